use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use anyhow::Context;
use log::{error, info};
use memmap2::MmapMut;

use crate::fat_constants::DISK_SIZE;

/// Owner of the memory-mapped disk image. Every other component borrows
/// typed subslices of this mapping; nothing else holds it past unmount.
pub struct ImageMapper {
    map: MmapMut,
}

impl ImageMapper {
    /// Open the backing image read+write, creating and sizing it to
    /// `DISK_SIZE` if absent. Returns the mapper and whether the image
    /// was freshly created (a fresh image still needs formatting).
    pub fn open(path: &Path) -> anyhow::Result<(Self, bool)> {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => {
                let len = file
                    .metadata()
                    .with_context(|| format!("stat image {}", path.display()))?
                    .len();
                if len != DISK_SIZE as u64 {
                    anyhow::bail!(
                        "image {} is {} bytes, expected {}",
                        path.display(),
                        len,
                        DISK_SIZE
                    );
                }
                let map = unsafe { MmapMut::map_mut(&file) }
                    .with_context(|| format!("map image {}", path.display()))?;
                info!("opened existing image {}", path.display());
                Ok((ImageMapper { map }, false))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(path)
                    .with_context(|| format!("create image {}", path.display()))?;
                file.set_len(DISK_SIZE as u64)
                    .with_context(|| format!("size image {} to {} bytes", path.display(), DISK_SIZE))?;
                let map = unsafe { MmapMut::map_mut(&file) }
                    .with_context(|| format!("map image {}", path.display()))?;
                info!("created image {} ({} bytes)", path.display(), DISK_SIZE);
                Ok((ImageMapper { map }, true))
            }
            Err(e) => Err(e).with_context(|| format!("open image {}", path.display())),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Synchronous flush of the whole mapping to the backing file.
    pub fn flush(&self) -> io::Result<()> {
        self.map.flush()
    }
}

impl Drop for ImageMapper {
    fn drop(&mut self) {
        // Unmount still proceeds on a failed sync; the failure is logged.
        if let Err(e) = self.map.flush() {
            error!("image flush on unmount failed: {e}");
        }
    }
}
