use std::ops::Range;
use std::path::Path;

use anyhow::Context;
use log::{debug, info};

use crate::dir::{encode_name, DirBlock, DirBlockMut, DirEntry};
use crate::error::FsError;
use crate::fat::{Fat, FatMut};
use crate::fat_constants::{
    CLUSTER_SIZE, DISK_SIZE, FAT_ENTRY_EOF, FAT_ENTRY_FREE, FIRST_DATA_CLUSTER,
};
use crate::image::ImageMapper;
use crate::path::{resolve, split_parent, DirLocation, Resolved, ResolvedEntry};
use crate::superblock::{Superblock, SUPERBLOCK_SIZE};

/// Attributes the core reports for a resolved path. Mode bits, owner
/// and timestamps are synthesised at the upcall boundary; the core only
/// knows the on-disk facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    Directory,
    File { size: u64, clusters: u32 },
}

/// The mounted filesystem: the mapped image plus its layout descriptor.
/// All other views (FAT, directory blocks, data clusters) are borrowed
/// from here per operation, so nothing outlives the mount.
pub struct Fat16Fs {
    image: ImageMapper,
    layout: Superblock,
}

impl Fat16Fs {
    /// Open or create the image at `path` and bind the layout views.
    /// A freshly created image is formatted first.
    pub fn mount(path: &Path) -> anyhow::Result<Self> {
        let (mut image, fresh) = ImageMapper::open(path)?;
        let layout = if fresh {
            let layout = Superblock::for_image(DISK_SIZE, CLUSTER_SIZE);
            Self::format(&mut image, &layout);
            info!(
                "formatted image: {} clusters of {} bytes",
                layout.total_clusters, layout.cluster_size
            );
            layout
        } else {
            Superblock::parse(image.bytes())
                .and_then(|sb| sb.validate(DISK_SIZE).map(|_| sb))
                .context("image carries an invalid superblock")?
        };
        Ok(Fat16Fs { image, layout })
    }

    fn format(image: &mut ImageMapper, layout: &Superblock) {
        let bytes = image.bytes_mut();
        bytes.fill(0);
        // infallible: the mapping is DISK_SIZE bytes by construction
        let _ = layout.serialize(&mut bytes[..SUPERBLOCK_SIZE]);
        let fat_range = layout.fat_offset as usize
            ..layout.fat_offset as usize + layout.total_clusters as usize * 2;
        FatMut::new(&mut bytes[fat_range], layout.total_clusters).init();
    }

    /// Flush the mapping to the backing file. Called on unmount and by
    /// hosts that want durability mid-mount.
    pub fn flush(&self) -> Result<(), FsError> {
        self.image.flush().map_err(|e| {
            log::error!("image flush failed: {e}");
            FsError::Corrupt
        })
    }

    pub fn total_clusters(&self) -> u32 {
        self.layout.total_clusters
    }

    // --- region plumbing -------------------------------------------------

    fn fat_range(&self) -> Range<usize> {
        let start = self.layout.fat_offset as usize;
        start..start + self.layout.total_clusters as usize * 2
    }

    fn dir_range(&self, location: DirLocation) -> Result<Range<usize>, FsError> {
        let cs = self.layout.cluster_size as usize;
        match location {
            DirLocation::Root => {
                let start = self.layout.root_dir_offset as usize;
                Ok(start..start + cs)
            }
            DirLocation::Cluster(c) => {
                if c < FIRST_DATA_CLUSTER || u32::from(c) >= self.layout.total_clusters {
                    return Err(FsError::Corrupt);
                }
                let start = self.layout.data_offset as usize
                    + (c - FIRST_DATA_CLUSTER) as usize * cs;
                Ok(start..start + cs)
            }
        }
    }

    pub(crate) fn dir_block(&self, location: DirLocation) -> Result<DirBlock<'_>, FsError> {
        let range = self.dir_range(location)?;
        Ok(DirBlock::new(&self.image.bytes()[range]))
    }

    fn dir_block_mut(&mut self, location: DirLocation) -> Result<DirBlockMut<'_>, FsError> {
        let range = self.dir_range(location)?;
        Ok(DirBlockMut::new(&mut self.image.bytes_mut()[range]))
    }

    fn fat(&self) -> Fat<'_> {
        Fat::new(&self.image.bytes()[self.fat_range()], self.layout.total_clusters)
    }

    fn fat_mut(&mut self) -> FatMut<'_> {
        let range = self.fat_range();
        let total = self.layout.total_clusters;
        FatMut::new(&mut self.image.bytes_mut()[range], total)
    }

    /// FAT view and data area at once; the regions are disjoint, so the
    /// mapping splits cleanly at the data-area offset.
    fn fat_and_data(&mut self) -> (Fat<'_>, &mut [u8]) {
        let fat_range = self.fat_range();
        let data_offset = self.layout.data_offset as usize;
        let total = self.layout.total_clusters;
        let (meta, data) = self.image.bytes_mut().split_at_mut(data_offset);
        (Fat::new(&meta[fat_range], total), data)
    }

    fn store_entry(
        &mut self,
        parent: DirLocation,
        slot: usize,
        entry: &DirEntry,
    ) -> Result<(), FsError> {
        self.dir_block_mut(parent)?.store(slot, entry);
        Ok(())
    }

    fn resolve_file(&self, path: &str) -> Result<ResolvedEntry, FsError> {
        match resolve(self, path)? {
            Resolved::Root => Err(FsError::IsADirectory),
            Resolved::Entry(e) if e.entry.is_dir() => Err(FsError::IsADirectory),
            Resolved::Entry(e) => Ok(e),
        }
    }

    /// Resolve a parent path for create/mkdir: must exist and be a
    /// directory; returns where its block lives.
    fn resolve_dir(&self, path: &str) -> Result<DirLocation, FsError> {
        match resolve(self, path)? {
            Resolved::Root => Ok(DirLocation::Root),
            Resolved::Entry(e) if e.entry.is_dir() => {
                Ok(DirLocation::from_cluster(e.entry.first_cluster))
            }
            Resolved::Entry(_) => Err(FsError::NotADirectory),
        }
    }

    fn ensure_absent(&self, path: &str) -> Result<(), FsError> {
        match resolve(self, path) {
            Ok(_) => Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // --- metadata operations ---------------------------------------------

    pub fn getattr(&self, path: &str) -> Result<Attr, FsError> {
        match resolve(self, path)? {
            Resolved::Root => Ok(Attr::Directory),
            Resolved::Entry(e) if e.entry.is_dir() => Ok(Attr::Directory),
            Resolved::Entry(e) => {
                let first = e.entry.first_cluster;
                let clusters = if first == FAT_ENTRY_EOF || first == FAT_ENTRY_FREE {
                    0
                } else {
                    self.fat().chain_length(first)?
                };
                Ok(Attr::File {
                    size: u64::from(e.entry.file_size),
                    clusters,
                })
            }
        }
    }

    /// Directory listing: `.` and `..` are synthesised first, then each
    /// live entry in lowercase `name[.ext]` form. Raw dot records in
    /// non-root directories are suppressed to avoid duplicates.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let location = self.resolve_dir(path)?;
        let block = self.dir_block(location)?;
        let mut names = vec![String::from("."), String::from("..")];
        for (_, entry) in block.live_entries() {
            if entry.is_dot_record() {
                continue;
            }
            names.push(entry.display_name());
        }
        Ok(names)
    }

    /// No-op by design (timestamps are not persisted), but the path is
    /// still resolved so a missing target reports ENOENT.
    pub fn utimens(&self, path: &str) -> Result<(), FsError> {
        resolve(self, path).map(|_| ())
    }

    // --- namespace operations --------------------------------------------

    pub fn create(&mut self, path: &str) -> Result<(), FsError> {
        let (parent_path, base) = split_parent(path)?;
        self.ensure_absent(path)?;
        let parent = self.resolve_dir(parent_path)?;
        let slot = self
            .dir_block(parent)?
            .find_free_slot()
            .ok_or(FsError::NoSpace)?;
        let (name, ext) = encode_name(base);
        self.store_entry(parent, slot, &DirEntry::new_file(name, ext))
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let (parent_path, base) = split_parent(path)?;
        self.ensure_absent(path)?;
        let parent = self.resolve_dir(parent_path)?;
        // claim the slot first so cluster exhaustion leaves no half entry
        let slot = self
            .dir_block(parent)?
            .find_free_slot()
            .ok_or(FsError::NoSpace)?;
        let cluster = self.fat_mut().allocate()?;
        let (name, ext) = encode_name(base);
        self.store_entry(parent, slot, &DirEntry::new_directory(name, ext, cluster))?;
        self.dir_block_mut(DirLocation::Cluster(cluster))?
            .init_directory(cluster, parent.cluster_id());
        Ok(())
    }

    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let e = self.resolve_file(path)?;
        let first = e.entry.first_cluster;
        if first != FAT_ENTRY_FREE && first != FAT_ENTRY_EOF {
            self.fat_mut().free_chain(first)?;
        }
        self.dir_block_mut(e.parent)?.tombstone(e.slot);
        Ok(())
    }

    pub fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let e = match resolve(self, path)? {
            Resolved::Root => return Err(FsError::Busy),
            Resolved::Entry(e) => e,
        };
        if !e.entry.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let cluster = e.entry.first_cluster;
        if !self
            .dir_block(DirLocation::from_cluster(cluster))?
            .is_empty_past_dots()
        {
            return Err(FsError::NotEmpty);
        }
        // directories are single-cluster by construction
        if cluster != 0 {
            self.fat_mut().set(cluster, FAT_ENTRY_FREE);
        }
        self.dir_block_mut(e.parent)?.tombstone(e.slot);
        Ok(())
    }

    // --- file I/O engine --------------------------------------------------

    pub fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let e = self.resolve_file(path)?;
        let file_size = u64::from(e.entry.file_size);
        if offset >= file_size {
            return Ok(0);
        }
        let want = buf.len().min((file_size - offset) as usize);
        if want == 0 {
            return Ok(0);
        }
        let mut cluster = e.entry.first_cluster;
        if cluster == FAT_ENTRY_EOF || cluster == FAT_ENTRY_FREE {
            return Ok(0);
        }

        let cs = self.layout.cluster_size as u64;
        let fat = self.fat();
        // skip the clusters fully before the requested offset
        let mut cluster_start = 0u64;
        let mut steps = 0u32;
        while cluster_start + cs <= offset {
            cluster = fat.get(cluster);
            if cluster == FAT_ENTRY_EOF || cluster == FAT_ENTRY_FREE {
                return Ok(0);
            }
            cluster_start += cs;
            steps += 1;
            if steps >= self.layout.total_clusters {
                return Err(FsError::Corrupt);
            }
        }

        let data = &self.image.bytes()[self.layout.data_offset as usize..];
        let mut copied = 0usize;
        while copied < want {
            if cluster < FIRST_DATA_CLUSTER || u32::from(cluster) >= self.layout.total_clusters {
                return Err(FsError::Corrupt);
            }
            let in_cluster = (offset + copied as u64 - cluster_start) as usize;
            let n = (cs as usize - in_cluster).min(want - copied);
            let start =
                (cluster - FIRST_DATA_CLUSTER) as usize * cs as usize + in_cluster;
            buf[copied..copied + n].copy_from_slice(&data[start..start + n]);
            copied += n;
            if copied < want {
                let next = fat.get(cluster);
                if next == FAT_ENTRY_EOF || next == FAT_ENTRY_FREE {
                    break;
                }
                cluster = next;
                cluster_start += cs;
            }
        }
        Ok(copied)
    }

    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> Result<usize, FsError> {
        let e = self.resolve_file(path)?;
        if data.is_empty() {
            return Ok(0);
        }
        let mut entry = e.entry;
        let cs = u64::from(self.layout.cluster_size);

        let mut first = entry.first_cluster;
        let had_chain = first != FAT_ENTRY_EOF && first != FAT_ENTRY_FREE;
        let mut count = if had_chain {
            self.fat().chain_length(first)?
        } else {
            0
        };

        // grow the chain to cover offset + len; a failed allocation stops
        // the extension and the copy below clamps to what fits
        let required = (offset + data.len() as u64).div_ceil(cs) as u32;
        if required > count {
            let mut tail = if had_chain {
                Some(self.fat().tail(first)?)
            } else {
                None
            };
            let mut fat = self.fat_mut();
            while count < required {
                let new = match fat.allocate() {
                    Ok(c) => c,
                    Err(FsError::NoSpace) => {
                        debug!("chain extension ran out of clusters at {count}/{required}");
                        break;
                    }
                    Err(err) => return Err(err),
                };
                match tail {
                    Some(t) => fat.set(t, new),
                    None => first = new,
                }
                tail = Some(new);
                count += 1;
            }
        }

        let max_writable = u64::from(count) * cs;
        if offset >= max_writable {
            // keep whatever clusters did get linked to the file
            if first != entry.first_cluster {
                entry.first_cluster = first;
                self.store_entry(e.parent, e.slot, &entry)?;
            }
            return Ok(0);
        }
        let len = data.len().min((max_writable - offset) as usize);

        let total_clusters = self.layout.total_clusters;
        let (fat, data_area) = self.fat_and_data();
        let mut cluster = first;
        let mut cluster_start = 0u64;
        let mut steps = 0u32;
        while cluster_start + cs <= offset {
            cluster = fat.get(cluster);
            if cluster == FAT_ENTRY_EOF || cluster == FAT_ENTRY_FREE {
                return Err(FsError::Corrupt);
            }
            cluster_start += cs;
            steps += 1;
            if steps >= total_clusters {
                return Err(FsError::Corrupt);
            }
        }

        let mut written = 0usize;
        while written < len {
            if cluster < FIRST_DATA_CLUSTER || u32::from(cluster) >= total_clusters {
                return Err(FsError::Corrupt);
            }
            let in_cluster = (offset + written as u64 - cluster_start) as usize;
            let n = (cs as usize - in_cluster).min(len - written);
            let start =
                (cluster - FIRST_DATA_CLUSTER) as usize * cs as usize + in_cluster;
            data_area[start..start + n].copy_from_slice(&data[written..written + n]);
            written += n;
            if written < len {
                let next = fat.get(cluster);
                if next == FAT_ENTRY_EOF || next == FAT_ENTRY_FREE {
                    break;
                }
                cluster = next;
                cluster_start += cs;
            }
        }

        entry.first_cluster = first;
        let end = offset + written as u64;
        if end > u64::from(entry.file_size) {
            entry.file_size = end as u32;
        }
        self.store_entry(e.parent, e.slot, &entry)?;
        Ok(written)
    }

    /// Rewrites the recorded size only; the cluster chain is left alone.
    pub fn truncate(&mut self, path: &str, size: u64) -> Result<(), FsError> {
        let e = self.resolve_file(path)?;
        let new_size = u32::try_from(size).map_err(|_| FsError::InvalidArgument)?;
        let mut entry = e.entry;
        entry.file_size = new_size;
        self.store_entry(e.parent, e.slot, &entry)
    }
}
