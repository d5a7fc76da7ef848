//! Upcall boundary for a FUSE-style host library.
//!
//! The host delivers `getattr`, `readdir`, `read`, `write`, ... as
//! calls into a [`Driver`]; every handler runs under one exclusive lock
//! (the whole filesystem is a single critical section) and reports
//! results in the host convention: `0` or a byte count on success, a
//! negative POSIX errno on failure.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use log::info;

use crate::error::FsError;
use crate::fs::{Attr, Fat16Fs};

/// Synthetic `stat` payload. Permission bits are not enforced and
/// timestamps are not persisted, so directories report `0755`, regular
/// files `0644`, ownership is the calling process, and every timestamp
/// is the current wall clock.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileStat {
    fn synthesize(attr: Attr) -> Self {
        let now = SystemTime::now();
        let (mode, nlink, size, blocks) = match attr {
            Attr::Directory => (libc::S_IFDIR as u32 | 0o755, 2, 0, 0),
            Attr::File { size, clusters } => {
                (libc::S_IFREG as u32 | 0o644, 1, size, u64::from(clusters))
            }
        };
        FileStat {
            mode,
            nlink,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            size,
            blocks,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

/// One mounted filesystem behind the FS-wide exclusive lock.
pub struct Driver {
    fs: Mutex<Fat16Fs>,
}

fn status(result: Result<(), FsError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.errno(),
    }
}

impl Driver {
    /// `init` upcall: mount the image configured via `--image=<path>`.
    /// Mount failure is fatal for the host; there is no mounted state
    /// to fall back to.
    pub fn init(image: &Path) -> anyhow::Result<Self> {
        let fs = Fat16Fs::mount(image)?;
        info!("filesystem initialised over {}", image.display());
        Ok(Driver { fs: Mutex::new(fs) })
    }

    /// `destroy` upcall: flush the mapping; unmapping happens when the
    /// driver is dropped. A failed sync is logged, not propagated.
    pub fn destroy(&self) {
        let _ = self.lock().flush();
        info!("filesystem unmounted");
    }

    fn lock(&self) -> MutexGuard<'_, Fat16Fs> {
        // handlers never leave the image in an inconsistent state on
        // panic, so a poisoned lock is still safe to reuse
        self.fs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn getattr(&self, path: &str) -> Result<FileStat, i32> {
        self.lock()
            .getattr(path)
            .map(FileStat::synthesize)
            .map_err(FsError::errno)
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<String>, i32> {
        self.lock().readdir(path).map_err(FsError::errno)
    }

    pub fn mkdir(&self, path: &str) -> i32 {
        status(self.lock().mkdir(path))
    }

    pub fn rmdir(&self, path: &str) -> i32 {
        status(self.lock().rmdir(path))
    }

    pub fn create(&self, path: &str) -> i32 {
        status(self.lock().create(path))
    }

    pub fn unlink(&self, path: &str) -> i32 {
        status(self.lock().unlink(path))
    }

    pub fn truncate(&self, path: &str, size: u64) -> i32 {
        status(self.lock().truncate(path, size))
    }

    pub fn utimens(&self, path: &str) -> i32 {
        status(self.lock().utimens(path))
    }

    pub fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> isize {
        match self.lock().read(path, buf, offset) {
            Ok(n) => n as isize,
            Err(e) => e.errno() as isize,
        }
    }

    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> isize {
        match self.lock().write(path, data, offset) {
            Ok(n) => n as isize,
            Err(e) => e.errno() as isize,
        }
    }
}
