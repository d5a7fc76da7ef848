use std::fmt;

/// Failure taxonomy for filesystem operations. Every variant maps onto
/// one POSIX errno at the upcall boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// A path component does not exist.
    NotFound,
    /// A non-final path component is not a directory.
    NotADirectory,
    /// The operation targets a directory but requires a regular file.
    IsADirectory,
    /// Create/mkdir target already exists.
    AlreadyExists,
    /// rmdir on a directory that still holds live entries.
    NotEmpty,
    /// The root directory cannot be removed.
    Busy,
    /// No free cluster or no free directory slot.
    NoSpace,
    /// Malformed path or out-of-range argument.
    InvalidArgument,
    /// On-disk structure violated an invariant (e.g. a chain walk
    /// exceeded its step bound). Treated as corruption, never retried.
    Corrupt,
}

impl FsError {
    /// Negative errno value for the upcall surface.
    pub fn errno(self) -> i32 {
        -match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::Busy => libc::EBUSY,
            FsError::NoSpace => libc::ENOSPC,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::Corrupt => libc::EIO,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "no such file or directory"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::IsADirectory => write!(f, "is a directory"),
            FsError::AlreadyExists => write!(f, "file exists"),
            FsError::NotEmpty => write!(f, "directory not empty"),
            FsError::Busy => write!(f, "resource busy"),
            FsError::NoSpace => write!(f, "no space left on device"),
            FsError::InvalidArgument => write!(f, "invalid argument"),
            FsError::Corrupt => write!(f, "filesystem structure corrupt"),
        }
    }
}

impl std::error::Error for FsError {}
