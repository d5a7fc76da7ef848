//! User-space FAT16 filesystem core over a memory-mapped disk image.
//!
//! The backing image is mapped once at mount; the superblock, FAT, root
//! directory block and data area are disjoint typed views into that one
//! mapping. [`fs::Fat16Fs`] implements the operations, and
//! [`handlers::Driver`] adapts them to the 0 / byte-count /
//! negative-errno convention of a FUSE-style upcall transport. The
//! transport itself and the CLI front-end live outside this crate.

pub mod dir;
pub mod error;
pub mod fat;
pub mod fat_constants;
pub mod fs;
pub mod handlers;
pub mod image;
pub mod path;
pub mod superblock;

pub use error::FsError;
pub use fs::{Attr, Fat16Fs};
pub use handlers::{Driver, FileStat};
