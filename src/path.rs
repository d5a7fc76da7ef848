use crate::dir::DirEntry;
use crate::error::FsError;
use crate::fs::Fat16Fs;

/// Where a directory's block lives. Cluster 0 in an on-disk `..` record
/// aliases the root block, which sits outside the data area and has no
/// FAT presence; the tagged form keeps that case out of the arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    Root,
    Cluster(u16),
}

impl DirLocation {
    pub fn from_cluster(cluster: u16) -> Self {
        if cluster == 0 {
            DirLocation::Root
        } else {
            DirLocation::Cluster(cluster)
        }
    }

    /// The value stored in a child directory's `..` record.
    pub fn cluster_id(self) -> u16 {
        match self {
            DirLocation::Root => 0,
            DirLocation::Cluster(c) => c,
        }
    }
}

/// A located directory entry: the directory block that holds it, the
/// slot index within that block, and the decoded record.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEntry {
    pub parent: DirLocation,
    pub slot: usize,
    pub entry: DirEntry,
}

/// Outcome of resolving an absolute path. The root directory has no
/// entry of its own, so it gets a dedicated variant.
#[derive(Debug, Clone, Copy)]
pub enum Resolved {
    Root,
    Entry(ResolvedEntry),
}

/// Walk an absolute path one component at a time through the directory
/// store. Empty segments (repeated slashes) are skipped.
pub fn resolve(fs: &Fat16Fs, path: &str) -> Result<Resolved, FsError> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidArgument);
    }
    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    let mut current = DirLocation::Root;
    loop {
        let segment = match segments.next() {
            Some(s) => s,
            None => return Ok(Resolved::Root),
        };
        let (slot, entry) = fs
            .dir_block(current)?
            .find(segment)
            .ok_or(FsError::NotFound)?;
        if segments.peek().is_none() {
            return Ok(Resolved::Entry(ResolvedEntry {
                parent: current,
                slot,
                entry,
            }));
        }
        if !entry.is_dir() {
            return Err(FsError::NotADirectory);
        }
        current = DirLocation::from_cluster(entry.first_cluster);
    }
}

/// Split a path into parent path and basename for create/mkdir. An
/// empty basename (including the bare root) is EINVAL.
pub fn split_parent(path: &str) -> Result<(&str, &str), FsError> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidArgument);
    }
    let idx = match path.rfind('/') {
        Some(idx) => idx,
        None => return Err(FsError::InvalidArgument),
    };
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    let base = &path[idx + 1..];
    if base.is_empty() {
        return Err(FsError::InvalidArgument);
    }
    Ok((parent, base))
}
