use crate::fat_constants::{
    Attributes, DIR_ENTRY_SIZE, ENTRIES_PER_DIR, ENTRY_DELETED, ENTRY_NEVER_USED, FAT_ENTRY_EOF,
    MAX_EXTENSION, MAX_FILENAME,
};

/// Decoded form of one 32-byte directory record.
///
/// The on-disk layout is packed little-endian: name (8), extension (3),
/// attributes (1), reserved (10), mtime (2), mdate (2), first cluster
/// (2), file size (4). The timestamp fields are not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; MAX_FILENAME],
    pub ext: [u8; MAX_EXTENSION],
    pub attributes: Attributes,
    pub first_cluster: u16,
    pub file_size: u32,
}

impl DirEntry {
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; MAX_FILENAME];
        name.copy_from_slice(&raw[0..8]);
        let mut ext = [0u8; MAX_EXTENSION];
        ext.copy_from_slice(&raw[8..11]);
        DirEntry {
            name,
            ext,
            attributes: Attributes::from_bits_retain(raw[11]),
            first_cluster: u16::from_le_bytes([raw[26], raw[27]]),
            file_size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[..DIR_ENTRY_SIZE].fill(0);
        raw[0..8].copy_from_slice(&self.name);
        raw[8..11].copy_from_slice(&self.ext);
        raw[11] = self.attributes.bits();
        raw[26..28].copy_from_slice(&self.first_cluster.to_le_bytes());
        raw[28..32].copy_from_slice(&self.file_size.to_le_bytes());
    }

    /// Fresh empty file: no data chain yet, so the first-cluster field
    /// holds the EOF sentinel.
    pub fn new_file(name: [u8; MAX_FILENAME], ext: [u8; MAX_EXTENSION]) -> Self {
        DirEntry {
            name,
            ext,
            attributes: Attributes::ARCHIVE,
            first_cluster: FAT_ENTRY_EOF,
            file_size: 0,
        }
    }

    pub fn new_directory(
        name: [u8; MAX_FILENAME],
        ext: [u8; MAX_EXTENSION],
        first_cluster: u16,
    ) -> Self {
        DirEntry {
            name,
            ext,
            attributes: Attributes::DIRECTORY,
            first_cluster,
            file_size: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    /// True for the physical `.`/`..` records inside a directory block.
    pub fn is_dot_record(&self) -> bool {
        self.name[0] == b'.'
    }

    /// Lowercase `name[.ext]` form used by readdir.
    pub fn display_name(&self) -> String {
        let mut out = String::with_capacity(MAX_FILENAME + 1 + MAX_EXTENSION);
        for &b in self.name.iter().take_while(|&&b| b != b' ') {
            out.push(b.to_ascii_lowercase() as char);
        }
        if self.ext[0] != b' ' {
            out.push('.');
            for &b in self.ext.iter().take_while(|&&b| b != b' ') {
                out.push(b.to_ascii_lowercase() as char);
            }
        }
        out
    }
}

/// Encode a path component into FAT 8.3 form: uppercase, space-padded,
/// split at the last dot. `.` and `..` are stored literally.
pub fn encode_name(name: &str) -> ([u8; MAX_FILENAME], [u8; MAX_EXTENSION]) {
    let mut fat_name = [b' '; MAX_FILENAME];
    let mut fat_ext = [b' '; MAX_EXTENSION];
    match name {
        "." => fat_name[0] = b'.',
        ".." => {
            fat_name[0] = b'.';
            fat_name[1] = b'.';
        }
        _ => {
            let (stem, ext) = match name.rsplit_once('.') {
                Some((stem, ext)) if !ext.is_empty() => (stem, ext),
                _ => (name.trim_end_matches('.'), ""),
            };
            for (dst, b) in fat_name.iter_mut().zip(stem.bytes()) {
                *dst = b.to_ascii_uppercase();
            }
            for (dst, b) in fat_ext.iter_mut().zip(ext.bytes()) {
                *dst = b.to_ascii_uppercase();
            }
        }
    }
    (fat_name, fat_ext)
}

fn slot_range(slot: usize) -> std::ops::Range<usize> {
    slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE
}

fn slot_in_use(bytes: &[u8], slot: usize) -> bool {
    let first = bytes[slot * DIR_ENTRY_SIZE];
    first != ENTRY_NEVER_USED && first != ENTRY_DELETED
}

/// Read view over one cluster-sized directory block.
pub struct DirBlock<'a> {
    bytes: &'a [u8],
}

impl<'a> DirBlock<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), ENTRIES_PER_DIR * DIR_ENTRY_SIZE);
        DirBlock { bytes }
    }

    pub fn entry(&self, slot: usize) -> DirEntry {
        DirEntry::parse(&self.bytes[slot_range(slot)])
    }

    /// Byte-equal match on the encoded (name, ext) pair. Tombstoned and
    /// never-used slots are skipped; the scan covers the whole block.
    pub fn find(&self, name: &str) -> Option<(usize, DirEntry)> {
        let (want_name, want_ext) = encode_name(name);
        for slot in 0..ENTRIES_PER_DIR {
            if !slot_in_use(self.bytes, slot) {
                continue;
            }
            let raw = &self.bytes[slot_range(slot)];
            if raw[0..8] == want_name && raw[8..11] == want_ext {
                return Some((slot, DirEntry::parse(raw)));
            }
        }
        None
    }

    /// First slot whose record was never used or has been tombstoned.
    pub fn find_free_slot(&self) -> Option<usize> {
        (0..ENTRIES_PER_DIR).find(|&slot| !slot_in_use(self.bytes, slot))
    }

    pub fn live_entries(&self) -> Vec<(usize, DirEntry)> {
        (0..ENTRIES_PER_DIR)
            .filter(|&slot| slot_in_use(self.bytes, slot))
            .map(|slot| (slot, self.entry(slot)))
            .collect()
    }

    /// Empty apart from the `.`/`..` records at slots 0 and 1.
    pub fn is_empty_past_dots(&self) -> bool {
        (2..ENTRIES_PER_DIR).all(|slot| !slot_in_use(self.bytes, slot))
    }
}

/// Write view over one directory block.
pub struct DirBlockMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> DirBlockMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        debug_assert_eq!(bytes.len(), ENTRIES_PER_DIR * DIR_ENTRY_SIZE);
        DirBlockMut { bytes }
    }

    pub fn store(&mut self, slot: usize, entry: &DirEntry) {
        entry.encode(&mut self.bytes[slot_range(slot)]);
    }

    pub fn tombstone(&mut self, slot: usize) {
        self.bytes[slot * DIR_ENTRY_SIZE] = ENTRY_DELETED;
    }

    /// Zero a fresh directory cluster and write its `.`/`..` records.
    /// `parent_cluster` is 0 when the parent is the root block.
    pub fn init_directory(&mut self, own_cluster: u16, parent_cluster: u16) {
        self.bytes.fill(0);
        let (dot, blank_ext) = encode_name(".");
        let (dotdot, _) = encode_name("..");
        self.store(0, &DirEntry::new_directory(dot, blank_ext, own_cluster));
        self.store(1, &DirEntry::new_directory(dotdot, blank_ext, parent_cluster));
    }
}
