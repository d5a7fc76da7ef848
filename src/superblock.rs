use crate::error::FsError;
use crate::fat_constants::{CLUSTER_SIZE, FIRST_DATA_CLUSTER};

/// Serialized size: five little-endian u32 fields.
pub const SUPERBLOCK_SIZE: usize = 20;

/// Layout descriptor stored at offset 0 of the image. Records where the
/// FAT, root directory block and data area live, so a remount can rebind
/// its views without recomputing the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub total_clusters: u32,
    pub fat_offset: u32,
    pub root_dir_offset: u32,
    pub data_offset: u32,
    pub cluster_size: u32,
}

impl Superblock {
    /// Compute the layout written by a fresh format: superblock, FAT
    /// (two bytes per cluster), one root directory block, data area.
    pub fn for_image(disk_size: usize, cluster_size: usize) -> Self {
        let total_clusters = ((disk_size - SUPERBLOCK_SIZE) / (cluster_size + 2)) as u32;
        let fat_offset = SUPERBLOCK_SIZE as u32;
        let root_dir_offset = fat_offset + total_clusters * 2;
        let data_offset = root_dir_offset + cluster_size as u32;
        Superblock {
            total_clusters,
            fat_offset,
            root_dir_offset,
            data_offset,
            cluster_size: cluster_size as u32,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, FsError> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(FsError::Corrupt);
        }
        let field = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Ok(Superblock {
            total_clusters: field(0),
            fat_offset: field(4),
            root_dir_offset: field(8),
            data_offset: field(12),
            cluster_size: field(16),
        })
    }

    pub fn serialize(&self, buf: &mut [u8]) -> Result<(), FsError> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(FsError::Corrupt);
        }
        buf[0..4].copy_from_slice(&self.total_clusters.to_le_bytes());
        buf[4..8].copy_from_slice(&self.fat_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.root_dir_offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.cluster_size.to_le_bytes());
        Ok(())
    }

    /// Sanity checks before binding views onto a pre-existing image. A
    /// superblock that places any region out of bounds would otherwise
    /// turn every later slice into a panic.
    pub fn validate(&self, disk_size: usize) -> Result<(), FsError> {
        let cs = self.cluster_size as usize;
        if cs != CLUSTER_SIZE || self.total_clusters <= u32::from(FIRST_DATA_CLUSTER) {
            return Err(FsError::Corrupt);
        }
        let fat_end = self.fat_offset as usize + self.total_clusters as usize * 2;
        let root_end = self.root_dir_offset as usize + cs;
        let data_clusters = self.total_clusters as usize - FIRST_DATA_CLUSTER as usize;
        let data_end = self.data_offset as usize + data_clusters * cs;
        if self.fat_offset as usize != SUPERBLOCK_SIZE
            || fat_end > self.root_dir_offset as usize
            || root_end > self.data_offset as usize
            || data_end > disk_size
        {
            return Err(FsError::Corrupt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat_constants::DISK_SIZE;

    #[test]
    fn format_layout_is_contiguous() {
        let sb = Superblock::for_image(DISK_SIZE, CLUSTER_SIZE);
        assert_eq!(sb.fat_offset as usize, SUPERBLOCK_SIZE);
        assert_eq!(sb.root_dir_offset, sb.fat_offset + sb.total_clusters * 2);
        assert_eq!(sb.data_offset, sb.root_dir_offset + CLUSTER_SIZE as u32);
        assert!(sb.validate(DISK_SIZE).is_ok());
    }

    #[test]
    fn serialize_and_parse_roundtrip() {
        let sb = Superblock::for_image(DISK_SIZE, CLUSTER_SIZE);
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        sb.serialize(&mut buf).expect("serialize failed");
        let sb2 = Superblock::parse(&buf).expect("parse failed");
        assert_eq!(sb, sb2);
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert_eq!(Superblock::parse(&[0u8; 8]), Err(FsError::Corrupt));
    }

    #[test]
    fn validate_rejects_foreign_cluster_size() {
        let mut sb = Superblock::for_image(DISK_SIZE, CLUSTER_SIZE);
        sb.cluster_size = 512;
        assert_eq!(sb.validate(DISK_SIZE), Err(FsError::Corrupt));
    }
}
