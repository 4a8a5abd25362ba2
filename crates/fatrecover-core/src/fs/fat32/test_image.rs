//! Small synthetic FAT32 images for unit tests.
//!
//! Geometry: 512-byte sectors, 1 sector per cluster, 32 reserved sectors,
//! 2 FAT copies of 1 sector each, 64 data clusters, root directory at
//! cluster 2.

use super::fat::FAT_ENTRY_EOC;

pub(crate) struct TestImage {
    pub bytes: Vec<u8>,
    root: Vec<u32>,
    next_slot: usize,
}

impl TestImage {
    pub const BYTES_PER_SECTOR: usize = 512;
    pub const RESERVED: usize = 32;
    pub const FATS: usize = 2;
    pub const DATA_CLUSTERS: u32 = 64;

    pub fn new() -> Self {
        let total_sectors = Self::RESERVED + Self::FATS + Self::DATA_CLUSTERS as usize;
        let mut bytes = vec![0u8; total_sectors * Self::BYTES_PER_SECTOR];

        bytes[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        bytes[3..11].copy_from_slice(b"MSWIN4.1");
        bytes[0x0B..0x0D].copy_from_slice(&(Self::BYTES_PER_SECTOR as u16).to_le_bytes());
        bytes[0x0D] = 1;
        bytes[0x0E..0x10].copy_from_slice(&(Self::RESERVED as u16).to_le_bytes());
        bytes[0x10] = Self::FATS as u8;
        bytes[0x15] = 0xF8;
        bytes[0x20..0x24].copy_from_slice(&(total_sectors as u32).to_le_bytes());
        bytes[0x24..0x28].copy_from_slice(&1u32.to_le_bytes());
        bytes[0x2C..0x30].copy_from_slice(&2u32.to_le_bytes());
        bytes[0x47..0x52].copy_from_slice(b"NO NAME    ");
        bytes[0x52..0x5A].copy_from_slice(b"FAT32   ");
        bytes[510] = 0x55;
        bytes[511] = 0xAA;

        let mut image = TestImage {
            bytes,
            root: vec![2],
            next_slot: 0,
        };
        image.set_fat(0, 0x0FFF_FFF8);
        image.set_fat(1, FAT_ENTRY_EOC);
        image.set_fat(2, FAT_ENTRY_EOC);
        image
    }

    pub fn cluster_offset(cluster: u32) -> usize {
        (Self::RESERVED + Self::FATS + cluster as usize - 2) * Self::BYTES_PER_SECTOR
    }

    /// Set a FAT entry in every copy
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        for copy in 0..Self::FATS {
            let offset = (Self::RESERVED + copy) * Self::BYTES_PER_SECTOR + cluster as usize * 4;
            self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Append a cluster to the root directory chain
    pub fn extend_root(&mut self, cluster: u32) {
        let last = *self.root.last().unwrap();
        self.set_fat(last, cluster);
        self.set_fat(cluster, FAT_ENTRY_EOC);
        self.root.push(cluster);
    }

    pub fn write_cluster(&mut self, cluster: u32, data: &[u8]) {
        assert!(data.len() <= Self::BYTES_PER_SECTOR);
        let offset = Self::cluster_offset(cluster);
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Add a raw root directory entry, returning its byte offset
    pub fn add_entry(&mut self, name: &[u8; 11], attr: u8, start: u32, size: u32) -> usize {
        let per_cluster = Self::BYTES_PER_SECTOR / 32;
        let cluster = self.root[self.next_slot / per_cluster];
        let offset = Self::cluster_offset(cluster) + (self.next_slot % per_cluster) * 32;
        self.next_slot += 1;

        let raw = &mut self.bytes[offset..offset + 32];
        raw[..11].copy_from_slice(name);
        raw[11] = attr;
        raw[20..22].copy_from_slice(&((start >> 16) as u16).to_le_bytes());
        raw[26..28].copy_from_slice(&(start as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&size.to_le_bytes());
        offset
    }

    /// Write `content` across `clusters`, chain them and delete the entry:
    /// the name byte becomes 0xE5 and the chain is freed in every FAT.
    pub fn add_deleted_file(&mut self, name: &[u8; 11], content: &[u8], clusters: &[u32]) -> usize {
        for (i, chunk) in content.chunks(Self::BYTES_PER_SECTOR).enumerate() {
            self.write_cluster(clusters[i], chunk);
        }
        let start = clusters.first().copied().unwrap_or(0);
        let offset = self.add_entry(name, 0x20, start, content.len() as u32);
        self.bytes[offset] = 0xE5;
        offset
    }
}
