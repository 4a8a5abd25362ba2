//! Synthetic FAT32 images shared by the integration tests
//!
//! Geometry: 512-byte sectors, 2 sectors per cluster, 8 reserved sectors,
//! 2 FAT copies of 1 sector each, 100 data clusters, root at cluster 2.

#![allow(dead_code)]

pub const BYTES_PER_SECTOR: usize = 512;
pub const SECTORS_PER_CLUSTER: usize = 2;
pub const CLUSTER_SIZE: usize = BYTES_PER_SECTOR * SECTORS_PER_CLUSTER;
pub const RESERVED_SECTORS: usize = 8;
pub const NUM_FATS: usize = 2;
pub const SECTORS_PER_FAT: usize = 1;
pub const DATA_CLUSTERS: usize = 100;

const EOC: u32 = 0x0FFF_FFFF;

pub struct FatImage {
    pub bytes: Vec<u8>,
    next_slot: usize,
}

impl FatImage {
    pub fn new() -> Self {
        let data_start = RESERVED_SECTORS + NUM_FATS * SECTORS_PER_FAT;
        let total_sectors = data_start + DATA_CLUSTERS * SECTORS_PER_CLUSTER;
        let mut bytes = vec![0u8; total_sectors * BYTES_PER_SECTOR];

        bytes[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        bytes[3..11].copy_from_slice(b"mkfs.fat");
        bytes[0x0B..0x0D].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
        bytes[0x0D] = SECTORS_PER_CLUSTER as u8;
        bytes[0x0E..0x10].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        bytes[0x10] = NUM_FATS as u8;
        bytes[0x15] = 0xF8;
        bytes[0x20..0x24].copy_from_slice(&(total_sectors as u32).to_le_bytes());
        bytes[0x24..0x28].copy_from_slice(&(SECTORS_PER_FAT as u32).to_le_bytes());
        bytes[0x2C..0x30].copy_from_slice(&2u32.to_le_bytes());
        bytes[0x43..0x47].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        bytes[0x47..0x52].copy_from_slice(b"TESTDISK   ");
        bytes[0x52..0x5A].copy_from_slice(b"FAT32   ");
        bytes[510] = 0x55;
        bytes[511] = 0xAA;

        let mut image = FatImage {
            bytes,
            next_slot: 0,
        };
        image.set_fat(0, 0x0FFF_FFF8);
        image.set_fat(1, EOC);
        image.set_fat(2, EOC);
        image
    }

    pub fn cluster_offset(cluster: u32) -> usize {
        let data_start = RESERVED_SECTORS + NUM_FATS * SECTORS_PER_FAT;
        (data_start + (cluster as usize - 2) * SECTORS_PER_CLUSTER) * BYTES_PER_SECTOR
    }

    fn fat_offset(copy: usize, cluster: u32) -> usize {
        (RESERVED_SECTORS + copy * SECTORS_PER_FAT) * BYTES_PER_SECTOR + cluster as usize * 4
    }

    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        for copy in 0..NUM_FATS {
            let offset = Self::fat_offset(copy, cluster);
            self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn fat(bytes: &[u8], copy: usize, cluster: u32) -> u32 {
        let offset = Self::fat_offset(copy, cluster);
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    /// Bytes of one whole FAT copy
    pub fn fat_copy(bytes: &[u8], copy: usize) -> &[u8] {
        let start = Self::fat_offset(copy, 0);
        &bytes[start..start + SECTORS_PER_FAT * BYTES_PER_SECTOR]
    }

    /// Add a live file: content, FAT chain and directory entry.
    /// Returns the byte offset of the entry.
    pub fn add_file(&mut self, name: &[u8; 11], content: &[u8], clusters: &[u32]) -> usize {
        assert_eq!(clusters.len(), content.len().div_ceil(CLUSTER_SIZE));
        for (chunk, &cluster) in content.chunks(CLUSTER_SIZE).zip(clusters) {
            let offset = Self::cluster_offset(cluster);
            self.bytes[offset..offset + chunk.len()].copy_from_slice(chunk);
        }
        for (i, &cluster) in clusters.iter().enumerate() {
            self.set_fat(cluster, clusters.get(i + 1).copied().unwrap_or(EOC));
        }
        let start = clusters.first().copied().unwrap_or(0);
        self.add_entry(name, 0x20, start, content.len() as u32)
    }

    pub fn add_entry(&mut self, name: &[u8; 11], attr: u8, start: u32, size: u32) -> usize {
        assert!(self.next_slot < CLUSTER_SIZE / 32, "root directory cluster is full");
        let offset = Self::cluster_offset(2) + self.next_slot * 32;
        self.next_slot += 1;

        let raw = &mut self.bytes[offset..offset + 32];
        raw[..11].copy_from_slice(name);
        raw[11] = attr;
        raw[20..22].copy_from_slice(&((start >> 16) as u16).to_le_bytes());
        raw[26..28].copy_from_slice(&(start as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&size.to_le_bytes());
        offset
    }

    /// Delete the way FAT32 drivers do: mark the entry and free its chain.
    /// Content is left in place.
    pub fn delete(&mut self, entry_offset: usize, clusters: &[u32]) {
        self.bytes[entry_offset] = 0xE5;
        for &cluster in clusters {
            self.set_fat(cluster, 0);
        }
    }
}

/// Deterministic non-repeating-looking content
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 31 + i / 7) as u8).wrapping_add(seed))
        .collect()
}
