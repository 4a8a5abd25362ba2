//! FAT32 File Allocation Table access and chain traversal
//!
//! FAT Entry Values (low 28 bits):
//! - 0x00000000: Free cluster
//! - 0x00000001: Reserved
//! - 0x00000002-0x0FFFFFF6: Next cluster in chain
//! - 0x0FFFFFF7: Bad cluster
//! - 0x0FFFFFF8-0x0FFFFFFF: End of chain
//!
//! Reads come from the first FAT copy. Writes go to every copy so the
//! tables stay identical for every touched cluster.

use std::collections::HashSet;

use super::volume::Volume;
use crate::fs::common::Backing;
use crate::recovery::RecoveryError;

/// Special FAT entry values
pub const FAT_ENTRY_FREE: u32 = 0x0000_0000;
pub const FAT_ENTRY_BAD: u32 = 0x0FFF_FFF7;
pub const FAT_ENTRY_EOC_MIN: u32 = 0x0FFF_FFF8; // End of chain minimum
pub const FAT_ENTRY_EOC: u32 = 0x0FFF_FFFF; // Value written to terminate a chain

const FAT32_MASK: u32 = 0x0FFF_FFFF;

/// Decoded meaning of a FAT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Reserved,
    Next(u32),
    Bad,
    EndOfChain,
}

impl FatEntry {
    pub fn from_raw(raw: u32) -> Self {
        match raw & FAT32_MASK {
            FAT_ENTRY_FREE => FatEntry::Free,
            1 => FatEntry::Reserved,
            FAT_ENTRY_BAD => FatEntry::Bad,
            v if v >= FAT_ENTRY_EOC_MIN => FatEntry::EndOfChain,
            v => FatEntry::Next(v),
        }
    }
}

impl<S: Backing> Volume<S> {
    /// Raw FAT entry of a cluster, top 4 bits masked
    pub fn fat_entry(&self, cluster: u32) -> Result<u32, RecoveryError> {
        let offset = self.fat_entry_offset(0, cluster)?;
        Ok(self.read_u32(offset)? & FAT32_MASK)
    }

    /// Write `value` into every FAT copy, preserving the reserved top bits
    pub fn set_fat_entry(&mut self, cluster: u32, value: u32) -> Result<(), RecoveryError> {
        for copy in 0..self.boot_sector().number_of_fats {
            let offset = self.fat_entry_offset(copy, cluster)?;
            let existing = self.read_u32(offset)?;
            self.write_u32(offset, (existing & !FAT32_MASK) | (value & FAT32_MASK))?;
        }
        Ok(())
    }

    /// Check if a cluster is free
    pub fn is_free(&self, cluster: u32) -> Result<bool, RecoveryError> {
        Ok(FatEntry::from_raw(self.fat_entry(cluster)?) == FatEntry::Free)
    }

    /// Highest cluster index that has a FAT entry, is declared by the boot
    /// sector and lies entirely inside the mapped image
    pub fn max_cluster(&self) -> u32 {
        let boot = self.boot_sector();
        let declared = boot.cluster_count().saturating_add(1);

        let data_start = boot.data_area_start_sector() * boot.bytes_per_sector as u64;
        let mapped = (self.len() as u64).saturating_sub(data_start) / self.cluster_size() as u64;
        let mapped = mapped.saturating_add(1).min(u32::MAX as u64) as u32;

        declared
            .min(mapped)
            .min(self.fat_entry_count().saturating_sub(1))
    }

    /// Get the next cluster in chain (None if end of chain or invalid)
    pub fn next_cluster(&self, cluster: u32) -> Result<Option<u32>, RecoveryError> {
        match FatEntry::from_raw(self.fat_entry(cluster)?) {
            FatEntry::Next(next) => Ok(Some(next)),
            _ => Ok(None),
        }
    }

    /// Free data clusters in ascending order, at most `limit` of them
    pub fn free_clusters(&self, limit: usize) -> Result<Vec<u32>, RecoveryError> {
        let mut free = Vec::new();
        for cluster in 2..=self.max_cluster() {
            if free.len() == limit {
                break;
            }
            if self.is_free(cluster)? {
                free.push(cluster);
            }
        }
        Ok(free)
    }

    /// Count free clusters
    pub fn free_cluster_count(&self) -> Result<usize, RecoveryError> {
        let mut count = 0;
        for cluster in 2..=self.max_cluster() {
            if self.is_free(cluster)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Get entire cluster chain starting from a cluster
    pub fn cluster_chain(&self, start_cluster: u32) -> Result<Vec<u32>, RecoveryError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start_cluster;

        // Follow chain with loop detection
        loop {
            if !visited.insert(current) {
                tracing::warn!("FAT chain loop detected at cluster {}", current);
                break;
            }
            chain.push(current);

            match self.next_cluster(current)? {
                Some(next) => current = next,
                None => break,
            }
        }

        Ok(chain)
    }
}
