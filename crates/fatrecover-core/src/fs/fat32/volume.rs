//! Bounds-checked access to a mapped FAT32 volume
//!
//! Every byte offset the engine touches is computed here: cluster data,
//! FAT entries in each copy and directory entry slots. Other components
//! address the volume by cluster index or slot location only.

use byteorder::{ByteOrder, LittleEndian};

use super::BootSector;
use crate::fs::common::Backing;
use crate::recovery::RecoveryError;

/// A FAT32 volume over a mutable backing region
pub struct Volume<S: Backing> {
    storage: S,
    boot_sector: BootSector,
}

impl<S: Backing> Volume<S> {
    /// Parse the boot sector and wrap the backing region
    pub fn open(storage: S) -> Result<Self, RecoveryError> {
        let boot_sector = BootSector::parse(storage.bytes())?;

        let fat_end = boot_sector.fat_offset()
            + boot_sector.number_of_fats as u64 * boot_sector.fat_size_bytes();
        if fat_end > storage.bytes().len() as u64 {
            return Err(RecoveryError::InvalidFileSystem(format!(
                "FAT region ends at byte {} but the image is only {} bytes",
                fat_end,
                storage.bytes().len()
            )));
        }

        tracing::debug!(
            "FAT32 volume: {} bytes/cluster, {} FAT(s) of {} sectors, data at sector {}, root cluster {}",
            boot_sector.bytes_per_cluster(),
            boot_sector.number_of_fats,
            boot_sector.sectors_per_fat,
            boot_sector.data_area_start_sector(),
            boot_sector.root_cluster
        );

        Ok(Volume {
            storage,
            boot_sector,
        })
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot_sector
    }

    /// Get cluster size in bytes
    pub fn cluster_size(&self) -> u32 {
        self.boot_sector.bytes_per_cluster()
    }

    /// Length of the mapped region
    pub fn len(&self) -> usize {
        self.storage.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give the backing region back to the caller
    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Calculate byte offset for a cluster
    ///
    /// Fails with `OutOfRange` unless the whole cluster lies inside the
    /// mapped region.
    pub fn cluster_offset(&self, cluster: u32) -> Result<usize, RecoveryError> {
        if cluster < 2 {
            return Err(RecoveryError::OutOfRange(format!(
                "cluster {} is reserved",
                cluster
            )));
        }

        // Cluster 2 is the first data cluster
        let sector = self.boot_sector.data_area_start_sector()
            + (cluster as u64 - 2) * self.boot_sector.sectors_per_cluster as u64;
        let offset = sector * self.boot_sector.bytes_per_sector as u64;

        self.check_range(offset, self.cluster_size() as u64)
            .map_err(|_| {
                RecoveryError::OutOfRange(format!(
                    "cluster {} at byte {} exceeds the {} byte volume",
                    cluster,
                    offset,
                    self.len()
                ))
            })
    }

    /// Read the full contents of one cluster
    pub fn read_cluster(&self, cluster: u32) -> Result<&[u8], RecoveryError> {
        let offset = self.cluster_offset(cluster)?;
        Ok(&self.storage.bytes()[offset..offset + self.cluster_size() as usize])
    }

    /// Mutable view of one cluster
    pub fn cluster_mut(&mut self, cluster: u32) -> Result<&mut [u8], RecoveryError> {
        let offset = self.cluster_offset(cluster)?;
        let size = self.cluster_size() as usize;
        Ok(&mut self.storage.bytes_mut()[offset..offset + size])
    }

    /// Number of entries one FAT copy can hold
    pub fn fat_entry_count(&self) -> u32 {
        (self.boot_sector.fat_size_bytes() / 4).min(u32::MAX as u64) as u32
    }

    /// Byte offset of `cluster`'s entry inside FAT copy `copy`
    pub(crate) fn fat_entry_offset(&self, copy: u8, cluster: u32) -> Result<usize, RecoveryError> {
        if copy >= self.boot_sector.number_of_fats {
            return Err(RecoveryError::OutOfRange(format!(
                "FAT copy {} of {}",
                copy, self.boot_sector.number_of_fats
            )));
        }
        if cluster >= self.fat_entry_count() {
            return Err(RecoveryError::OutOfRange(format!(
                "cluster {} has no FAT entry ({} entries per FAT)",
                cluster,
                self.fat_entry_count()
            )));
        }

        let offset = self.boot_sector.fat_offset()
            + copy as u64 * self.boot_sector.fat_size_bytes()
            + cluster as u64 * 4;
        self.check_range(offset, 4)
    }

    /// Byte offset of the `index`-th 32-byte slot in a directory cluster
    pub(crate) fn dir_slot_offset(&self, cluster: u32, index: usize) -> Result<usize, RecoveryError> {
        if index >= self.boot_sector.entries_per_cluster() {
            return Err(RecoveryError::OutOfRange(format!(
                "directory slot {} beyond the {} slots of a cluster",
                index,
                self.boot_sector.entries_per_cluster()
            )));
        }
        Ok(self.cluster_offset(cluster)? + index * super::directory::ENTRY_SIZE)
    }

    pub(crate) fn read_bytes(&self, offset: usize, length: usize) -> Result<&[u8], RecoveryError> {
        let start = self.check_range(offset as u64, length as u64)?;
        Ok(&self.storage.bytes()[start..start + length])
    }

    pub(crate) fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), RecoveryError> {
        let start = self.check_range(offset as u64, data.len() as u64)?;
        self.storage.bytes_mut()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn read_u32(&self, offset: usize) -> Result<u32, RecoveryError> {
        Ok(LittleEndian::read_u32(self.read_bytes(offset, 4)?))
    }

    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), RecoveryError> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_bytes(offset, &buf)
    }

    pub(crate) fn write_u16(&mut self, offset: usize, value: u16) -> Result<(), RecoveryError> {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.write_bytes(offset, &buf)
    }

    /// Durably persist every mutation made so far
    pub fn flush(&mut self) -> Result<(), RecoveryError> {
        self.storage.flush()?;
        Ok(())
    }

    fn check_range(&self, offset: u64, length: u64) -> Result<usize, RecoveryError> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len() as u64 => Ok(offset as usize),
            _ => Err(RecoveryError::OutOfRange(format!(
                "{} bytes at offset {} exceed the {} byte volume",
                length,
                offset,
                self.len()
            ))),
        }
    }
}
