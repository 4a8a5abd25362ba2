/// FAT32 file system support
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt::Write as _;
use std::io::Cursor;

use crate::recovery::RecoveryError;

// Sub-modules
pub mod directory;
pub mod fat;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_image;

/// Boot sector signature at offset 510
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

const VALID_BYTES_PER_SECTOR: [u16; 4] = [512, 1024, 2048, 4096];

/// FAT32 boot sector (BIOS parameter block fields used by recovery)
#[derive(Debug, Clone)]
pub struct BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub number_of_fats: u8,
    pub total_sectors: u32,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
}

impl BootSector {
    /// Parse and validate a FAT32 boot sector from raw bytes
    pub fn parse(data: &[u8]) -> Result<Self, RecoveryError> {
        if data.len() < 512 {
            return Err(RecoveryError::InvalidFileSystem(
                "Insufficient data for FAT32 boot sector".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);

        cursor.set_position(0x0B);
        let bytes_per_sector = cursor.read_u16::<LittleEndian>()?;
        let sectors_per_cluster = cursor.read_u8()?;
        let reserved_sector_count = cursor.read_u16::<LittleEndian>()?;
        let number_of_fats = cursor.read_u8()?;

        cursor.set_position(0x13);
        let total_sectors_16 = cursor.read_u16::<LittleEndian>()?;

        cursor.set_position(0x20);
        let total_sectors_32 = cursor.read_u32::<LittleEndian>()?;
        let sectors_per_fat = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(0x2C);
        let root_cluster = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(0x43);
        let volume_id = cursor.read_u32::<LittleEndian>()?;
        let mut volume_label = [0u8; 11];
        std::io::Read::read_exact(&mut cursor, &mut volume_label)?;

        if data[510..512] != BOOT_SIGNATURE {
            tracing::warn!(
                "Boot sector signature is {:02X}{:02X}, expected 55AA",
                data[510],
                data[511]
            );
        }

        let total_sectors = if total_sectors_32 != 0 {
            total_sectors_32
        } else {
            total_sectors_16 as u32
        };

        let boot = BootSector {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sector_count,
            number_of_fats,
            total_sectors,
            sectors_per_fat,
            root_cluster,
            volume_id,
            volume_label,
        };
        boot.validate()?;

        Ok(boot)
    }

    fn validate(&self) -> Result<(), RecoveryError> {
        if !VALID_BYTES_PER_SECTOR.contains(&self.bytes_per_sector) {
            return Err(RecoveryError::InvalidFileSystem(format!(
                "invalid bytes per sector: {}",
                self.bytes_per_sector
            )));
        }
        if !self.sectors_per_cluster.is_power_of_two() {
            return Err(RecoveryError::InvalidFileSystem(format!(
                "invalid sectors per cluster: {}",
                self.sectors_per_cluster
            )));
        }
        if self.number_of_fats == 0 {
            return Err(RecoveryError::InvalidFileSystem(
                "volume declares no FAT copies".to_string(),
            ));
        }
        if self.sectors_per_fat == 0 {
            return Err(RecoveryError::InvalidFileSystem(
                "FAT size is zero (not a FAT32 volume?)".to_string(),
            ));
        }
        if self.root_cluster < 2 {
            return Err(RecoveryError::InvalidFileSystem(format!(
                "invalid root directory cluster: {}",
                self.root_cluster
            )));
        }
        if self.total_sectors != 0 && self.data_area_start_sector() >= self.total_sectors as u64 {
            return Err(RecoveryError::InvalidFileSystem(format!(
                "data area starts at sector {} beyond the {} sector volume",
                self.data_area_start_sector(),
                self.total_sectors
            )));
        }
        Ok(())
    }

    /// First sector of the data area: reserved + FAT copies × FAT size
    pub fn data_area_start_sector(&self) -> u64 {
        self.reserved_sector_count as u64
            + self.number_of_fats as u64 * self.sectors_per_fat as u64
    }

    /// Get bytes per cluster
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    /// Byte offset of the first FAT copy
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sector_count as u64 * self.bytes_per_sector as u64
    }

    /// Size of one FAT copy in bytes
    pub fn fat_size_bytes(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }

    /// Number of directory entries held by one cluster
    pub fn entries_per_cluster(&self) -> usize {
        self.bytes_per_cluster() as usize / directory::ENTRY_SIZE
    }

    /// Number of data clusters declared by the boot sector
    pub fn cluster_count(&self) -> u32 {
        let data_sectors = (self.total_sectors as u64).saturating_sub(self.data_area_start_sector());
        (data_sectors / self.sectors_per_cluster as u64) as u32
    }
}

/// Get FAT32 file system information
pub fn filesystem_info(boot: &BootSector) -> String {
    format!(
        "Number of FATs = {}\n\
         Number of bytes per sector = {}\n\
         Number of sectors per cluster = {}\n\
         Number of reserved sectors = {}\n",
        boot.number_of_fats,
        boot.bytes_per_sector,
        boot.sectors_per_cluster,
        boot.reserved_sector_count
    )
}

/// Render live root directory entries, one line each, plus the total
pub fn format_root_listing(entries: &[directory::DirEntry]) -> String {
    let mut out = String::new();

    for entry in entries {
        let name = entry.name.display();
        // Writing to a String cannot fail.
        let _ = if entry.is_directory() {
            writeln!(out, "{}/ (starting cluster = {})", name, entry.start_cluster())
        } else if entry.file_size == 0 {
            writeln!(out, "{} (size = 0)", name)
        } else {
            writeln!(
                out,
                "{} (size = {}, starting cluster = {})",
                name,
                entry.file_size,
                entry.start_cluster()
            )
        };
    }
    let _ = writeln!(out, "Total number of entries = {}", entries.len());

    out
}
