//! FAT32 directory entry parsing and root directory traversal
//!
//! Each entry is 32 bytes:
//! - 0..11: 8.3 name (space padded)
//! - 11: attributes
//! - 20..22: high 16 bits of the start cluster
//! - 26..28: low 16 bits of the start cluster
//! - 28..32: file size
//!
//! A first name byte of 0xE5 marks a deleted entry, 0x00 marks the rest of
//! the directory cluster as unused.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;

use super::fat::FatEntry;
use super::volume::Volume;
use crate::fs::common::Backing;
use crate::recovery::RecoveryError;

/// Directory entry size in bytes
pub const ENTRY_SIZE: usize = 32;

pub const DELETED_MARKER: u8 = 0xE5;
pub const END_OF_DIRECTORY: u8 = 0x00;

/// File attributes
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_LONG_NAME: u8 = 0x0F;

pub(crate) const OFFSET_CLUSTER_HI: usize = 20;
pub(crate) const OFFSET_CLUSTER_LO: usize = 26;

/// Special characters allowed in a displayed 8.3 name besides A-Z and 0-9
const VALID_SPECIAL_CHARS: &[u8] = b"!#$%&'()-@^_`{}~";

/// On-disk 11-byte 8.3 name
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortName([u8; 11]);

impl ShortName {
    pub fn from_bytes(bytes: [u8; 11]) -> Self {
        ShortName(bytes)
    }

    /// Pack a dotted display name ("HELLO.TXT") into the padded 8.3 form.
    ///
    /// Case is preserved: matching is byte-exact against the on-disk name.
    pub fn from_display(name: &str) -> Result<Self, RecoveryError> {
        let invalid = |reason: &str| RecoveryError::Usage(format!("'{}' {}", name, reason));

        if name.is_empty() {
            return Err(invalid("is empty"));
        }
        let (base, ext) = match name.split_once('.') {
            Some((_, ext)) if ext.contains('.') => {
                return Err(invalid("has more than one dot"));
            }
            Some((base, ext)) => (base, ext),
            None => (name, ""),
        };
        if base.is_empty() {
            return Err(invalid("has no base name"));
        }
        if base.len() > 8 || ext.len() > 3 {
            return Err(invalid("does not fit the 8.3 format"));
        }

        let mut bytes = [b' '; 11];
        bytes[..base.len()].copy_from_slice(base.as_bytes());
        bytes[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
        Ok(ShortName(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }

    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Dotted display form: base up to the first space, then '.' and the
    /// extension if one is present.
    pub fn display(&self) -> String {
        let base: Vec<u8> = self.0[..8].iter().copied().take_while(|&b| b != b' ').collect();
        let ext: Vec<u8> = self.0[8..].iter().copied().take_while(|&b| b != b' ').collect();

        let mut name = String::from_utf8_lossy(&base).into_owned();
        if self.0[8] != b' ' {
            name.push('.');
            name.push_str(&String::from_utf8_lossy(&ext));
        }
        name
    }

    /// Whether the displayed name only uses legal 8.3 characters
    pub fn is_valid_display(&self) -> bool {
        let display = self.display();
        let (base, ext) = display.split_once('.').unwrap_or((display.as_str(), ""));
        let legal = |s: &str| {
            s.bytes().all(|b| {
                b.is_ascii_uppercase() || b.is_ascii_digit() || VALID_SPECIAL_CHARS.contains(&b)
            })
        };

        base.len() <= 8 && ext.len() <= 3 && legal(base) && legal(ext)
    }

    /// Compare every byte except the first, which deletion overwrites
    pub fn matches_ignoring_first(&self, other: &ShortName) -> bool {
        self.0[1..] == other.0[1..]
    }
}

impl fmt::Debug for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortName({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Serialize for ShortName {
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(&self.display())
    }
}

/// Parsed 32-byte directory entry
#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: ShortName,
    pub attributes: u8,
    pub cluster_hi: u16,
    pub cluster_lo: u16,
    pub file_size: u32,
}

impl DirEntry {
    /// Parse a single directory entry from 32 bytes
    pub fn parse(data: &[u8]) -> Result<Self, RecoveryError> {
        if data.len() < ENTRY_SIZE {
            return Err(RecoveryError::InvalidFileSystem(
                "Insufficient data for directory entry".to_string(),
            ));
        }

        let mut name = [0u8; 11];
        name.copy_from_slice(&data[..11]);

        let mut cursor = Cursor::new(data);
        cursor.set_position(11);
        let attributes = cursor.read_u8()?;
        cursor.set_position(OFFSET_CLUSTER_HI as u64);
        let cluster_hi = cursor.read_u16::<LittleEndian>()?;
        cursor.set_position(OFFSET_CLUSTER_LO as u64);
        let cluster_lo = cursor.read_u16::<LittleEndian>()?;
        let file_size = cursor.read_u32::<LittleEndian>()?;

        Ok(DirEntry {
            name: ShortName(name),
            attributes,
            cluster_hi,
            cluster_lo,
            file_size,
        })
    }

    /// Start cluster combined from the high and low halves
    pub fn start_cluster(&self) -> u32 {
        ((self.cluster_hi as u32) << 16) | self.cluster_lo as u32
    }

    pub fn is_deleted(&self) -> bool {
        self.name.first_byte() == DELETED_MARKER
    }

    pub fn is_end_marker(&self) -> bool {
        self.name.first_byte() == END_OF_DIRECTORY
    }

    /// Check if this is a directory
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Long-name slots and the volume label are not files
    pub fn is_metadata(&self) -> bool {
        self.attributes & ATTR_LONG_NAME == ATTR_LONG_NAME
            || self.attributes & ATTR_VOLUME_ID != 0
    }
}

/// A directory entry together with where it lives on the volume
#[derive(Debug, Clone)]
pub struct DirSlot {
    /// Position in directory scan order
    pub index: usize,
    /// Directory cluster holding the entry
    pub cluster: u32,
    /// Slot number inside that cluster
    pub slot: usize,
    pub entry: DirEntry,
}

/// Lazy walk over every 32-byte slot of a directory's cluster chain.
///
/// Slots are not filtered: deleted and unused entries are yielded too.
pub struct DirectoryWalker<'a, S: Backing> {
    volume: &'a Volume<S>,
    cluster: Option<u32>,
    slot: usize,
    index: usize,
    visited: HashSet<u32>,
}

impl<'a, S: Backing> DirectoryWalker<'a, S> {
    pub fn new(volume: &'a Volume<S>, start_cluster: u32) -> Self {
        let mut visited = HashSet::new();
        visited.insert(start_cluster);
        DirectoryWalker {
            volume,
            cluster: Some(start_cluster),
            slot: 0,
            index: 0,
            visited,
        }
    }

    fn advance_cluster(&mut self, current: u32) -> Result<(), RecoveryError> {
        self.slot = 0;
        self.cluster = match FatEntry::from_raw(self.volume.fat_entry(current)?) {
            FatEntry::EndOfChain => None,
            FatEntry::Next(next) if self.visited.insert(next) => Some(next),
            FatEntry::Next(next) => {
                tracing::warn!("Directory chain loops back to cluster {}", next);
                None
            }
            other => {
                tracing::warn!(
                    "Directory cluster {} links to {:?}; stopping walk",
                    current,
                    other
                );
                None
            }
        };
        Ok(())
    }
}

impl<S: Backing> Iterator for DirectoryWalker<'_, S> {
    type Item = Result<DirSlot, RecoveryError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cluster = self.cluster?;

        if self.slot == self.volume.boot_sector().entries_per_cluster() {
            if let Err(e) = self.advance_cluster(cluster) {
                self.cluster = None;
                return Some(Err(e));
            }
            return self.next();
        }

        let parsed = self
            .volume
            .dir_slot_offset(cluster, self.slot)
            .and_then(|offset| self.volume.read_bytes(offset, ENTRY_SIZE))
            .and_then(DirEntry::parse);

        match parsed {
            Ok(entry) => {
                let slot = DirSlot {
                    index: self.index,
                    cluster,
                    slot: self.slot,
                    entry,
                };
                self.slot += 1;
                self.index += 1;
                Some(Ok(slot))
            }
            Err(e) => {
                self.cluster = None;
                Some(Err(e))
            }
        }
    }
}

impl<S: Backing> Volume<S> {
    /// Walk the root directory from its first cluster
    pub fn root_directory(&self) -> DirectoryWalker<'_, S> {
        DirectoryWalker::new(self, self.boot_sector().root_cluster)
    }

    /// Byte offset of a slot's 32-byte entry
    pub(crate) fn dir_slot_location(&self, slot: &DirSlot) -> Result<usize, RecoveryError> {
        self.dir_slot_offset(slot.cluster, slot.slot)
    }
}

/// Live, displayable entries of the root directory in scan order
pub fn list_root_directory<S: Backing>(volume: &Volume<S>) -> Result<Vec<DirEntry>, RecoveryError> {
    let mut entries = Vec::new();

    for slot in volume.root_directory() {
        let entry = slot?.entry;
        if entry.is_deleted() || entry.is_end_marker() || entry.is_metadata() {
            continue;
        }
        if !entry.name.is_valid_display() {
            tracing::debug!("Skipping entry with non 8.3 name {:?}", entry.name);
            continue;
        }
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat32::test_image::TestImage;

    #[test]
    fn test_short_name_packing() {
        assert_eq!(
            ShortName::from_display("HELLO.TXT").unwrap().as_bytes(),
            b"HELLO   TXT"
        );
        assert_eq!(
            ShortName::from_display("README").unwrap().as_bytes(),
            b"README     "
        );
        assert_eq!(
            ShortName::from_display("ABCDEFGH.C").unwrap().as_bytes(),
            b"ABCDEFGHC  "
        );
    }

    #[test]
    fn test_short_name_rejects() {
        for name in ["", ".TXT", "A.B.C", "TOOLONGNAME.TXT", "FILE.TEXT"] {
            assert!(
                matches!(ShortName::from_display(name), Err(RecoveryError::Usage(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_short_name_preserves_case() {
        let lower = ShortName::from_display("hello.txt").unwrap();
        let upper = ShortName::from_display("HELLO.TXT").unwrap();
        assert_eq!(lower.as_bytes(), b"hello   txt");
        assert!(!lower.matches_ignoring_first(&upper));
    }

    #[test]
    fn test_short_name_display() {
        assert_eq!(ShortName::from_bytes(*b"HELLO   TXT").display(), "HELLO.TXT");
        assert_eq!(ShortName::from_bytes(*b"DIR        ").display(), "DIR");
        assert_eq!(ShortName::from_bytes(*b"A       B  ").display(), "A.B");
    }

    #[test]
    fn test_display_validity() {
        assert!(ShortName::from_bytes(*b"HELLO   TXT").is_valid_display());
        assert!(ShortName::from_bytes(*b"A_B~1   $$$").is_valid_display());
        assert!(!ShortName::from_bytes(*b"hello   txt").is_valid_display());
        assert!(!ShortName::from_bytes(*b"HE*LO   TXT").is_valid_display());
    }

    #[test]
    fn test_match_ignores_first_byte_only() {
        let wanted = ShortName::from_display("HELLO.TXT").unwrap();
        let deleted = ShortName::from_bytes(*b"\xE5ELLO   TXT");
        let other = ShortName::from_bytes(*b"\xE5ELLO   TX2");

        assert!(deleted.matches_ignoring_first(&wanted));
        assert!(!other.matches_ignoring_first(&wanted));
    }

    #[test]
    fn test_parse_entry() {
        let mut raw = [0u8; 32];
        raw[..11].copy_from_slice(b"\xE5ILE    BIN");
        raw[11] = 0x20;
        raw[20..22].copy_from_slice(&0x0001u16.to_le_bytes());
        raw[26..28].copy_from_slice(&0x0203u16.to_le_bytes());
        raw[28..32].copy_from_slice(&4096u32.to_le_bytes());

        let entry = DirEntry::parse(&raw).unwrap();
        assert!(entry.is_deleted());
        assert!(!entry.is_directory());
        assert_eq!(entry.start_cluster(), 0x0001_0203);
        assert_eq!(entry.file_size, 4096);
    }

    #[test]
    fn test_walker_follows_root_chain() {
        let mut image = TestImage::new();
        image.extend_root(9);
        for i in 0..20u8 {
            let name = format!("F{:<7}TXT", i);
            image.add_entry(name.as_bytes().try_into().unwrap(), 0x20, 0, 0);
        }

        let volume = Volume::open(image.bytes).unwrap();
        let slots: Vec<DirSlot> = volume.root_directory().collect::<Result<_, _>>().unwrap();

        // two clusters of 16 slots, unused slots included
        assert_eq!(slots.len(), 32);
        assert_eq!(slots[15].cluster, 2);
        assert_eq!(slots[16].cluster, 9);
        assert_eq!(slots[16].slot, 0);
        assert_eq!(slots[19].entry.name.display(), "F19.TXT");
        assert!(slots[20].entry.is_end_marker());
        assert!(slots.iter().enumerate().all(|(i, s)| s.index == i));
    }

    #[test]
    fn test_walker_is_restartable() {
        let mut image = TestImage::new();
        image.add_entry(b"ONE     TXT", 0x20, 0, 0);
        let volume = Volume::open(image.bytes).unwrap();

        let first: Vec<_> = volume.root_directory().map(|s| s.unwrap().index).collect();
        let second: Vec<_> = volume.root_directory().map(|s| s.unwrap().index).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_walker_stops_on_loop() {
        let mut image = TestImage::new();
        image.extend_root(3);
        image.set_fat(3, 2);

        let volume = Volume::open(image.bytes).unwrap();
        assert_eq!(volume.root_directory().count(), 32);
    }

    #[test]
    fn test_list_root_directory_filters() {
        let mut image = TestImage::new();
        image.add_entry(b"NO NAME    ", ATTR_VOLUME_ID, 0, 0);
        image.add_entry(b"A\0B\0C\0\0\0\0\0\0", ATTR_LONG_NAME, 0, 0);
        image.add_entry(b"KEEP    TXT", 0x20, 5, 10);
        image.add_entry(b"\xE5ONE    TXT", 0x20, 6, 10);
        image.add_entry(b"lower   txt", 0x20, 7, 10);
        image.add_entry(b"SUB        ", ATTR_DIRECTORY, 8, 0);

        let volume = Volume::open(image.bytes).unwrap();
        let names: Vec<String> = list_root_directory(&volume)
            .unwrap()
            .iter()
            .map(|e| e.name.display())
            .collect();
        assert_eq!(names, vec!["KEEP.TXT", "SUB"]);
    }
}
