//! Writing an accepted recovery back to the volume
//!
//! This is the only place the engine mutates the image. Every location is
//! validated before the first byte is written, so a rejected chain leaves
//! the volume untouched.

use crate::fs::common::Backing;
use crate::fs::fat32::directory::{DirSlot, OFFSET_CLUSTER_HI, OFFSET_CLUSTER_LO};
use crate::fs::fat32::fat::FAT_ENTRY_EOC;
use crate::fs::fat32::volume::Volume;
use crate::recovery::RecoveryError;

/// Link `chain` in every FAT copy, restore the entry's first name byte and
/// flush.
///
/// With `rewrite_start` the entry's start cluster fields are pointed at
/// `chain[0]`; an empty chain leaves them alone.
pub fn commit_recovery<S: Backing>(
    volume: &mut Volume<S>,
    slot: &DirSlot,
    chain: &[u32],
    first_byte: u8,
    rewrite_start: bool,
) -> Result<(), RecoveryError> {
    let entry_offset = volume.dir_slot_location(slot)?;
    for &cluster in chain {
        volume.cluster_offset(cluster)?;
        for copy in 0..volume.boot_sector().number_of_fats {
            volume.fat_entry_offset(copy, cluster)?;
        }
    }

    for (i, &cluster) in chain.iter().enumerate() {
        let link = chain.get(i + 1).copied().unwrap_or(FAT_ENTRY_EOC);
        volume.set_fat_entry(cluster, link)?;
    }

    if rewrite_start {
        if let Some(&start) = chain.first() {
            volume.write_u16(entry_offset + OFFSET_CLUSTER_HI, (start >> 16) as u16)?;
            volume.write_u16(entry_offset + OFFSET_CLUSTER_LO, start as u16)?;
        }
    }

    volume.write_bytes(entry_offset, &[first_byte])?;
    volume.flush()?;

    tracing::info!(
        "Restored entry at slot {} with chain {:?}",
        slot.index,
        chain
    );
    Ok(())
}
