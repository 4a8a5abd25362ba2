//! Deleted directory entries that could be the requested file

use crate::fs::common::Backing;
use crate::fs::fat32::directory::{DirSlot, ShortName};
use crate::fs::fat32::volume::Volume;
use crate::recovery::RecoveryError;

/// Deleted root entries whose name matches `wanted` apart from the first
/// byte, in directory scan order.
///
/// Matching is byte-exact on the padded 8.3 form, so case and padding must
/// agree with what is stored on disk.
pub fn find_candidates<S: Backing>(
    volume: &Volume<S>,
    wanted: &ShortName,
) -> Result<Vec<DirSlot>, RecoveryError> {
    let mut candidates = Vec::new();

    for slot in volume.root_directory() {
        let slot = slot?;
        if slot.entry.is_deleted() && slot.entry.name.matches_ignoring_first(wanted) {
            tracing::debug!(
                "Candidate {:?} at slot {} (cluster {}, {} bytes)",
                slot.entry.name,
                slot.index,
                slot.entry.start_cluster(),
                slot.entry.file_size
            );
            candidates.push(slot);
        }
    }

    Ok(candidates)
}
