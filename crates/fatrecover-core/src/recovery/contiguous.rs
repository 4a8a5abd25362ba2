//! Chain hypothesis for files stored in one run of consecutive clusters

use crate::forensics::verification::clusters_needed;
use crate::recovery::RecoveryError;

/// Number of clusters a file of `file_size` bytes occupies
pub fn cluster_count(file_size: u32, cluster_size: u32) -> usize {
    clusters_needed(file_size, cluster_size)
}

/// `[start, start + 1, ..]` long enough to hold `file_size` bytes.
///
/// An empty file needs no clusters, so its stored start cluster is ignored.
pub fn contiguous_chain(
    start_cluster: u32,
    file_size: u32,
    cluster_size: u32,
) -> Result<Vec<u32>, RecoveryError> {
    let count = cluster_count(file_size, cluster_size);
    if count == 0 {
        return Ok(Vec::new());
    }

    if start_cluster < 2 {
        return Err(RecoveryError::OutOfRange(format!(
            "{} byte file stores reserved start cluster {}",
            file_size, start_cluster
        )));
    }

    (0..count as u32)
        .map(|i| {
            start_cluster.checked_add(i).ok_or_else(|| {
                RecoveryError::OutOfRange(format!(
                    "run of {} clusters from {} overflows the cluster index",
                    count, start_cluster
                ))
            })
        })
        .collect()
}
