/// Cluster-order reassembly for files whose clusters were not contiguous
///
/// Once a file is deleted its FAT links are gone, so the only evidence of
/// where its clusters went is the content itself. The search tries ordered
/// selections of free clusters depth-first and accepts the first whose
/// concatenated bytes hash to the expected digest.
///
/// Work grows as the falling factorial of the free-cluster window and the
/// chain length, so both are capped by `SearchLimits`.
use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::forensics::verification::{chunk_len, clusters_needed, ContentHash};
use crate::fs::common::Backing;
use crate::fs::fat32::volume::Volume;
use crate::recovery::RecoveryError;

/// Upper bounds on the non-contiguous search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchLimits {
    /// How many free clusters, lowest first, the search may draw from
    pub max_free_clusters: usize,

    /// Longest chain the search will attempt
    pub max_chain_len: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_free_clusters: 20,
            max_chain_len: 5,
        }
    }
}

impl SearchLimits {
    /// Free-cluster window is tracked in a 64-bit set
    pub const MAX_FREE_CLUSTERS: usize = 64;

    /// Most orderings a single candidate may cost in the worst case
    pub const MAX_SEARCH_LEAVES: u64 = 1_000_000_000;

    /// Orderings tried in the worst case for one candidate
    pub fn worst_case_leaves(&self) -> u64 {
        falling_factorial(self.max_free_clusters as u64, self.max_chain_len as u64)
    }

    pub fn validate(&self) -> Result<(), RecoveryError> {
        if self.max_free_clusters == 0 || self.max_free_clusters > Self::MAX_FREE_CLUSTERS {
            return Err(RecoveryError::Usage(format!(
                "max free clusters must be between 1 and {}, got {}",
                Self::MAX_FREE_CLUSTERS,
                self.max_free_clusters
            )));
        }
        if self.max_chain_len == 0 || self.max_chain_len > self.max_free_clusters {
            return Err(RecoveryError::Usage(format!(
                "max chain length must be between 1 and max free clusters ({}), got {}",
                self.max_free_clusters, self.max_chain_len
            )));
        }
        if self.worst_case_leaves() > Self::MAX_SEARCH_LEAVES {
            return Err(RecoveryError::Usage(format!(
                "{} free clusters with chains of {} allow {} orderings, at most {} are searched",
                self.max_free_clusters,
                self.max_chain_len,
                self.worst_case_leaves(),
                Self::MAX_SEARCH_LEAVES
            )));
        }
        Ok(())
    }
}

/// n * (n - 1) * ... * (n - k + 1), saturating at `u64::MAX`
pub fn falling_factorial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    (0..k).fold(1u64, |acc, i| acc.saturating_mul(n - i))
}

/// Find an ordering of clusters drawn from `free` whose content hashes to
/// `expected`.
///
/// Returns `Ok(None)` when no ordering matches. A zero-size file matches
/// with an empty chain exactly when `expected` is the empty-content hash.
pub fn search_chain<S: Backing>(
    volume: &Volume<S>,
    free: &[u32],
    file_size: u32,
    expected: &ContentHash,
    limits: &SearchLimits,
) -> Result<Option<Vec<u32>>, RecoveryError> {
    if file_size == 0 {
        return Ok((*expected == ContentHash::EMPTY).then(Vec::new));
    }

    let chain_len = clusters_needed(file_size, volume.cluster_size());
    if chain_len > limits.max_chain_len {
        return Err(RecoveryError::SearchBoundExceeded(format!(
            "{} byte file needs {} clusters, limit is {}",
            file_size, chain_len, limits.max_chain_len
        )));
    }
    if free.len() > SearchLimits::MAX_FREE_CLUSTERS {
        return Err(RecoveryError::SearchBoundExceeded(format!(
            "{} free clusters offered, at most {} can be searched",
            free.len(),
            SearchLimits::MAX_FREE_CLUSTERS
        )));
    }
    if chain_len > free.len() {
        tracing::debug!(
            "Only {} free cluster(s) for a {} cluster chain",
            free.len(),
            chain_len
        );
        return Ok(None);
    }

    tracing::debug!(
        "Searching orderings of {} cluster(s) over {} free: at most {} leaves",
        chain_len,
        free.len(),
        falling_factorial(free.len() as u64, chain_len as u64)
    );

    let mut search = ChainSearch {
        volume,
        free,
        file_size,
        chain_len,
        expected,
        leaves: 0,
    };
    let all = if free.len() == 64 {
        u64::MAX
    } else {
        (1u64 << free.len()) - 1
    };

    let found = search.descend(all, 0, Sha1::new())?;
    tracing::debug!("Visited {} leaves", search.leaves);

    Ok(found.map(|mut reversed| {
        reversed.reverse();
        reversed
    }))
}

struct ChainSearch<'a, S: Backing> {
    volume: &'a Volume<S>,
    free: &'a [u32],
    file_size: u32,
    chain_len: usize,
    expected: &'a ContentHash,
    leaves: u64,
}

impl<S: Backing> ChainSearch<'_, S> {
    /// Each frame owns its remaining set and hasher state, so siblings
    /// never observe each other's choices. The chain is built in reverse
    /// while unwinding from a match.
    fn descend(
        &mut self,
        remaining: u64,
        depth: usize,
        hasher: Sha1,
    ) -> Result<Option<Vec<u32>>, RecoveryError> {
        if depth == self.chain_len {
            self.leaves += 1;
            let matched = ContentHash::from_hasher(hasher) == *self.expected;
            return Ok(matched.then(|| Vec::with_capacity(self.chain_len)));
        }

        let take = chunk_len(self.file_size, self.volume.cluster_size(), depth);
        let mut pending = remaining;
        while pending != 0 {
            let bit = pending.trailing_zeros();
            pending &= pending - 1;

            let cluster = self.free[bit as usize];
            let mut next = hasher.clone();
            next.update(&self.volume.read_cluster(cluster)?[..take]);

            if let Some(mut chain) = self.descend(remaining & !(1u64 << bit), depth + 1, next)? {
                chain.push(cluster);
                return Ok(Some(chain));
            }
        }

        Ok(None)
    }
}
