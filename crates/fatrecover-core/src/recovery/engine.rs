/// Deleted-file recovery engine for FAT32 root directories
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::forensics::verification::{hash_chain, ContentHash};
use crate::fs::common::Backing;
use crate::fs::fat32::directory::{DirSlot, ShortName};
use crate::fs::fat32::volume::Volume;
use crate::recovery::candidates::find_candidates;
use crate::recovery::commit::commit_recovery;
use crate::recovery::contiguous::contiguous_chain;
use crate::recovery::reassembly::{search_chain, SearchLimits};

/// Recovery engine configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryConfig {
    pub limits: SearchLimits,
}

impl RecoveryConfig {
    pub fn with_limits(limits: SearchLimits) -> Self {
        Self { limits }
    }
}

/// Result of a single recovery request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Entry restored with this cluster chain
    Recovered { chain: Vec<u32>, verified: bool },
    /// No deleted entry matched the name, or none matched the hash
    NotFound,
    /// Several deleted entries matched and no hash was given to pick one
    Ambiguous { candidates: usize },
}

impl RecoveryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered { .. })
    }
}

/// Outcome of a recovery together with the name it was requested for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: RecoveryOutcome,
}

impl RecoveryReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            RecoveryOutcome::Recovered { verified: false, .. } => {
                write!(f, "{}: successfully recovered", self.filename)
            }
            RecoveryOutcome::Recovered { verified: true, .. } => {
                write!(f, "{}: successfully recovered with SHA-1", self.filename)
            }
            RecoveryOutcome::NotFound => write!(f, "{}: file not found", self.filename),
            RecoveryOutcome::Ambiguous { .. } => {
                write!(f, "{}: multiple candidates found", self.filename)
            }
        }
    }
}

/// Recovery engine over one mapped volume
pub struct RecoveryEngine<S: Backing> {
    volume: Volume<S>,
    config: RecoveryConfig,
}

impl<S: Backing> RecoveryEngine<S> {
    pub fn new(volume: Volume<S>, config: RecoveryConfig) -> Result<Self, RecoveryError> {
        config.limits.validate()?;
        Ok(Self { volume, config })
    }

    pub fn volume(&self) -> &Volume<S> {
        &self.volume
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn into_volume(self) -> Volume<S> {
        self.volume
    }

    /// Recover a file assumed to occupy consecutive clusters.
    ///
    /// Without a hash a single candidate is restored directly and several
    /// candidates are reported as ambiguous. With a hash every candidate is
    /// verified in directory order and the first match is restored.
    pub fn recover_contiguous(
        &mut self,
        filename: &str,
        expected: Option<&ContentHash>,
    ) -> Result<RecoveryReport, RecoveryError> {
        let wanted = ShortName::from_display(filename)?;
        let candidates = find_candidates(&self.volume, &wanted)?;
        tracing::info!(
            "{} deleted candidate(s) for {} (contiguous)",
            candidates.len(),
            filename
        );

        let outcome = match (candidates.as_slice(), expected) {
            ([], _) => RecoveryOutcome::NotFound,
            ([only], None) => {
                let chain = self.assumed_chain(only)?;
                commit_recovery(&mut self.volume, only, &chain, wanted.first_byte(), false)?;
                RecoveryOutcome::Recovered {
                    chain,
                    verified: false,
                }
            }
            (several, None) => RecoveryOutcome::Ambiguous {
                candidates: several.len(),
            },
            (all, Some(target)) => match self.first_verified(all, target)? {
                Some((slot, chain)) => {
                    commit_recovery(&mut self.volume, &slot, &chain, wanted.first_byte(), false)?;
                    RecoveryOutcome::Recovered {
                        chain,
                        verified: true,
                    }
                }
                None => RecoveryOutcome::NotFound,
            },
        };

        Ok(RecoveryReport {
            filename: filename.to_string(),
            outcome,
        })
    }

    /// Recover a file whose clusters may be scattered among the free ones.
    ///
    /// Candidates are tried in directory order; the first whose content can
    /// be assembled from free clusters to match `expected` is restored, and
    /// its start cluster is rewritten to the first cluster found.
    pub fn recover_non_contiguous(
        &mut self,
        filename: &str,
        expected: &ContentHash,
    ) -> Result<RecoveryReport, RecoveryError> {
        let wanted = ShortName::from_display(filename)?;
        let candidates = find_candidates(&self.volume, &wanted)?;
        tracing::info!(
            "{} deleted candidate(s) for {} (non-contiguous)",
            candidates.len(),
            filename
        );

        let mut outcome = RecoveryOutcome::NotFound;
        if !candidates.is_empty() {
            let free = self
                .volume
                .free_clusters(self.config.limits.max_free_clusters)?;
            tracing::debug!("Search window: {} free cluster(s) {:?}", free.len(), free);

            let mut searched = 0usize;
            let mut over_bound = None;
            for slot in &candidates {
                let found = match search_chain(
                    &self.volume,
                    &free,
                    slot.entry.file_size,
                    expected,
                    &self.config.limits,
                ) {
                    Ok(found) => found,
                    Err(RecoveryError::SearchBoundExceeded(reason)) => {
                        tracing::warn!("Skipping candidate at slot {}: {}", slot.index, reason);
                        over_bound = Some(reason);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                searched += 1;
                if let Some(chain) = found {
                    commit_recovery(&mut self.volume, slot, &chain, wanted.first_byte(), true)?;
                    outcome = RecoveryOutcome::Recovered {
                        chain,
                        verified: true,
                    };
                    break;
                }
                tracing::debug!("Candidate at slot {} has no matching ordering", slot.index);
            }

            // every candidate was too large to search
            if searched == 0 {
                if let Some(reason) = over_bound {
                    return Err(RecoveryError::SearchBoundExceeded(reason));
                }
            }
        }

        Ok(RecoveryReport {
            filename: filename.to_string(),
            outcome,
        })
    }

    fn assumed_chain(&self, slot: &DirSlot) -> Result<Vec<u32>, RecoveryError> {
        contiguous_chain(
            slot.entry.start_cluster(),
            slot.entry.file_size,
            self.volume.cluster_size(),
        )
    }

    fn first_verified(
        &self,
        candidates: &[DirSlot],
        target: &ContentHash,
    ) -> Result<Option<(DirSlot, Vec<u32>)>, RecoveryError> {
        for slot in candidates {
            let chain = match self.assumed_chain(slot) {
                Ok(chain) => chain,
                Err(RecoveryError::OutOfRange(reason)) => {
                    tracing::warn!("Skipping candidate at slot {}: {}", slot.index, reason);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match hash_chain(&self.volume, slot.entry.file_size, &chain) {
                Ok(digest) if digest == *target => return Ok(Some((slot.clone(), chain))),
                Ok(digest) => {
                    tracing::debug!("Candidate at slot {} hashes to {}", slot.index, digest)
                }
                Err(RecoveryError::OutOfRange(reason)) => {
                    tracing::warn!("Skipping candidate at slot {}: {}", slot.index, reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Usage error: {0}")]
    Usage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid file system: {0}")]
    InvalidFileSystem(String),
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
    #[error("Search bound exceeded: {0}")]
    SearchBoundExceeded(String),
}
