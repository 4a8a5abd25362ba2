/// Recovery of deleted FAT32 root directory entries
pub mod candidates;
pub mod commit;
pub mod contiguous;
pub mod engine;
pub mod reassembly;

pub use candidates::find_candidates;
pub use commit::commit_recovery;
pub use contiguous::{cluster_count, contiguous_chain};
pub use engine::{RecoveryConfig, RecoveryEngine, RecoveryError, RecoveryOutcome, RecoveryReport};
pub use reassembly::{falling_factorial, search_chain, SearchLimits};
