/// Content verification for recovery candidates
pub mod verification;

pub use verification::{clusters_needed, hash_chain, ContentHash, DIGEST_LEN};
