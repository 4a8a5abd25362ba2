/// Hash-based content verification for recovery candidates
///
/// A candidate's identity is checked by hashing the bytes an assumed cluster
/// chain would give the file and comparing against a SHA-1 digest supplied
/// by the user.
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

use crate::fs::common::Backing;
use crate::fs::fat32::volume::Volume;
use crate::recovery::RecoveryError;

/// Length of a SHA-1 digest in bytes
pub const DIGEST_LEN: usize = 20;

/// SHA-1 digest of a file's content
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    /// SHA-1 of zero bytes (da39a3ee5e6b4b0d3255bfef95601890afd80709)
    pub const EMPTY: ContentHash = ContentHash([
        0xda, 0x39, 0xa3, 0xee, 0x5e, 0x6b, 0x4b, 0x0d, 0x32, 0x55, 0xbf, 0xef, 0x95, 0x60, 0x18,
        0x90, 0xaf, 0xd8, 0x07, 0x09,
    ]);

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        ContentHash(bytes)
    }

    /// Decode a 40-character hexadecimal digest
    pub fn from_hex(hex_digest: &str) -> Result<Self, RecoveryError> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(hex_digest, &mut bytes).map_err(|e| {
            RecoveryError::InvalidHash(format!(
                "'{}' is not a 40 digit hexadecimal SHA-1: {}",
                hex_digest, e
            ))
        })?;
        Ok(ContentHash(bytes))
    }

    /// Calculate hash from byte slice
    pub fn of(data: &[u8]) -> Self {
        Self::from_hasher(Sha1::new_with_prefix(data))
    }

    pub(crate) fn from_hasher(hasher: Sha1) -> Self {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&hasher.finalize());
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ContentHash {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Number of clusters needed to hold `file_size` bytes
pub fn clusters_needed(file_size: u32, cluster_size: u32) -> usize {
    (file_size as u64).div_ceil(cluster_size as u64) as usize
}

/// Bytes of the file held by the `index`-th cluster of its chain
pub(crate) fn chunk_len(file_size: u32, cluster_size: u32, index: usize) -> usize {
    let consumed = index as u64 * cluster_size as u64;
    (file_size as u64).saturating_sub(consumed).min(cluster_size as u64) as usize
}

/// Hash `file_size` bytes read across `chain` in order.
///
/// The last cluster is clamped to the remaining byte count. A zero-size
/// file yields `ContentHash::EMPTY` without touching any cluster.
pub fn hash_chain<S: Backing>(
    volume: &Volume<S>,
    file_size: u32,
    chain: &[u32],
) -> Result<ContentHash, RecoveryError> {
    if file_size == 0 {
        return Ok(ContentHash::EMPTY);
    }

    let cluster_size = volume.cluster_size();
    let needed = clusters_needed(file_size, cluster_size);
    if chain.len() < needed {
        return Err(RecoveryError::OutOfRange(format!(
            "{} byte file needs {} clusters, chain has {}",
            file_size,
            needed,
            chain.len()
        )));
    }

    let mut hasher = Sha1::new();
    for (index, &cluster) in chain.iter().take(needed).enumerate() {
        let data = volume.read_cluster(cluster)?;
        hasher.update(&data[..chunk_len(file_size, cluster_size, index)]);
    }

    Ok(ContentHash::from_hasher(hasher))
}
