//! Content fingerprints for cheap divergence detection.
//!
//! Equal fingerprints are treated as "same content". That is not a
//! cryptographic guarantee; a false match only suppresses a prompt that would
//! not have been needed, and callers still compare the raw text before
//! interrupting the user.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint of the empty document.
    pub const EMPTY: Fingerprint = Fingerprint(0);

    /// Digest `content`: the first 8 bytes of its SHA-256.
    pub fn of(content: &str) -> Self {
        if content.is_empty() {
            return Self::EMPTY;
        }

        let digest = Sha256::digest(content.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);

        // Keep the sentinel unique to the empty string.
        match u64::from_be_bytes(prefix) {
            0 => Fingerprint(1),
            v => Fingerprint(v),
        }
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub fn fingerprint(content: &str) -> Fingerprint {
    Fingerprint::of(content)
}
