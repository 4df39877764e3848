//! Fingerprints identifying a compiled source set

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// SHA256 fingerprint over the (filename, text) pairs fed to the compiler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of an empty source set
    pub fn empty() -> Self {
        Self::of_sources(&BTreeMap::new())
    }

    /// Compute the fingerprint of a named source set.
    ///
    /// Each entry is length-prefixed so that moving text between files
    /// changes the result.
    pub fn of_sources(sources: &BTreeMap<String, String>) -> Self {
        let mut hasher = Sha256::new();
        for (name, text) in sources {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex digits, for log lines
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
