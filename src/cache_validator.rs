use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cached profile lookup sealed with a SHA-256 checksum.
///
/// The enrichment cache stores these instead of raw payloads; an entry whose
/// checksum no longer matches is treated as a miss and the profile is fetched
/// again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedCacheEntry {
    /// Serialized JSON payload
    pub data: String,
    /// Hex-encoded SHA-256 of `data`
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    /// Serializes `value` and seals it. Returns `None` if it cannot be serialized.
    pub fn seal<T: Serialize>(value: &T) -> Option<Self> {
        serde_json::to_string(value).ok().map(Self::new)
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Validates the checksum and decodes the payload.
    ///
    /// Returns `None` for a tampered entry or one that no longer decodes as `T`.
    pub fn open<T: DeserializeOwned>(&self) -> Option<T> {
        if !self.is_valid() {
            tracing::warn!(
                "Cache entry failed checksum validation (expected {}, {} bytes), discarding",
                self.checksum,
                self.data.len()
            );
            return None;
        }
        serde_json::from_str(&self.data).ok()
    }
}
