//! Content fingerprinting for duplicate detection.
//!
//! The fingerprint is the lowercase hex SHA-256 of the exact uploaded bytes. It
//! does not depend on the declared content type or filename.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Hex-encoded SHA-256 digest of a receipt's raw bytes (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub const HEX_LEN: usize = 64;

    /// Hash the given bytes.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(hex::encode(digest))
    }

    /// Wrap a digest previously produced by [`ContentFingerprint::of`] (e.g. read back from the store).
    pub fn from_hex(value: impl Into<String>) -> Result<Self, anyhow::Error> {
        let value = value.into().to_ascii_lowercase();
        if value.len() != Self::HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid content fingerprint: {}", value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
