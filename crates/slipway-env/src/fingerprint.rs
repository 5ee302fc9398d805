//! Cache key composition.
//!
//! Keys are content-derived: OS identifier plus fingerprints of the
//! toolchain pin file and the dependency lock file. Two runs with the
//! same triple always compose the same key, so concurrent saves can only
//! race on identical content.

use sha2::{Digest, Sha256};
use slipway_core::Result;
use std::path::Path;

/// Sha256 hex fingerprint of a byte slice.
pub fn fingerprint_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Sha256 hex fingerprint of a file's content.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    Ok(fingerprint_bytes(&content))
}

/// A composed cache key with its ordered restore-key fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Fully qualified key: `{os}-{toolchain}-{lock}`.
    pub primary: String,

    /// Fallback prefixes, most specific first.
    pub restore_keys: Vec<String>,
}

impl CacheKey {
    /// Compose a key from the OS identifier, toolchain pin file and lock file.
    pub fn compose(os: &str, toolchain_file: &Path, lock_file: &Path) -> Result<Self> {
        let toolchain = short(&fingerprint_file(toolchain_file)?);
        let lock = short(&fingerprint_file(lock_file)?);
        Ok(Self::from_parts(os, &toolchain, &lock))
    }

    /// Compose a key from already-computed fingerprints.
    pub fn from_parts(os: &str, toolchain: &str, lock: &str) -> Self {
        Self {
            primary: format!("{os}-{toolchain}-{lock}"),
            restore_keys: vec![format!("{os}-{toolchain}-"), format!("{os}-")],
        }
    }
}

fn short(digest: &str) -> String {
    digest[..12.min(digest.len())].to_string()
}
