//! Filesystem-backed dependency cache.
//!
//! Entries are keyed by the content-derived `CacheKey`. Restore walks the
//! primary key then each fallback prefix in order and copies the first
//! existing entry into the working paths; a miss on every key is a cold
//! start, not an error. Save runs only after a fully successful pipeline
//! so a broken build can never poison the cache.

use crate::fingerprint::CacheKey;
use slipway_core::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Content-addressed cache rooted at a directory.
pub struct FsDependencyCache {
    root: PathBuf,
}

impl FsDependencyCache {
    /// Open (creating if needed) a cache at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Restore the given working paths from the most specific matching
    /// entry. Returns the matched key, or `None` on a cold start.
    pub fn restore(&self, key: &CacheKey, paths: &[PathBuf]) -> Result<Option<String>> {
        let Some(matched) = self.lookup(key)? else {
            debug!(key = %key.primary, "cache miss on all keys; cold start");
            return Ok(None);
        };

        let entry = self.root.join(&matched);
        for (index, path) in paths.iter().enumerate() {
            let stored = entry.join(index.to_string());
            if stored.exists() {
                copy_tree(&stored, path)?;
            }
        }

        info!(key = %matched, "restored dependency cache");
        Ok(Some(matched))
    }

    /// Persist the current state of `paths` under `key`.
    ///
    /// Last-writer-wins under concurrent saves: keys are content-derived,
    /// so racing writers are persisting the same inputs.
    pub fn save(&self, key: &str, paths: &[PathBuf]) -> Result<()> {
        let entry = self.root.join(key);
        if entry.exists() {
            fs::remove_dir_all(&entry)?;
        }
        fs::create_dir_all(&entry)?;

        for (index, path) in paths.iter().enumerate() {
            if path.exists() {
                copy_tree(path, &entry.join(index.to_string()))?;
            }
        }

        info!(key = %key, "saved dependency cache");
        Ok(())
    }

    /// First existing entry among the primary key then the fallback
    /// prefixes, in order. Prefix matches resolve to the lexicographically
    /// last candidate so repeated lookups are deterministic.
    fn lookup(&self, key: &CacheKey) -> Result<Option<String>> {
        if self.root.join(&key.primary).is_dir() {
            return Ok(Some(key.primary.clone()));
        }

        let mut entries: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        entries.sort();

        for prefix in &key.restore_keys {
            if let Some(hit) = entries.iter().rev().find(|name| name.starts_with(prefix.as_str())) {
                return Ok(Some(hit.clone()));
            }
        }

        Ok(None)
    }
}

/// Recursively copy a directory tree (or single file) to `dst`.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key() -> CacheKey {
        CacheKey::from_parts("linux", "aaaaaaaaaaaa", "bbbbbbbbbbbb")
    }

    #[test]
    fn test_miss_on_all_keys_is_cold_start() {
        let dir = tempdir().unwrap();
        let cache = FsDependencyCache::new(dir.path().join("cache")).unwrap();
        let matched = cache.restore(&key(), &[dir.path().join("target")]).unwrap();
        assert!(matched.is_none());
        assert!(!dir.path().join("target").exists());
    }

    #[test]
    fn test_save_then_restore_primary_key() {
        let dir = tempdir().unwrap();
        let cache = FsDependencyCache::new(dir.path().join("cache")).unwrap();

        let work = dir.path().join("work");
        fs::create_dir_all(work.join("deps")).unwrap();
        fs::write(work.join("deps/libfoo.rlib"), b"artifact").unwrap();

        let k = key();
        cache.save(&k.primary, &[work.clone()]).unwrap();

        let restored = dir.path().join("restored");
        let matched = cache.restore(&k, &[restored.clone()]).unwrap();
        assert_eq!(matched.as_deref(), Some(k.primary.as_str()));
        assert_eq!(
            fs::read(restored.join("deps/libfoo.rlib")).unwrap(),
            b"artifact"
        );
    }

    #[test]
    fn test_fallback_prefix_match() {
        let dir = tempdir().unwrap();
        let cache = FsDependencyCache::new(dir.path().join("cache")).unwrap();

        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("stamp"), b"old").unwrap();

        // Saved under an older lock fingerprint, same toolchain.
        let old = CacheKey::from_parts("linux", "aaaaaaaaaaaa", "000000000000");
        cache.save(&old.primary, &[work.clone()]).unwrap();

        let restored = dir.path().join("restored");
        let matched = cache.restore(&key(), &[restored.clone()]).unwrap();
        assert_eq!(matched.as_deref(), Some(old.primary.as_str()));
        assert!(restored.join("stamp").exists());
    }

    #[test]
    fn test_restore_deterministic_across_repeats() {
        let dir = tempdir().unwrap();
        let cache = FsDependencyCache::new(dir.path().join("cache")).unwrap();

        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("stamp"), b"x").unwrap();

        for lock in ["111111111111", "222222222222"] {
            let k = CacheKey::from_parts("linux", "aaaaaaaaaaaa", lock);
            cache.save(&k.primary, &[work.clone()]).unwrap();
        }

        let first = cache.restore(&key(), &[]).unwrap();
        let second = cache.restore(&key(), &[]).unwrap();
        assert_eq!(first, second);
        // Lexicographically last candidate under the prefix.
        assert_eq!(
            first.as_deref(),
            Some("linux-aaaaaaaaaaaa-222222222222")
        );
    }

    #[test]
    fn test_save_overwrites_existing_entry() {
        let dir = tempdir().unwrap();
        let cache = FsDependencyCache::new(dir.path().join("cache")).unwrap();

        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("stamp"), b"v1").unwrap();
        let k = key();
        cache.save(&k.primary, &[work.clone()]).unwrap();

        fs::write(work.join("stamp"), b"v2").unwrap();
        cache.save(&k.primary, &[work.clone()]).unwrap();

        let restored = dir.path().join("restored");
        cache.restore(&k, &[restored.clone()]).unwrap();
        assert_eq!(fs::read(restored.join("stamp")).unwrap(), b"v2");
    }
}
