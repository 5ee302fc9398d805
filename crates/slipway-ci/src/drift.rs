//! Dependency lock-drift detection.
//!
//! A byte-exact snapshot of the lock file is taken before the test runner
//! and compared afterwards. Any difference, down to trailing whitespace,
//! means the run silently mutated declared dependencies. Drift is never
//! auto-merged; it is its own failure class, distinct from test failures.

use slipway_core::{Result, StageError};
use std::path::{Path, PathBuf};

/// Byte-exact copy of the lock file at snapshot time.
#[derive(Debug, Clone)]
pub struct LockSnapshot {
    path: PathBuf,
    content: Vec<u8>,
}

impl LockSnapshot {
    /// Capture the lock file as it is right now.
    pub fn capture(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            content: std::fs::read(path)?,
        })
    }

    /// Compare the live lock file against the snapshot.
    pub fn verify(&self) -> Result<()> {
        let live = std::fs::read(&self.path).map_err(|_| StageError::LockDrift {
            lock_path: self.path.clone(),
        })?;
        if live != self.content {
            return Err(StageError::LockDrift {
                lock_path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Path of the snapshotted lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
