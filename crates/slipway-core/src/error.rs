//! Error taxonomy for pipeline stages.
//!
//! Every stage failure maps to exactly one variant so the CLI can always
//! name the stage that aborted the run. No variant is retried anywhere;
//! the only self-healing step in the system is the forced removal of a
//! stale container before start, which lives in `slipway-smoke`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Which half of the test stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Unit,
    Integration,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestPhase::Unit => write!(f, "unit"),
            TestPhase::Integration => write!(f, "integration"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("toolchain provisioning failed: {0}")]
    Provisioning(String),

    #[error("disk quota precondition failed: {0}")]
    Quota(String),

    #[error("quality gate '{check}' failed (exit code {exit_code})")]
    QualityGate { check: String, exit_code: i32 },

    #[error("{phase} tests failed (exit code {exit_code})")]
    Test { phase: TestPhase, exit_code: i32 },

    #[error("dependency drift: {lock_path} changed during the run")]
    LockDrift { lock_path: PathBuf },

    #[error("image build failed for '{image}' (exit code {exit_code})")]
    ImageBuild { image: String, exit_code: i32 },

    #[error("container '{name}' failed to start: {reason}")]
    ContainerStart { name: String, reason: String },

    #[error("server not ready on {addr} within {timeout_secs}s")]
    Readiness { addr: String, timeout_secs: u64 },

    #[error("smoke probe against {addr}:{port} failed (exit code {exit_code})")]
    Probe {
        addr: String,
        port: u16,
        exit_code: i32,
    },

    #[error("run exceeded wall-clock deadline of {deadline_secs}s")]
    TimedOut { deadline_secs: u64 },

    #[error("step '{step}' could not be spawned: {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("step '{step}' timed out after {timeout_secs}s")]
    StepTimeout { step: String, timeout_secs: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Stable identifier of the failing stage, surfaced to the caller
    /// and used in run reports.
    pub fn stage(&self) -> String {
        match self {
            StageError::Provisioning(_) => "provision".to_string(),
            StageError::Quota(_) => "quota".to_string(),
            StageError::QualityGate { check, .. } => format!("quality_gate:{check}"),
            StageError::Test { phase, .. } => format!("test:{phase}"),
            StageError::LockDrift { .. } => "lock_drift".to_string(),
            StageError::ImageBuild { .. } => "image_build".to_string(),
            StageError::ContainerStart { .. } => "container_start".to_string(),
            StageError::Readiness { .. } => "readiness".to_string(),
            StageError::Probe { .. } => "probe".to_string(),
            StageError::TimedOut { .. } => "timeout".to_string(),
            StageError::Spawn { step, .. } | StageError::StepTimeout { step, .. } => step.clone(),
            StageError::Io(_) => "io".to_string(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_identify_failures() {
        let err = StageError::QualityGate {
            check: "license".to_string(),
            exit_code: 1,
        };
        assert_eq!(err.stage(), "quality_gate:license");

        let err = StageError::Test {
            phase: TestPhase::Integration,
            exit_code: 2,
        };
        assert_eq!(err.stage(), "test:integration");

        let err = StageError::LockDrift {
            lock_path: PathBuf::from("Cargo.lock"),
        };
        assert_eq!(err.stage(), "lock_drift");

        let err = StageError::Readiness {
            addr: "127.0.0.1:5440".to_string(),
            timeout_secs: 60,
        };
        assert_eq!(err.stage(), "readiness");
    }

    #[test]
    fn test_drift_distinct_from_test_failure() {
        let drift = StageError::LockDrift {
            lock_path: PathBuf::from("Cargo.lock"),
        };
        let test = StageError::Test {
            phase: TestPhase::Unit,
            exit_code: 1,
        };
        assert_ne!(drift.stage(), test.stage());
    }

    #[test]
    fn test_display_carries_exit_code() {
        let err = StageError::Probe {
            addr: "127.0.0.1".to_string(),
            port: 5440,
            exit_code: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:5440"));
        assert!(msg.contains("3"));
    }
}
