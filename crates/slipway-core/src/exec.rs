//! Subprocess execution seam.
//!
//! Every external invocation in the pipeline (rustup, make, cargo, docker,
//! the smoke probe) goes through the `CommandRunner` trait so stage logic
//! can be exercised in tests with a scripted runner instead of real
//! processes. The production implementation is `ProcessRunner`.

use crate::error::{Result, StageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// One external invocation: a labelled argv plus working directory,
/// environment additions and a per-step timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Step label used in logs and error reporting.
    pub name: String,

    /// Command line (first element is the executable).
    pub argv: Vec<String>,

    /// Working directory; inherits the process cwd when `None`.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables injected into the child.
    pub env: Vec<(String, String)>,

    /// Timeout in seconds; 0 means unbounded.
    pub timeout_secs: u64,
}

impl CommandSpec {
    /// Create a spec with no cwd override, no extra env and no timeout.
    pub fn new(name: impl Into<String>, argv: &[&str]) -> Self {
        Self {
            name: name.into(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: Vec::new(),
            timeout_secs: 0,
        }
    }

    /// Run the command in the given directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable to the child's environment.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Bound the step with a timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Captured output of a completed invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Exit code (0 = success, -1 = killed by signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CapturedOutput {
    /// Did the invocation exit 0?
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Content digest of the combined output, used as the stored
    /// output reference on stage records.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stdout.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.stderr.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Execution seam for all external invocations.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its output.
    ///
    /// A non-zero exit is NOT an error at this layer; callers decide what
    /// a failed invocation means for their stage. Errors are reserved for
    /// spawn failures and step timeouts.
    async fn run(&self, spec: &CommandSpec) -> Result<CapturedOutput>;
}

/// Production runner backed by `tokio::process`.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CapturedOutput> {
        if spec.argv.is_empty() {
            return Err(StageError::Spawn {
                step: spec.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        }

        let start = Instant::now();

        let mut cmd = Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out step (or an abandoned run) must not leave its
            // subprocess behind; dropping the child kills it.
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|source| StageError::Spawn {
            step: spec.name.clone(),
            source,
        })?;

        let output = if spec.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| StageError::StepTimeout {
                step: spec.name.clone(),
                timeout_secs: spec.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(CapturedOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
