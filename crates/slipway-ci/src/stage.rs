//! Verification stage definitions and configuration.
//!
//! The checkout drives its checks through make targets; the orchestrator
//! only cares about argv, working directory and exit status. Rule sets
//! behind the lint/format targets are external policy, not modelled here.

use serde::{Deserialize, Serialize};
use slipway_core::CommandSpec;
use std::path::{Path, PathBuf};

/// Builtin verification stages, in pipeline order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStage {
    /// Best-effort disk reclamation before any build work.
    QuotaRelease,

    /// Asserts enough free disk remains; failing this aborts the run.
    QuotaAssert,

    /// License-header check across the tree.
    LicenseHeader,

    /// Lint check.
    Lint,

    /// Formatting check.
    Format,

    /// Unit tests in the primary working directory.
    UnitTest,

    /// External integration harness, run from its own subdirectory.
    IntegrationHarness,
}

impl VerifyStage {
    /// Stage name as reported in records and failure messages.
    pub fn name(&self) -> &'static str {
        match self {
            VerifyStage::QuotaRelease => "quota_release",
            VerifyStage::QuotaAssert => "quota_assert",
            VerifyStage::LicenseHeader => "license",
            VerifyStage::Lint => "lint",
            VerifyStage::Format => "format",
            VerifyStage::UnitTest => "unit_test",
            VerifyStage::IntegrationHarness => "integration_harness",
        }
    }

    /// Default command for the stage.
    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            VerifyStage::QuotaRelease => &["make", "free-disk"],
            VerifyStage::QuotaAssert => &["make", "ensure-disk-quota"],
            VerifyStage::LicenseHeader => &["make", "check-license"],
            VerifyStage::Lint => &["make", "clippy"],
            VerifyStage::Format => &["make", "fmt"],
            VerifyStage::UnitTest => &["make", "test"],
            VerifyStage::IntegrationHarness => &["make", "run"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    /// Subdirectory (relative to the workspace) the stage runs from.
    pub fn subdir(&self) -> Option<&'static str> {
        match self {
            VerifyStage::IntegrationHarness => Some("integration_tests"),
            _ => None,
        }
    }
}

/// Configuration for one stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Working directory relative to the workspace root.
    pub subdir: Option<PathBuf>,

    /// Timeout in seconds (0 = unbounded).
    pub timeout_secs: u64,

    /// Whether this stage is enabled.
    pub enabled: bool,
}

impl StageConfig {
    /// Stage configuration from a builtin stage.
    pub fn from_builtin(stage: VerifyStage, timeout_secs: u64) -> Self {
        Self {
            name: stage.name().to_string(),
            command: stage.command(),
            subdir: stage.subdir().map(PathBuf::from),
            timeout_secs,
            enabled: true,
        }
    }

    /// Custom stage configuration.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            subdir: None,
            timeout_secs,
            enabled: true,
        }
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Resolve into an executable `CommandSpec` rooted at the workspace.
    pub fn to_spec(&self, workspace: &Path) -> CommandSpec {
        let cwd = match &self.subdir {
            Some(sub) => workspace.join(sub),
            None => workspace.to_path_buf(),
        };
        CommandSpec {
            name: self.name.clone(),
            argv: self.command.clone(),
            cwd: Some(cwd),
            env: Vec::new(),
            timeout_secs: self.timeout_secs,
        }
    }
}
