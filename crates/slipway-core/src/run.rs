//! Pipeline run bookkeeping.
//!
//! A `PipelineRun` is created when the orchestrator is invoked, collects
//! one immutable `StageRecord` per completed stage, and becomes terminal
//! once every stage has run or the first failure aborts the sequence.

use crate::exec::CapturedOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why the pipeline was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Push,
    PullRequest,
    Manual,
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

/// Record of one completed stage. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,

    /// When the stage started.
    pub started_at: DateTime<Utc>,

    /// When the stage finished.
    pub finished_at: DateTime<Utc>,

    /// Exit code of the underlying invocation.
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Content digest of the combined output (the stored output reference).
    pub output_digest: String,

    /// Whether the stage passed.
    pub success: bool,
}

impl StageRecord {
    /// Build a record from a captured invocation.
    pub fn from_output(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        output: &CapturedOutput,
    ) -> Self {
        Self {
            name: name.into(),
            started_at,
            finished_at: Utc::now(),
            exit_code: output.exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            output_digest: output.digest(),
            success: output.success(),
        }
    }

    /// Record an internal stage (snapshot, drift check) that produced no
    /// subprocess output.
    pub fn internal(name: impl Into<String>, started_at: DateTime<Utc>, success: bool) -> Self {
        let empty = CapturedOutput {
            exit_code: if success { 0 } else { 1 },
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        };
        let mut record = Self::from_output(name, started_at, &empty);
        record.success = success;
        record
    }

    /// Whether this stage passed.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// One orchestrator execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run ID.
    pub id: String,

    /// Trigger reason, carried for reporting.
    pub trigger: TriggerReason,

    /// Ordered stage records.
    pub stages: Vec<StageRecord>,

    /// Overall status.
    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run became terminal.
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a run in the `Running` state.
    pub fn start(trigger: TriggerReason) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trigger,
            stages: Vec::new(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append a completed stage record.
    pub fn record(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    /// Mark the run terminal with the given status.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed()).count()
    }

    /// Number of stages that failed.
    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.passed()).count()
    }

    /// First failing stage, if any.
    pub fn first_failure(&self) -> Option<&StageRecord> {
        self.stages.iter().find(|s| !s.passed())
    }
}
