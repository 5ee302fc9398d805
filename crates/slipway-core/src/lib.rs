//! Slipway Core - shared domain model for the verification pipeline
//!
//! Provides the pieces every slipway crate builds on:
//! - `PipelineRun` / `StageRecord` run bookkeeping
//! - The `StageError` failure taxonomy (one variant per stage class)
//! - `CommandRunner`, the subprocess seam all stages execute through
//! - Tracing initialisation for the binaries

pub mod error;
pub mod exec;
pub mod fakes;
pub mod run;
pub mod telemetry;

// Re-export key types
pub use error::{Result, StageError, TestPhase};
pub use exec::{CapturedOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use run::{PipelineRun, RunStatus, StageRecord, TriggerReason};
pub use telemetry::init_tracing;

/// Slipway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
