//! Slipway CI - the build-verification pipeline.
//!
//! Runs the gated stage sequence against a source checkout:
//! provision → cache restore → quota check → quality gates
//! (license → lint → format) → tests (unit → integration) →
//! lock-drift check, fail-fast with a typed failure per stage.

pub mod drift;
pub mod pipeline;
pub mod stage;

// Re-export key types
pub use drift::LockSnapshot;
pub use pipeline::{VerifyConfig, VerifyOutcome, VerifyPipeline};
pub use stage::{StageConfig, VerifyStage};
