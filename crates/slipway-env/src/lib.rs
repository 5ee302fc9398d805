//! Slipway Env - environment layer for the verification pipeline.
//!
//! Covers the two stages that run before any build work:
//! - pinned toolchain provisioning (idempotent, fatal on failure)
//! - content-addressed dependency cache restore/save

pub mod cache;
pub mod fingerprint;
pub mod toolchain;

pub use cache::FsDependencyCache;
pub use fingerprint::{fingerprint_bytes, fingerprint_file, CacheKey};
pub use toolchain::{ensure_toolchain, ToolchainSpec};
