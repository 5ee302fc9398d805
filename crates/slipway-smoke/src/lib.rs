//! Slipway Smoke - container build and smoke-test lane.
//!
//! Builds the server image once, then runs the boot-probe-teardown
//! lifecycle twice: with the baked-in defaults and with an external
//! runtime config bind-mounted. The server itself is a black box; the
//! only contracts are "the container starts", "the port answers" and
//! "the probe exits 0".

pub mod container;
pub mod smoke;

// Re-export key types
pub use container::{ContainerCli, ContainerConfig, ContainerInstance, ContainerState, CONFIG_MOUNT_PATH};
pub use smoke::{SmokeConfig, SmokeController, SmokeLane, SmokeOutcome, SmokePhase};
