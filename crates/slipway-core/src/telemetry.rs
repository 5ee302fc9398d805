//! Tracing setup for the slipway binaries.
//!
//! Stage subprocess output is captured on `StageRecord`s, not logged, so
//! the subscriber only carries orchestrator events. Text mode uses the
//! compact formatter for interactive runs; JSON mode flattens event
//! fields for log aggregation. Safe to call more than once — the global
//! subscriber can only be set once per process, later calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// `level` is the default verbosity; `RUST_LOG` overrides it entirely
/// when set, including per-crate directives.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true).with_target(false))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .try_init()
            .ok();
    }
}
