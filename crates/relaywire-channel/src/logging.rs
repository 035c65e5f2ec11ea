//! Test-only `tracing` wiring.
//!
//! The usual `tracing_subscriber::registry().with(fmt::layer()).with(filter).init()`
//! pattern, scoped down to something a `#[test]` can call idempotently
//! without fighting other tests over the global default subscriber.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `relaywire=debug`)
/// exactly once per process.
///
/// Safe to call from every test that wants reactor/channel diagnostics on
/// failure — later calls are no-ops rather than panicking on "subscriber
/// already set".
pub fn init_test_subscriber() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relaywire=debug"));
        let _ = tracing_subscriber::registry().with(fmt::layer().with_test_writer()).with(filter).try_init();
    });
}
