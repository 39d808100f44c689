//! Test support: one global tracing subscriber shared by all tests

use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Targets too chatty to be useful in test output.
const NOISY_TARGETS: [&str; 1] = ["walkdir"];

/// Default directives when RUST_LOG is unset.
const DEFAULT_DIRECTIVES: &str = "coursemap=trace,warn";

static TEST_SETUP: Once = Once::new();

/// Install the test subscriber once per process; later calls are no-ops.
pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        install_subscriber();
        info!("test logging ready");
    });
}

fn install_subscriber() {
    if tracing::dispatcher::has_been_set() {
        debug!("subscriber already installed");
        return;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let quiet = filter_fn(|metadata| {
        !NOISY_TARGETS
            .iter()
            .any(|target| metadata.target().starts_with(target))
    });

    let layer = fmt::layer()
        .with_test_writer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(quiet)
        .with_filter(env_filter);

    if let Err(e) = tracing_subscriber::registry().with(layer).try_init() {
        eprintln!("test logging not installed: {e}");
    }
}
