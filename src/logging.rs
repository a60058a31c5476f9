use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "fractalbot=info";

/// Install the global fmt subscriber; `RUST_LOG` overrides the default filter
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second call (tests, nested binaries) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
