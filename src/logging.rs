use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. `RUST_LOG` controls the filter;
/// WARN is the default so compression and rebuild degradations are
/// visible without flooding operator output.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
