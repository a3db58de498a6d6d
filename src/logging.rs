use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Call once at startup.
///
/// `RUST_LOG` overrides the default `inexogy_meter_bridge=info` directive.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("inexogy_meter_bridge=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
