use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the process-wide subscriber: fmt layer with target and thread
/// ids, filtered by `RUST_LOG` or `default_filter` when unset.
/// Only binaries call this.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
