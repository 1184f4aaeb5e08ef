//! Logging and tracing setup shared by the PortFleet binaries and tests.

pub mod tracing;

pub use tracing::{init_tracing, shutdown_tracing, LogFormat, TracingConfig};

/// Initialize logging, with OpenTelemetry export only when requested
pub fn init_basic_observability(service_name: &str, enable_tracing: bool, format: LogFormat) {
    if enable_tracing {
        let mut config = TracingConfig::new(service_name);
        config.format = format;
        if let Err(e) = init_tracing(config) {
            eprintln!("failed to initialize tracing: {e}");
        }
    } else {
        init_minimal_logging(format);
    }
}

/// Minimal logging setup without OpenTelemetry infrastructure.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_minimal_logging(format: LogFormat) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init(),
    };
}

/// Logging for tests: writes through the libtest capture and never panics
/// when several tests initialise it.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
