//! Logging setup for the colloquy binary
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` overrides the configured level when set.

use colloquy_roles::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG`, else from the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter = env_filter(config);
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = installed {
        eprintln!("colloquy: logging already initialized: {e}");
    }
}
