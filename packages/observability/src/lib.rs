//! # Observability
//!
//! Logging setup shared by every audience signal crate.
//!
//! Library crates only emit `tracing` events. Binaries call
//! [`init_with_config`] once at startup to decide where those events go:
//!
//! - stderr, compact human-readable lines (always on unless disabled)
//! - a JSONL file, one object per event, when `log_path` is set
//!
//! The filter comes from `RUST_LOG` when present, otherwise from
//! [`LogConfig::default_level`].
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "audience-signal".into(),
//!     default_level: "debug".into(),
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod file_writer;
mod json_layer;

pub use file_writer::{LogFileWriter, LogFileWriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name written into every JSONL entry.
    pub service_name: String,

    /// Default filter directive, overridden by `RUST_LOG`.
    pub default_level: String,

    /// Optional JSONL output file.
    pub log_path: Option<PathBuf>,

    /// Emit compact lines on stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// Calling this twice is harmless: the second global subscriber install is
/// rejected by `tracing` and ignored here.
pub fn init_with_config(config: LogConfig) {
    let file_layer = config.log_path.as_ref().and_then(|path| {
        match LogFileWriter::new(path) {
            Ok(writer) => Some(
                JsonLayer::new(
                    config.service_name.clone(),
                    LogFileWriterFactory::new(writer),
                )
                .with_filter(env_filter(&config.default_level)),
            ),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    if let Some(path) = &config.log_path {
        tracing::debug!(log_path = %path.display(), "observability initialized");
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub use tracing::{debug, error, info, instrument, trace, warn};

pub use tracing::Level;
