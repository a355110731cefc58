//! Logging initialization.

use crate::Paths;
use observability::LogConfig;

const SERVICE_NAME: &str = "audience-signal";

/// Initialize stderr logging at the given default level.
///
/// `RUST_LOG` still takes precedence over `level`.
pub fn init_logging(level: &str) {
    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        also_stderr: true,
        ..Default::default()
    });
}

/// Initialize logging to stderr and to `<logs_dir>/audience-signal.jsonl`.
pub fn init_logging_to_file(level: &str, paths: &Paths) {
    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    });
}
