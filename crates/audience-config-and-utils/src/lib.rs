//! Service configuration, file system paths and logging setup.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_CALLBACK_TIMEOUT_MS, DEFAULT_LOG_LEVEL, DEFAULT_PLATFORM_NAME,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_INTERVAL_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_to_file};
pub use paths::Paths;
