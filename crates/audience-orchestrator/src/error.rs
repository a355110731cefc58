//! Orchestrator error types.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of [`crate::AudienceClient`].
#[derive(Error, Debug)]
pub enum AudienceError {
    /// No reply arrived within the callback timeout
    #[error("No reply to {request} within {timeout:?}")]
    CallbackTimeout {
        request: &'static str,
        timeout: Duration,
    },

    /// The orchestrator is no longer running
    #[error("Audience orchestrator has shut down")]
    Shutdown,

    /// Configuration or path error
    #[error("Config error: {0}")]
    Config(#[from] audience_config_and_utils::CoreError),

    /// Outbox error
    #[error("Outbox error: {0}")]
    Outbox(#[from] audience_outbox::OutboxError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] audience_database::DatabaseError),
}

/// Result type alias using AudienceError.
pub type AudienceResult<T> = Result<T, AudienceError>;
