//! Audience signal orchestration.
//!
//! This crate provides:
//! - Orchestrator: single-owner actor gating, dispatching and applying
//!   inbound events against versioned upstream snapshots
//! - Dispatch table: one handler per (event type, event source)
//! - SharedStatePublisher: versioned publication with pending markers
//! - AudienceClient: cloneable handle with paired request/reply

mod client;
mod error;
mod handlers;
mod orchestrator;
mod publisher;
mod replies;
mod tracker;

pub use client::{AudienceClient, ClientOptions, DEFAULT_CALLBACK_TIMEOUT};
pub use error::{AudienceError, AudienceResult};
pub use handlers::{dispatch_table, HandlerFn};
pub use orchestrator::Orchestrator;
pub use publisher::SharedStatePublisher;
pub use replies::ReplyRegistry;
pub use tracker::{Resolution, SnapshotTracker};
