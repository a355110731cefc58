//! Durable, strictly ordered delivery of audience signal hits.
//!
//! This crate provides:
//! - HitQueue: FIFO queue backed by SQLite with suspend/resume/purge and a
//!   single-in-flight delivery worker
//! - DeliveryProcessor: one network attempt per hit, classified into
//!   success, retry or terminal failure
//! - NetworkService: the HTTP seam, with a reqwest implementation
//! - ServerResponse: tolerant parser for audience server payloads

mod error;
mod hit;
mod network;
mod processor;
mod queue;
mod response;

pub use error::{OutboxError, OutboxResult};
pub use hit::{HitStore, SignalHit};
pub use network::{
    fire_and_forget, NetworkRequest, NetworkResponse, NetworkService, ReqwestNetworkService,
};
pub use processor::{DeliveryProcessor, HitOutcome, RECOVERABLE_STATUS_CODES};
pub use queue::{HitCompletion, HitQueue, QueueMode, DEFAULT_RETRY_INTERVAL};
pub use response::ServerResponse;
