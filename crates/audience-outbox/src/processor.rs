//! Delivery processor.

use crate::{NetworkRequest, NetworkResponse, NetworkService, SignalHit};
use std::sync::Arc;
use tracing::{debug, warn};

/// Statuses worth retrying: request timeout, service unavailable,
/// gateway timeout.
pub const RECOVERABLE_STATUS_CODES: [u16; 3] = [408, 503, 504];

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitOutcome {
    /// 2xx; carries the response body.
    Success(String),
    /// Transient failure; the same hit is attempted again later.
    Retry,
    /// Permanent failure or no connection; the hit is dropped.
    TerminalFailure,
}

/// Sends a hit and classifies what came back.
#[derive(Clone)]
pub struct DeliveryProcessor {
    network: Arc<dyn NetworkService>,
}

impl DeliveryProcessor {
    pub fn new(network: Arc<dyn NetworkService>) -> Self {
        Self { network }
    }

    pub async fn process(&self, hit: &SignalHit) -> HitOutcome {
        let request = NetworkRequest::get(hit.url.clone(), hit.timeout_secs);
        let outcome = classify(self.network.send(request).await);

        match &outcome {
            HitOutcome::Success(_) => debug!(hit_id = %hit.id, "Hit delivered"),
            HitOutcome::Retry => warn!(hit_id = %hit.id, "Recoverable failure, hit will be retried"),
            HitOutcome::TerminalFailure => warn!(hit_id = %hit.id, "Hit failed permanently, dropping"),
        }
        outcome
    }
}

/// Map a network result onto an outcome.
pub(crate) fn classify(response: Option<NetworkResponse>) -> HitOutcome {
    match response {
        None => HitOutcome::TerminalFailure,
        Some(response) if RECOVERABLE_STATUS_CODES.contains(&response.status) => HitOutcome::Retry,
        Some(response) if (200..300).contains(&response.status) => {
            HitOutcome::Success(response.body)
        }
        Some(_) => HitOutcome::TerminalFailure,
    }
}
