//! Versioned shared-state publication.

use audience_protocol_types::{AudienceSharedState, OutboundMessage, SharedStateStatus};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Publishes this subsystem's public state, once per version.
pub struct SharedStatePublisher {
    history: BTreeMap<u64, SharedStateStatus<AudienceSharedState>>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl SharedStatePublisher {
    /// Start with an empty state at version 0.
    pub fn new(outbound: broadcast::Sender<OutboundMessage>) -> Self {
        let mut publisher = Self {
            history: BTreeMap::new(),
            outbound,
        };
        publisher.insert(0, SharedStateStatus::Set(AudienceSharedState::default()));
        publisher
    }

    pub fn latest_version(&self) -> u64 {
        self.history.keys().next_back().copied().unwrap_or(0)
    }

    pub fn get(&self, version: u64) -> Option<&SharedStateStatus<AudienceSharedState>> {
        self.history.get(&version)
    }

    /// Reserve `version` with a pending marker.
    ///
    /// Only versions newer than the latest publication can be reserved.
    pub fn publish_pending(&mut self, version: Option<u64>) -> Option<u64> {
        let version = version.filter(|v| *v > self.latest_version());
        match version {
            Some(version) => {
                self.insert(version, SharedStateStatus::Pending);
                Some(version)
            }
            None => {
                debug!("Skipping pending marker for stale version");
                None
            }
        }
    }

    /// Publish `state`, resolving a pending marker at `version` if there is
    /// one. Returns the version used.
    pub fn publish(&mut self, version: Option<u64>, state: AudienceSharedState) -> u64 {
        let version = match version {
            Some(v) if matches!(self.history.get(&v), Some(SharedStateStatus::Pending)) => v,
            Some(v) if v > self.latest_version() => v,
            _ => self.latest_version() + 1,
        };
        self.insert(version, SharedStateStatus::Set(state));
        version
    }

    fn insert(&mut self, version: u64, state: SharedStateStatus<AudienceSharedState>) {
        self.history.insert(version, state.clone());
        if self
            .outbound
            .send(OutboundMessage::SharedStateChanged { version, state })
            .is_err()
        {
            debug!(version, "No subscribers for shared state");
        }
    }
}
