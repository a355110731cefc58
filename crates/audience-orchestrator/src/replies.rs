//! Direct-reply routing by pairing id.

use audience_protocol_types::OutboundMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::debug;

/// Callers waiting for a reply, keyed by the pairing id of their request.
#[derive(Default)]
pub struct ReplyRegistry {
    pending: Mutex<HashMap<String, oneshot::Sender<OutboundMessage>>>,
}

impl ReplyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a continuation for `pair_id`.
    pub fn register(&self, pair_id: &str) -> oneshot::Receiver<OutboundMessage> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(pair_id.to_string(), tx);
        rx
    }

    /// Deliver `message` to the caller waiting on `pair_id`.
    ///
    /// Returns false when nobody is waiting any more.
    pub fn resolve(&self, pair_id: &str, message: OutboundMessage) -> bool {
        let Some(tx) = self.pending.lock().remove(pair_id) else {
            debug!(pair_id, "No caller waiting for reply");
            return false;
        };
        tx.send(message).is_ok()
    }

    /// Forget a caller that gave up.
    pub fn evict(&self, pair_id: &str) -> bool {
        self.pending.lock().remove(pair_id).is_some()
    }

    /// Drop every waiting caller. Their receivers see a closed channel.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
