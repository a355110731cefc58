//! Durable hit queue.
//!
//! Hits live in an in-memory `VecDeque` mirrored to a [`HitStore`]. A single
//! worker task delivers the head hit, waits for its outcome, and only then
//! looks at the next one, so hits reach the server in enqueue order even
//! when some of them need retries.

use crate::{DeliveryProcessor, HitOutcome, HitStore, SignalHit};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wait between attempts of a hit that got a recoverable status.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Whether the worker may take hits off the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Active,
    Suspended,
}

/// A hit that reached a terminal outcome.
///
/// `body` is the response body on success and `None` on terminal failure.
#[derive(Debug, Clone)]
pub struct HitCompletion {
    pub hit: SignalHit,
    pub body: Option<String>,
}

struct QueueState {
    pending: VecDeque<SignalHit>,
    mode: QueueMode,
    /// Id of the hit currently being delivered.
    in_flight: Option<String>,
    /// Bumped by every purge. Outcomes from an older generation are dropped.
    generation: u64,
}

/// Crash-durable FIFO of signal hits.
pub struct HitQueue {
    store: Option<Arc<dyn HitStore>>,
    state: Mutex<QueueState>,
    wake: Notify,
    shutdown: watch::Sender<bool>,
}

impl HitQueue {
    /// Create a suspended, empty queue.
    pub fn new(store: Option<Arc<dyn HitStore>>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            store,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                mode: QueueMode::Suspended,
                in_flight: None,
                generation: 0,
            }),
            wake: Notify::new(),
            shutdown,
        })
    }

    /// Load hits left over from a previous run.
    ///
    /// Their pairing ids and sequence numbers come back invalidated.
    pub fn recover(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        match store.load_hits() {
            Ok(hits) => {
                let count = hits.len();
                let mut state = self.state.lock();
                state.pending.extend(hits);
                if count > 0 {
                    info!(count, "Recovered persisted hits");
                }
                drop(state);
                self.wake.notify_one();
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to load persisted hits");
                0
            }
        }
    }

    /// Persist and append a hit.
    ///
    /// When persistence fails the hit is still queued in memory.
    pub fn enqueue(&self, hit: SignalHit) {
        if let Some(store) = &self.store {
            if let Err(e) = store.insert_hit(&hit) {
                warn!(hit_id = %hit.id, error = %e, "Failed to persist hit, keeping it in memory only");
            }
        }

        debug!(hit_id = %hit.id, "Enqueued hit");
        self.state.lock().pending.push_back(hit);
        self.wake.notify_one();
    }

    /// Stop handing out hits. Queued hits are kept.
    pub fn suspend(&self) {
        let mut state = self.state.lock();
        if state.mode != QueueMode::Suspended {
            debug!(pending = state.pending.len(), "Suspending hit queue");
            state.mode = QueueMode::Suspended;
        }
    }

    /// Restart delivery from the head.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if state.mode != QueueMode::Active {
            debug!(pending = state.pending.len(), "Resuming hit queue");
            state.mode = QueueMode::Active;
        }
        drop(state);
        self.wake.notify_one();
    }

    /// Drop every queued hit and return them, head first.
    ///
    /// A delivery already in flight is not cancelled; its outcome is ignored
    /// and a pending retry wait ends early.
    pub fn purge(&self) -> Vec<SignalHit> {
        let mut state = self.state.lock();
        let dropped: Vec<SignalHit> = state.pending.drain(..).collect();
        state.generation += 1;
        drop(state);
        self.wake.notify_one();

        if let Some(store) = &self.store {
            if let Err(e) = store.delete_all_hits() {
                warn!(error = %e, "Failed to delete persisted hits");
            }
        }

        info!(count = dropped.len(), "Purged hit queue");
        dropped
    }

    pub fn mode(&self) -> QueueMode {
        self.state.lock().mode
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the worker after its current attempt.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.wake.notify_one();
    }

    /// Spawn the delivery worker.
    ///
    /// Terminal outcomes are reported on `completions` after the hit has
    /// left the queue.
    pub fn spawn_worker(
        self: &Arc<Self>,
        processor: DeliveryProcessor,
        retry_interval: Duration,
        completions: mpsc::UnboundedSender<HitCompletion>,
    ) -> JoinHandle<()> {
        let queue = self.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            queue
                .run_worker(processor, retry_interval, completions, shutdown)
                .await;
        })
    }

    async fn run_worker(
        &self,
        processor: DeliveryProcessor,
        retry_interval: Duration,
        completions: mpsc::UnboundedSender<HitCompletion>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("Hit queue worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some((hit, generation)) = self.take_head() else {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            match processor.process(&hit).await {
                HitOutcome::Retry => {
                    self.release_head(&hit.id);
                    if !self.wait_for_retry(retry_interval, generation, &mut shutdown).await {
                        break;
                    }
                }
                HitOutcome::Success(body) => {
                    self.finish_head(hit, Some(body), generation, &completions);
                }
                HitOutcome::TerminalFailure => {
                    self.finish_head(hit, None, generation, &completions);
                }
            }
        }
        debug!("Hit queue worker stopped");
    }

    /// Sleep until the retry is due or the queue is purged. Returns false
    /// on shutdown.
    async fn wait_for_retry(
        &self,
        retry_interval: Duration,
        generation: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let sleep = tokio::time::sleep(retry_interval);
        tokio::pin!(sleep);
        while self.state.lock().generation == generation {
            tokio::select! {
                _ = &mut sleep => return true,
                // enqueue and resume also wake us; only a purge ends the wait
                _ = self.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
        debug!("Queue purged during retry wait");
        true
    }

    /// Mark the head hit in flight and hand out a copy, if the queue is
    /// active and nothing else is in flight.
    fn take_head(&self) -> Option<(SignalHit, u64)> {
        let mut state = self.state.lock();
        if state.mode != QueueMode::Active || state.in_flight.is_some() {
            return None;
        }
        let hit = state.pending.front()?.clone();
        state.in_flight = Some(hit.id.clone());
        Some((hit, state.generation))
    }

    fn release_head(&self, hit_id: &str) {
        let mut state = self.state.lock();
        if state.in_flight.as_deref() == Some(hit_id) {
            state.in_flight = None;
        }
    }

    fn finish_head(
        &self,
        hit: SignalHit,
        body: Option<String>,
        generation: u64,
        completions: &mpsc::UnboundedSender<HitCompletion>,
    ) {
        let mut state = self.state.lock();
        state.in_flight = None;
        if state.generation != generation {
            debug!(hit_id = %hit.id, "Dropping outcome of purged hit");
            return;
        }
        if state.pending.front().map(|h| h.id.as_str()) == Some(hit.id.as_str()) {
            state.pending.pop_front();
        }
        drop(state);

        if let Some(store) = &self.store {
            if let Err(e) = store.delete_hit(&hit.id) {
                warn!(hit_id = %hit.id, error = %e, "Failed to delete delivered hit");
            }
        }

        if completions.send(HitCompletion { hit, body }).is_err() {
            debug!("Completion receiver dropped");
        }
    }
}
