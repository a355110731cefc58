//! The orchestrator actor.
//!
//! Owns the visitor state, the upstream snapshot trackers and the shared
//! state publisher. Inbound events are handled one at a time in arrival
//! order; an event whose inputs are not ready yet holds the head of the
//! backlog until they are. Delivery outcomes from the hit queue arrive on a
//! separate channel and are handled between inbound events.

use crate::handlers::{dispatch_table, HandlerFn};
use crate::publisher::SharedStatePublisher;
use crate::replies::ReplyRegistry;
use crate::tracker::SnapshotTracker;
use audience_outbox::{
    fire_and_forget, HitCompletion, HitQueue, NetworkRequest, NetworkService, ServerResponse,
    SignalHit,
};
use audience_protocol_types::{
    ConfigurationSnapshot, ConsentStatus, Event, EventSource, EventType, IdentitySnapshot,
    InboundMessage, OutboundMessage, Profile, SharedStateStatus,
};
use chrono::{DateTime, Utc};
use signal_url_builder::DEFAULT_TIMEOUT_SECS;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use visitor_state::VisitorState;

pub struct Orchestrator {
    pub(crate) visitor: VisitorState,
    pub(crate) queue: Arc<HitQueue>,
    pub(crate) network: Arc<dyn NetworkService>,
    pub(crate) configuration: SnapshotTracker<ConfigurationSnapshot>,
    pub(crate) identity: SnapshotTracker<IdentitySnapshot>,
    pub(crate) publisher: SharedStatePublisher,
    pub(crate) replies: Arc<ReplyRegistry>,
    pub(crate) outbound: broadcast::Sender<OutboundMessage>,
    pub(crate) platform: Option<String>,
    /// Hits created at or before this instant predate the last reset.
    pub(crate) last_reset: Option<DateTime<Utc>>,
    backlog: VecDeque<Event>,
    handlers: HashMap<(EventType, EventSource), HandlerFn>,
}

impl Orchestrator {
    pub fn new(
        visitor: VisitorState,
        queue: Arc<HitQueue>,
        network: Arc<dyn NetworkService>,
        replies: Arc<ReplyRegistry>,
        outbound: broadcast::Sender<OutboundMessage>,
        platform: Option<String>,
    ) -> Self {
        Self {
            visitor,
            queue,
            network,
            configuration: SnapshotTracker::new(),
            identity: SnapshotTracker::new(),
            publisher: SharedStatePublisher::new(outbound.clone()),
            replies,
            outbound,
            platform,
            last_reset: None,
            backlog: VecDeque::new(),
            handlers: dispatch_table(),
        }
    }

    /// Process events and completions until shutdown or until every
    /// client handle is gone.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<Event>,
        mut completions: mpsc::UnboundedReceiver<HitCompletion>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Audience orchestrator started");
        loop {
            tokio::select! {
                event = inbound.recv() => match event {
                    Some(event) => self.accept(event),
                    None => break,
                },
                Some(completion) = completions.recv() => {
                    self.handle_completion(completion);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.queue.shutdown();
        let dropped = self.replies.clear();
        if !self.backlog.is_empty() || dropped > 0 {
            info!(
                blocked = self.backlog.len(),
                waiting_callers = dropped,
                "Orchestrator stopping with unfinished work"
            );
        }
        info!("Audience orchestrator stopped");
    }

    /// Take in one inbound event.
    ///
    /// Snapshot changes are recorded right away so that blocked events can
    /// see them; everything else goes through the backlog.
    pub fn accept(&mut self, event: Event) {
        debug!(event = event.message.name(), sequence = ?event.sequence, "Inbound event");

        match &event.message {
            InboundMessage::ConfigurationChanged(status) => {
                let version = self.configuration.record(event.sequence, status.clone());
                debug!(version, pending = status.is_pending(), "Recorded configuration");
            }
            InboundMessage::IdentityChanged(status) => {
                let version = self.identity.record(event.sequence, status.clone());
                debug!(version, pending = status.is_pending(), "Recorded identity");
            }
            _ => {}
        }

        self.backlog.push_back(event);
        self.drain_backlog();
    }

    /// Number of events waiting on upstream snapshots.
    pub fn blocked(&self) -> usize {
        self.backlog.len()
    }

    fn drain_backlog(&mut self) {
        while let Some(event) = self.backlog.front() {
            if !self.is_ready(event) {
                debug!(
                    event = event.message.name(),
                    sequence = ?event.sequence,
                    blocked = self.backlog.len(),
                    "Waiting for upstream state"
                );
                break;
            }
            if let Some(event) = self.backlog.pop_front() {
                self.dispatch(event);
            }
        }
    }

    fn is_ready(&self, event: &Event) -> bool {
        match &event.message {
            InboundMessage::ConfigurationChanged(_) | InboundMessage::IdentityChanged(_) => true,
            InboundMessage::SubmitSignal { .. } | InboundMessage::LifecycleSignal { .. } => {
                !self.configuration.resolve(event.sequence).is_pending()
                    && !self.identity.resolve(event.sequence).is_pending()
            }
            InboundMessage::GetIdentifiers
            | InboundMessage::SetIdentifiers { .. }
            | InboundMessage::GetVisitorProfile
            | InboundMessage::Reset
            | InboundMessage::IdentityReset
            | InboundMessage::SecondaryServiceResponse { .. } => {
                self.configuration.resolve(event.sequence).is_set()
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        let route = event.message.route();
        match self.handlers.get(&route).copied() {
            Some(handler) => handler(self, &event),
            None => warn!(event = event.message.name(), ?route, "No handler registered"),
        }
    }

    /// Configuration in effect for `version`.
    pub(crate) fn configuration_at(&self, version: Option<u64>) -> Option<ConfigurationSnapshot> {
        self.configuration.resolve(version).into_set()
    }

    /// Reply to the caller waiting on `pair_id`, if any.
    pub(crate) fn reply_direct(&self, pair_id: Option<&str>, message: OutboundMessage) {
        if let Some(pair_id) = pair_id {
            self.replies.resolve(pair_id, message);
        }
    }

    /// Reply to the waiting caller, or broadcast when the request was
    /// unpaired.
    pub(crate) fn respond(&self, pair_id: Option<&str>, message: OutboundMessage) {
        match pair_id {
            Some(pair_id) => {
                self.replies.resolve(pair_id, message);
            }
            None => self.broadcast(message),
        }
    }

    pub(crate) fn broadcast(&self, message: OutboundMessage) {
        if self.outbound.send(message).is_err() {
            debug!("No subscribers for broadcast");
        }
    }

    pub(crate) fn publish_state(&mut self, version: Option<u64>) -> u64 {
        let state = self.visitor.snapshot();
        self.publisher.publish(version, state)
    }

    fn handle_completion(&mut self, completion: HitCompletion) {
        let HitCompletion { hit, body } = completion;
        let pair_id = hit.event.pair_id.as_deref();

        if self.last_reset.is_some_and(|reset| hit.created_at <= reset) {
            debug!(hit_id = %hit.id, "Ignoring response to hit created before reset");
            self.reply_direct(pair_id, profile_reply(Profile::new(), pair_id));
            self.publish_state(hit.event.sequence);
            return;
        }

        let response = ServerResponse::parse(body.as_deref());
        self.apply_response(response, hit.event.sequence, pair_id);
    }

    /// Fold a server response into visitor state and notify everyone who
    /// cares about it.
    pub(crate) fn apply_response(
        &mut self,
        response: ServerResponse,
        version: Option<u64>,
        pair_id: Option<&str>,
    ) {
        let ServerResponse {
            uuid,
            profile,
            forward_urls,
        } = response;

        if !forward_urls.is_empty() {
            let timeout = self
                .configuration
                .latest_set()
                .map(|c| c.timeout_or(DEFAULT_TIMEOUT_SECS))
                .unwrap_or(DEFAULT_TIMEOUT_SECS);
            debug!(count = forward_urls.len(), "Firing forward urls");
            for url in forward_urls {
                fire_and_forget(self.network.clone(), NetworkRequest::get(url, timeout));
            }
        }

        if uuid.is_some() {
            self.visitor.set_uuid(uuid);
        }
        self.visitor.merge_visitor_profile(&profile);

        self.reply_direct(pair_id, profile_reply(profile.clone(), pair_id));
        if !profile.is_empty() {
            self.broadcast(profile_reply(profile, None));
        }
        self.publish_state(version);
    }

    /// Apply a resolved configuration's consent.
    pub(crate) fn apply_consent(
        &mut self,
        configuration: &ConfigurationSnapshot,
        version: Option<u64>,
    ) {
        let previous = self.visitor.consent();
        let consent = configuration.consent;
        if previous != consent {
            info!(from = %previous, to = %consent, "Consent changed");
        }

        match consent {
            ConsentStatus::OptIn => {
                self.visitor.set_consent(consent);
                self.queue.resume();
            }
            ConsentStatus::Unknown => {
                self.visitor.set_consent(consent);
                self.queue.suspend();
            }
            ConsentStatus::OptOut => {
                self.queue.suspend();
                let dropped = self.queue.purge();

                let sent = match (self.visitor.uuid(), configuration.server()) {
                    (Some(uuid), Some(server)) => {
                        let url = signal_url_builder::build_opt_out_url(server, &uuid);
                        let timeout = configuration.timeout_or(DEFAULT_TIMEOUT_SECS);
                        info!("Sending opt-out notification");
                        fire_and_forget(self.network.clone(), NetworkRequest::get(url, timeout));
                        true
                    }
                    _ => false,
                };

                self.visitor.set_consent(consent);
                self.settle_dropped(dropped);
                self.broadcast(OutboundMessage::OptOutHitSent { sent });
                self.publish_state(version);
            }
        }
    }

    /// Forget the visitor. `purge_queue` also drops queued hits.
    pub(crate) fn reset(&mut self, version: Option<u64>, purge_queue: bool) {
        let dropped = if purge_queue {
            self.queue.purge()
        } else {
            Vec::new()
        };
        self.visitor.clear_identifiers();
        self.last_reset = Some(Utc::now());
        info!(purge_queue, "Visitor reset");
        self.settle_dropped(dropped);
        self.publish_state(version);
    }

    /// Answer callers of purged hits with an empty profile and resolve the
    /// pending shared state each of them reserved.
    fn settle_dropped(&mut self, dropped: Vec<SignalHit>) {
        for hit in dropped {
            let reserved = hit.event.sequence.filter(|version| {
                matches!(self.publisher.get(*version), Some(SharedStateStatus::Pending))
            });
            if let Some(version) = reserved {
                self.publish_state(Some(version));
            }

            let pair_id = hit.event.pair_id.as_deref();
            self.reply_direct(pair_id, profile_reply(Profile::new(), pair_id));
        }
    }
}

pub(crate) fn profile_reply(profile: Profile, pair_id: Option<&str>) -> OutboundMessage {
    OutboundMessage::ProfileResponse {
        profile,
        correlation_id: pair_id.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use audience_outbox::NetworkResponse;
    use audience_protocol_types::{SharedStateStatus, Traits};

    struct NullNetwork;

    #[async_trait]
    impl NetworkService for NullNetwork {
        async fn send(&self, _request: NetworkRequest) -> Option<NetworkResponse> {
            None
        }
    }

    fn orchestrator() -> (Orchestrator, broadcast::Receiver<OutboundMessage>) {
        let (outbound, rx) = broadcast::channel(64);
        let orchestrator = Orchestrator::new(
            VisitorState::new(None),
            HitQueue::new(None),
            Arc::new(NullNetwork),
            Arc::new(ReplyRegistry::new()),
            outbound,
            None,
        );
        (orchestrator, rx)
    }

    fn configuration(consent: ConsentStatus) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            server: Some("x.com".to_string()),
            consent,
            ..Default::default()
        }
    }

    fn event(message: InboundMessage, sequence: u64) -> Event {
        Event::new(message).with_sequence(sequence)
    }

    #[tokio::test]
    async fn test_head_of_line_blocking_preserves_order() {
        let (mut orchestrator, _rx) = orchestrator();
        let replies = orchestrator.replies.clone();

        orchestrator.accept(event(
            InboundMessage::ConfigurationChanged(SharedStateStatus::Pending),
            1,
        ));
        let first = replies.register("first");
        orchestrator.accept(event(InboundMessage::GetVisitorProfile, 2).with_pair_id("first"));
        orchestrator.accept(event(
            InboundMessage::SetIdentifiers {
                dpid: "d".to_string(),
                dpuuid: "du".to_string(),
            },
            3,
        ));
        assert_eq!(orchestrator.blocked(), 2);

        orchestrator.accept(event(
            InboundMessage::ConfigurationChanged(SharedStateStatus::Set(configuration(
                ConsentStatus::OptIn,
            ))),
            1,
        ));
        assert_eq!(orchestrator.blocked(), 0);
        assert!(first.await.is_ok());
        assert_eq!(orchestrator.visitor.dpid().as_deref(), Some("d"));
        assert_eq!(orchestrator.queue.mode(), audience_outbox::QueueMode::Active);
    }

    #[tokio::test]
    async fn test_submit_without_configuration_replies_empty() {
        let (mut orchestrator, _rx) = orchestrator();
        let rx = orchestrator.replies.register("p");

        orchestrator.accept(
            event(
                InboundMessage::SubmitSignal {
                    traits: Traits::new(),
                },
                1,
            )
            .with_pair_id("p"),
        );

        assert_eq!(orchestrator.blocked(), 0);
        assert_eq!(rx.await.unwrap(), profile_reply(Profile::new(), Some("p")));
        assert!(orchestrator.queue.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_consent_queues_unpaired_hit() {
        let (mut orchestrator, _rx) = orchestrator();
        orchestrator.accept(event(
            InboundMessage::ConfigurationChanged(SharedStateStatus::Set(configuration(
                ConsentStatus::Unknown,
            ))),
            1,
        ));
        let rx = orchestrator.replies.register("p");
        let mut traits = Traits::new();
        traits.insert("k".to_string(), "v".to_string());
        orchestrator.accept(event(InboundMessage::SubmitSignal { traits }, 2).with_pair_id("p"));

        assert!(rx.await.is_ok());
        assert_eq!(orchestrator.queue.len(), 1);
        assert_eq!(orchestrator.queue.mode(), audience_outbox::QueueMode::Suspended);
    }

    #[tokio::test]
    async fn test_stale_completion_changes_nothing() {
        let (mut orchestrator, _rx) = orchestrator();
        orchestrator.accept(event(
            InboundMessage::ConfigurationChanged(SharedStateStatus::Set(configuration(
                ConsentStatus::OptIn,
            ))),
            1,
        ));

        let hit = audience_outbox::SignalHit::new(
            event(
                InboundMessage::SubmitSignal {
                    traits: Traits::new(),
                },
                2,
            ),
            "https://x.com/event?".to_string(),
            2,
        );
        orchestrator.accept(event(InboundMessage::Reset, 3));

        orchestrator.handle_completion(HitCompletion {
            hit,
            body: Some(r#"{"uuid":"U","stuff":[{"cn":"seg","cv":"1"}]}"#.to_string()),
        });
        assert_eq!(orchestrator.visitor.uuid(), None);
        assert!(orchestrator.visitor.visitor_profile().is_empty());
    }
}
