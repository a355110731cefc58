//! Caller-facing handle to a running orchestrator.

use crate::orchestrator::Orchestrator;
use crate::replies::ReplyRegistry;
use crate::{AudienceError, AudienceResult};
use audience_config_and_utils::{Config, Paths};
use audience_database::Database;
use audience_outbox::{
    DeliveryProcessor, HitQueue, HitStore, NetworkService, ReqwestNetworkService,
    DEFAULT_RETRY_INTERVAL,
};
use audience_protocol_types::{
    ConfigurationSnapshot, DataProviderIds, Event, IdentitySnapshot, InboundMessage,
    OutboundMessage, Profile, SharedStateStatus, Traits,
};
use audience_storage::DataStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use visitor_state::VisitorState;

/// Default wait for a direct reply.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_millis(5000);

const OUTBOUND_CAPACITY: usize = 256;

/// Everything needed to start an orchestrator.
pub struct ClientOptions {
    pub network: Arc<dyn NetworkService>,
    pub data_store: Option<Arc<dyn DataStore>>,
    pub hit_store: Option<Arc<dyn HitStore>>,
    pub platform: Option<String>,
    pub retry_interval: Duration,
    pub callback_timeout: Duration,
}

impl ClientOptions {
    /// In-memory options with default timings.
    pub fn new(network: Arc<dyn NetworkService>) -> Self {
        Self {
            network,
            data_store: None,
            hit_store: None,
            platform: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    /// Options with timings and platform taken from the service config.
    pub fn from_config(config: &Config, network: Arc<dyn NetworkService>) -> Self {
        Self {
            platform: Some(config.platform_name().to_string()),
            retry_interval: config.retry_interval(),
            callback_timeout: config.callback_timeout(),
            ..Self::new(network)
        }
    }

    /// Production options: SQLite under `paths` and a reqwest network
    /// service.
    pub fn open(config: &Config, paths: &Paths) -> AudienceResult<Self> {
        paths.ensure_dirs()?;
        let database = Arc::new(Database::open(&paths.database_file())?);
        let network = Arc::new(ReqwestNetworkService::new()?);
        Ok(Self::from_config(config, network).with_database(database))
    }

    /// Persist visitor state and hits in `database`.
    pub fn with_database(mut self, database: Arc<Database>) -> Self {
        self.data_store = Some(database.clone());
        self.hit_store = Some(database);
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_callback_timeout(mut self, callback_timeout: Duration) -> Self {
        self.callback_timeout = callback_timeout;
        self
    }
}

/// Cloneable handle for talking to the orchestrator.
///
/// Every call is an event on the orchestrator's inbound channel. Calls that
/// expect an answer wait for a direct reply correlated by a fresh pairing
/// id, up to the callback timeout.
#[derive(Clone)]
pub struct AudienceClient {
    inbound: mpsc::UnboundedSender<Event>,
    replies: Arc<ReplyRegistry>,
    outbound: broadcast::Sender<OutboundMessage>,
    sequence: Arc<AtomicU64>,
    queue: Arc<HitQueue>,
    shutdown: Arc<watch::Sender<bool>>,
    callback_timeout: Duration,
}

impl AudienceClient {
    /// Recover persisted hits and spawn the delivery worker and the
    /// orchestrator on the current runtime.
    pub fn start(options: ClientOptions) -> Self {
        let ClientOptions {
            network,
            data_store,
            hit_store,
            platform,
            retry_interval,
            callback_timeout,
        } = options;

        let queue = HitQueue::new(hit_store);
        let recovered = queue.recover();

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        queue.spawn_worker(
            DeliveryProcessor::new(network.clone()),
            retry_interval,
            completions_tx,
        );

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let replies = Arc::new(ReplyRegistry::new());

        let orchestrator = Orchestrator::new(
            VisitorState::new(data_store),
            queue.clone(),
            network,
            replies.clone(),
            outbound.clone(),
            platform,
        );
        tokio::spawn(orchestrator.run(inbound_rx, completions_rx, shutdown_rx));

        info!(recovered, "Audience client started");
        Self {
            inbound: inbound_tx,
            replies,
            outbound,
            // version 0 is the initial empty shared state
            sequence: Arc::new(AtomicU64::new(1)),
            queue,
            shutdown: Arc::new(shutdown_tx),
            callback_timeout,
        }
    }

    /// Receive broadcasts and shared-state publications.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }

    /// Hits waiting for delivery.
    pub fn pending_hits(&self) -> usize {
        self.queue.len()
    }

    /// Submit traits and wait for the returned profile delta.
    ///
    /// Resolves with an empty profile when the signal cannot be sent now.
    pub async fn signal_with_data(&self, traits: Traits) -> AudienceResult<Profile> {
        let reply = self.request(InboundMessage::SubmitSignal { traits }).await?;
        Ok(into_profile(reply))
    }

    pub async fn get_visitor_profile(&self) -> AudienceResult<Profile> {
        let reply = self.request(InboundMessage::GetVisitorProfile).await?;
        Ok(into_profile(reply))
    }

    pub async fn get_identifiers(&self) -> AudienceResult<DataProviderIds> {
        match self.request(InboundMessage::GetIdentifiers).await? {
            OutboundMessage::IdentityResponse { dpid, dpuuid, .. } => {
                Ok(DataProviderIds { dpid, dpuuid })
            }
            other => {
                warn!(?other, "Unexpected reply to identifier request");
                Ok(DataProviderIds::default())
            }
        }
    }

    pub fn set_data_provider_ids(
        &self,
        dpid: impl Into<String>,
        dpuuid: impl Into<String>,
    ) -> AudienceResult<u64> {
        self.send(InboundMessage::SetIdentifiers {
            dpid: dpid.into(),
            dpuuid: dpuuid.into(),
        })
    }

    /// Clear the visitor and drop queued hits.
    pub fn reset(&self) -> AudienceResult<u64> {
        self.send(InboundMessage::Reset)
    }

    /// Clear the visitor but keep queued hits.
    pub fn identity_reset(&self) -> AudienceResult<u64> {
        self.send(InboundMessage::IdentityReset)
    }

    /// Publish a configuration status at a new version, returned.
    pub fn configuration_changed(
        &self,
        status: SharedStateStatus<ConfigurationSnapshot>,
    ) -> AudienceResult<u64> {
        self.send(InboundMessage::ConfigurationChanged(status))
    }

    /// Deliver the configuration for a version previously published as
    /// pending.
    pub fn resolve_configuration(
        &self,
        version: u64,
        configuration: ConfigurationSnapshot,
    ) -> AudienceResult<()> {
        self.send_event(
            Event::new(InboundMessage::ConfigurationChanged(SharedStateStatus::Set(
                configuration,
            )))
            .with_sequence(version),
        )
    }

    /// Publish an identity status at a new version, returned.
    pub fn identity_changed(
        &self,
        status: SharedStateStatus<IdentitySnapshot>,
    ) -> AudienceResult<u64> {
        self.send(InboundMessage::IdentityChanged(status))
    }

    /// Deliver the identity for a version previously published as pending.
    pub fn resolve_identity(&self, version: u64, identity: IdentitySnapshot) -> AudienceResult<()> {
        self.send_event(
            Event::new(InboundMessage::IdentityChanged(SharedStateStatus::Set(identity)))
                .with_sequence(version),
        )
    }

    pub fn lifecycle_signal(&self, context_data: BTreeMap<String, String>) -> AudienceResult<u64> {
        self.send(InboundMessage::LifecycleSignal { context_data })
    }

    pub fn secondary_service_response(&self, body: impl Into<String>) -> AudienceResult<u64> {
        self.send(InboundMessage::SecondaryServiceResponse { body: body.into() })
    }

    /// Stop the orchestrator and the delivery worker. Waiting callers get
    /// [`AudienceError::Shutdown`].
    pub fn shutdown(&self) {
        info!("Shutting down audience client");
        self.shutdown.send_replace(true);
        self.queue.shutdown();
    }

    /// Send `message` at the next version and return that version.
    pub fn send(&self, message: InboundMessage) -> AudienceResult<u64> {
        let sequence = self.next_sequence();
        self.send_event(Event::new(message).with_sequence(sequence))?;
        Ok(sequence)
    }

    /// Send `message` and wait for the reply paired with it.
    pub async fn request(&self, message: InboundMessage) -> AudienceResult<OutboundMessage> {
        let name = message.name();
        let pair_id = uuid::Uuid::new_v4().to_string();
        let rx = self.replies.register(&pair_id);

        let event = Event::new(message)
            .with_sequence(self.next_sequence())
            .with_pair_id(pair_id.clone());
        if let Err(e) = self.send_event(event) {
            self.replies.evict(&pair_id);
            return Err(e);
        }

        match tokio::time::timeout(self.callback_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AudienceError::Shutdown),
            Err(_) => {
                self.replies.evict(&pair_id);
                warn!(request = name, pair_id = %pair_id, "Timed out waiting for reply");
                Err(AudienceError::CallbackTimeout {
                    request: name,
                    timeout: self.callback_timeout,
                })
            }
        }
    }

    fn send_event(&self, event: Event) -> AudienceResult<()> {
        debug!(event = event.message.name(), sequence = ?event.sequence, "Sending event");
        self.inbound
            .send(event)
            .map_err(|_| AudienceError::Shutdown)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }
}

fn into_profile(reply: OutboundMessage) -> Profile {
    match reply {
        OutboundMessage::ProfileResponse { profile, .. }
        | OutboundMessage::IdentityResponse { profile, .. } => profile,
        other => {
            warn!(?other, "Unexpected reply to profile request");
            Profile::new()
        }
    }
}
