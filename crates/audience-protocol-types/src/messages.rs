//! Inbound and outbound messages.

use crate::{
    AudienceSharedState, ConfigurationSnapshot, IdentitySnapshot, Profile, SharedStateStatus,
    Traits,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Producer category of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Audience,
    Configuration,
    Identity,
    Lifecycle,
    Analytics,
}

/// Intent of an inbound message within its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    RequestContent,
    RequestProfile,
    RequestIdentity,
    UpdateIdentity,
    RequestReset,
    ResponseContent,
    SharedStateUpdate,
}

/// Messages the pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Send traits to the audience server; replies with the returned profile.
    SubmitSignal { traits: Traits },
    /// Replies with the data-provider id pair and profile.
    GetIdentifiers,
    /// Store the data-provider id pair.
    SetIdentifiers { dpid: String, dpuuid: String },
    /// Replies with the stored profile.
    GetVisitorProfile,
    /// Clear visitor state and drop queued hits.
    Reset,
    /// Clear visitor state, keep queued hits.
    IdentityReset,
    ConfigurationChanged(SharedStateStatus<ConfigurationSnapshot>),
    IdentityChanged(SharedStateStatus<IdentitySnapshot>),
    /// Lifecycle metrics, submitted as a signal when not forwarded elsewhere.
    LifecycleSignal { context_data: BTreeMap<String, String> },
    /// Audience server payload relayed by the secondary analytics service.
    SecondaryServiceResponse { body: String },
}

impl InboundMessage {
    /// Dispatch key of this message.
    pub fn route(&self) -> (EventType, EventSource) {
        match self {
            InboundMessage::SubmitSignal { .. } => (EventType::Audience, EventSource::RequestContent),
            InboundMessage::GetVisitorProfile => (EventType::Audience, EventSource::RequestProfile),
            InboundMessage::GetIdentifiers => (EventType::Audience, EventSource::RequestIdentity),
            InboundMessage::SetIdentifiers { .. } => {
                (EventType::Audience, EventSource::UpdateIdentity)
            }
            InboundMessage::Reset => (EventType::Audience, EventSource::RequestReset),
            InboundMessage::IdentityReset => (EventType::Identity, EventSource::RequestReset),
            InboundMessage::ConfigurationChanged(_) => {
                (EventType::Configuration, EventSource::ResponseContent)
            }
            InboundMessage::IdentityChanged(_) => {
                (EventType::Identity, EventSource::SharedStateUpdate)
            }
            InboundMessage::LifecycleSignal { .. } => {
                (EventType::Lifecycle, EventSource::ResponseContent)
            }
            InboundMessage::SecondaryServiceResponse { .. } => {
                (EventType::Analytics, EventSource::ResponseContent)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundMessage::SubmitSignal { .. } => "submit_signal",
            InboundMessage::GetIdentifiers => "get_identifiers",
            InboundMessage::SetIdentifiers { .. } => "set_identifiers",
            InboundMessage::GetVisitorProfile => "get_visitor_profile",
            InboundMessage::Reset => "reset",
            InboundMessage::IdentityReset => "identity_reset",
            InboundMessage::ConfigurationChanged(_) => "configuration_changed",
            InboundMessage::IdentityChanged(_) => "identity_changed",
            InboundMessage::LifecycleSignal { .. } => "lifecycle_signal",
            InboundMessage::SecondaryServiceResponse { .. } => "secondary_service_response",
        }
    }
}

/// Envelope around an inbound message.
///
/// `sequence` is the bus-assigned version used for snapshot lookups and
/// shared-state publication. `sequence` and `pair_id` are session-scoped:
/// both are `None` for events reloaded after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub sequence: Option<u64>,
    pub pair_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: InboundMessage,
}

impl Event {
    pub fn new(message: InboundMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: None,
            pair_id: None,
            timestamp: Utc::now(),
            message,
        }
    }

    pub fn with_pair_id(mut self, pair_id: impl Into<String>) -> Self {
        self.pair_id = Some(pair_id.into());
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// Messages the pipeline produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Visitor profile; a direct reply when `correlation_id` is set,
    /// otherwise a broadcast.
    ProfileResponse {
        profile: Profile,
        correlation_id: Option<String>,
    },
    IdentityResponse {
        profile: Profile,
        dpid: Option<String>,
        dpuuid: Option<String>,
        correlation_id: Option<String>,
    },
    /// Reports whether an opt-out notification request went out.
    OptOutHitSent { sent: bool },
    SharedStateChanged {
        version: u64,
        state: SharedStateStatus<AudienceSharedState>,
    },
}

impl OutboundMessage {
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            OutboundMessage::ProfileResponse { correlation_id, .. }
            | OutboundMessage::IdentityResponse { correlation_id, .. } => {
                correlation_id.as_deref()
            }
            OutboundMessage::OptOutHitSent { .. } | OutboundMessage::SharedStateChanged { .. } => {
                None
            }
        }
    }
}
