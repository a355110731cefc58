//! Message and snapshot types exchanged with the audience signal pipeline.
//!
//! Inbound messages arrive wrapped in an [`Event`] envelope carrying the
//! bus-assigned sequence number and an optional pairing id. Outbound
//! messages are either direct replies (correlated by pairing id) or
//! broadcasts.

mod consent;
mod lifecycle;
mod messages;
mod shared_state;
mod snapshots;

pub use consent::ConsentStatus;
pub use lifecycle::{remap_lifecycle_data, LIFECYCLE_KEY_MAP};
pub use messages::{Event, EventSource, EventType, InboundMessage, OutboundMessage};
pub use shared_state::{AudienceSharedState, SharedStateStatus};
pub use snapshots::{
    AuthenticationState, ConfigurationSnapshot, CustomerVisitorId, DataProviderIds,
    IdentitySnapshot,
};

use std::collections::BTreeMap;

/// Trait key/value pairs submitted with a signal.
pub type Traits = BTreeMap<String, String>;

/// Segment key/value pairs returned by the audience server.
pub type Profile = BTreeMap<String, String>;
