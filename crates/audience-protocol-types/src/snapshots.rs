//! Configuration and identity snapshots.
//!
//! Both arrive from other components as flat JSON maps. The `from_map`
//! constructors accept that wire shape and ignore anything they do not
//! recognize.

use crate::ConsentStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const CONFIG_SERVER: &str = "audience.server";
const CONFIG_TIMEOUT: &str = "audience.timeout";
const CONFIG_ORG_ID: &str = "experienceCloud.org";
const CONFIG_PRIVACY: &str = "global.privacy";
const CONFIG_FORWARDING: &str = "analytics.aamForwardingEnabled";

const IDENTITY_MID: &str = "mid";
const IDENTITY_BLOB: &str = "blob";
const IDENTITY_LOCATION_HINT: &str = "locationhint";
const IDENTITY_VISITOR_IDS: &str = "visitoridslist";

const VISITOR_ID_TYPE: &str = "ID_TYPE";
const VISITOR_ID: &str = "ID";
const VISITOR_ID_STATE: &str = "STATE";

/// Remote endpoint configuration relevant to signal delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    pub server: Option<String>,
    pub timeout_secs: Option<u64>,
    pub org_id: Option<String>,
    #[serde(default)]
    pub consent: ConsentStatus,
    #[serde(default)]
    pub forwarding_enabled: bool,
}

impl ConfigurationSnapshot {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            server: non_empty_str(map, CONFIG_SERVER),
            timeout_secs: map.get(CONFIG_TIMEOUT).and_then(Value::as_u64),
            org_id: non_empty_str(map, CONFIG_ORG_ID),
            consent: map
                .get(CONFIG_PRIVACY)
                .and_then(Value::as_str)
                .map(ConsentStatus::from_wire)
                .unwrap_or_default(),
            forwarding_enabled: map
                .get(CONFIG_FORWARDING)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Configured server, ignoring empty strings.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref().filter(|s| !s.is_empty())
    }

    pub fn timeout_or(&self, default_secs: u64) -> u64 {
        self.timeout_secs.unwrap_or(default_secs)
    }
}

/// Authentication state of a customer visitor id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationState {
    #[default]
    Unknown,
    Authenticated,
    LoggedOut,
}

impl AuthenticationState {
    /// Numeric code sent on the wire.
    pub fn code(&self) -> u8 {
        match self {
            AuthenticationState::Unknown => 0,
            AuthenticationState::Authenticated => 1,
            AuthenticationState::LoggedOut => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => AuthenticationState::Authenticated,
            2 => AuthenticationState::LoggedOut,
            _ => AuthenticationState::Unknown,
        }
    }
}

/// A customer-supplied visitor identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerVisitorId {
    pub id_type: String,
    pub id: Option<String>,
    #[serde(default)]
    pub auth_state: AuthenticationState,
}

/// Visitor identity published by the identity service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub mid: Option<String>,
    pub blob: Option<String>,
    pub location_hint: Option<String>,
    #[serde(default)]
    pub visitor_ids: Vec<CustomerVisitorId>,
}

impl IdentitySnapshot {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let visitor_ids = map
            .get(IDENTITY_VISITOR_IDS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(parse_visitor_id).collect())
            .unwrap_or_default();

        Self {
            mid: non_empty_str(map, IDENTITY_MID),
            blob: non_empty_str(map, IDENTITY_BLOB),
            location_hint: non_empty_str(map, IDENTITY_LOCATION_HINT),
            visitor_ids,
        }
    }
}

fn parse_visitor_id(value: &Value) -> Option<CustomerVisitorId> {
    let entry = value.as_object()?;
    let id_type = entry.get(VISITOR_ID_TYPE)?.as_str()?.to_string();
    Some(CustomerVisitorId {
        id_type,
        id: entry
            .get(VISITOR_ID)
            .and_then(Value::as_str)
            .map(str::to_string),
        auth_state: entry
            .get(VISITOR_ID_STATE)
            .and_then(Value::as_i64)
            .map(AuthenticationState::from_code)
            .unwrap_or_default(),
    })
}

fn non_empty_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The externally supplied data-provider id pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProviderIds {
    pub dpid: Option<String>,
    pub dpuuid: Option<String>,
}
