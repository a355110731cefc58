use crate::Profile;
use serde::{Deserialize, Serialize};

/// Either a placeholder for a state that is known to be coming, or the
/// state itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "state", rename_all = "snake_case")]
pub enum SharedStateStatus<T> {
    Pending,
    Set(T),
}

impl<T> SharedStateStatus<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, SharedStateStatus::Pending)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            SharedStateStatus::Set(value) => Some(value),
            SharedStateStatus::Pending => None,
        }
    }
}

/// Public projection of the visitor state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceSharedState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpuuid: Option<String>,
    #[serde(default, skip_serializing_if = "Profile::is_empty")]
    pub profile: Profile,
}

impl AudienceSharedState {
    pub fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.dpid.is_none() && self.dpuuid.is_none() && self.profile.is_empty()
    }
}
