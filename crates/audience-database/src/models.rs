//! Row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted hit in the `signal_hits` table.
///
/// `event_json` is the serialized triggering event. `event_sequence` and
/// `pair_id` mirror the event's session-scoped correlation fields so they
/// can be invalidated in place on startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalHitRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub timeout_secs: u64,
    pub event_sequence: Option<u64>,
    pub pair_id: Option<String>,
    pub event_json: String,
}
