//! Persisted hits.

use crate::OutboxResult;
use audience_database::{Database, SignalHitRecord};
use audience_protocol_types::Event;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// One unit of outbound work: the triggering event plus the request to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalHit {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub event: Event,
    pub url: String,
    pub timeout_secs: u64,
}

impl SignalHit {
    pub fn new(event: Event, url: String, timeout_secs: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            event,
            url,
            timeout_secs,
        }
    }

    pub fn to_record(&self) -> OutboxResult<SignalHitRecord> {
        Ok(SignalHitRecord {
            id: self.id.clone(),
            created_at: self.created_at,
            url: self.url.clone(),
            timeout_secs: self.timeout_secs,
            event_sequence: self.event.sequence,
            pair_id: self.event.pair_id.clone(),
            event_json: serde_json::to_string(&self.event)?,
        })
    }

    /// Rebuild a hit. The record's columns win over the serialized event
    /// for the session-scoped fields.
    pub fn from_record(record: SignalHitRecord) -> OutboxResult<Self> {
        let mut event: Event = serde_json::from_str(&record.event_json)?;
        event.sequence = record.event_sequence;
        event.pair_id = record.pair_id;
        Ok(Self {
            id: record.id,
            created_at: record.created_at,
            event,
            url: record.url,
            timeout_secs: record.timeout_secs,
        })
    }
}

/// Durable backing for the hit queue.
pub trait HitStore: Send + Sync {
    fn insert_hit(&self, hit: &SignalHit) -> OutboxResult<()>;

    fn delete_hit(&self, id: &str) -> OutboxResult<()>;

    fn delete_all_hits(&self) -> OutboxResult<usize>;

    /// Load every stored hit in insertion order, with pairing ids and
    /// sequence numbers invalidated.
    fn load_hits(&self) -> OutboxResult<Vec<SignalHit>>;
}

impl HitStore for Database {
    fn insert_hit(&self, hit: &SignalHit) -> OutboxResult<()> {
        self.insert_signal_hit(&hit.to_record()?)?;
        Ok(())
    }

    fn delete_hit(&self, id: &str) -> OutboxResult<()> {
        self.delete_signal_hit(id)?;
        Ok(())
    }

    fn delete_all_hits(&self) -> OutboxResult<usize> {
        Ok(self.delete_all_signal_hits()?)
    }

    fn load_hits(&self) -> OutboxResult<Vec<SignalHit>> {
        let invalidated = self.clear_signal_hit_pairing()?;
        if invalidated > 0 {
            info!(count = invalidated, "Invalidated pairing of reloaded hits");
        }

        let mut hits = Vec::new();
        for record in self.list_signal_hits()? {
            let id = record.id.clone();
            match SignalHit::from_record(record) {
                Ok(hit) => hits.push(hit),
                Err(e) => {
                    warn!(hit_id = %id, error = %e, "Dropping unreadable hit");
                    if let Err(e) = self.delete_signal_hit(&id) {
                        warn!(hit_id = %id, error = %e, "Failed to delete unreadable hit");
                    }
                }
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audience_protocol_types::{InboundMessage, Traits};

    fn signal_event() -> Event {
        let mut traits = Traits::new();
        traits.insert("k".to_string(), "v".to_string());
        Event::new(InboundMessage::SubmitSignal { traits })
            .with_pair_id("pair-1")
            .with_sequence(3)
    }

    #[test]
    fn test_record_conversion_keeps_event() {
        let hit = SignalHit::new(signal_event(), "https://s/event?c_k=v".to_string(), 2);
        let record = hit.to_record().unwrap();
        assert_eq!(record.event_sequence, Some(3));
        assert_eq!(record.pair_id.as_deref(), Some("pair-1"));

        assert_eq!(SignalHit::from_record(record).unwrap(), hit);
    }

    #[test]
    fn test_load_hits_invalidates_pairing() {
        let db = Database::open_in_memory().unwrap();
        let hit = SignalHit::new(signal_event(), "https://s/event?c_k=v".to_string(), 2);
        db.insert_hit(&hit).unwrap();

        let loaded = db.load_hits().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, hit.id);
        assert_eq!(loaded[0].event.pair_id, None);
        assert_eq!(loaded[0].event.sequence, None);
        assert_eq!(loaded[0].event.message, hit.event.message);
    }

    #[test]
    fn test_load_hits_drops_unreadable_rows() {
        let db = Database::open_in_memory().unwrap();
        let good = SignalHit::new(signal_event(), "https://s/event?".to_string(), 2);
        db.insert_hit(&good).unwrap();

        let mut broken = good.to_record().unwrap();
        broken.id = "broken".to_string();
        broken.event_json = "{not json".to_string();
        db.insert_signal_hit(&broken).unwrap();

        let loaded = db.load_hits().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(db.count_signal_hits().unwrap(), 1);
    }
}
