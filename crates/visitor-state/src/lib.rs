//! Visitor state store.
//!
//! Holds the service-assigned uuid, the data-provider id pair, the segment
//! profile and the current consent. The uuid and profile are persisted
//! through a [`DataStore`]; the data-provider ids live in memory only.
//!
//! While consent is opted out every field stays empty: setters other than
//! clearing are ignored and getters do not hydrate from storage.
//!
//! Storage failures are logged and otherwise ignored, so the store keeps
//! working in memory when persistence is unavailable.

use audience_protocol_types::{AudienceSharedState, ConsentStatus, DataProviderIds, Profile};
use audience_storage::{DataStore, StorageKeys};
use std::sync::Arc;
use tracing::{debug, warn};

/// In-memory visitor state with write-through persistence.
pub struct VisitorState {
    store: Option<Arc<dyn DataStore>>,
    uuid: Option<String>,
    dpid: Option<String>,
    dpuuid: Option<String>,
    profile: Profile,
    consent: ConsentStatus,
}

impl VisitorState {
    /// Create an empty state with Unknown consent.
    ///
    /// Persisted values are loaded lazily on first read.
    pub fn new(store: Option<Arc<dyn DataStore>>) -> Self {
        Self {
            store,
            uuid: None,
            dpid: None,
            dpuuid: None,
            profile: Profile::new(),
            consent: ConsentStatus::Unknown,
        }
    }

    pub fn consent(&self) -> ConsentStatus {
        self.consent
    }

    fn opted_out(&self) -> bool {
        self.consent == ConsentStatus::OptOut
    }

    pub fn uuid(&mut self) -> Option<String> {
        if self.uuid.is_none() && !self.opted_out() {
            if let Some(store) = &self.store {
                match store.get(StorageKeys::VISITOR_UUID) {
                    Ok(value) => self.uuid = value.filter(|v| !v.is_empty()),
                    Err(e) => warn!(error = %e, "Failed to load visitor uuid"),
                }
            }
        }
        self.uuid.clone()
    }

    pub fn set_uuid(&mut self, uuid: Option<String>) {
        let uuid = uuid.filter(|v| !v.is_empty());
        if uuid.is_some() && self.opted_out() {
            debug!("Ignoring uuid update while opted out");
            return;
        }

        if let Some(store) = &self.store {
            let result = match &uuid {
                Some(value) => store.set(StorageKeys::VISITOR_UUID, value),
                None => store.delete(StorageKeys::VISITOR_UUID).map(|_| ()),
            };
            if let Err(e) = result {
                warn!(error = %e, "Failed to persist visitor uuid");
            }
        }
        self.uuid = uuid;
    }

    pub fn dpid(&self) -> Option<String> {
        self.dpid.clone()
    }

    pub fn set_dpid(&mut self, dpid: Option<String>) {
        let dpid = dpid.filter(|v| !v.is_empty());
        if dpid.is_some() && self.opted_out() {
            debug!("Ignoring dpid update while opted out");
            return;
        }
        self.dpid = dpid;
    }

    pub fn dpuuid(&self) -> Option<String> {
        self.dpuuid.clone()
    }

    pub fn set_dpuuid(&mut self, dpuuid: Option<String>) {
        let dpuuid = dpuuid.filter(|v| !v.is_empty());
        if dpuuid.is_some() && self.opted_out() {
            debug!("Ignoring dpuuid update while opted out");
            return;
        }
        self.dpuuid = dpuuid;
    }

    pub fn data_provider_ids(&self) -> DataProviderIds {
        DataProviderIds {
            dpid: self.dpid(),
            dpuuid: self.dpuuid(),
        }
    }

    pub fn visitor_profile(&mut self) -> Profile {
        if self.profile.is_empty() && !self.opted_out() {
            if let Some(store) = &self.store {
                match store.get_map(StorageKeys::VISITOR_PROFILE) {
                    Ok(value) => self.profile = value.unwrap_or_default(),
                    Err(e) => warn!(error = %e, "Failed to load visitor profile"),
                }
            }
        }
        self.profile.clone()
    }

    pub fn set_visitor_profile(&mut self, profile: Profile) {
        if !profile.is_empty() && self.opted_out() {
            debug!("Ignoring profile update while opted out");
            return;
        }

        if let Some(store) = &self.store {
            let result = if profile.is_empty() {
                store.delete(StorageKeys::VISITOR_PROFILE).map(|_| ())
            } else {
                store.set_map(StorageKeys::VISITOR_PROFILE, &profile)
            };
            if let Err(e) = result {
                warn!(error = %e, "Failed to persist visitor profile");
            }
        }
        self.profile = profile;
    }

    /// Merge `delta` over the current profile. Later keys win.
    pub fn merge_visitor_profile(&mut self, delta: &Profile) {
        if delta.is_empty() {
            return;
        }
        let mut profile = self.visitor_profile();
        profile.extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.set_visitor_profile(profile);
    }

    /// Public projection; empty while opted out.
    pub fn snapshot(&mut self) -> AudienceSharedState {
        if self.opted_out() {
            return AudienceSharedState::default();
        }
        AudienceSharedState {
            uuid: self.uuid(),
            dpid: self.dpid(),
            dpuuid: self.dpuuid(),
            profile: self.visitor_profile(),
        }
    }

    /// Empty every field and remove the persisted values.
    pub fn clear_identifiers(&mut self) {
        self.set_uuid(None);
        self.set_dpid(None);
        self.set_dpuuid(None);
        self.set_visitor_profile(Profile::new());
        debug!("Cleared visitor identifiers");
    }

    /// Record a new consent. Opting out clears every identifier.
    pub fn set_consent(&mut self, consent: ConsentStatus) {
        self.consent = consent;
        if consent == ConsentStatus::OptOut {
            self.clear_identifiers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audience_database::Database;
    use audience_storage::{MemoryDataStore, StorageError, StorageResult};

    struct UnavailableStore;

    impl DataStore for UnavailableStore {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable)
        }

        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Unavailable)
        }

        fn delete(&self, _key: &str) -> StorageResult<bool> {
            Err(StorageError::Unavailable)
        }
    }

    fn profile(pairs: &[(&str, &str)]) -> Profile {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_setters_persist_and_getters_hydrate() {
        let store: Arc<dyn DataStore> = Arc::new(MemoryDataStore::new());

        let mut state = VisitorState::new(Some(store.clone()));
        state.set_consent(ConsentStatus::OptIn);
        state.set_uuid(Some("U".to_string()));
        state.set_visitor_profile(profile(&[("seg", "1")]));

        let mut reloaded = VisitorState::new(Some(store));
        assert_eq!(reloaded.uuid().as_deref(), Some("U"));
        assert_eq!(reloaded.visitor_profile(), profile(&[("seg", "1")]));
    }

    #[test]
    fn test_data_provider_ids_are_memory_only() {
        let store = Arc::new(MemoryDataStore::new());
        let mut state = VisitorState::new(Some(store.clone()));
        state.set_dpid(Some("d".to_string()));
        state.set_dpuuid(Some("du".to_string()));

        assert_eq!(state.data_provider_ids().dpid.as_deref(), Some("d"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_opt_out_clears_everything() {
        let store: Arc<dyn DataStore> = Arc::new(MemoryDataStore::new());
        let mut state = VisitorState::new(Some(store.clone()));
        state.set_uuid(Some("U".to_string()));
        state.set_dpid(Some("d".to_string()));
        state.set_dpuuid(Some("du".to_string()));
        state.set_visitor_profile(profile(&[("seg", "1")]));

        state.set_consent(ConsentStatus::OptOut);

        assert_eq!(state.uuid(), None);
        assert_eq!(state.dpid(), None);
        assert_eq!(state.dpuuid(), None);
        assert!(state.visitor_profile().is_empty());
        assert!(state.snapshot().is_empty());
        assert!(!store.has(StorageKeys::VISITOR_UUID).unwrap());
        assert!(!store.has(StorageKeys::VISITOR_PROFILE).unwrap());
    }

    #[test]
    fn test_setters_are_ignored_while_opted_out() {
        let store: Arc<dyn DataStore> = Arc::new(MemoryDataStore::new());
        let mut state = VisitorState::new(Some(store.clone()));
        state.set_consent(ConsentStatus::OptOut);

        state.set_uuid(Some("U".to_string()));
        state.set_dpid(Some("d".to_string()));
        state.set_dpuuid(Some("du".to_string()));
        state.merge_visitor_profile(&profile(&[("seg", "1")]));

        assert!(state.snapshot().is_empty());
        assert_eq!(state.uuid(), None);
        assert!(!store.has(StorageKeys::VISITOR_UUID).unwrap());

        state.set_consent(ConsentStatus::OptIn);
        state.set_uuid(Some("U".to_string()));
        assert_eq!(state.snapshot().uuid.as_deref(), Some("U"));
    }

    #[test]
    fn test_opted_out_getters_do_not_hydrate() {
        let store: Arc<dyn DataStore> = Arc::new(MemoryDataStore::new());
        store.set(StorageKeys::VISITOR_UUID, "stale").unwrap();

        let mut state = VisitorState::new(Some(store));
        state.consent = ConsentStatus::OptOut;
        assert_eq!(state.uuid(), None);
    }

    #[test]
    fn test_merge_profile_is_idempotent() {
        let mut state = VisitorState::new(Some(Arc::new(MemoryDataStore::new())));
        state.set_visitor_profile(profile(&[("a", "1")]));

        let delta = profile(&[("b", "2"), ("a", "3")]);
        state.merge_visitor_profile(&delta);
        let first = state.visitor_profile();
        state.merge_visitor_profile(&delta);

        assert_eq!(first, profile(&[("a", "3"), ("b", "2")]));
        assert_eq!(state.visitor_profile(), first);
    }

    #[test]
    fn test_unavailable_storage_degrades_to_memory() {
        let mut state = VisitorState::new(Some(Arc::new(UnavailableStore)));
        state.set_uuid(Some("U".to_string()));
        state.set_visitor_profile(profile(&[("seg", "1")]));

        assert_eq!(state.uuid().as_deref(), Some("U"));
        assert_eq!(state.visitor_profile(), profile(&[("seg", "1")]));

        state.clear_identifiers();
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn test_without_store() {
        let mut state = VisitorState::new(None);
        state.set_uuid(Some("U".to_string()));
        assert_eq!(state.snapshot().uuid.as_deref(), Some("U"));
    }

    #[test]
    fn test_database_backed_state() {
        let db: Arc<dyn DataStore> = Arc::new(Database::open_in_memory().unwrap());
        let mut state = VisitorState::new(Some(db.clone()));
        state.set_uuid(Some("U".to_string()));
        state.merge_visitor_profile(&profile(&[("seg", "1")]));

        assert_eq!(db.get(StorageKeys::VISITOR_UUID).unwrap().as_deref(), Some("U"));
        assert_eq!(
            db.get_map(StorageKeys::VISITOR_PROFILE).unwrap(),
            Some(profile(&[("seg", "1")]))
        );
    }
}
