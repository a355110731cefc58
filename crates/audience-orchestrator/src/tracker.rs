//! Versioned snapshots of upstream shared state.

use audience_protocol_types::SharedStateStatus;
use std::collections::BTreeMap;

/// What an upstream input looked like at a given version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Nothing was ever published.
    Absent,
    /// Known to exist but not delivered yet.
    Pending,
    Set(T),
}

impl<T> Resolution<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Resolution::Set(_))
    }

    pub fn into_set(self) -> Option<T> {
        match self {
            Resolution::Set(value) => Some(value),
            Resolution::Absent | Resolution::Pending => None,
        }
    }
}

/// History of one upstream input, keyed by version.
#[derive(Debug)]
pub struct SnapshotTracker<T> {
    history: BTreeMap<u64, SharedStateStatus<T>>,
}

impl<T: Clone> Default for SnapshotTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SnapshotTracker<T> {
    pub fn new() -> Self {
        Self {
            history: BTreeMap::new(),
        }
    }

    /// Record `status` at `version`, or right after the latest entry when
    /// the version is unknown. Returns the version used.
    pub fn record(&mut self, version: Option<u64>, status: SharedStateStatus<T>) -> u64 {
        let version = version.unwrap_or_else(|| self.next_version());
        self.history.insert(version, status);
        version
    }

    /// The latest entry at or before `version`. With no version, the latest
    /// entry overall. Versions older than the first entry see the first
    /// entry.
    pub fn resolve(&self, version: Option<u64>) -> Resolution<T> {
        let entry = match version {
            Some(version) => self
                .history
                .range(..=version)
                .next_back()
                .or_else(|| self.history.iter().next()),
            None => self.history.iter().next_back(),
        };
        match entry {
            None => Resolution::Absent,
            Some((_, SharedStateStatus::Pending)) => Resolution::Pending,
            Some((_, SharedStateStatus::Set(value))) => Resolution::Set(value.clone()),
        }
    }

    /// Latest snapshot that is actually set.
    pub fn latest_set(&self) -> Option<T> {
        self.history
            .values()
            .rev()
            .find_map(|status| status.as_set().cloned())
    }

    fn next_version(&self) -> u64 {
        self.history
            .keys()
            .next_back()
            .map(|v| v + 1)
            .unwrap_or(0)
    }
}
