//! Storage key constants.

/// Keys under which visitor state is persisted.
pub struct StorageKeys;

impl StorageKeys {
    /// Service-assigned visitor id (string).
    pub const VISITOR_UUID: &'static str = "visitor.uuid";

    /// Visitor segment profile (JSON object of strings).
    pub const VISITOR_PROFILE: &'static str = "visitor.profile";
}
