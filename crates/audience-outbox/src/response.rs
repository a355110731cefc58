//! Audience server response payloads.

use audience_protocol_types::Profile;
use serde_json::Value;
use tracing::warn;

/// What a delivered hit told us.
///
/// Parsing never fails: anything missing or malformed yields empty fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerResponse {
    pub uuid: Option<String>,
    pub profile: Profile,
    pub forward_urls: Vec<String>,
}

impl ServerResponse {
    /// Parse a `{uuid, stuff: [{cn, cv}], dests: [{c}]}` payload.
    pub fn parse(body: Option<&str>) -> Self {
        let body = match body.map(str::trim).filter(|b| !b.is_empty()) {
            Some(body) => body,
            None => return Self::default(),
        };

        let root = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(root)) => root,
            Ok(_) => {
                warn!("Audience response is not a JSON object");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, "Malformed audience response");
                return Self::default();
            }
        };

        let uuid = root
            .get("uuid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let profile = root
            .get("stuff")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(parse_segment).collect())
            .unwrap_or_default();

        let forward_urls = root
            .get("dests")
            .and_then(Value::as_array)
            .map(|dests| {
                dests
                    .iter()
                    .filter_map(|d| d.get("c").and_then(Value::as_str))
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            uuid,
            profile,
            forward_urls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.profile.is_empty() && self.forward_urls.is_empty()
    }
}

fn parse_segment(entry: &Value) -> Option<(String, String)> {
    let name = entry.get("cn")?.as_str()?;
    if name.is_empty() {
        return None;
    }
    let value = match entry.get("cv")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some((name.to_string(), value))
}
