//! Audience server request URLs.
//!
//! [`build_signal_request`] is a pure function of its inputs: the same
//! traits, snapshots and visitor ids always produce byte-identical URLs.

use audience_protocol_types::{
    ConfigurationSnapshot, CustomerVisitorId, IdentitySnapshot, Traits,
};

/// Platform reported when the caller does not name one.
pub const DEFAULT_PLATFORM: &str = "java";

/// Request timeout used when the configuration has none.
pub const DEFAULT_TIMEOUT_SECS: u64 = 2;

/// Separator inside a `d_cid_ic` value (an encoded U+0001).
const CID_SEPARATOR: &str = "%01";

/// Visitor identifiers read from the state store.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisitorIds<'a> {
    pub uuid: Option<&'a str>,
    pub dpid: Option<&'a str>,
    pub dpuuid: Option<&'a str>,
}

/// A ready-to-send signal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRequest {
    pub url: String,
    pub timeout_secs: u64,
}

/// Build the `/event` URL and timeout for a signal.
pub fn build_signal_request(
    server: &str,
    traits: &Traits,
    identity: Option<&IdentitySnapshot>,
    configuration: Option<&ConfigurationSnapshot>,
    visitor: VisitorIds<'_>,
    platform: Option<&str>,
) -> SignalRequest {
    let mut url = format!("https://{}/event?", server);

    append_traits(&mut url, traits);

    if let Some(identity) = identity {
        append_identity(&mut url, identity);
    }

    if let Some(org_id) = configuration.and_then(|c| c.org_id.as_deref()) {
        push_param(&mut url, "d_orgid", org_id);
    }

    if let Some(uuid) = visitor.uuid {
        push_param(&mut url, "d_uuid", uuid);
    }

    if let (Some(dpid), Some(dpuuid)) = (visitor.dpid, visitor.dpuuid) {
        if !dpid.is_empty() && !dpuuid.is_empty() {
            push_param(&mut url, "d_dpid", dpid);
            push_param(&mut url, "d_dpuuid", dpuuid);
        }
    }

    push_param(
        &mut url,
        "d_ptfm",
        platform.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PLATFORM),
    );
    push_param(&mut url, "d_dst", "1");
    push_param(&mut url, "d_rtbd", "json");

    SignalRequest {
        url: url.replacen("?&", "?", 1),
        timeout_secs: configuration
            .map(|c| c.timeout_or(DEFAULT_TIMEOUT_SECS))
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    }
}

/// Opt-out notification URL for a visitor.
pub fn build_opt_out_url(server: &str, uuid: &str) -> String {
    format!("https://{}/demoptout.jpg?d_uuid={}", server, uuid)
}

fn append_traits(url: &mut String, traits: &Traits) {
    for (key, value) in traits {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let key = key.replace('.', "_");
        url.push_str("&c_");
        url.push_str(&urlencoding::encode(&key));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
}

fn append_identity(url: &mut String, identity: &IdentitySnapshot) {
    if let Some(mid) = non_empty(&identity.mid) {
        push_param(url, "d_mid", mid);
    }
    if let Some(blob) = non_empty(&identity.blob) {
        push_param(url, "d_blob", blob);
    }
    if let Some(hint) = non_empty(&identity.location_hint) {
        push_param(url, "dcs_region", hint);
    }
    for visitor_id in &identity.visitor_ids {
        push_param(url, "d_cid_ic", &customer_id_value(visitor_id));
    }
}

/// `{type}[%01{id}]%01{authState}`
fn customer_id_value(visitor_id: &CustomerVisitorId) -> String {
    let mut value = visitor_id.id_type.clone();
    if let Some(id) = non_empty(&visitor_id.id) {
        value.push_str(CID_SEPARATOR);
        value.push_str(&urlencoding::encode(id));
    }
    value.push_str(CID_SEPARATOR);
    value.push_str(&visitor_id.auth_state.code().to_string());
    value
}

fn push_param(url: &mut String, key: &str, value: &str) {
    url.push('&');
    url.push_str(key);
    url.push('=');
    url.push_str(value);
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
