//! Subcommand implementations.

use anyhow::{bail, Result};
use audience_config_and_utils::{Config, Paths};
use audience_database::Database;
use audience_orchestrator::{AudienceClient, AudienceError, ClientOptions};
use audience_protocol_types::{
    ConfigurationSnapshot, ConsentStatus, IdentitySnapshot, Profile, SharedStateStatus, Traits,
};
use audience_storage::DataStore;
use std::sync::Arc;
use tracing::{info, warn};
use visitor_state::VisitorState;

/// Arguments of `audience-signal signal`.
pub struct SignalArgs {
    pub server: Option<String>,
    pub org: Option<String>,
    pub consent: ConsentStatus,
    pub mid: Option<String>,
    pub timeout: Option<u64>,
    pub traits: Traits,
}

/// Submit one signal and print the returned profile.
pub async fn signal(config: &Config, paths: &Paths, args: SignalArgs) -> Result<()> {
    let Some(server) = args.server.or_else(|| config.default_server.clone()) else {
        bail!("No audience server given; pass --server or set default_server in the config file");
    };
    Config::server_url(&server)?;

    let client = AudienceClient::start(ClientOptions::open(config, paths)?);

    if let Some(mid) = args.mid {
        client.identity_changed(SharedStateStatus::Set(IdentitySnapshot {
            mid: Some(mid),
            ..Default::default()
        }))?;
    }
    client.configuration_changed(SharedStateStatus::Set(ConfigurationSnapshot {
        server: Some(server),
        timeout_secs: args.timeout.or(Some(config.default_request_timeout_secs)),
        org_id: args.org,
        consent: args.consent,
        forwarding_enabled: false,
    }))?;

    let profile = match client.signal_with_data(args.traits).await {
        Ok(profile) => profile,
        Err(AudienceError::CallbackTimeout { .. }) => {
            warn!("No response yet; the signal stays queued");
            Profile::new()
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}", serde_json::to_string_pretty(&profile)?);

    let pending = client.pending_hits();
    if pending > 0 {
        info!(pending, "Hits left in the queue for a later run");
    }
    client.shutdown();
    Ok(())
}

/// Print the stored uuid and profile.
pub fn profile(paths: &Paths) -> Result<()> {
    let database: Arc<dyn DataStore> = Arc::new(open_database(paths)?);
    let mut visitor = VisitorState::new(Some(database));

    let output = serde_json::json!({
        "uuid": visitor.uuid(),
        "profile": visitor.visitor_profile(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the number of persisted hits.
pub fn pending(paths: &Paths) -> Result<()> {
    let database = open_database(paths)?;
    println!("{}", database.count_signal_hits()?);
    Ok(())
}

/// Clear stored identifiers and drop queued hits.
pub async fn reset(config: &Config, paths: &Paths) -> Result<()> {
    let client = AudienceClient::start(ClientOptions::open(config, paths)?);

    // requests are only served once a configuration is known
    client.configuration_changed(SharedStateStatus::Set(ConfigurationSnapshot {
        server: config.default_server.clone(),
        ..Default::default()
    }))?;
    client.reset()?;
    client.get_visitor_profile().await?;

    println!("Visitor reset");
    client.shutdown();
    Ok(())
}

fn open_database(paths: &Paths) -> Result<Database> {
    paths.ensure_dirs()?;
    Ok(Database::open(&paths.database_file())?)
}
