//! audience-signal - submit audience signals and inspect local visitor state.

mod commands;

use std::path::PathBuf;

use audience_config_and_utils::{init_logging, init_logging_to_file, Config, Paths};
use audience_protocol_types::ConsentStatus;
use clap::{Parser, Subcommand};
use tracing::debug;

/// Audience signal command-line interface.
#[derive(Parser)]
#[command(name = "audience-signal")]
#[command(about = "Send audience signals and inspect the stored visitor profile")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Also write JSON logs to <base-dir>/logs/audience-signal.jsonl
    #[arg(long, global = true)]
    log_file: bool,

    /// Base directory for runtime files (config, database, logs). Defaults to ~/.audience-signal
    #[arg(long, global = true, env = "AUDIENCE_SIGNAL_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit traits and print the returned profile
    Signal {
        /// Audience server host, e.g. dpm.example.net
        #[arg(long)]
        server: Option<String>,

        /// Organization id sent as d_orgid
        #[arg(long)]
        org: Option<String>,

        /// Privacy status: optedin, optedout or optunknown
        #[arg(long, default_value = "optedin", value_parser = parse_consent)]
        consent: ConsentStatus,

        /// Marketing cloud id sent as d_mid
        #[arg(long)]
        mid: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Trait as key=value; repeatable
        #[arg(short = 't', long = "trait", value_parser = parse_trait)]
        traits: Vec<(String, String)>,
    },
    /// Print the stored uuid and profile
    Profile,
    /// Print the number of hits waiting for delivery
    Pending,
    /// Clear stored identifiers and drop queued hits
    Reset,
}

fn parse_consent(value: &str) -> Result<ConsentStatus, String> {
    match value {
        "optedin" | "optedout" | "optunknown" => Ok(ConsentStatus::from_wire(value)),
        other => Err(format!("unknown privacy status '{}'", other)),
    }
}

fn parse_trait(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    if cli.log_file {
        paths.ensure_dirs()?;
        init_logging_to_file(level, &paths);
    } else {
        init_logging(level);
    }
    debug!(base_dir = %paths.base_dir().display(), "Loaded configuration");

    match cli.command {
        Commands::Signal {
            server,
            org,
            consent,
            mid,
            timeout,
            traits,
        } => {
            let request = commands::SignalArgs {
                server,
                org,
                consent,
                mid,
                timeout,
                traits: traits.into_iter().collect(),
            };
            commands::signal(&config, &paths, request).await?;
        }
        Commands::Profile => commands::profile(&paths)?,
        Commands::Pending => commands::pending(&paths)?,
        Commands::Reset => commands::reset(&config, &paths).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trait() {
        assert_eq!(
            parse_trait("a.b=x=y").unwrap(),
            ("a.b".to_string(), "x=y".to_string())
        );
        assert_eq!(parse_trait("k=").unwrap(), ("k".to_string(), String::new()));
        assert!(parse_trait("novalue").is_err());
        assert!(parse_trait("=v").is_err());
    }

    #[test]
    fn test_parse_consent() {
        assert_eq!(parse_consent("optedout").unwrap(), ConsentStatus::OptOut);
        assert!(parse_consent("maybe").is_err());
    }

    #[test]
    fn test_cli_parses_signal() {
        let cli = Cli::try_parse_from([
            "audience-signal",
            "signal",
            "--server",
            "dpm.example.net",
            "-t",
            "k=v",
            "--trait",
            "a=b",
        ])
        .unwrap();
        match cli.command {
            Commands::Signal {
                server,
                consent,
                traits,
                ..
            } => {
                assert_eq!(server.as_deref(), Some("dpm.example.net"));
                assert_eq!(consent, ConsentStatus::OptIn);
                assert_eq!(traits.len(), 2);
            }
            _ => panic!("expected signal command"),
        }
    }
}
