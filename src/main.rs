use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_auth::SealedTokenVerifier;
use relay_core::Outbound;
use relay_server::ServerConfig;
use relay_store::Database;
use relay_telemetry::{init_telemetry, TelemetryConfig};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;

/// Real-time vendor dispatch and location relay.
#[derive(Debug, Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 9092)]
    port: u16,

    /// Path to the SQLite database. Defaults to ~/.relay/relay.db.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Secret used to verify connection tokens.
    #[arg(long, env = "RELAY_AUTH_SECRET", hide_env_values = true)]
    auth_secret: SecretString,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        log_level: cli.log_level.parse().unwrap_or(tracing::Level::INFO),
        ..TelemetryConfig::default()
    });

    let db_path = cli.database.unwrap_or_else(default_database_path);
    let db = Database::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    let verifier = Arc::new(SealedTokenVerifier::from_secret(
        cli.auth_secret.expose_secret(),
    ));

    // All dispatch and location events fan out through this channel
    let (event_tx, _) = broadcast::channel::<Outbound>(1024);

    let config = ServerConfig {
        port: cli.port,
        ..Default::default()
    };
    let handle = relay_server::start(config, db, verifier, event_tx)
        .await
        .context("starting server")?;

    tracing::info!(port = handle.port, "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("shutting down");
    Ok(())
}

fn default_database_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".relay")
        .join("relay.db")
}
