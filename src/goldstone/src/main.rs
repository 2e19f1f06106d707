//! Goldstone: OpenStack monitoring dashboard backend.
//!
//! Loads configuration, connects the search client and the management store,
//! then serves the REST API.

use clap::Parser;
use goldstone_analytics::EsClient;
use goldstone_api::{ApiServer, AppState};
use goldstone_core::config::AppConfig;
use goldstone_management::{ManagementState, ManagementStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "goldstone")]
#[command(about = "OpenStack monitoring and log intelligence server")]
#[command(version)]
struct Cli {
    /// TOML config file (environment variables still override it)
    #[arg(short, long, env = "GOLDSTONE_CONFIG")]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "GOLDSTONE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "GOLDSTONE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Management snapshot file (overrides config)
    #[arg(long, env = "GOLDSTONE__STORE__DATA_FILE")]
    data_file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goldstone=info,goldstone_api=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Goldstone starting up");

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }
    };

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(path) = cli.data_file {
        config.store.data_file = Some(path);
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        servers = ?config.elasticsearch.servers,
        index = %config.elasticsearch.index,
        "Configuration loaded"
    );

    let client = EsClient::new(&config.elasticsearch)?;

    let data_file = config.store.data_file.as_ref().map(PathBuf::from);
    let store = match &data_file {
        Some(path) => ManagementStore::load(path)?,
        None => {
            warn!("No data_file configured, accounts will not survive a restart");
            ManagementStore::new()
        }
    };

    let management = ManagementState::new(Arc::new(store), config.auth.token_ttl_hours)
        .with_installed_apps(config.addons.installed.clone())
        .with_data_file(data_file);

    let state = AppState {
        backend: Arc::new(client),
        index: config.elasticsearch.index.clone(),
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };

    let api_server = ApiServer::new(config, state, management);

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Goldstone is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
