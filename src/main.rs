//! # Federated API Gateway - Main Entry Point
//!
//! Loads the gateway configuration, deploys the declared topologies and
//! serves them over HTTP. The configuration file path comes from the first
//! command-line argument, defaulting to `gateway.yaml`.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use federated_gateway::auth::token::{LocalTokenAuthority, RejectingAuthority, TokenAuthority};
use federated_gateway::chain::factory::{GatewayServices, ProviderRegistry};
use federated_gateway::dispatch::client::BackendClient;
use federated_gateway::gateway::server::GatewayServer;
use federated_gateway::topology::registry::{watch_topology_file, TopologyRegistry};
use federated_gateway::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("gateway.yaml"));
    let config = GatewayConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    info!("configuration loaded from {}", config_path.display());

    let authority: Arc<dyn TokenAuthority> = match &config.token_authority_pem {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("reading token authority key {}", path.display()))?;
            Arc::new(LocalTokenAuthority::from_pem(&pem)?)
        }
        None => {
            warn!("no token authority key configured; delegated verification will fail closed");
            Arc::new(RejectingAuthority)
        }
    };

    let client = Arc::new(BackendClient::new(&config.dispatch)?);
    let registry = Arc::new(TopologyRegistry::new(
        ProviderRegistry::with_builtins(),
        GatewayServices { authority, client },
    ));

    let deployed = registry
        .deploy_file(&config.topology_file)
        .with_context(|| format!("deploying topologies from {}", config.topology_file.display()))?;
    if deployed.is_empty() {
        anyhow::bail!(
            "no topology could be deployed from {}",
            config.topology_file.display()
        );
    }
    info!("deployed topologies: {}", deployed.join(", "));

    // The watcher must stay alive for the lifetime of the process.
    let _watcher = if config.watch_topologies {
        Some(watch_topology_file(
            Arc::clone(&registry),
            &config.topology_file,
        )?)
    } else {
        None
    };

    let server = GatewayServer::new(config.server.clone(), registry);
    server.start().await?;
    Ok(())
}
