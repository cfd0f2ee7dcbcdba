use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use replica_node::{
    broker_client::TcpBrokerClient, cli::Cli, config::NodeConfig, node::Node, server::NodeServer,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = NodeConfig::from_cli(&cli)?;
    info!(
        node = %config.identity,
        probability_pct = config.policy.probability() * 100.0,
        window = %config.policy.window(),
        "starting node"
    );

    let broker = TcpBrokerClient::resolve(&config.broker).await?;
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to start node {} on {}", config.identity, config.listen))?;

    let node = Node::new(
        config.identity.clone(),
        config.simulator(),
        config.recovery,
        broker,
    );
    let server = NodeServer::new(listener, node.clone());
    let addr = server.local_addr()?;

    let advertised = config.advertised_address(addr);
    tokio::spawn(async move {
        node.register(&advertised).await;
    });

    info!("node {} listening on {}", config.identity, addr);
    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("node exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
