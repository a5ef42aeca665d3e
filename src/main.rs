use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use windlass::api::{serve, AppState};
use windlass::clients::{ClusterClient, HttpClusterClient, StaticArtifactStore};
use windlass::health::{ProbeScheduler, UptimeAggregator};
use windlass::notify::{LogGateway, Notifier};
use windlass::orchestrator::{
    DeploymentLocks, FanoutConfig, FanoutExecutor, Orchestrator, RollbackEngine,
};
use windlass::registry::ClusterTargetRegistry;
use windlass::storage::InMemoryStore;
use windlass::Config;

#[derive(Parser)]
#[command(name = "windlass")]
#[command(about = "Deployment lifecycle orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Serve {
        #[arg(long, help = "Port for the API server (overrides WINDLASS_API_PORT)")]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => run_server(port).await?,
    }

    Ok(())
}

async fn run_server(port: Option<u16>) -> Result<()> {
    let config = Config::from_env();
    let port = port.unwrap_or(config.api_port);

    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(ClusterTargetRegistry::new());
    let client: Arc<dyn ClusterClient> = Arc::new(HttpClusterClient::new());
    let artifacts = Arc::new(StaticArtifactStore);
    let locks = Arc::new(DeploymentLocks::new());
    let (notifier, _notify_task) = Notifier::new(Arc::new(LogGateway));

    let fanout = Arc::new(FanoutExecutor::new(
        client.clone(),
        FanoutConfig {
            per_target_timeout: Duration::from_secs(config.apply_timeout_secs),
            ceiling_timeout: Duration::from_secs(config.fanout_ceiling_secs),
            max_retries: config.apply_retries,
        },
    ));
    let aggregator = Arc::new(UptimeAggregator::new(
        config.health_threshold,
        config.probe_window,
    ));
    let rollback = Arc::new(RollbackEngine::new(
        store.clone(),
        fanout.clone(),
        registry.clone(),
        locks.clone(),
        notifier.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        registry.clone(),
        artifacts,
        fanout,
        rollback.clone(),
        aggregator.clone(),
        notifier,
        locks,
    ));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, changes) = ProbeScheduler::new(
        client,
        registry,
        aggregator,
        Duration::from_secs(config.probe_interval_secs),
        Duration::from_secs(config.probe_timeout_secs),
    );
    scheduler.spawn(shutdown_rx.clone());
    rollback.spawn_monitor(changes, shutdown_rx);

    serve(
        AppState {
            orchestrator,
        },
        port,
    )
    .await
}
