//! Event bridge shard: polls the manager, provisions ingress resources, runs processor
//! executors and serves the event ingress.

use clap::Parser;
use eventbridge::executor::{EventDispatcher, ExecutorFactory, ExecutorRegistry};
use eventbridge::metrics::ExecutorMetrics;
use eventbridge::server::ShardApi;
use eventbridge::shard::{
    HttpManagerClient, InMemoryCluster, IngressReconciler, ManagerSyncService, ResourceProvisioner,
};
use eventbridge::{Config, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "eventbridge-shard")]
#[command(about = "Event bridge shard - provisions bridges and runs processors")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration; built-in defaults are used when absent
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            match Config::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to load configuration: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => Config::default(),
    };
    config.validate()?;

    info!("Starting event bridge shard");

    let metrics = ExecutorMetrics::new()?;
    let registry = Arc::new(ExecutorRegistry::new(ExecutorFactory::with_defaults(
        &config.executor,
        metrics.clone(),
    )));
    let manager = Arc::new(HttpManagerClient::new(
        &config.manager.base_url,
        Duration::from_millis(config.manager.request_timeout_ms),
    ));
    let (cluster, events) = InMemoryCluster::new();
    let cluster = Arc::new(cluster);
    let provisioner = Arc::new(ResourceProvisioner::new(cluster.clone(), &config.ingress));
    let sync = Arc::new(ManagerSyncService::new(
        manager,
        provisioner,
        registry.clone(),
        &config.shard,
    ));

    if let Err(e) = sync.resync_executors().await {
        error!("Executor resync failed: {}", e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = IngressReconciler::new(cluster, sync.clone());
    let reconciler_task = tokio::spawn(reconciler.run(events, shutdown_rx.clone()));
    let sync_task = tokio::spawn(sync.clone().run(shutdown_rx.clone()));

    let api = ShardApi::new(EventDispatcher::new(registry), metrics, &config.server.listen);
    let mut api_task = tokio::spawn(api.start(shutdown_rx));

    let ingress_exit = tokio::select! {
        signal = signal::ctrl_c() => {
            signal?;
            info!("Received shutdown signal (Ctrl+C)");
            None
        }
        result = &mut api_task => Some(result),
    };
    let _ = shutdown_tx.send(true);
    let api_result = match ingress_exit {
        Some(result) => {
            error!("Event ingress exited, shutting down");
            result
        }
        None => api_task.await,
    };

    let (reconciler_result, sync_result) = tokio::join!(reconciler_task, sync_task);
    reconciler_result?;
    sync_result?;
    api_result??;

    info!("Event bridge shard stopped");
    Ok(())
}
