//! Scheduler server entry point: loads configuration, wires the Store,
//! Queue, Coordinator and Delivery Worker together, and serves the
//! REST surface defined in §6.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scheduler_core::config::{AppConfig, LogFormat};
use scheduler_health::HealthChecker;
use scheduler_queue::RedisDispatchQueue;
use scheduler_server::state::AppStateBuilder;
use scheduler_server::App;
use scheduler_store::PgJobStore;
use scheduler_worker::{build_http_client, DeliveryWorker};

#[derive(Parser, Debug)]
#[command(name = "scheduler-server")]
#[command(author, version, about = "Persistent HTTP job scheduler", long_about = None)]
struct Cli {
    /// Port to listen on (overrides config and environment).
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config and environment).
    #[arg(long)]
    host: Option<String>,
}

fn init_tracing(config: &scheduler_core::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(config.verbose))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    init_tracing(&config.logging);

    tracing::info!(version = scheduler_core::VERSION, node_env = %config.node_env, "starting scheduler");

    let pg_pool = scheduler_store::pool::connect(&config.store).await?;
    let redis_pool = scheduler_queue::pool::connect(&config.queue).await?;

    let store: Arc<dyn scheduler_store::JobStore> = Arc::new(PgJobStore::new(pg_pool.clone()));
    let queue = Arc::new(RedisDispatchQueue::new(redis_pool.clone()));
    let health = Arc::new(HealthChecker::new(pg_pool, redis_pool));

    let state = AppStateBuilder::new()
        .config(config.clone())
        .store(store.clone())
        .queue(queue.clone() as Arc<dyn scheduler_queue::DispatchQueue>)
        .health(health)
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    let http_client = build_http_client(&config.delivery)?;
    let worker = Arc::new(DeliveryWorker::new(
        store,
        queue.clone() as Arc<dyn scheduler_queue::DispatchQueue>,
        http_client,
        config.target.clone(),
        config.delivery.clone(),
    ));

    let app = App::new(state, queue, config.delivery.concurrency);

    app.run(move |data| {
        let worker = worker.clone();
        async move { worker.handle(data).await }
    })
    .await
}
