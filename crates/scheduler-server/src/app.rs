//! Router assembly and the top-level serve loop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use scheduler_queue::RedisDispatchQueue;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tracing::info;

use crate::middleware::{body_limit_layer, compression_layer, cors_layer, request_id, request_logging};
use crate::shutdown::{graceful_shutdown, listen_for_shutdown_signals, ShutdownController, ShutdownExecutor, ShutdownPhase};
use crate::state::AppState;

pub struct App {
    state: AppState,
    queue: Arc<RedisDispatchQueue>,
    worker_concurrency: usize,
    shutdown: ShutdownController,
}

impl App {
    pub fn new(state: AppState, queue: Arc<RedisDispatchQueue>, worker_concurrency: usize) -> Self {
        let timeout = state.config.server.shutdown_timeout();
        Self {
            state,
            queue,
            worker_concurrency,
            shutdown: ShutdownController::new(timeout),
        }
    }

    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.state.config.cors);
        let body_limit = body_limit_layer(self.state.config.server.max_body_size_bytes);

        let api = scheduler_api::router(self.state.api_state());

        Router::new()
            .route("/", get(|| async { "scheduler" }))
            .merge(api)
            .layer(
                ServiceBuilder::new()
                    .layer(axum_middleware::from_fn(request_id))
                    .layer(axum_middleware::from_fn(request_logging))
                    .layer(compression_layer())
                    .layer(cors)
                    .layer(body_limit),
            )
    }

    /// Binds, serves, and runs the ordered shutdown sequence once the
    /// listener returns. `worker: impl Fn(DispatchData) -> Fut` is supplied
    /// by `main`, which owns the `DeliveryWorker`; the consume loop is
    /// spawned here so its lifetime is tied to the `StopWorkers` phase.
    pub async fn run<H, Fut>(self, handler: H) -> anyhow::Result<()>
    where
        H: Fn(scheduler_core::job::DispatchData) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = scheduler_core::error::Result<()>> + Send + 'static,
    {
        let addr: SocketAddr = self.state.config.server.address().parse()?;
        let router = self.build_router();

        let (worker_shutdown_tx, worker_shutdown_rx) = broadcast::channel::<()>(1);
        let queue = self.queue.clone();
        let concurrency = self.worker_concurrency;
        let worker_task = tokio::spawn(async move {
            queue.consume(handler, concurrency, worker_shutdown_rx).await;
        });

        let shutdown = self.shutdown.clone();
        tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));

        info!(%addr, "listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(graceful_shutdown(shutdown.clone()))
            .await?;

        let mut executor = ShutdownExecutor::new(shutdown.clone());
        executor.register(ShutdownPhase::StopWorkers, move || {
            let tx = worker_shutdown_tx.clone();
            async move {
                let _ = tx.send(());
            }
        });
        executor.execute().await;

        let _ = worker_task.await;
        Ok(())
    }
}
