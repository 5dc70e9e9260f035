//! Graceful shutdown handling (§5: the Worker's consume loop must be told
//! to stop and drain before the Store/Queue connections are torn down).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub type ShutdownReceiver = broadcast::Receiver<()>;
pub type ShutdownSender = broadcast::Sender<()>;

/// Broadcasts the shutdown signal to every subscriber: the HTTP listener,
/// the Worker's `consume()` loop, and anything else registered against it.
#[derive(Clone)]
pub struct ShutdownController {
    sender: ShutdownSender,
    is_shutting_down: Arc<AtomicBool>,
    timeout: Duration,
}

impl ShutdownController {
    pub fn new(timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    pub fn with_default_timeout() -> Self {
        Self::new(Duration::from_secs(30))
    }

    pub fn subscribe(&self) -> ShutdownReceiver {
        self.sender.subscribe()
    }

    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("initiating graceful shutdown");
            let _ = self.sender.send(());
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::with_default_timeout()
    }
}

/// Waits for SIGINT or SIGTERM and trips the controller.
pub async fn listen_for_shutdown_signals(controller: ShutdownController) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }

    controller.shutdown();
}

/// Passed to `axum::serve(...).with_graceful_shutdown(...)`.
pub async fn graceful_shutdown(controller: ShutdownController) {
    let mut receiver = controller.subscribe();
    let _ = receiver.recv().await;
    info!("starting graceful shutdown sequence");
}

/// Ordered cleanup phases. `StopWorkers` is where the Delivery Worker's
/// `consume()` loop is told to stop and drain in-flight deliveries — the
/// mechanism that satisfies the cooperative-close requirement in §5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    StopAccepting,
    DrainConnections,
    StopWorkers,
    FlushCaches,
    CloseDatabase,
    Cleanup,
}

impl ShutdownPhase {
    pub fn all() -> &'static [ShutdownPhase] {
        &[
            ShutdownPhase::StopAccepting,
            ShutdownPhase::DrainConnections,
            ShutdownPhase::StopWorkers,
            ShutdownPhase::FlushCaches,
            ShutdownPhase::CloseDatabase,
            ShutdownPhase::Cleanup,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShutdownPhase::StopAccepting => "stop accepting connections",
            ShutdownPhase::DrainConnections => "drain existing connections",
            ShutdownPhase::StopWorkers => "stop background workers",
            ShutdownPhase::FlushCaches => "flush caches",
            ShutdownPhase::CloseDatabase => "close database connections",
            ShutdownPhase::Cleanup => "final cleanup",
        }
    }
}

pub struct ShutdownExecutor {
    controller: ShutdownController,
    handlers: Vec<(
        ShutdownPhase,
        Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>,
    )>,
}

impl ShutdownExecutor {
    pub fn new(controller: ShutdownController) -> Self {
        Self {
            controller,
            handlers: Vec::new(),
        }
    }

    pub fn register<F, Fut>(&mut self, phase: ShutdownPhase, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers
            .push((phase, Box::new(move || Box::pin(handler()))));
    }

    pub async fn execute(mut self) {
        self.handlers.sort_by_key(|(phase, _)| *phase);
        let timeout_per_phase = self.controller.timeout() / (ShutdownPhase::all().len() as u32);

        for phase in ShutdownPhase::all() {
            let phase_handlers: Vec<_> = self.handlers.iter().filter(|(p, _)| p == phase).collect();
            if phase_handlers.is_empty() {
                continue;
            }

            info!("executing shutdown phase: {}", phase.name());
            let phase_future = async {
                for (_, handler) in phase_handlers {
                    handler().await;
                }
            };

            match tokio::time::timeout(timeout_per_phase, phase_future).await {
                Ok(_) => info!("shutdown phase '{}' completed", phase.name()),
                Err(_) => warn!("shutdown phase '{}' timed out", phase.name()),
            }
        }

        info!("graceful shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn controller_flips_once() {
        let controller = ShutdownController::with_default_timeout();
        assert!(!controller.is_shutting_down());
        controller.shutdown();
        assert!(controller.is_shutting_down());
    }

    #[tokio::test]
    async fn phases_are_ordered() {
        let phases = ShutdownPhase::all();
        assert_eq!(phases.len(), 6);
        assert_eq!(phases[0], ShutdownPhase::StopAccepting);
        assert_eq!(phases[5], ShutdownPhase::Cleanup);
    }

    #[tokio::test]
    async fn executor_runs_registered_phase() {
        let controller = ShutdownController::new(Duration::from_secs(1));
        let mut executor = ShutdownExecutor::new(controller);
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        executor.register(ShutdownPhase::StopWorkers, move || {
            let ran2 = ran2.clone();
            async move {
                ran2.store(true, Ordering::SeqCst);
            }
        });
        executor.execute().await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
