//! Process-wide application state, assembled once in `main` and shared
//! across the router via `axum::extract::State`.

use std::sync::Arc;

use scheduler_coordinator::Coordinator;
use scheduler_core::config::AppConfig;
use scheduler_health::HealthChecker;
use scheduler_queue::DispatchQueue;
use scheduler_store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<Coordinator>,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub fn api_state(&self) -> scheduler_api::ApiState {
        scheduler_api::ApiState {
            coordinator: self.coordinator.clone(),
            health: self.health.clone(),
        }
    }
}

/// Chainable constructor for `AppState`; every field is required so the
/// builder simply validates presence before handing back a
/// ready-to-serve `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn JobStore>>,
    queue: Option<Arc<dyn DispatchQueue>>,
    health: Option<Arc<HealthChecker>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn DispatchQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn health(mut self, health: Arc<HealthChecker>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<AppState, &'static str> {
        let config = self.config.ok_or("config is required")?;
        let store = self.store.ok_or("store is required")?;
        let queue = self.queue.ok_or("queue is required")?;
        let health = self.health.ok_or("health checker is required")?;

        Ok(AppState {
            config: Arc::new(config),
            coordinator: Arc::new(Coordinator::new(store, queue)),
            health,
        })
    }
}
