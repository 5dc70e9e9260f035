//! Process wiring for the scheduler: configuration, graceful shutdown,
//! the axum `App`, and the ambient middleware stack sitting in front of
//! the `scheduler-api` router.

pub mod app;
pub mod middleware;
pub mod shutdown;
pub mod state;

pub use app::App;
pub use state::{AppState, AppStateBuilder};
