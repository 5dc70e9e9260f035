//! Durable storage of Job records (§4.2).

pub mod migration;
pub mod pool;
pub mod store;

pub use migration::Migrator;
pub use store::{JobFilter, JobStore, JobUpdate, PgJobStore};

#[cfg(feature = "mock")]
pub use store::MockJobStore;
