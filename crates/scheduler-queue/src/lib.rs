//! Dispatch Queue — the delayed/repeating work queue consumed by the
//! Delivery Worker, plus its DLQ sub-queue (§4.3).

pub mod pool;
pub mod queue;

pub use queue::{manual_key, DispatchQueue, RedisDispatchQueue};

#[cfg(feature = "mock")]
pub use queue::MockDispatchQueue;
