//! Engine Coordinator — enforces the invariants between the Job Store and
//! the Dispatch Queue on every external operation (§4.5).

pub mod coordinator;

pub use coordinator::Coordinator;
