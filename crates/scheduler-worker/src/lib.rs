//! Delivery Worker — consumes the Dispatch Queue and performs outbound
//! HTTP delivery for each due job (§4.4).

pub mod delivery;
pub mod worker;

pub use delivery::{build_http_client, with_retry};
pub use worker::DeliveryWorker;
