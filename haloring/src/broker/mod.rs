//! Broker: run orchestration and snapshot reconciliation.
//!
//! The broker owns the run configuration and the initial board. On
//! `RunGol` it partitions the board into stripes, initialises the ring,
//! starts every worker with a single long-running `RunServer`, and gathers
//! the final stripes. While a run is live it services control calls -
//! count, snapshot, pause, stop - by fanning out to the ring and
//! reconciling what comes back.

mod config;
mod error;
mod reconcile;
mod service;

pub use config::BrokerConfig;
pub use error::BrokerError;
pub use reconcile::{merge_changes, rebuild_world};
pub use service::Broker;
