//! Broker error types.
//!
//! The `Display` strings of the first three variants are protocol
//! sentinels; controllers match on them verbatim.

use thiserror::Error;

use crate::rpc::RpcError;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The run was superseded by a fresh `RunGol` or by `Stop`.
    #[error("broker closed")]
    Closed,

    /// No candidate worker endpoint answered the dial.
    #[error("no node connected")]
    NoNodeConnected,

    /// Snapshot reconciliation saw two workers more than one generation
    /// apart.
    #[error("server not sync")]
    NotSync,

    /// A control call arrived before the first `RunGol`.
    #[error("no run in progress")]
    NoActiveRun,

    /// The submitted board was rejected.
    #[error("invalid board: {0}")]
    InvalidBoard(String),

    /// A cached worker connection failed mid-run. Fatal to the run.
    #[error("worker {address} failed: {source}")]
    Worker { address: String, source: RpcError },

    /// A spawned fan-out task died.
    #[error("internal task failed: {0}")]
    Internal(String),
}
