//! Worker error types.

use thiserror::Error;

use crate::rpc::RpcError;

/// Errors a worker reports to the broker or to a ring neighbour.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// `RunServer` arrived before `InitServer`.
    #[error("worker not initialised")]
    NotInitialised,

    /// The run was cancelled by a fresh `InitServer` or by `Stop`.
    #[error("worker closed")]
    Closed,

    /// A halo fetch landed while no generation loop is feeding the
    /// rendezvous.
    #[error("no active run")]
    NoActiveRun,

    /// The stripe payload does not match its claimed dimensions.
    #[error("invalid stripe: dimensions do not match payload")]
    InvalidStripe,

    /// A neighbour returned a halo row of the wrong width.
    #[error("halo width {actual} does not match stripe width {expected}")]
    HaloWidth { expected: usize, actual: usize },

    /// Could not reach a ring neighbour.
    #[error("ring dial failed for {address}: {source}")]
    Dial { address: String, source: RpcError },

    /// A halo fetch failed mid-run. Fatal to the run: a missing halo cannot
    /// be reconciled without fault-tolerance machinery.
    #[error("halo fetch failed: {0}")]
    Halo(#[source] RpcError),

    /// A spawned compute or fetch task died.
    #[error("internal task failed: {0}")]
    Internal(String),
}
