//! Stripe worker.
//!
//! A worker owns one horizontal stripe of the board. `InitServer` hands it
//! the stripe, its global row offset, and the addresses of its two ring
//! neighbours; `RunServer` then advances the stripe generation by
//! generation, exchanging halo rows with the neighbours each turn, until
//! the target turn is reached or the run is cancelled.
//!
//! The change log ([`ChangeLog`]) and the rendezvous plumbing ([`halo`])
//! are what let the broker snapshot a ring whose members are up to one
//! generation apart.

mod changelog;
mod error;
mod halo;
mod run_loop;
mod service;

pub use changelog::ChangeLog;
pub use error::WorkerError;
pub use service::Worker;
