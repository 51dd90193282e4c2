//! Haloring - distributed Game of Life on a toroidal board.
//!
//! A single broker partitions the board into horizontal stripes and hands
//! each stripe to a worker. The workers form a ring: every generation each
//! worker exchanges its boundary rows ("halo" rows) with its two ring
//! neighbours and advances autonomously as fast as halos arrive. A compact
//! two-buffer change log per worker lets the broker reassemble a globally
//! consistent snapshot even though neighbours may be one generation apart.
//!
//! # Components
//!
//! - [`broker`] - owns the run configuration, partitions boards, fans out
//!   control calls and reconciles snapshots.
//! - [`worker`] - holds one stripe and runs the generation loop.
//! - [`controller`] - drives a run interactively (ticks, snapshots, pause,
//!   shutdown) on behalf of an embedding application.
//! - [`rpc`] - the line-delimited JSON transport the components speak.

pub mod board;
pub mod broker;
pub mod controller;
pub mod engine;
pub mod logging;
pub mod protocol;
pub mod rpc;
pub mod worker;

/// Version shared by the library and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
