//! Line-delimited JSON RPC over TCP.
//!
//! The transport is deliberately small: newline-framed JSON objects with a
//! request id for multiplexing. What matters for the simulation is the
//! concurrency shape on both ends:
//!
//! - the [`RpcClient`] keeps any number of calls in flight on one cached
//!   connection, so a worker can fetch halos from a neighbour whose own
//!   `RunServer` call is parked on the same socket;
//! - [`serve`] spawns a task per request, so a handler blocking on a
//!   rendezvous token never stalls the connection's read loop.

mod client;
mod error;
mod frame;
mod server;

pub use client::RpcClient;
pub use error::RpcError;
pub use frame::{RequestFrame, ResponseFrame};
pub use server::{bind, params, serve, to_result, RpcService};
