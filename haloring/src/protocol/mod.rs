//! Wire payload types shared by broker, worker, and controller.
//!
//! One struct per request/response pair in the RPC surface. The transport
//! (see [`crate::rpc`]) moves these as JSON values; anything process-local
//! (connection handles, channels) stays out of this module.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::{Board, Cell};

/// RPC method names.
///
/// The strings are the protocol; both sides match on them verbatim.
pub mod methods {
    pub const BROKER_RUN_GOL: &str = "Broker.RunGol";
    pub const BROKER_COUNT_ALIVE_CELLS: &str = "Broker.CountAliveCells";
    pub const BROKER_GET_WORLD: &str = "Broker.GetWorld";
    pub const BROKER_PAUSE: &str = "Broker.Pause";
    pub const BROKER_STOP: &str = "Broker.Stop";

    pub const WORKER_INIT_SERVER: &str = "Worker.InitServer";
    pub const WORKER_RUN_SERVER: &str = "Worker.RunServer";
    pub const WORKER_GET_FIRST_LINE: &str = "Worker.GetFirstLine";
    pub const WORKER_GET_LAST_LINE: &str = "Worker.GetLastLine";
    pub const WORKER_GET_WORLD_CHANGE: &str = "Worker.GetWorldChange";
    pub const WORKER_PAUSE: &str = "Worker.Pause";
    pub const WORKER_STOP: &str = "Worker.Stop";
}

/// Network location of a broker or worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Empty payload for requests and responses that carry no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// `Broker.RunGol` request: a board to iterate, how far, and how wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGolRequest {
    pub board: Board,
    pub current_turn: u32,
    pub turns: u32,
    pub threads: usize,
}

/// `Broker.RunGol` response: the board at generation `turns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGolResponse {
    pub board: Board,
    pub current_turn: u32,
}

/// `Broker.CountAliveCells` response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AliveCellsCountResponse {
    pub count: usize,
    pub current_turn: u32,
}

/// `Broker.GetWorld` response: a reconciled snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWorldResponse {
    pub world: Board,
    pub current_turn: u32,
}

/// `Broker.Pause` / `Worker.Pause` response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PauseResponse {
    pub current_turn: u32,
}

/// `Worker.InitServer` request: one stripe plus everything the worker needs
/// to join the ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitServerRequest {
    pub stripe: Board,
    pub start_y: usize,
    pub current_turn: u32,
    pub turns: u32,
    pub threads: usize,
    pub previous: ServerAddress,
    pub next: ServerAddress,
}

/// `Worker.RunServer` response: the stripe at the final generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunServerResponse {
    pub stripe: Board,
}

/// `Worker.GetFirstLine` / `Worker.GetLastLine` response: one halo row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineResponse {
    pub line: Vec<u8>,
}

/// `Worker.GetWorldChange` response: the two-buffer change log.
///
/// `committed` is a set (encoded as a sequence) of cells that differ from
/// the initial board as of `current_turn - 1`; `pending` is the ordered list
/// of cells flipped by the transition into `current_turn`. Both are global
/// coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldChangeResponse {
    pub committed: Vec<Cell>,
    pub pending: Vec<Cell>,
    pub current_turn: u32,
}
