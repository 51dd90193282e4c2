//! Shared harness: spins up an in-process ring of workers plus a broker on
//! ephemeral loopback ports and hands back a connected RPC client.

#![allow(dead_code)]

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use haloring::board::{Board, ALIVE, DEAD};
use haloring::broker::{Broker, BrokerConfig};
use haloring::engine;
use haloring::protocol::{methods, RunGolRequest, RunGolResponse, ServerAddress};
use haloring::rpc::{serve, RpcClient, RpcError};
use haloring::worker::Worker;

/// An in-process ring: broker client plus the root shutdown token.
pub struct Ring {
    pub broker: RpcClient,
    pub shutdown: CancellationToken,
}

impl Ring {
    /// Starts `workers` worker servers and a broker wired to them.
    pub async fn start(workers: usize) -> Ring {
        let shutdown = CancellationToken::new();

        let mut endpoints = Vec::with_capacity(workers);
        for _ in 0..workers {
            endpoints.push(start_worker(&shutdown).await);
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = BrokerConfig::default()
            .with_port(port)
            .with_max_nodes(workers)
            .with_worker_endpoints(endpoints);
        let token = shutdown.child_token();
        let broker = Arc::new(Broker::new(config, token.clone()));
        tokio::spawn(serve(listener, broker, token));

        let client = RpcClient::connect(&format!("127.0.0.1:{port}")).await.unwrap();
        Ring {
            broker: client,
            shutdown,
        }
    }

    /// Issues one `Broker.RunGol` call.
    pub async fn run_gol(
        &self,
        board: &Board,
        turns: u32,
        threads: usize,
    ) -> Result<RunGolResponse, RpcError> {
        self.broker
            .call(
                methods::BROKER_RUN_GOL,
                &RunGolRequest {
                    board: board.clone(),
                    current_turn: 0,
                    turns,
                    threads,
                },
            )
            .await
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

async fn start_worker(shutdown: &CancellationToken) -> ServerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let token = shutdown.child_token();
    let worker = Arc::new(Worker::new(token.clone()));
    tokio::spawn(serve(listener, worker, token));
    ServerAddress::new("127.0.0.1", port)
}

/// Builds a board from rows of `.` (dead) and `O` (alive).
pub fn board_from_art(rows: &[&str]) -> Board {
    let width = rows[0].len();
    let cells = rows
        .iter()
        .flat_map(|row| row.bytes().map(|b| if b == b'O' { ALIVE } else { DEAD }))
        .collect();
    Board::from_cells(width, rows.len(), cells).unwrap()
}

/// Renders a board back to art rows, for assertion messages.
pub fn art(board: &Board) -> String {
    (0..board.height())
        .map(|y| {
            board
                .row(y)
                .iter()
                .map(|&c| if c == DEAD { '.' } else { 'O' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A seeded random board, half dead and half alive.
pub fn random_board(width: usize, height: usize, seed: u64) -> Board {
    let mut rng = StdRng::seed_from_u64(seed);
    let cells = (0..width * height)
        .map(|_| if rng.gen_bool(0.5) { ALIVE } else { DEAD })
        .collect();
    Board::from_cells(width, height, cells).unwrap()
}

/// Single-process reference result after `turns` generations.
pub fn reference(board: &Board, turns: u32) -> Board {
    engine::step_n(board, turns)
}

/// The 8x8 toroidal glider from the end-to-end scenarios.
pub fn glider_8x8() -> Board {
    board_from_art(&[
        ".O......",
        "..O.....",
        "OOO.....",
        "........",
        "........",
        "........",
        "........",
        "........",
    ])
}
