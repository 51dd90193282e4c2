//! Interactive run driver.
//!
//! The controller issues one long-running `RunGol` and, concurrently,
//! drives the interactive loop: a 2-second tick reports live-cell counts,
//! and command tokens trigger snapshots, pause, and shutdown. PGM bytes
//! go to files under the configured output directory; everything else the
//! embedder needs arrives as [`Event`]s.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::board::{pgm, Board};
use crate::protocol::{
    methods, AliveCellsCountResponse, CurrentWorldResponse, Empty, PauseResponse, RunGolRequest,
    RunGolResponse,
};
use crate::rpc::{RpcClient, RpcError};

mod events;

pub use events::{Command, Event, RunState};

/// Census interval for the alive-cells tick.
const TICK_INTERVAL: Duration = Duration::from_secs(2);

/// Parameters for one controller session.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Broker address, `host:port`.
    pub broker_addr: String,
    /// Generations to run.
    pub turns: u32,
    /// Compute tasks per worker.
    pub threads: usize,
    /// Directory snapshot files are written into.
    pub output_dir: PathBuf,
}

/// Errors that end a controller session.
///
/// All of them are fatal: the CLI maps them to a nonzero exit.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("broker call failed: {0}")]
    Broker(#[from] RpcError),

    #[error("snapshot write failed: {0}")]
    Snapshot(#[from] pgm::PgmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives one run to completion or quit.
pub async fn run(
    config: ControllerConfig,
    board: Board,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<Event>,
) -> Result<(), ControllerError> {
    std::fs::create_dir_all(&config.output_dir)?;

    // Zero turns is trivially complete: emit the input unchanged without
    // any broker traffic.
    if config.turns == 0 {
        let filename = write_snapshot(&config.output_dir, &board, 0)?;
        emit(
            &events,
            Event::ImageOutputComplete {
                completed_turns: 0,
                filename,
            },
        )
        .await;
        emit(
            &events,
            Event::FinalTurnComplete {
                completed_turns: 0,
                alive_cells: board.alive_cells(),
            },
        )
        .await;
        emit(
            &events,
            Event::StateChange {
                completed_turns: 0,
                new_state: RunState::Quitting,
            },
        )
        .await;
        return Ok(());
    }

    let broker = RpcClient::connect(&config.broker_addr).await?;
    info!(broker = %config.broker_addr, turns = config.turns, "connected to broker");

    let run_request = RunGolRequest {
        board,
        current_turn: 0,
        turns: config.turns,
        threads: config.threads,
    };
    let (run_tx, mut run_rx) = oneshot::channel();
    let run_client = broker.clone();
    tokio::spawn(async move {
        let result = run_client
            .call::<_, RunGolResponse>(methods::BROKER_RUN_GOL, &run_request)
            .await;
        let _ = run_tx.send(result);
    });

    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + TICK_INTERVAL,
        TICK_INTERVAL,
    );
    let mut paused = false;
    let mut commands_open = true;

    loop {
        tokio::select! {
            finished = &mut run_rx => {
                let response = finished.map_err(|_| RpcError::ConnectionClosed)??;
                let filename =
                    write_snapshot(&config.output_dir, &response.board, response.current_turn)?;
                emit(&events, Event::ImageOutputComplete {
                    completed_turns: response.current_turn,
                    filename,
                }).await;
                emit(&events, Event::FinalTurnComplete {
                    completed_turns: response.current_turn,
                    alive_cells: response.board.alive_cells(),
                }).await;
                emit(&events, Event::StateChange {
                    completed_turns: response.current_turn,
                    new_state: RunState::Quitting,
                }).await;
                return Ok(());
            }

            _ = ticker.tick(), if !paused => {
                let count: AliveCellsCountResponse = broker
                    .call(methods::BROKER_COUNT_ALIVE_CELLS, &Empty {})
                    .await?;
                emit(&events, Event::AliveCellsCount {
                    completed_turns: count.current_turn,
                    cells_count: count.count,
                }).await;
            }

            command = commands.recv(), if commands_open => {
                let Some(command) = command else {
                    commands_open = false;
                    continue;
                };
                // While paused, only another Pause resumes; everything else
                // would park on the stalled ring.
                if paused && command != Command::Pause {
                    debug!(?command, "ignored while paused");
                    continue;
                }
                match command {
                    Command::Snapshot => {
                        let snapshot: CurrentWorldResponse =
                            broker.call(methods::BROKER_GET_WORLD, &Empty {}).await?;
                        let filename = write_snapshot(
                            &config.output_dir,
                            &snapshot.world,
                            snapshot.current_turn,
                        )?;
                        emit(&events, Event::ImageOutputComplete {
                            completed_turns: snapshot.current_turn,
                            filename,
                        }).await;
                    }
                    Command::Pause => {
                        let response: PauseResponse =
                            broker.call(methods::BROKER_PAUSE, &Empty {}).await?;
                        paused = !paused;
                        if !paused {
                            // Resuming right before a due tick would fire a
                            // stale census.
                            ticker.reset();
                        }
                        emit(&events, Event::StateChange {
                            completed_turns: response.current_turn,
                            new_state: if paused { RunState::Paused } else { RunState::Executing },
                        }).await;
                    }
                    Command::QuitLocal => {
                        let count: AliveCellsCountResponse = broker
                            .call(methods::BROKER_COUNT_ALIVE_CELLS, &Empty {})
                            .await?;
                        emit(&events, Event::StateChange {
                            completed_turns: count.current_turn,
                            new_state: RunState::Quitting,
                        }).await;
                        info!("quitting locally, broker left running");
                        return Ok(());
                    }
                    Command::QuitAll => {
                        let snapshot: CurrentWorldResponse =
                            broker.call(methods::BROKER_GET_WORLD, &Empty {}).await?;
                        let filename = write_snapshot(
                            &config.output_dir,
                            &snapshot.world,
                            snapshot.current_turn,
                        )?;
                        emit(&events, Event::ImageOutputComplete {
                            completed_turns: snapshot.current_turn,
                            filename,
                        }).await;
                        // The broker exits on Stop; a torn reply is expected.
                        let _ = broker.call::<_, Empty>(methods::BROKER_STOP, &Empty {}).await;
                        emit(&events, Event::StateChange {
                            completed_turns: snapshot.current_turn,
                            new_state: RunState::Quitting,
                        }).await;
                        info!("broker and workers stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn emit(events: &mpsc::Sender<Event>, event: Event) {
    if events.send(event).await.is_err() {
        debug!("event sink closed");
    }
}

fn write_snapshot(dir: &Path, board: &Board, turn: u32) -> Result<String, ControllerError> {
    let filename = pgm::snapshot_filename(board, turn);
    let mut file = BufWriter::new(File::create(dir.join(&filename))?);
    pgm::write(&mut file, board)?;
    info!(%filename, turn, "snapshot written");
    Ok(filename)
}
