//! `haloring controller` - drives a run interactively.
//!
//! Stdin lines map to command tokens:
//!
//! | line | command                                         |
//! |------|-------------------------------------------------|
//! | `s`  | snapshot the current world to a PGM file        |
//! | `p`  | toggle pause                                    |
//! | `q`  | quit the controller, leave the broker running   |
//! | `k`  | snapshot, then stop broker and workers, then quit |
//!
//! Events are printed to stdout as they arrive.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{info, warn};

use haloring::board::pgm;
use haloring::controller::{self, Command, ControllerConfig};
use haloring::logging;

use crate::error::CliError;

pub async fn run(
    image: PathBuf,
    turns: u32,
    threads: usize,
    broker: String,
    output_dir: PathBuf,
) -> Result<(), CliError> {
    let _guard = logging::init(logging::DEFAULT_LOG_DIR, "controller.log")
        .map_err(CliError::LoggingInit)?;

    let board = {
        let mut file = File::open(&image).map_err(|error| CliError::Image {
            path: image.display().to_string(),
            error: error.into(),
        })?;
        pgm::read(&mut file).map_err(|error| CliError::Image {
            path: image.display().to_string(),
            error,
        })?
    };
    info!(
        image = %image.display(),
        width = board.width(),
        height = board.height(),
        turns,
        threads,
        "board loaded"
    );

    let (command_tx, command_rx) = mpsc::channel(4);
    std::thread::spawn(move || read_commands(command_tx));

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{event}");
        }
    });

    let config = ControllerConfig {
        broker_addr: broker,
        turns,
        threads,
        output_dir,
    };
    let result = controller::run(config, board, command_rx, event_tx).await;
    let _ = printer.await;
    result.map_err(CliError::Controller)
}

/// Blocking stdin reader; runs on its own thread for the process lifetime.
fn read_commands(commands: mpsc::Sender<Command>) {
    let stdin = BufReader::new(std::io::stdin());
    for line in stdin.lines() {
        let Ok(line) = line else { break };
        let command = match line.trim() {
            "s" => Command::Snapshot,
            "p" => Command::Pause,
            "q" => Command::QuitLocal,
            "k" => Command::QuitAll,
            "" => continue,
            other => {
                warn!(input = other, "unrecognised command");
                continue;
            }
        };
        if commands.blocking_send(command).is_err() {
            break;
        }
    }
}
