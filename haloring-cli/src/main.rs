//! Haloring CLI.
//!
//! One binary, three roles:
//!
//! - `haloring broker` - listens for a controller and orchestrates the ring
//! - `haloring worker` - computes one stripe of the board
//! - `haloring controller` - loads a PGM board, drives a run interactively
//!
//! Each process initialises its own log file under `logs/`; verbosity is
//! controlled with `RUST_LOG`.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use error::CliError;

#[derive(Parser)]
#[command(name = "haloring")]
#[command(version = haloring::VERSION)]
#[command(about = "Distributed Game of Life over a ring of halo-exchange workers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broker that partitions boards across workers
    Broker {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Maximum number of workers to connect
        #[arg(long = "node", default_value_t = 4)]
        node: usize,
    },

    /// Run a stripe worker
    Worker {
        /// Port to listen on
        #[arg(long, default_value_t = 8081)]
        port: u16,
    },

    /// Run the interactive controller
    Controller {
        /// Initial board as a binary PGM file
        #[arg(long)]
        image: PathBuf,

        /// Number of generations to run
        #[arg(long)]
        turns: u32,

        /// Compute tasks per worker
        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Broker address
        #[arg(long, default_value = "127.0.0.1:8080")]
        broker: String,

        /// Directory snapshot files are written into
        #[arg(long, default_value = "out")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Broker { port, node } => commands::broker::run(port, node).await,
        Commands::Worker { port } => commands::worker::run(port).await,
        Commands::Controller {
            image,
            turns,
            threads,
            broker,
            output_dir,
        } => commands::controller::run(image, turns, threads, broker, output_dir).await,
    };

    if let Err(e) = result {
        e.exit();
    }
}
