//! `haloring worker` - computes one stripe of the board.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use haloring::logging;
use haloring::rpc;
use haloring::worker::Worker;

use crate::error::CliError;

pub async fn run(port: u16) -> Result<(), CliError> {
    let _guard = logging::init(logging::DEFAULT_LOG_DIR, &format!("worker-{port}.log"))
        .map_err(CliError::LoggingInit)?;

    let listener = rpc::bind(port)
        .await
        .map_err(|error| CliError::Bind { port, error })?;

    let shutdown = CancellationToken::new();
    let worker = Arc::new(Worker::new(shutdown.clone()));
    info!(port, "worker started");

    // Returns once Worker.Stop cancels the token.
    rpc::serve(listener, worker, shutdown)
        .await
        .map_err(CliError::Serve)?;
    info!("worker exited");
    Ok(())
}
