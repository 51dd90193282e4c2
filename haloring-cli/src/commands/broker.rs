//! `haloring broker` - orchestrates the worker ring.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use haloring::broker::{Broker, BrokerConfig};
use haloring::logging;
use haloring::rpc;

use crate::error::CliError;

pub async fn run(port: u16, node: usize) -> Result<(), CliError> {
    let _guard = logging::init(logging::DEFAULT_LOG_DIR, "broker.log")
        .map_err(CliError::LoggingInit)?;

    let config = BrokerConfig::default()
        .with_port(port)
        .with_max_nodes(node);

    let listener = rpc::bind(config.port)
        .await
        .map_err(|error| CliError::Bind { port, error })?;

    let shutdown = CancellationToken::new();
    let broker = Arc::new(Broker::new(config, shutdown.clone()));
    info!(port, max_nodes = node, "broker started");

    // Returns once Broker.Stop cancels the token.
    rpc::serve(listener, broker, shutdown)
        .await
        .map_err(CliError::Serve)?;
    info!("broker exited");
    Ok(())
}
