//! RPC server loop.
//!
//! One task per connection, one task per request. Handlers that park for a
//! long time (a worker's halo fetch waits for the generation loop's
//! readiness token) must not stop later frames on the same connection from
//! being read, so dispatch never runs on the read path.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frame::{self, RequestFrame, ResponseFrame};

/// Outbound response queue depth per connection.
const RESPONSE_QUEUE_DEPTH: usize = 32;

/// A dispatchable RPC endpoint.
///
/// Implementations map a method name plus raw params to a result value or
/// an error string; the string is what the remote caller sees.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, String>;
}

/// Decodes handler params, mapping failures to a wire error string.
pub fn params<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|error| format!("invalid params: {error}"))
}

/// Encodes a handler result, mapping failures to a wire error string.
pub fn to_result<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|error| format!("invalid result: {error}"))
}

/// Binds a listener on all interfaces.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Accepts connections until `shutdown` fires.
pub async fn serve<S: RpcService>(
    listener: TcpListener,
    service: Arc<S>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let local = listener.local_addr()?;
    info!(addr = %local, "rpc server listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!(peer = %peer, "rpc connection accepted");
                let service = Arc::clone(&service);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    handle_connection(stream, service, shutdown).await;
                });
            }
        }
    }

    info!(addr = %local, "rpc server stopped");
    Ok(())
}

async fn handle_connection<S: RpcService>(
    stream: TcpStream,
    service: Arc<S>,
    shutdown: CancellationToken,
) {
    if let Err(error) = stream.set_nodelay(true) {
        warn!(error = %error, "failed to set nodelay");
    }
    let (read_half, mut write_half) = stream.into_split();

    // Responses funnel through one writer task so concurrent request tasks
    // never interleave bytes of different frames. The writer drains until
    // the last sender is gone, which keeps a Stop reply from being cut off.
    let (response_tx, mut response_rx) = mpsc::channel::<String>(RESPONSE_QUEUE_DEPTH);
    let writer = tokio::spawn(async move {
        while let Some(line) = response_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut requests = tokio::task::JoinSet::new();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    loop {
        while requests.try_join_next().is_some() {}

        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            request = frame::read_frame::<_, RequestFrame>(&mut reader, &mut buf) => request,
        };
        let request = match request {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(error) => {
                warn!(error = %error, "dropping connection on malformed frame");
                break;
            }
        };

        let service = Arc::clone(&service);
        let response_tx = response_tx.clone();
        requests.spawn(async move {
            let RequestFrame { id, method, params } = request;
            let response = match service.dispatch(&method, params).await {
                Ok(result) => ResponseFrame::ok(id, result),
                Err(error) => {
                    debug!(method = %method, error = %error, "handler returned error");
                    ResponseFrame::err(id, error)
                }
            };
            match frame::encode(&response) {
                Ok(line) => {
                    let _ = response_tx.send(line).await;
                }
                Err(error) => warn!(error = %error, "failed to encode response"),
            }
        });
    }

    // The caller is gone: nobody can receive replies, and a handler from a
    // dead caller parked on a worker rendezvous must not consume a token
    // meant for a live one.
    requests.abort_all();
    drop(response_tx);
    let _ = writer.await;
}
