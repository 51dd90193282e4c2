//! Multiplexing RPC client.
//!
//! One TCP connection carries any number of in-flight calls. A background
//! reader task routes responses to waiting callers by id, so a long-running
//! call (a worker's `RunServer` can take minutes) never blocks a quick one
//! (a halo fetch) on the same connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::frame::{self, RequestFrame, ResponseFrame};
use super::RpcError;

/// Outbound line queue depth per connection.
const WRITE_QUEUE_DEPTH: usize = 32;

/// A handle to one RPC connection.
///
/// Cloning is cheap; clones share the connection and its in-flight table.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientShared>,
}

struct ClientShared {
    peer: String,
    write_tx: mpsc::Sender<String>,
    pending: DashMap<u64, oneshot::Sender<ResponseFrame>>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl RpcClient {
    /// Dials `addr` and spawns the connection's reader and writer tasks.
    pub async fn connect(addr: &str) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = addr, "rpc connection established");

        let (read_half, mut write_half) = stream.into_split();
        let (write_tx, mut write_rx) = mpsc::channel::<String>(WRITE_QUEUE_DEPTH);

        let inner = Arc::new(ClientShared {
            peer: addr.to_string(),
            write_tx,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: CancellationToken::new(),
        });

        tokio::spawn(async move {
            while let Some(line) = write_rx.recv().await {
                if let Err(error) = write_half.write_all(line.as_bytes()).await {
                    warn!(error = %error, "rpc write failed");
                    break;
                }
            }
        });

        let shared = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut buf = String::new();
            loop {
                match frame::read_frame::<_, ResponseFrame>(&mut reader, &mut buf).await {
                    Ok(Some(response)) => {
                        trace!(id = response.id, "rpc response received");
                        if let Some((_, reply)) = shared.pending.remove(&response.id) {
                            let _ = reply.send(response);
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        warn!(peer = %shared.peer, error = %error, "rpc read failed");
                        break;
                    }
                }
            }
            // Wake every caller, including any that registers after this
            // point; the token closes the whole handle for good.
            shared.closed.cancel();
            shared.pending.clear();
            debug!(peer = %shared.peer, "rpc connection closed");
        });

        Ok(Self { inner })
    }

    /// The address this client was dialled against.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// Invokes `method` and waits for its typed response.
    ///
    /// A remote handler error comes back as [`RpcError::Remote`]; a dead
    /// connection as [`RpcError::ConnectionClosed`].
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if self.inner.closed.is_cancelled() {
            return Err(RpcError::ConnectionClosed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RequestFrame {
            id,
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        let line = frame::encode(&request)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.pending.insert(id, reply_tx);
        if self.inner.write_tx.send(line).await.is_err() {
            self.inner.pending.remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        let response = tokio::select! {
            response = reply_rx => response.map_err(|_| RpcError::ConnectionClosed)?,
            _ = self.inner.closed.cancelled() => return Err(RpcError::ConnectionClosed),
        };

        if let Some(message) = response.error {
            return Err(RpcError::Remote(message));
        }
        let result = response.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(result)?)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("peer", &self.inner.peer)
            .finish()
    }
}
