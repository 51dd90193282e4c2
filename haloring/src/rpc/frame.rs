//! Line-delimited JSON frames.
//!
//! Every message is one JSON object on one line. Requests carry an `id` the
//! caller chose; the matching response echoes it, which is what lets many
//! calls share a connection out of order.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::RpcError;

/// A method invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// The reply to a [`RequestFrame`] with the same `id`.
///
/// Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Encodes a frame as a single newline-terminated line.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

/// Writes one frame and flushes it.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode(frame)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame; `Ok(None)` on a clean EOF.
pub async fn read_frame<R, T>(reader: &mut R, buf: &mut String) -> Result<Option<T>, RpcError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    buf.clear();
    if reader.read_line(buf).await? == 0 {
        return Ok(None);
    }
    let frame = serde_json::from_str(buf.trim_end())?;
    Ok(Some(frame))
}
