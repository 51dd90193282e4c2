//! Error type for the RPC transport.

use thiserror::Error;

/// Errors surfaced by [`crate::rpc::RpcClient`] calls and the server loop.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport-level failure (dial, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The peer went away with calls still in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote handler returned an error string.
    ///
    /// Protocol sentinels such as `"broker closed"` and `"server not sync"`
    /// travel through this variant verbatim.
    #[error("{0}")]
    Remote(String),
}

impl RpcError {
    /// The remote error string, if this is a [`RpcError::Remote`].
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            RpcError::Remote(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_display_is_bare_message() {
        let err = RpcError::Remote("server not sync".to_string());
        assert_eq!(err.to_string(), "server not sync");
        assert_eq!(err.remote_message(), Some("server not sync"));
    }

    #[test]
    fn test_connection_closed_has_no_remote_message() {
        assert!(RpcError::ConnectionClosed.remote_message().is_none());
    }
}
