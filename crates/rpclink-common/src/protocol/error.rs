use std::sync::Arc;

use thiserror::Error;

use super::Address;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection attempt to `address` failed. Every sender that was
    /// waiting on that attempt observes the same cause.
    #[error("Connect failed on {address}: {cause}")]
    ConnectFailure {
        address: Address,
        #[source]
        cause: Arc<RpcError>,
    },

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl RpcError {
    /// Returns true if this error means the connection itself is gone, as
    /// opposed to a single exchange failing.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            RpcError::Connection(_)
                | RpcError::ConnectionClosed(_)
                | RpcError::ConnectFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
