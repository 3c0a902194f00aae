//! Requests sent over a client channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ties a [`Response`](super::Response) to the request it answers.
pub type RequestId = u64;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// A method call on the remote peer.
///
/// `timeout_ms` never reaches the peer's scheduling: the client channel uses
/// it to bound the whole exchange, including the wait for a connection that
/// is still being established.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rpclink_common::Request;
/// use serde_json::json;
///
/// let request = Request::new("resize", json!({"width": 640})).with_timeout(250);
/// assert_eq!(request.timeout(), Some(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    /// Omitted args decode as `null`.
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Request {
    /// Creates a request with an id from [`next_request_id`].
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            id: next_request_id(),
            method: method.into(),
            args,
            timeout_ms: None,
        }
    }

    /// Replaces the generated id.
    ///
    /// Useful when a caller resends a request and wants the peer to see the
    /// same id both times.
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Returns a request id that no other call in this process has returned.
///
/// Ids start at 1 and only grow, so 0 can be used as a placeholder by peers
/// that answer without having parsed a request.
pub fn next_request_id() -> RequestId {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}
