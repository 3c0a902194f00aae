//! Responses returned over a client channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{Result, RpcError};
use super::requests::RequestId;

/// What the peer made of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The method ran and returned this value.
    Result(Value),
    /// The method failed on the peer with this message.
    Error(String),
}

/// Answer to the [`Request`](super::Request) with the same `id`.
///
/// The outcome is flattened into the object, so on the wire a response is
/// either `{"id": 7, "result": ...}` or `{"id": 7, "error": "..."}`. A
/// response cannot claim success and carry no result.
///
/// # Example
///
/// ```
/// use rpclink_common::{Response, RpcError};
/// use serde_json::json;
///
/// let ok = Response::success(7, json!({"pi": 3.14159}));
/// assert_eq!(ok.into_result().unwrap(), json!({"pi": 3.14159}));
///
/// let failed = Response::error(7, "division by zero");
/// assert!(matches!(failed.into_result(), Err(RpcError::Remote(_))));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Error(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    /// Converts the response into the method's return value.
    ///
    /// # Errors
    ///
    /// A remote failure becomes [`RpcError::Remote`] with the peer's message.
    pub fn into_result(self) -> Result<Value> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(message) => Err(RpcError::Remote(message)),
        }
    }
}
