//! Message codecs.
//!
//! A codec turns [`Request`]s and [`Response`]s into the opaque payloads a
//! connection carries, and back. Connections never look inside payloads, so
//! the client channel is the only place a codec is applied.

use crate::protocol::{Request, Response, Result, RpcError};

/// Encodes and decodes protocol messages.
///
/// Decoding failures are reported as [`RpcError::InvalidRequest`] or
/// [`RpcError::InvalidResponse`] so that callers can tell a peer speaking
/// the wrong format apart from a local serialization problem.
pub trait Codec: Send + Sync + 'static {
    fn encode_request(&self, request: &Request) -> Result<Vec<u8>>;

    fn decode_request(&self, data: &[u8]) -> Result<Request>;

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>>;

    fn decode_response(&self, data: &[u8]) -> Result<Response>;
}

/// JSON codec.
///
/// # Example
///
/// ```
/// use rpclink_common::transport::{Codec, JsonCodec};
/// use rpclink_common::Request;
/// use serde_json::json;
///
/// let request = Request::new("sum", json!([1, 2, 3]));
/// let payload = JsonCodec.encode_request(&request).unwrap();
/// assert_eq!(JsonCodec.decode_request(&payload).unwrap(), request);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    fn decode_request(&self, data: &[u8]) -> Result<Request> {
        serde_json::from_slice(data)
            .map_err(|e| RpcError::InvalidRequest(format!("Undecodable request: {}", e)))
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    fn decode_response(&self, data: &[u8]) -> Result<Response> {
        serde_json::from_slice(data)
            .map_err(|e| RpcError::InvalidResponse(format!("Undecodable response: {}", e)))
    }
}
