use std::fmt;
use std::sync::Arc;

use rpclink_common::transport::{Codec, JsonCodec};
use rpclink_common::{Address, Request, Response, Result, RpcError};
use serde_json::Value;

use crate::connector::Connection;
use crate::handle::ConnectionHandle;

/// Client channel returned by [`ClientTransport::create`](crate::ClientTransport::create).
///
/// Pairs a (possibly shared) connection handle with the codec. Creating a
/// channel never waits for the network: each send first waits for the
/// handle to resolve, then encodes, exchanges and decodes. If the connect
/// attempt behind the handle failed, every send fails with
/// [`RpcError::ConnectFailure`] and the original cause.
///
/// Channels are cheap to clone and hold no state of their own.
pub struct ClientChannel<C, K = JsonCodec> {
    handle: ConnectionHandle<C>,
    codec: Arc<K>,
}

impl<C: Connection, K: Codec> ClientChannel<C, K> {
    pub fn new(handle: ConnectionHandle<C>, codec: Arc<K>) -> Self {
        Self { handle, codec }
    }

    /// The address this channel talks to.
    pub fn address(&self) -> &Address {
        self.handle.address()
    }

    /// The cached attempt this channel sends over. Channels created for the
    /// same address on the same shard share it until it is evicted.
    pub fn handle(&self) -> &ConnectionHandle<C> {
        &self.handle
    }

    /// Waits for the underlying connection.
    pub async fn connection(&self) -> Result<Arc<C>> {
        self.handle.connection().await
    }

    /// Sends a request and waits for its response.
    ///
    /// If the request carries `timeout_ms`, the whole exchange (including
    /// waiting for the connection) is bounded by it.
    ///
    /// # Errors
    ///
    /// - [`RpcError::ConnectFailure`] if the connection could not be established
    /// - [`RpcError::Timeout`] if the request's timeout elapsed first
    /// - [`RpcError::InvalidResponse`] if the reply does not decode or answers
    ///   another request
    pub async fn request_response(&self, request: &Request) -> Result<Response> {
        let Some(timeout) = request.timeout() else {
            return self.exchange(request).await;
        };
        tokio::time::timeout(timeout, self.exchange(request))
            .await
            .map_err(|_| RpcError::Timeout(timeout.as_millis() as u64))?
    }

    /// Sends a request without waiting for any reply.
    pub async fn fire_and_forget(&self, request: &Request) -> Result<()> {
        let connection = self.handle.connection().await?;
        let payload = self.codec.encode_request(request)?;
        connection.fire_and_forget(payload).await
    }

    /// Calls `method` on the peer and returns its result.
    ///
    /// # Arguments
    ///
    /// * `method` - Name of the remote method
    /// * `args` - Arguments passed to it as JSON
    ///
    /// # Returns
    ///
    /// The method's result, or [`RpcError::Remote`] if the peer reported a
    /// failure.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use rpclink_client::{ClientTransport, ClientTransportConfig, MemoryConnector};
    /// # use rpclink_common::{transport::JsonCodec, Address};
    /// # use serde_json::json;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> rpclink_common::Result<()> {
    /// # let transport = ClientTransport::new(
    /// #     MemoryConnector::echo(),
    /// #     JsonCodec,
    /// #     ClientTransportConfig::default(),
    /// # )?;
    /// let channel = transport.create(Address::new("echo", 4801));
    /// let sum = channel.call("echo", json!([1, 2])).await?;
    /// assert_eq!(sum, json!([1, 2]));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call(&self, method: impl Into<String>, args: Value) -> Result<Value> {
        let request = Request::new(method, args);
        self.request_response(&request).await?.into_result()
    }

    async fn exchange(&self, request: &Request) -> Result<Response> {
        let connection = self.handle.connection().await?;

        let payload = self.codec.encode_request(request)?;
        let reply = connection.request_response(payload).await?;
        let response = self.codec.decode_response(&reply)?;

        if response.id != request.id {
            return Err(RpcError::InvalidResponse(format!(
                "Response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        Ok(response)
    }
}

impl<C, K> Clone for ClientChannel<C, K> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<C, K> fmt::Debug for ClientChannel<C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientChannel")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
