//! The seam between the connection manager and a concrete transport.
//!
//! A [`Connector`] knows how to open a connection to an [`Address`]; the
//! [`Connection`] it yields carries opaque, already-encoded payloads and
//! reports its own termination through [`Connection::closed`]. The connection
//! manager never looks inside payloads and never decides when a connection
//! is dead: both belong to the implementation of these traits.

use std::future::Future;

use rpclink_common::{Address, Result};

/// Opens connections. This is the transport factory consumed by
/// [`ClientTransport`](crate::ClientTransport).
///
/// `connect` is invoked exactly once per connection attempt. Any connect
/// timeout is the connector's business.
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(&self, address: &Address) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// An established connection.
pub trait Connection: Send + Sync + 'static {
    /// Sends `payload` and waits for the correlated reply.
    fn request_response(&self, payload: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Sends `payload` without waiting for any reply.
    fn fire_and_forget(&self, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Resolves once the connection has terminated.
    ///
    /// `Ok(())` means an orderly close from either side, `Err` a transport
    /// failure after the connection was open. May be awaited any number of
    /// times; every call observes the same outcome.
    fn closed(&self) -> impl Future<Output = Result<()>> + Send;

    /// Closes the connection. Calling it more than once has no further effect.
    fn close(&self);

    fn is_open(&self) -> bool;
}
