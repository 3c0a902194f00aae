//! rpclink Client Connection Manager
//!
//! [`ClientTransport::create`] turns an [`Address`](rpclink_common::Address)
//! into a [`ClientChannel`] without blocking. Behind it, a sharded
//! [`ConnectionCache`] keeps at most one connection attempt or live
//! connection per address and shard: concurrent callers share the attempt
//! in flight, a failed attempt is evicted so the next `create` dials again,
//! and a live connection is evicted as soon as it closes.
//!
//! Connections come from a [`Connector`]. Two are provided:
//!
//! - [`TcpConnector`]: multiplexed, length-prefixed frames over TCP
//! - [`MemoryConnector`]: in-process peers, for tests and local wiring
//!
//! # Example
//!
//! ```rust
//! use rpclink_client::{ClientTransport, ClientTransportConfig, MemoryConnector};
//! use rpclink_common::transport::JsonCodec;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> rpclink_common::Result<()> {
//! let transport = ClientTransport::new(
//!     MemoryConnector::echo(),
//!     JsonCodec,
//!     ClientTransportConfig::default(),
//! )?;
//!
//! let channel = transport.create("127.0.0.1:4801".parse()?);
//! let echoed = channel.call("echo", json!({"n": 1})).await?;
//! assert_eq!(echoed, json!({"n": 1}));
//! assert_eq!(transport.cached_connections(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod channel;
pub mod connector;
mod establisher;
pub mod handle;
pub mod memory;
pub mod signal;
pub mod tcp;
pub mod transport;

pub use cache::{ConnectionCache, ShardPolicy};
pub use channel::ClientChannel;
pub use connector::{Connection, Connector};
pub use handle::{ConnectionHandle, HandleState};
pub use memory::{MemoryConnection, MemoryConnector};
pub use signal::CloseSignal;
pub use tcp::{TcpConnection, TcpConnector, TcpConnectorConfig};
pub use transport::{ClientTransport, ClientTransportConfig};
