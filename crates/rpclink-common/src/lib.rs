//! rpclink Common Types and Transport Framing
//!
//! This crate provides the protocol definitions, codec and wire framing
//! shared by the rpclink client and by anything that talks to it.
//!
//! # Overview
//!
//! - **Protocol Layer**: [`Address`], [`Request`]/[`Response`] and the
//!   [`RpcError`] type used across the workspace
//! - **Transport Layer**: the [`Codec`](transport::Codec) trait with its JSON
//!   implementation, and the length-prefixed multiplexing frames used by the
//!   TCP transport
//!
//! # Wire Format
//!
//! - **Serialization**: JSON
//! - **Frame**: `[4-byte length as u32 big-endian] [8-byte stream id] [1-byte kind] [payload]`
//! - **Max Frame Size**: 100 MB
//!
//! # Example
//!
//! ```
//! use rpclink_common::{Address, Request, Response};
//! use serde_json::json;
//!
//! let address: Address = "127.0.0.1:4801".parse().unwrap();
//! let request = Request::new("compute", json!({"n": 1000})).with_timeout(5000);
//! let response = Response::success(request.id, json!({"result": 42}));
//! assert_eq!(address.port, 4801);
//! assert!(response.is_success());
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
