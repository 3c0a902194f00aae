//! rpclink Transport Layer
//!
//! Codec and framing shared by every transport implementation.
//!
//! # Components
//!
//! - **[`Codec`]**: the encode/decode seam used by client channels, and
//!   **[`JsonCodec`]**, its JSON implementation
//! - **[`Frame`]**, [`read_frame`], [`write_frame`]: length-prefixed frames that
//!   carry a stream id so many exchanges can share one byte stream
//!
//! # Example
//!
//! ```
//! use rpclink_common::transport::{read_frame, write_frame, Frame, MAX_FRAME_SIZE};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rpclink_common::Result<()> {
//! let (mut client, mut server) = tokio::io::duplex(1024);
//!
//! write_frame(&mut client, &Frame::request(7, b"ping".to_vec())).await?;
//! let frame = read_frame(&mut server, MAX_FRAME_SIZE).await?.unwrap();
//! assert_eq!(frame.stream_id, 7);
//! assert_eq!(frame.payload, b"ping");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod frame;

pub use codec::{Codec, JsonCodec};
pub use frame::{read_frame, write_frame, Frame, FrameKind, MAX_FRAME_SIZE};

#[cfg(test)]
mod tests;
