use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Maximum frame size (100 MB), excluding the length prefix.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Stream id (8 bytes) plus kind (1 byte).
const HEADER_LEN: usize = 9;

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A request that expects a `Response` frame with the same stream id.
    Request = 1,
    /// A request that expects no reply.
    FireAndForget = 2,
    /// The reply to a `Request`.
    Response = 3,
    /// A transport-level failure for the stream id; the payload is a UTF-8 message.
    Error = 4,
}

impl TryFrom<u8> for FrameKind {
    type Error = RpcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameKind::Request),
            2 => Ok(FrameKind::FireAndForget),
            3 => Ok(FrameKind::Response),
            4 => Ok(FrameKind::Error),
            other => Err(RpcError::InvalidResponse(format!("Unknown frame kind: {}", other))),
        }
    }
}

/// A single message on a multiplexed byte stream.
///
/// # Wire Format
///
/// ```text
/// [4-byte length] [8-byte stream id] [1-byte kind] [payload]
/// ```
///
/// All integers are big-endian. The length counts everything after the
/// length prefix itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: u64,
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn request(stream_id: u64, payload: Vec<u8>) -> Self {
        Self {
            stream_id,
            kind: FrameKind::Request,
            payload,
        }
    }

    pub fn fire_and_forget(stream_id: u64, payload: Vec<u8>) -> Self {
        Self {
            stream_id,
            kind: FrameKind::FireAndForget,
            payload,
        }
    }

    pub fn response(stream_id: u64, payload: Vec<u8>) -> Self {
        Self {
            stream_id,
            kind: FrameKind::Response,
            payload,
        }
    }

    pub fn error(stream_id: u64, message: impl Into<String>) -> Self {
        Self {
            stream_id,
            kind: FrameKind::Error,
            payload: message.into().into_bytes(),
        }
    }

    /// Encodes the frame including its length prefix.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = HEADER_LEN + self.payload.len();
        if len > MAX_FRAME_SIZE {
            return Err(RpcError::InvalidRequest(format!(
                "Frame too large: {} bytes (max {} bytes)",
                len, MAX_FRAME_SIZE
            )));
        }

        let mut buf = Vec::with_capacity(4 + len);
        buf.extend_from_slice(&(len as u32).to_be_bytes());
        buf.extend_from_slice(&self.stream_id.to_be_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Writes one frame and flushes the writer.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = frame.encode()?;

    writer
        .write_all(&encoded)
        .await
        .map_err(|e| map_io_error(e, "writing frame"))?;

    writer
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between
/// frames. Frames longer than `max_frame_size` are rejected before their
/// body is allocated.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader
            .read(&mut len_buf[filled..])
            .await
            .map_err(|e| map_io_error(e, "reading length prefix"))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(RpcError::Connection(
                "reading length prefix: Connection lost".to_string(),
            ));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len < HEADER_LEN {
        return Err(RpcError::InvalidResponse(format!(
            "Frame too short: {} bytes (min {} bytes)",
            len, HEADER_LEN
        )));
    }
    if len > max_frame_size {
        return Err(RpcError::InvalidResponse(format!(
            "Frame too large: {} bytes (max {} bytes)",
            len, max_frame_size
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading frame"))?;

    let mut id_buf = [0u8; 8];
    id_buf.copy_from_slice(&buf[..8]);
    let stream_id = u64::from_be_bytes(id_buf);
    let kind = FrameKind::try_from(buf[8])?;
    let payload = buf.split_off(HEADER_LEN);

    Ok(Some(Frame { stream_id, kind, payload }))
}

/// Map IO errors to appropriate RpcError variants
///
/// - Lost connections -> `Connection`
/// - Other IO errors -> `Io`
fn map_io_error(err: std::io::Error, context: &str) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => {
            RpcError::Connection(format!("{}: Connection lost", context))
        }
        _ => RpcError::Io(err),
    }
}
