//! TCP connector.
//!
//! One [`TcpConnection`] carries any number of concurrent exchanges: every
//! request gets its own stream id, a background reader task routes each
//! `Response` frame back to the request that is waiting for it, and writes
//! are serialized through a mutex on the write half.
//!
//! # Wire Protocol
//!
//! See [`rpclink_common::transport::Frame`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rpclink_common::transport::{read_frame, write_frame, Frame, FrameKind, MAX_FRAME_SIZE};
use rpclink_common::{Address, Result, RpcError};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::AbortHandle;

use crate::connector::{Connection, Connector};
use crate::signal::CloseSignal;

/// TCP connector configuration.
///
/// # Default Configuration
///
/// - `connect_timeout_ms`: 5000 (per resolved socket address)
/// - `nodelay`: true
/// - `max_frame_size`: 100 MB
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConnectorConfig {
    /// Timeout for each TCP connect, in milliseconds
    pub connect_timeout_ms: u64,
    /// Whether to set `TCP_NODELAY` on new connections
    pub nodelay: bool,
    /// Largest frame accepted from the peer
    pub max_frame_size: usize,
}

impl Default for TcpConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            nodelay: true,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Opens multiplexed TCP connections.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TcpConnectorConfig,
}

impl TcpConnector {
    /// Creates a connector.
    ///
    /// # Arguments
    ///
    /// * `config` - Connect timeout, `TCP_NODELAY` and frame size limit
    ///
    /// # Example
    ///
    /// ```
    /// use rpclink_client::{TcpConnector, TcpConnectorConfig};
    ///
    /// let connector = TcpConnector::new(TcpConnectorConfig {
    ///     connect_timeout_ms: 1000,
    ///     ..Default::default()
    /// });
    /// assert!(connector.config().nodelay);
    /// ```
    pub fn new(config: TcpConnectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConnectorConfig {
        &self.config
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    /// Resolves `address` and tries each resolved socket address until one
    /// connects.
    async fn connect(&self, address: &Address) -> Result<TcpConnection> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let socket_addrs = tokio::net::lookup_host((address.host.as_str(), address.port))
            .await
            .map_err(|e| RpcError::Connection(format!("Invalid address '{}': {}", address, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    if self.config.nodelay {
                        stream.set_nodelay(true).map_err(|e| {
                            RpcError::Connection(format!("Failed to set TCP_NODELAY: {}", e))
                        })?;
                    }
                    tracing::debug!(%address, %socket_addr, "TCP connection established");
                    return Ok(TcpConnection::start(
                        stream,
                        address.clone(),
                        self.config.max_frame_size,
                    ));
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => {
                    last_err = Some(format!("timed out after {}ms", self.config.connect_timeout_ms))
                }
            }
        }

        Err(RpcError::Connection(format!(
            "Failed to connect to {}: {}",
            address,
            last_err.unwrap_or_else(|| "no socket addresses resolved".to_string())
        )))
    }
}

type PendingReplies = DashMap<u64, oneshot::Sender<Result<Vec<u8>>>>;

/// A multiplexed TCP connection made by [`TcpConnector`].
pub struct TcpConnection {
    address: Address,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    pending: Arc<PendingReplies>,
    next_stream_id: AtomicU64,
    signal: CloseSignal,
    reader: AbortHandle,
}

impl TcpConnection {
    fn start(stream: TcpStream, address: Address, max_frame_size: usize) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending = Arc::new(PendingReplies::new());
        let signal = CloseSignal::new();

        let reader = tokio::spawn(read_loop(
            read_half,
            pending.clone(),
            signal.clone(),
            address.clone(),
            max_frame_size,
        ))
        .abort_handle();

        Self {
            address,
            writer: Arc::new(Mutex::new(write_half)),
            pending,
            next_stream_id: AtomicU64::new(1),
            signal,
            reader,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Number of requests still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        if !self.signal.is_open() {
            return Err(RpcError::ConnectionClosed(self.address.to_string()));
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = write_frame(&mut *writer, frame).await {
            drop(writer);
            self.terminate(Some(e.to_string()));
            return Err(e);
        }
        Ok(())
    }

    fn terminate(&self, failure: Option<String>) {
        match failure {
            Some(reason) => self.signal.fail(reason),
            None => self.signal.close(),
        };
        self.reader.abort();
        fail_pending(&self.pending, &self.address);
    }
}

impl Connection for TcpConnection {
    async fn request_response(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.pending.insert(stream_id, tx);
        let _pending = PendingGuard {
            pending: &self.pending,
            stream_id,
        };

        // The reader may have drained the table just before the insert.
        if !self.signal.is_open() {
            return Err(RpcError::ConnectionClosed(self.address.to_string()));
        }

        self.send(&Frame::request(stream_id, payload)).await?;

        rx.await
            .map_err(|_| RpcError::ConnectionClosed(self.address.to_string()))?
    }

    async fn fire_and_forget(&self, payload: Vec<u8>) -> Result<()> {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        self.send(&Frame::fire_and_forget(stream_id, payload)).await
    }

    async fn closed(&self) -> Result<()> {
        self.signal.closed().await
    }

    fn close(&self) {
        if !self.signal.is_open() {
            return;
        }
        self.terminate(None);

        let writer = self.writer.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = writer.lock().await.shutdown().await;
            });
        }
    }

    fn is_open(&self) -> bool {
        self.signal.is_open()
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("address", &self.address)
            .field("open", &self.is_open())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Removes a request's reply slot when the request finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    stream_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.stream_id);
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: Arc<PendingReplies>,
    signal: CloseSignal,
    address: Address,
    max_frame_size: usize,
) {
    loop {
        match read_frame(&mut reader, max_frame_size).await {
            Ok(Some(frame)) => dispatch(&pending, frame, &address),
            Ok(None) => {
                tracing::debug!(%address, "Peer closed connection");
                signal.close();
                break;
            }
            Err(e) => {
                tracing::debug!(%address, error = %e, "Connection read failed");
                signal.fail(e.to_string());
                break;
            }
        }
    }

    fail_pending(&pending, &address);
}

fn dispatch(pending: &PendingReplies, frame: Frame, address: &Address) {
    match frame.kind {
        FrameKind::Response => match pending.remove(&frame.stream_id) {
            Some((_, reply)) => {
                let _ = reply.send(Ok(frame.payload));
            }
            None => tracing::debug!(
                %address,
                stream_id = frame.stream_id,
                "Dropping response for unknown stream"
            ),
        },
        FrameKind::Error => {
            if let Some((_, reply)) = pending.remove(&frame.stream_id) {
                let message = String::from_utf8_lossy(&frame.payload).into_owned();
                let _ = reply.send(Err(RpcError::Transport(message)));
            }
        }
        FrameKind::Request | FrameKind::FireAndForget => {
            tracing::warn!(%address, kind = ?frame.kind, "Ignoring request frame sent by server");
        }
    }
}

fn fail_pending(pending: &PendingReplies, address: &Address) {
    let stream_ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for stream_id in stream_ids {
        if let Some((_, reply)) = pending.remove(&stream_id) {
            let _ = reply.send(Err(RpcError::ConnectionClosed(address.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_config_defaults() {
        let config = TcpConnectorConfig::default();
        assert_eq!(config.connect_timeout_ms, 5000);
        assert!(config.nodelay);
        assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TcpConnectorConfig =
            serde_json::from_str(r#"{"connect_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.connect_timeout_ms, 250);
        assert!(config.nodelay);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::from(listener.local_addr().unwrap());
        drop(listener);

        let err = TcpConnector::default().connect(&address).await.unwrap_err();
        assert!(matches!(err, RpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let address = Address::new("host.invalid", 1);
        let err = TcpConnector::default().connect(&address).await.unwrap_err();
        assert!(matches!(err, RpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_peer_hangup_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::from(listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let connection = TcpConnector::default().connect(&address).await.unwrap();
        connection.closed().await.unwrap();

        assert!(!connection.is_open());
        assert!(matches!(
            connection.request_response(b"late".to_vec()).await,
            Err(RpcError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_error_frame_fails_only_its_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::from(listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            while let Ok(Some(frame)) = read_frame(&mut stream, MAX_FRAME_SIZE).await {
                let reply = if frame.payload == b"bad" {
                    Frame::error(frame.stream_id, "rejected")
                } else {
                    Frame::response(frame.stream_id, frame.payload)
                };
                if write_frame(&mut stream, &reply).await.is_err() {
                    break;
                }
            }
        });

        let connection = TcpConnector::default().connect(&address).await.unwrap();

        let err = connection.request_response(b"bad".to_vec()).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(message) if message == "rejected"));

        let reply = connection.request_response(b"good".to_vec()).await.unwrap();
        assert_eq!(reply, b"good");
        assert!(connection.is_open());
        assert_eq!(connection.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_waiting_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::from(listener.local_addr().unwrap());
        tokio::spawn(async move {
            // Accept and never answer.
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let connection = Arc::new(TcpConnector::default().connect(&address).await.unwrap());
        let waiting = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request_response(b"hello".to_vec()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        connection.close();

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(RpcError::ConnectionClosed(_))));
        assert!(connection.closed().await.is_ok());
    }
}
