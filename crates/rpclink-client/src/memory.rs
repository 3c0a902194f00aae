//! In-memory connector.
//!
//! This module provides [`MemoryConnector`] for testing and local development
//! without a network. Payloads are answered in-process by a responder
//! closure, and the connector keeps enough bookkeeping to simulate refused
//! connections and connections that close or fail later.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rpclink_common::transport::{Codec, JsonCodec};
use rpclink_common::{Address, Response, Result, RpcError};

use crate::connector::{Connection, Connector};
use crate::signal::CloseSignal;

type Responder = Arc<dyn Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    attempts: AtomicUsize,
    accepted: AtomicUsize,
    one_way: AtomicUsize,
    refused: DashMap<Address, String>,
    live: DashMap<Address, Vec<CloseSignal>>,
}

/// Connector that answers in-process.
///
/// Clones share their counters and their view of live connections, so a test
/// can hand one clone to a [`ClientTransport`](crate::ClientTransport) and
/// inspect or disturb the connections through another.
#[derive(Clone)]
pub struct MemoryConnector {
    responder: Responder,
    connect_delay: Duration,
    state: Arc<MemoryState>,
}

impl MemoryConnector {
    /// Creates a connector whose connections answer every request payload
    /// with `responder(payload)`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            connect_delay: Duration::ZERO,
            state: Arc::new(MemoryState::default()),
        }
    }

    /// Creates a connector that answers each JSON request with a successful
    /// response whose result is the request's args.
    pub fn echo() -> Self {
        Self::new(|payload| {
            let request = JsonCodec.decode_request(&payload)?;
            JsonCodec.encode_response(&Response::success(request.id, request.args))
        })
    }

    /// Delays every connect by `delay` before it succeeds or fails.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Makes connects to `address` fail with `reason` until [`accept`](Self::accept) is called.
    pub fn refuse(&self, address: &Address, reason: impl Into<String>) {
        self.state.refused.insert(address.clone(), reason.into());
    }

    pub fn accept(&self, address: &Address) {
        self.state.refused.remove(address);
    }

    /// Number of times `connect` was called.
    pub fn connect_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Number of connects that succeeded.
    pub fn accepted_connections(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Number of fire-and-forget payloads received.
    pub fn one_way_messages(&self) -> usize {
        self.state.one_way.load(Ordering::SeqCst)
    }

    /// Number of connections to `address` that are still open.
    pub fn live_connections(&self, address: &Address) -> usize {
        self.state
            .live
            .get(address)
            .map(|signals| signals.iter().filter(|s| s.is_open()).count())
            .unwrap_or(0)
    }

    /// Closes every open connection to `address` as if the peer hung up.
    /// Returns how many were closed.
    pub fn close_connections(&self, address: &Address) -> usize {
        self.terminate(address, |signal| signal.close())
    }

    /// Fails every open connection to `address` with a transport error.
    /// Returns how many were failed.
    pub fn fail_connections(&self, address: &Address, reason: &str) -> usize {
        self.terminate(address, |signal| signal.fail(reason))
    }

    fn terminate(&self, address: &Address, fire: impl Fn(&CloseSignal) -> bool) -> usize {
        match self.state.live.remove(address) {
            Some((_, signals)) => signals.iter().filter(|signal| fire(signal)).count(),
            None => 0,
        }
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::echo()
    }
}

impl fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("connect_delay", &self.connect_delay)
            .field("attempts", &self.connect_attempts())
            .field("accepted", &self.accepted_connections())
            .finish_non_exhaustive()
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, address: &Address) -> Result<MemoryConnection> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if let Some(reason) = self.state.refused.get(address) {
            return Err(RpcError::Connection(format!(
                "Connection refused by {}: {}",
                address,
                reason.value()
            )));
        }

        let signal = CloseSignal::new();
        self.state
            .live
            .entry(address.clone())
            .or_default()
            .push(signal.clone());
        self.state.accepted.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryConnection {
            address: address.clone(),
            responder: self.responder.clone(),
            signal,
            state: self.state.clone(),
        })
    }
}

/// A connection made by [`MemoryConnector`].
pub struct MemoryConnection {
    address: Address,
    responder: Responder,
    signal: CloseSignal,
    state: Arc<MemoryState>,
}

impl MemoryConnection {
    pub fn address(&self) -> &Address {
        &self.address
    }

    fn ensure_open(&self) -> Result<()> {
        if self.signal.is_open() {
            Ok(())
        } else {
            Err(RpcError::ConnectionClosed(self.address.to_string()))
        }
    }
}

impl Connection for MemoryConnection {
    async fn request_response(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.ensure_open()?;
        (self.responder)(payload)
    }

    async fn fire_and_forget(&self, _payload: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.state.one_way.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn closed(&self) -> Result<()> {
        self.signal.closed().await
    }

    fn close(&self) {
        self.signal.close();
    }

    fn is_open(&self) -> bool {
        self.signal.is_open()
    }
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("address", &self.address)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
