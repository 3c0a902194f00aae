//! Shared, lazily-resolved connection handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use rpclink_common::{Address, Result, RpcError};

use crate::connector::Connection;

/// What a connection attempt settles to. Both sides are cheap to clone so
/// that every waiter receives the same value.
pub(crate) type ConnectOutcome<C> = std::result::Result<Arc<C>, Arc<RpcError>>;

type Attempt<C> = Shared<BoxFuture<'static, ConnectOutcome<C>>>;

const PENDING: u8 = 0;
const CONNECTED: u8 = 1;
const FAILED: u8 = 2;

/// Where a handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// The connect attempt is still in flight.
    Connecting,
    /// Connected and still cached.
    Open,
    /// Was open, then the connection terminated and the handle was evicted.
    Closed,
    /// The connect attempt failed.
    Failed,
}

/// "The connection to an address", as one attempt.
///
/// A handle is inserted into the cache while its attempt is still pending, so
/// every caller on the same shard finds the same handle immediately. All
/// clones await the same single attempt; once it has settled, later awaits
/// return the stored outcome without doing any work.
pub struct ConnectionHandle<C> {
    inner: Arc<HandleInner<C>>,
}

struct HandleInner<C> {
    id: u64,
    address: Address,
    shard: usize,
    attempt: Attempt<C>,
    settled: AtomicU8,
    evicted: AtomicBool,
}

impl<C: Connection> ConnectionHandle<C> {
    pub(crate) fn new(
        id: u64,
        address: Address,
        shard: usize,
        attempt: BoxFuture<'static, ConnectOutcome<C>>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                address,
                shard,
                attempt: attempt.shared(),
                settled: AtomicU8::new(PENDING),
                evicted: AtomicBool::new(false),
            }),
        }
    }

    /// Unique per attempt; used to tell a stale handle from its replacement.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    /// Index of the cache shard the handle lives in.
    pub fn shard(&self) -> usize {
        self.inner.shard
    }

    /// Waits for the attempt and returns the shared connection.
    ///
    /// A failed attempt yields [`RpcError::ConnectFailure`] carrying the
    /// original cause.
    pub async fn connection(&self) -> Result<Arc<C>> {
        self.inner
            .attempt
            .clone()
            .await
            .map_err(|cause| RpcError::ConnectFailure {
                address: self.inner.address.clone(),
                cause,
            })
    }

    /// Where the attempt stands right now, without waiting for it.
    ///
    /// The outcome is taken from the shared attempt once a waiter has polled
    /// it to completion, and otherwise from what the connecting task recorded
    /// when it settled, so a handle nobody awaits still leaves `Connecting`.
    pub fn state(&self) -> HandleState {
        let connected = match self.inner.attempt.peek() {
            Some(outcome) => Some(outcome.is_ok()),
            None => match self.inner.settled.load(Ordering::SeqCst) {
                CONNECTED => Some(true),
                FAILED => Some(false),
                _ => None,
            },
        };

        match connected {
            None => HandleState::Connecting,
            Some(false) => HandleState::Failed,
            Some(true) if self.is_evicted() => HandleState::Closed,
            Some(true) => HandleState::Open,
        }
    }

    /// Records how the attempt ended. Only the first call counts.
    pub(crate) fn mark_settled(&self, connected: bool) {
        let settled = if connected { CONNECTED } else { FAILED };
        let _ = self.inner.settled.compare_exchange(
            PENDING,
            settled,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Whether the handle has left the cache. An evicted handle is never
    /// handed out again; later `create` calls get a new attempt.
    pub fn is_evicted(&self) -> bool {
        self.inner.evicted.load(Ordering::SeqCst)
    }

    /// Returns true for the first call only.
    pub(crate) fn mark_evicted(&self) -> bool {
        !self.inner.evicted.swap(true, Ordering::SeqCst)
    }

    /// Returns true if both handles refer to the same attempt.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C> Clone for ConnectionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("address", &self.inner.address)
            .field("shard", &self.inner.shard)
            .finish_non_exhaustive()
    }
}
