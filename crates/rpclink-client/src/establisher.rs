//! Starts connection attempts and ties each one to its cache entry.
//!
//! Getting a connection happens in two steps. First the attempt's handle is
//! installed in the cache while the shard entry is locked. Then, with the
//! lock released, a task is spawned that drives the attempt:
//!
//! 1. the connector is asked for a connection;
//! 2. on failure the entry is evicted *before* waiters are told, so whoever
//!    observes the failure and retries gets a fresh attempt;
//! 3. on success waiters get the connection, then the task waits for the
//!    connection to terminate and evicts the entry.
//!
//! Eviction locks the shard, which is why the task is never spawned under
//! the entry lock: a runtime that has shut down drops the task on the spot.
//!
//! A second task watches the first and only logs if it dies abnormally;
//! eviction still happens in that case because it is tied to dropping the
//! attempt's guard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::FutureExt;
use rpclink_common::{Address, RpcError};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cache::ConnectionCache;
use crate::connector::{Connection, Connector};
use crate::handle::{ConnectOutcome, ConnectionHandle};

static HANDLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Establisher<F: Connector> {
    connector: Arc<F>,
    cache: Arc<ConnectionCache<F::Connection>>,
    runtime: Handle,
}

impl<F: Connector> Establisher<F> {
    pub(crate) fn new(
        connector: Arc<F>,
        cache: Arc<ConnectionCache<F::Connection>>,
        runtime: Handle,
    ) -> Self {
        Self {
            connector,
            cache,
            runtime,
        }
    }

    /// Returns the cached handle for `address`, starting a connection attempt
    /// first if the caller's shard has none. Never waits for the attempt.
    pub(crate) fn get_or_connect(&self, address: &Address) -> ConnectionHandle<F::Connection> {
        let mut started = None;
        let handle = self.cache.get_or_create(address, |shard| {
            let attempt = self.prepare(address, shard);
            let handle = attempt.handle.clone();
            started = Some(attempt);
            handle
        });

        // The shard is unlocked again; the attempt may evict its entry at once.
        if let Some(attempt) = started {
            self.start(attempt);
        }
        handle
    }

    /// Builds the handle for a new attempt without starting it.
    fn prepare(&self, address: &Address, shard: usize) -> AttemptGuard<F::Connection> {
        let id = HANDLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let (resolve, resolved) = oneshot::channel::<ConnectOutcome<F::Connection>>();

        let attempt = async move {
            resolved.await.unwrap_or_else(|_| {
                Err(Arc::new(RpcError::Connection(
                    "connection attempt was aborted".to_string(),
                )))
            })
        }
        .boxed();

        AttemptGuard {
            cache: self.cache.clone(),
            handle: ConnectionHandle::new(id, address.clone(), shard, attempt),
            resolve: Some(resolve),
        }
    }

    fn start(&self, attempt: AttemptGuard<F::Connection>) {
        let address = attempt.handle.address().clone();
        let task = self.runtime.spawn(establish(self.connector.clone(), attempt));
        self.runtime.spawn(report_cleanup_fault(address, task));
    }
}

impl<F: Connector> Clone for Establisher<F> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            cache: self.cache.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

async fn establish<F: Connector>(connector: Arc<F>, mut guard: AttemptGuard<F::Connection>) {
    let address = guard.handle.address().clone();

    let connection = match connector.connect(&address).await {
        Ok(connection) => Arc::new(connection),
        Err(e) => {
            tracing::warn!("Connect failed on {}, cause: {}", address, e);
            guard.fail(e);
            return;
        }
    };

    tracing::info!("Connected successfully on {}", address);
    guard.resolve(Ok(connection.clone()));

    match connection.closed().await {
        Ok(()) => tracing::info!("Connection closed on {}", address),
        Err(e) => tracing::warn!("Connection on {} terminated: {}", address, e),
    }
    // Dropping the guard evicts the entry.
}

async fn report_cleanup_fault(address: Address, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        tracing::warn!("Exception on closing connection to {}: {}", address, e);
    }
}

/// Owns the eviction of one attempt's cache entry.
///
/// The entry is evicted when the guard is dropped, whichever way the attempt
/// task ends, including the task never running at all. Waiters that have not
/// been resolved by then see the attempt as aborted, and only after the
/// entry is gone.
struct AttemptGuard<C: Connection> {
    cache: Arc<ConnectionCache<C>>,
    handle: ConnectionHandle<C>,
    resolve: Option<oneshot::Sender<ConnectOutcome<C>>>,
}

impl<C: Connection> AttemptGuard<C> {
    fn resolve(&mut self, outcome: ConnectOutcome<C>) {
        if let Some(resolve) = self.resolve.take() {
            self.handle.mark_settled(outcome.is_ok());
            // Nobody waiting is fine.
            let _ = resolve.send(outcome);
        }
    }

    fn fail(mut self, error: RpcError) {
        self.cache.evict(&self.handle);
        self.resolve(Err(Arc::new(error)));
    }
}

impl<C: Connection> Drop for AttemptGuard<C> {
    fn drop(&mut self) {
        self.cache.evict(&self.handle);
        if self.resolve.take().is_some() {
            self.handle.mark_settled(false);
        }
    }
}
