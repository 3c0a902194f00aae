//! Address-keyed cache of connection handles.
//!
//! # Shards
//!
//! The cache is split into one or more shards. Each shard holds at most one
//! handle per address, and its get-or-create is a single critical section on
//! the entry, so two callers routed to the same shard can never both start a
//! connection to the same address.
//!
//! How a call is routed is decided by [`ShardPolicy`]:
//!
//! - [`ShardPolicy::Global`] has one shard, so one connection per address for
//!   the whole process.
//! - [`ShardPolicy::PerThread`] hashes the calling thread onto a fixed number
//!   of shards. A given worker thread always lands on the same shard, and an
//!   address is connected to at most `shards` times.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rpclink_common::Address;
use serde::{Deserialize, Serialize};

use crate::connector::Connection;
use crate::handle::ConnectionHandle;

/// How calls are routed to cache shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ShardPolicy {
    /// A single shard shared by every caller.
    #[default]
    Global,
    /// `shards` independent shards selected by the calling thread.
    PerThread { shards: usize },
}

impl ShardPolicy {
    /// Number of shards the policy asks for. `PerThread { shards: 0 }` is
    /// treated as one shard.
    pub fn shard_count(&self) -> usize {
        match self {
            ShardPolicy::Global => 1,
            ShardPolicy::PerThread { shards } => (*shards).max(1),
        }
    }
}

/// Sharded map from [`Address`] to the [`ConnectionHandle`] of its current
/// attempt.
pub struct ConnectionCache<C> {
    policy: ShardPolicy,
    shards: Box<[DashMap<Address, ConnectionHandle<C>>]>,
}

impl<C: Connection> ConnectionCache<C> {
    /// Creates an empty cache with as many shards as `policy` asks for.
    ///
    /// # Example
    ///
    /// ```
    /// use rpclink_client::{ConnectionCache, MemoryConnection, ShardPolicy};
    ///
    /// let cache = ConnectionCache::<MemoryConnection>::new(ShardPolicy::PerThread { shards: 4 });
    /// assert_eq!(cache.shard_count(), 4);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(policy: ShardPolicy) -> Self {
        let shards = (0..policy.shard_count()).map(|_| DashMap::new()).collect();
        Self { policy, shards }
    }

    pub fn policy(&self) -> ShardPolicy {
        self.policy
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// The shard the current caller is routed to.
    pub fn select_shard(&self) -> usize {
        match self.policy {
            ShardPolicy::Global => 0,
            ShardPolicy::PerThread { .. } => {
                let mut hasher = DefaultHasher::new();
                std::thread::current().id().hash(&mut hasher);
                (hasher.finish() % self.shards.len() as u64) as usize
            }
        }
    }

    /// Returns the cached handle for `address` on the caller's shard, or
    /// installs the one built by `create`.
    ///
    /// # Arguments
    ///
    /// * `address` - The cache key
    /// * `create` - Builds a handle for the given shard index. It runs while
    ///   the shard is locked, so it must neither block nor touch this cache
    ///   (evicting from inside it would deadlock). Start the attempt after
    ///   this call returns.
    ///
    /// # Returns
    ///
    /// The handle every caller on the shard shares until it is evicted.
    pub fn get_or_create<F>(&self, address: &Address, create: F) -> ConnectionHandle<C>
    where
        F: FnOnce(usize) -> ConnectionHandle<C>,
    {
        let shard = self.select_shard();
        match self.shards[shard].entry(address.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(
                    %address,
                    shard,
                    id = entry.get().id(),
                    "Reusing cached connection"
                );
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let handle = create(shard);
                tracing::debug!(%address, shard, id = handle.id(), "Starting new connection");
                entry.insert(handle.clone());
                handle
            }
        }
    }

    /// Removes `handle` from its shard.
    ///
    /// Only that exact handle is removed: if the entry has since been replaced
    /// by a newer attempt, it is left alone. Returns true if this call removed
    /// the entry, so repeated evictions of the same handle are harmless.
    pub fn evict(&self, handle: &ConnectionHandle<C>) -> bool {
        let removed = self.shards[handle.shard()]
            .remove_if(handle.address(), |_, cached| cached.id() == handle.id())
            .is_some();
        handle.mark_evicted();
        if removed {
            tracing::debug!(
                address = %handle.address(),
                shard = handle.shard(),
                id = handle.id(),
                "Evicted connection"
            );
        }
        removed
    }

    /// Looks up the handle cached for `address` on a specific shard.
    ///
    /// # Returns
    ///
    /// `None` if the shard index is out of range or holds no entry.
    pub fn get(&self, shard: usize, address: &Address) -> Option<ConnectionHandle<C>> {
        self.shards
            .get(shard)?
            .get(address)
            .map(|entry| entry.value().clone())
    }

    /// Total number of cached handles over all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(DashMap::len).sum()
    }

    /// True when no shard holds an entry.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(DashMap::is_empty)
    }
}
