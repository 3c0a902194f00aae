use std::sync::Arc;

use rpclink_common::transport::{Codec, JsonCodec};
use rpclink_common::{Address, Result, RpcError};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::cache::{ConnectionCache, ShardPolicy};
use crate::channel::ClientChannel;
use crate::connector::Connector;
use crate::establisher::Establisher;

/// Client transport configuration.
///
/// # Default Configuration
///
/// - `shard_policy`: [`ShardPolicy::Global`], one connection per address
///
/// # Example
///
/// ```rust
/// use rpclink_client::{ClientTransportConfig, ShardPolicy};
///
/// let config: ClientTransportConfig = serde_json::from_str(
///     r#"{"shard_policy": {"mode": "per_thread", "shards": 4}}"#,
/// ).unwrap();
/// assert_eq!(config.shard_policy, ShardPolicy::PerThread { shards: 4 });
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientTransportConfig {
    /// How callers are routed to cache shards
    pub shard_policy: ShardPolicy,
}

/// Hands out client channels, sharing one live connection per address and
/// shard.
///
/// [`create`](Self::create) is synchronous: it looks the address up in the
/// cache and, on a miss, starts a connection attempt in the background. The
/// returned channel waits for the connection only when something is sent.
///
/// - Concurrent `create` calls for the same address and shard share a single
///   attempt.
/// - A failed attempt is evicted, so the next `create` tries again.
/// - When a connection terminates it is evicted, so the next `create`
///   reconnects.
///
/// The codec is a type parameter so that channels encode without dynamic
/// dispatch; it defaults to [`JsonCodec`].
///
/// # Example
///
/// ```rust
/// use rpclink_client::{ClientTransport, ClientTransportConfig, MemoryConnector};
/// use rpclink_common::{transport::JsonCodec, Address};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rpclink_common::Result<()> {
/// let transport = ClientTransport::new(
///     MemoryConnector::echo(),
///     JsonCodec,
///     ClientTransportConfig::default(),
/// )?;
///
/// let channel = transport.create(Address::new("echo", 4801));
/// let result = channel.call("echo", json!({"n": 1})).await?;
/// assert_eq!(result, json!({"n": 1}));
/// # Ok(())
/// # }
/// ```
pub struct ClientTransport<F: Connector, K = JsonCodec> {
    cache: Arc<ConnectionCache<F::Connection>>,
    establisher: Establisher<F>,
    connector: Arc<F>,
    codec: Arc<K>,
}

impl<F: Connector, K: Codec> ClientTransport<F, K> {
    /// Creates a transport that runs its connection attempts on the current
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Runtime`] when called outside a tokio runtime.
    pub fn new(connector: F, codec: K, config: ClientTransportConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            RpcError::Runtime(format!("ClientTransport needs a tokio runtime: {}", e))
        })?;
        Ok(Self::with_runtime(connector, codec, config, runtime))
    }

    /// Creates a transport that runs its connection attempts on `runtime`.
    ///
    /// If that runtime shuts down, later attempts fail at once and are not
    /// cached.
    pub fn with_runtime(
        connector: F,
        codec: K,
        config: ClientTransportConfig,
        runtime: Handle,
    ) -> Self {
        let connector = Arc::new(connector);
        let cache = Arc::new(ConnectionCache::new(config.shard_policy));
        let establisher = Establisher::new(connector.clone(), cache.clone(), runtime);

        tracing::debug!(shards = cache.shard_count(), "Client transport created");

        Self {
            cache,
            establisher,
            connector,
            codec: Arc::new(codec),
        }
    }

    /// Returns a channel to `address`, reusing the cached connection if there
    /// is one and starting a new attempt otherwise. Never waits on I/O.
    pub fn create(&self, address: Address) -> ClientChannel<F::Connection, K> {
        let handle = self.establisher.get_or_connect(&address);
        ClientChannel::new(handle, self.codec.clone())
    }

    /// The connector every attempt goes through.
    pub fn connector(&self) -> &F {
        &self.connector
    }

    /// Number of connections currently cached, over all shards. Includes
    /// attempts that are still in flight.
    pub fn cached_connections(&self) -> usize {
        self.cache.len()
    }

    /// Number of cache shards, as set by [`ClientTransportConfig::shard_policy`].
    pub fn shard_count(&self) -> usize {
        self.cache.shard_count()
    }
}

impl<F: Connector, K> Clone for ClientTransport<F, K> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            establisher: self.establisher.clone(),
            connector: self.connector.clone(),
            codec: self.codec.clone(),
        }
    }
}
