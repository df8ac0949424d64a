//! Top-level client facade: a single type spanning both the single-node
//! and cluster-routed cases, so callers that don't care about the
//! distinction can hold one `Client` and call [`RedisCommands`] methods
//! on it directly.

#[cfg(feature = "cluster")]
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

#[cfg(feature = "cluster")]
use crate::cluster::ClusterRouter;
use crate::commands::Executor;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{RedisError, Result};
use crate::pubsub::{PubSubMessage, Subscription, SubscriptionKind};
use crate::resp::Value;
use crate::transaction::{self, MultiBody, TransactionLock};

#[async_trait]
impl Executor for Connection {
    async fn execute(&self, args: &[&[u8]]) -> Result<Value> {
        Connection::execute(self, args).await
    }
}

#[cfg(feature = "cluster")]
#[async_trait]
impl Executor for ClusterRouter {
    async fn execute(&self, args: &[&[u8]]) -> Result<Value> {
        ClusterRouter::execute(self, args).await
    }
}

/// A logical Redis client: either one connection to a single node, or (with
/// the `cluster` feature) a cluster router fronting a whole fleet.
/// `RedisCommands` (the generated GET/SET/... wrappers) is implemented for
/// both uniformly.
pub enum Client {
    Single {
        conn: Connection,
        tx_lock: TransactionLock,
    },
    #[cfg(feature = "cluster")]
    Cluster(Arc<ClusterRouter>),
}

impl Client {
    /// Connect to a single node. See [`Connection::connect`].
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let conn = Connection::connect(config).await?;
        Ok(Self::Single {
            conn,
            tx_lock: TransactionLock::new(),
        })
    }

    /// Bootstrap a cluster router from a seed endpoint. See
    /// [`ClusterRouter::bootstrap`].
    #[cfg(feature = "cluster")]
    pub async fn connect_cluster(seed: &ClientConfig) -> Result<Self> {
        Ok(Self::Cluster(ClusterRouter::bootstrap(seed).await?))
    }

    pub fn is_cluster(&self) -> bool {
        match self {
            #[cfg(feature = "cluster")]
            Client::Cluster(_) => true,
            _ => false,
        }
    }

    /// Run `body` inside a MULTI/EXEC window. On a single connection this
    /// is a plain MULTI/EXEC; in cluster mode it fans out to every known
    /// primary unconditionally, a documented limitation rather than
    /// routing each queued command to the node owning its key.
    pub async fn multi<F>(&self, body: F) -> Result<Vec<Result<Value>>>
    where
        F: Fn(&mut MultiBody<'_>) -> Result<()> + Sync,
    {
        match self {
            Client::Single { conn, tx_lock } => transaction::multi(conn, tx_lock, |b| body(b)).await,
            #[cfg(feature = "cluster")]
            Client::Cluster(router) => router.multi(body).await,
        }
    }

    /// Subscribe on the single connection. Not supported in cluster mode —
    /// use [`Client::watch_keyspace`] there, since a single channel only
    /// ever lives on one node.
    pub async fn subscribe(&self, kind: SubscriptionKind, names: Vec<Bytes>) -> Result<Vec<Subscription>> {
        match self {
            Client::Single { conn, .. } => conn.subscribe(kind, names).await,
            #[cfg(feature = "cluster")]
            Client::Cluster(_) => Err(RedisError::Internal(
                "subscribe is single-node only; use watch_keyspace in cluster mode".into(),
            )),
        }
    }

    pub async fn unsubscribe(&self, kind: SubscriptionKind, names: Vec<Bytes>) -> Result<()> {
        match self {
            Client::Single { conn, .. } => conn.unsubscribe(kind, names).await,
            #[cfg(feature = "cluster")]
            Client::Cluster(_) => Err(RedisError::Internal(
                "unsubscribe is single-node only; use watch_keyspace in cluster mode".into(),
            )),
        }
    }

    /// PSUBSCRIBE `pattern` on every primary and merge the resulting
    /// streams (cluster mode only).
    #[cfg(feature = "cluster")]
    pub async fn watch_keyspace(
        &self,
        pattern: &[u8],
    ) -> Result<std::pin::Pin<Box<dyn futures_core::Stream<Item = PubSubMessage> + Send>>> {
        match self {
            Client::Cluster(router) => {
                let stream = router.watch_keyspace(pattern).await?;
                Ok(Box::pin(stream))
            }
            Client::Single { .. } => Err(RedisError::Internal(
                "watch_keyspace is cluster-only; use subscribe on a single connection".into(),
            )),
        }
    }

    pub fn close(&self) {
        if let Client::Single { conn, .. } = self {
            conn.close();
        }
    }
}

#[async_trait]
impl Executor for Client {
    async fn execute(&self, args: &[&[u8]]) -> Result<Value> {
        match self {
            Client::Single { conn, .. } => conn.execute(args).await,
            #[cfg(feature = "cluster")]
            Client::Cluster(router) => router.execute(args).await,
        }
    }
}
