//! Cluster router: bootstrap via `CLUSTER SLOTS`, key-based dispatch,
//! MOVED/ASK redirect recovery, periodic slot-table refresh, and cross-node
//! fan-out for transactions, subscriptions, and `CLIENT SETNAME`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;

use crate::command_table::{self, KeyIndex};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{RedisError, Result};
use crate::pubsub::SubscriptionKind;
use crate::resp::Value;
use crate::transaction::{self, MultiBody, TransactionLock};

use super::crc16;
use super::slots::{parse_cluster_slots, NodeAddr, SlotTable};

/// Bounded retry budget shared by MOVED, ASK, and TRYAGAIN recovery: all
/// three draw from the same budget rather than each getting its own.
const MAX_REDIRECTS: u32 = 5;

const TRYAGAIN_BASE_DELAY: Duration = Duration::from_millis(50);
const TRYAGAIN_MAX_DELAY: Duration = Duration::from_secs(1);

/// Exponential backoff with +/-10% jitter so a burst of callers that all
/// hit TRYAGAIN on the same slot don't all retry in lockstep.
fn tryagain_backoff(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    let base = TRYAGAIN_BASE_DELAY.saturating_mul(factor).min(TRYAGAIN_MAX_DELAY);
    let jitter_range = base.as_secs_f64() * 0.1;
    let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
    let jittered_secs = (base.as_secs_f64() + jitter).max(0.0);
    Duration::from_secs_f64(jittered_secs)
}

/// A logical cluster client: a slot table plus a lazily-populated,
/// memoized pool of per-node [`Connection`]s.
pub struct ClusterRouter {
    /// Template for per-node connections: auth, protocol, pipeline depth,
    /// etc. `host`/`port` are overridden per node.
    base_config: ClientConfig,
    /// Read on every `execute` call, written only on rebuild/MOVED — an
    /// `ArcSwap` keeps the hot path lock-free instead of contending a
    /// mutex per command.
    slots: ArcSwap<SlotTable>,
    nodes: RwLock<HashMap<Arc<NodeAddr>, Connection>>,
    tx_locks: Mutex<HashMap<Arc<NodeAddr>, TransactionLock>>,
    refresh_interval: Duration,
}

impl ClusterRouter {
    /// Connect to `seed`, issue `CLUSTER SLOTS`, build the initial slot
    /// table, then discard the seed connection. Spawns the background
    /// slot-refresh task (disabled when `slot_refresh_interval_secs` is 0).
    pub async fn bootstrap(seed: &ClientConfig) -> Result<Arc<Self>> {
        let seed_conn = Connection::connect(seed).await?;
        let reply = seed_conn.execute(&[b"CLUSTER", b"SLOTS"]).await?;
        let ranges = parse_cluster_slots(&reply)
            .ok_or_else(|| RedisError::Protocol("malformed CLUSTER SLOTS reply".into()))?;
        seed_conn.close();

        let mut table = SlotTable::new();
        table.rebuild(ranges);

        let router = Arc::new(Self {
            base_config: seed.clone(),
            slots: ArcSwap::from_pointee(table),
            nodes: RwLock::new(HashMap::new()),
            tx_locks: Mutex::new(HashMap::new()),
            refresh_interval: Duration::from_secs(seed.slot_refresh_interval_secs),
        });
        router.clone().spawn_background_refresh();
        Ok(router)
    }

    /// Route `args` to the node owning its key's slot, recovering from
    /// MOVED (one retry, bounded), ASK (one-shot via `ASKING`), and
    /// TRYAGAIN (exponential backoff) within a shared retry budget.
    pub async fn execute(&self, args: &[&[u8]]) -> Result<Value> {
        let key = self.routing_key(args)?;
        let mut slot = crc16::slot(key);

        for attempt in 0..=MAX_REDIRECTS {
            let addr = self.node_for_slot(slot)?;
            let conn = self.connection_for(&addr).await?;
            let reply = conn.execute(args).await?;

            let Some(err_str) = reply.as_error_str() else {
                return Ok(reply);
            };
            let server_err = RedisError::Server(err_str.to_string());

            if let Some((moved_slot, addr_str)) = server_err.as_moved() {
                let new_addr = Arc::new(self.resolve_redirect_target(&addr_str).await?);
                self.set_slot(moved_slot, new_addr.clone());
                let retry_conn = self.connection_for(&new_addr).await?;
                let retry_reply = retry_conn.execute(args).await?;
                if let Some(again) = retry_reply.as_error_str() {
                    if RedisError::Server(again.to_string()).as_moved().is_some() {
                        return Err(RedisError::Server(format!(
                            "repeated MOVED after redirect: {again}"
                        )));
                    }
                }
                return Ok(retry_reply);
            }

            if let Some((_, addr_str)) = server_err.as_ask() {
                let target = Arc::new(
                    NodeAddr::parse(&addr_str)
                        .ok_or_else(|| RedisError::Protocol(format!("malformed ASK target: {addr_str}")))?,
                );
                let ask_conn = self.connection_for(&target).await?;
                ask_conn.execute(&[b"ASKING"]).await?;
                return ask_conn.execute(args).await;
            }

            if server_err.is_try_again() {
                if attempt == MAX_REDIRECTS {
                    return Ok(reply);
                }
                tokio::time::sleep(tryagain_backoff(attempt)).await;
                slot = crc16::slot(key); // re-resolve: migration may have settled
                continue;
            }

            if server_err.is_cluster_down() {
                if attempt == MAX_REDIRECTS {
                    return Ok(reply);
                }
                tokio::time::sleep(tryagain_backoff(attempt)).await;
                // The node may have lost coverage of this slot entirely
                // (not just be mid-migration); refresh before retrying.
                let _ = self.refresh_from_any().await;
                slot = crc16::slot(key);
                continue;
            }

            return Ok(reply);
        }
        unreachable!("loop always returns within MAX_REDIRECTS + 1 iterations")
    }

    /// Fan out a MULTI/EXEC transaction to every known primary in parallel:
    /// the same `body` runs unmodified on each node rather than routing
    /// each queued command to the node owning its key, a documented
    /// limitation. Replies are concatenated in primary order. Any node
    /// failing fails the whole aggregate and discards the others' successes.
    pub async fn multi<F>(&self, body: F) -> Result<Vec<Result<Value>>>
    where
        F: Fn(&mut MultiBody<'_>) -> Result<()> + Sync,
    {
        let primaries = self.slots.load().all_primaries();
        if primaries.is_empty() {
            return Err(RedisError::ClusterNoNode(0));
        }
        let mut conns = Vec::with_capacity(primaries.len());
        for addr in &primaries {
            conns.push((addr.clone(), self.connection_for(addr).await?));
        }

        let futures = conns.iter().map(|(addr, conn)| {
            let lock = self.tx_lock_for(addr);
            async move { transaction::multi(conn, &lock, |b| body(b)).await }
        });
        let results = futures_util::future::join_all(futures).await;

        let mut all = Vec::new();
        for result in results {
            all.extend(result?);
        }
        Ok(all)
    }

    /// PSUBSCRIBE `pattern` on every known primary and merge their message
    /// streams into one.
    pub async fn watch_keyspace(
        &self,
        pattern: &[u8],
    ) -> Result<impl futures_core::Stream<Item = crate::pubsub::PubSubMessage>> {
        let primaries = self.slots.load().all_primaries();
        let mut subs = Vec::with_capacity(primaries.len());
        for addr in &primaries {
            let conn = self.connection_for(addr).await?;
            let mut node_subs = conn
                .subscribe(SubscriptionKind::Pattern, vec![Bytes::copy_from_slice(pattern)])
                .await?;
            subs.append(&mut node_subs);
        }
        Ok(futures_util::stream::select_all(subs))
    }

    /// `CLIENT SETNAME` on every known primary, best-effort (a node that
    /// fails to connect or reply is silently skipped).
    pub async fn client_setname(&self, name: &str) -> Result<()> {
        let primaries = self.slots.load().all_primaries();
        for addr in &primaries {
            if let Ok(conn) = self.connection_for(addr).await {
                let _ = conn.execute(&[b"CLIENT", b"SETNAME", name.as_bytes()]).await;
            }
        }
        Ok(())
    }

    /// A precomputed key that hashes to `slot`, for callers that want to
    /// force placement via `{slot-rep}suffix` hashtag syntax.
    pub fn key_for_slot(slot: u16) -> &'static [u8] {
        crc16::key_for_slot(slot)
    }

    fn node_for_slot(&self, slot: u16) -> Result<Arc<NodeAddr>> {
        self.slots.load().lookup(slot).ok_or(RedisError::ClusterNoNode(slot))
    }

    /// Point a single slot at a new primary via read-copy-update, without
    /// touching any other slot's current owner.
    fn set_slot(&self, slot: u16, addr: Arc<NodeAddr>) {
        self.slots.rcu(|table| {
            let mut next = (**table).clone();
            next.set_slot(slot, addr.clone());
            next
        });
    }

    fn routing_key<'a>(&self, args: &'a [&[u8]]) -> Result<&'a [u8]> {
        let keyword = std::str::from_utf8(args.first().copied().unwrap_or(b"")).unwrap_or_default();
        let key_index = command_table::lookup(keyword)
            .map(|info| info.key_index)
            .unwrap_or(KeyIndex::None);
        command_table::extract_key(key_index, &args[1..]).ok_or_else(|| {
            RedisError::Internal(format!("{keyword} has no routable key in cluster mode"))
        })
    }

    async fn connection_for(&self, addr: &Arc<NodeAddr>) -> Result<Connection> {
        if let Some(conn) = self.nodes.read().unwrap().get(addr).cloned() {
            return Ok(conn);
        }
        let config = self.config_for(addr);
        let conn = Connection::connect(&config).await?;
        // Double-check: another task may have raced us to connect to the
        // same node while we were awaiting the socket.
        let mut guard = self.nodes.write().unwrap();
        Ok(guard.entry(addr.clone()).or_insert(conn).clone())
    }

    fn tx_lock_for(&self, addr: &Arc<NodeAddr>) -> TransactionLock {
        self.tx_locks
            .lock()
            .unwrap()
            .entry(addr.clone())
            .or_insert_with(TransactionLock::new)
            .clone()
    }

    fn config_for(&self, addr: &NodeAddr) -> ClientConfig {
        ClientConfig {
            host: Some(addr.host.clone()),
            port: Some(addr.port),
            ..self.base_config.clone()
        }
    }

    /// Resolve a MOVED/redirect target address. If it isn't among the
    /// currently-known primaries, refresh the slot table from whichever
    /// known node answers first before trusting the redirect.
    async fn resolve_redirect_target(&self, addr_str: &str) -> Result<NodeAddr> {
        let target = NodeAddr::parse(addr_str)
            .ok_or_else(|| RedisError::Protocol(format!("malformed MOVED target: {addr_str}")))?;
        let known = self.slots.load().all_primaries().iter().any(|p| **p == target);
        if !known {
            let _ = self.refresh_from_any().await;
        }
        Ok(target)
    }

    /// Issue `CLUSTER SLOTS` against every known primary concurrently and
    /// rebuild the slot table from whichever reply arrives first and
    /// parses successfully.
    async fn refresh_from_any(&self) -> Result<()> {
        let primaries = self.slots.load().all_primaries();
        if primaries.is_empty() {
            return Err(RedisError::ClusterNoNode(0));
        }
        let futures = primaries.iter().map(|addr| async move {
            let conn = self.connection_for(addr).await?;
            conn.execute(&[b"CLUSTER", b"SLOTS"]).await
        });
        let results = futures_util::future::join_all(futures).await;
        for result in results {
            if let Ok(reply) = result {
                if let Some(ranges) = parse_cluster_slots(&reply) {
                    let mut table = SlotTable::new();
                    table.rebuild(ranges);
                    self.slots.store(Arc::new(table));
                    return Ok(());
                }
            }
        }
        Err(RedisError::ClusterNoNode(0))
    }

    fn spawn_background_refresh(self: Arc<Self>) {
        if self.refresh_interval.is_zero() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(&self);
        let interval = self.refresh_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(router) = weak.upgrade() else {
                    return;
                };
                if let Err(err) = router.refresh_from_any().await {
                    tracing::warn!(error = %err, "periodic CLUSTER SLOTS refresh failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tryagain_backoff_doubles_and_caps() {
        let within = |got: Duration, want: Duration| {
            let delta = got.as_secs_f64() - want.as_secs_f64();
            delta.abs() <= want.as_secs_f64() * 0.1 + f64::EPSILON
        };
        assert!(within(tryagain_backoff(0), Duration::from_millis(50)));
        assert!(within(tryagain_backoff(1), Duration::from_millis(100)));
        assert!(within(tryagain_backoff(2), Duration::from_millis(200)));
        assert!(tryagain_backoff(10) <= TRYAGAIN_MAX_DELAY * 11 / 10);
    }
}
