//! Client-side cache: RESP3 `CLIENT TRACKING` invalidation cache with
//! fingerprint-keyed LRU storage and concurrent-miss coalescing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::config::Protocol;
use crate::resp::Value;

/// Commands whose reply is safe to cache by `(command, key)` fingerprint.
/// Conservative by design: unknown commands are never cached.
const CACHEABLE_COMMANDS: &[&str] = &["GET", "HGET", "HGETALL", "LRANGE", "LLEN", "STRLEN", "TTL"];

pub fn is_cacheable(keyword: &str) -> bool {
    CACHEABLE_COMMANDS.contains(&keyword.to_ascii_uppercase().as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub command: String,
    pub key: Bytes,
}

impl Fingerprint {
    pub fn new(command: &str, key: &[u8]) -> Self {
        Self {
            command: command.to_ascii_uppercase(),
            key: Bytes::copy_from_slice(key),
        }
    }
}

struct Inner {
    entries: HashMap<Fingerprint, Value>,
    order: VecDeque<Fingerprint>,
    capacity: usize,
    in_flight: HashMap<Fingerprint, broadcast::Sender<Result<Value, String>>>,
}

impl Inner {
    fn touch(&mut self, fp: &Fingerprint) {
        if let Some(pos) = self.order.iter().position(|k| k == fp) {
            self.order.remove(pos);
        }
        self.order.push_back(fp.clone());
    }

    fn insert(&mut self, fp: Fingerprint, value: Value) {
        if !self.entries.contains_key(&fp) && self.entries.len() >= self.capacity {
            if let Some(evict) = self.order.pop_front() {
                self.entries.remove(&evict);
            }
        }
        self.touch(&fp);
        self.entries.insert(fp, value);
    }

    fn evict_key(&mut self, key: &[u8]) {
        let doomed: Vec<Fingerprint> = self
            .entries
            .keys()
            .filter(|fp| fp.key == key)
            .cloned()
            .collect();
        for fp in doomed {
            self.entries.remove(&fp);
            if let Some(pos) = self.order.iter().position(|k| k == &fp) {
                self.order.remove(pos);
            }
        }
    }

    fn flush(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Handle shared by the connection actor (which feeds it invalidation
/// pushes) and callers (which consult it before issuing a read).
///
/// A no-op (`capacity == 0` or protocol is RESP2) cache answers every
/// lookup with a miss and never stores anything, so the connection actor
/// and the public `execute` path don't need a separate disabled variant.
#[derive(Clone)]
pub struct CacheHandle {
    inner: Option<Arc<Mutex<Inner>>>,
}

impl CacheHandle {
    pub fn new(capacity: usize, protocol: Protocol) -> Self {
        #[cfg(not(feature = "client-side-cache"))]
        let capacity = {
            let _ = capacity;
            0
        };
        if capacity == 0 || protocol != Protocol::Resp3 {
            return Self { inner: None };
        }
        Self {
            inner: Some(Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity,
                in_flight: HashMap::new(),
            }))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<Value> {
        let inner = self.inner.as_ref()?;
        let mut guard = inner.lock().unwrap();
        let value = guard.entries.get(fp).cloned();
        if value.is_some() {
            guard.touch(fp);
        }
        value
    }

    pub fn insert(&self, fp: Fingerprint, value: Value) {
        if let Some(inner) = &self.inner {
            inner.lock().unwrap().insert(fp, value);
        }
    }

    /// Register this fingerprint as in-flight and return a receiver other
    /// concurrent callers can await instead of issuing a redundant GET.
    /// Returns `None` if this caller is the first (and therefore owns the
    /// real request) or if the cache is disabled.
    pub fn join_in_flight(
        &self,
        fp: &Fingerprint,
    ) -> Option<broadcast::Receiver<Result<Value, String>>> {
        let inner = self.inner.as_ref()?;
        let mut guard = inner.lock().unwrap();
        guard.in_flight.get(fp).map(|tx| tx.subscribe())
    }

    /// Claim ownership of fetching `fp`. Must be paired with
    /// [`CacheHandle::complete_in_flight`].
    pub fn begin_in_flight(&self, fp: Fingerprint) {
        if let Some(inner) = &self.inner {
            let (tx, _rx) = broadcast::channel(1);
            inner.lock().unwrap().in_flight.insert(fp, tx);
        }
    }

    pub fn complete_in_flight(&self, fp: &Fingerprint, result: Result<Value, String>) {
        if let Some(inner) = &self.inner {
            let mut guard = inner.lock().unwrap();
            if let Some(tx) = guard.in_flight.remove(fp) {
                let _ = tx.send(result);
            }
        }
    }

    /// Handle a decoded `invalidate` push frame: `Push([invalidate, Array([key, ...]) | Null])`.
    /// A `Null`/empty payload means "flush all".
    pub fn handle_invalidation(&self, push: &Value) {
        let Some(inner) = &self.inner else { return };
        let items = match push.as_array() {
            Some(items) => items,
            None => return,
        };
        let mut guard = inner.lock().unwrap();
        match items.get(1) {
            None | Some(Value::Null) | Some(Value::NullArray) => guard.flush(),
            Some(Value::Array(keys)) => {
                for key in keys {
                    if let Some(bytes) = key.as_bulk() {
                        guard.evict_key(bytes);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_never_stores() {
        let cache = CacheHandle::new(0, Protocol::Resp3);
        assert!(!cache.is_enabled());
        let fp = Fingerprint::new("GET", b"k");
        cache.insert(fp.clone(), Value::Integer(1));
        assert_eq!(cache.get(&fp), None);
    }

    #[test]
    fn resp2_cache_is_always_disabled() {
        let cache = CacheHandle::new(100, Protocol::Resp2);
        assert!(!cache.is_enabled());
    }

    #[test]
    fn insert_and_hit() {
        let cache = CacheHandle::new(10, Protocol::Resp3);
        let fp = Fingerprint::new("get", b"k");
        cache.insert(fp.clone(), Value::BulkString(Bytes::from_static(b"v")));
        assert_eq!(cache.get(&fp), Some(Value::BulkString(Bytes::from_static(b"v"))));
    }

    #[test]
    fn lru_eviction_respects_capacity() {
        let cache = CacheHandle::new(1, Protocol::Resp3);
        let a = Fingerprint::new("GET", b"a");
        let b = Fingerprint::new("GET", b"b");
        cache.insert(a.clone(), Value::Integer(1));
        cache.insert(b.clone(), Value::Integer(2));
        assert_eq!(cache.get(&a), None);
        assert_eq!(cache.get(&b), Some(Value::Integer(2)));
    }

    #[test]
    fn invalidation_evicts_matching_key_only() {
        let cache = CacheHandle::new(10, Protocol::Resp3);
        let a = Fingerprint::new("GET", b"a");
        let b = Fingerprint::new("GET", b"b");
        cache.insert(a.clone(), Value::Integer(1));
        cache.insert(b.clone(), Value::Integer(2));
        let push = Value::Push(vec![
            Value::SimpleString(Bytes::from_static(b"invalidate")),
            Value::Array(vec![Value::BulkString(Bytes::from_static(b"a"))]),
        ]);
        cache.handle_invalidation(&push);
        assert_eq!(cache.get(&a), None);
        assert_eq!(cache.get(&b), Some(Value::Integer(2)));
    }

    #[test]
    fn empty_invalidation_payload_flushes_all() {
        let cache = CacheHandle::new(10, Protocol::Resp3);
        let a = Fingerprint::new("GET", b"a");
        cache.insert(a.clone(), Value::Integer(1));
        let push = Value::Push(vec![
            Value::SimpleString(Bytes::from_static(b"invalidate")),
            Value::Null,
        ]);
        cache.handle_invalidation(&push);
        assert_eq!(cache.get(&a), None);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_on_one_in_flight_owner() {
        let cache = CacheHandle::new(10, Protocol::Resp3);
        let fp = Fingerprint::new("GET", b"k");
        assert!(cache.join_in_flight(&fp).is_none());
        cache.begin_in_flight(fp.clone());
        let mut follower = cache.join_in_flight(&fp).unwrap();
        cache.complete_in_flight(&fp, Ok(Value::Integer(7)));
        assert_eq!(follower.recv().await.unwrap(), Ok(Value::Integer(7)));
    }
}
