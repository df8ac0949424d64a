//! In-process RESP-speaking stub server: backs the end-to-end scenarios
//! in the crate's test suite without a live Redis/Redis Cluster
//! deployment.
//!
//! A [`StubServer`] is a minimal in-memory store plus enough command
//! coverage to drive `SET`/`GET`-shaped flows, `MULTI`/`EXEC`, pub/sub,
//! and (for the cluster router) a scriptable one-off `MOVED` redirect.
//! It is deliberately not a faithful Redis reimplementation: commands
//! outside this set reply with a generic error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::resp::{RespCodec, Value};

struct Store {
    strings: HashMap<Bytes, Bytes>,
    lists: HashMap<Bytes, VecDeque<Bytes>>,
    hashes: HashMap<Bytes, HashMap<Bytes, Bytes>>,
    sets: HashMap<Bytes, HashSet<Bytes>>,
    /// Keys that should always provoke a `MOVED` reply instead of being
    /// served, scripted via [`StubServer::script_moved`].
    moved: HashMap<Bytes, String>,
    /// This server's own bound port, reported back as the sole primary in
    /// `CLUSTER SLOTS` replies.
    self_port: u16,
}

impl Store {
    fn new(self_port: u16) -> Self {
        Self {
            strings: HashMap::new(),
            lists: HashMap::new(),
            hashes: HashMap::new(),
            sets: HashMap::new(),
            moved: HashMap::new(),
            self_port,
        }
    }
}

struct PubSub {
    channels: HashMap<Bytes, Vec<mpsc::UnboundedSender<Value>>>,
    patterns: HashMap<Bytes, Vec<mpsc::UnboundedSender<Value>>>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
            patterns: HashMap::new(),
        }
    }
}

/// A running stub server. Dropping it does not stop the accept loop (it
/// runs in a detached task); call [`StubServer::local_addr`] once and
/// keep the struct alive for the `log`/`script_moved` handles.
pub struct StubServer {
    addr: std::net::SocketAddr,
    store: Arc<Mutex<Store>>,
    pubsub: Arc<Mutex<PubSub>>,
    /// Every command received, as `"CMD arg1 arg2"` (lossy UTF-8), in
    /// arrival order, across every connection.
    pub log: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    /// Bind a listener on `127.0.0.1:0` and start accepting connections
    /// in a background task.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub server bind");
        let addr = listener.local_addr().expect("stub server local_addr");
        let store = Arc::new(Mutex::new(Store::new(addr.port())));
        let pubsub = Arc::new(Mutex::new(PubSub::default()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let accept_store = store.clone();
        let accept_pubsub = pubsub.clone();
        let accept_log = log.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_connection(
                    stream,
                    accept_store.clone(),
                    accept_pubsub.clone(),
                    accept_log.clone(),
                ));
            }
        });

        Self {
            addr,
            store,
            pubsub,
            log,
        }
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every subsequent command touching `key` replies `-MOVED <slot> <target>`
    /// instead of being served, where `<slot>` is this key's own hash slot.
    #[cfg(feature = "cluster")]
    pub fn script_moved(&self, key: &[u8], target: &str) {
        let slot = crate::cluster::slot(key);
        self.store
            .lock()
            .unwrap()
            .moved
            .insert(Bytes::copy_from_slice(key), format!("{slot} {target}"));
    }

    /// Number of commands this server has received so far.
    pub fn call_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

async fn serve_connection(
    stream: TcpStream,
    store: Arc<Mutex<Store>>,
    pubsub: Arc<Mutex<PubSub>>,
    log: Arc<Mutex<Vec<String>>>,
) {
    stream.set_nodelay(true).ok();
    let mut framed = Framed::new(stream, RespCodec::default());
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Value>();
    let mut multi: Option<Vec<Vec<Bytes>>> = None;

    loop {
        tokio::select! {
            incoming = framed.next() => {
                let Some(Ok(Value::Array(items))) = incoming else { return };
                let args: Vec<Bytes> = items
                    .into_iter()
                    .filter_map(|v| v.as_bulk().cloned())
                    .collect();
                if args.is_empty() {
                    continue;
                }
                log_call(&log, &args);

                let keyword = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
                let reply = match keyword.as_str() {
                    "MULTI" if multi.is_none() => {
                        multi = Some(Vec::new());
                        Some(Value::SimpleString(Bytes::from_static(b"OK")))
                    }
                    "EXEC" => match multi.take() {
                        Some(queued) => {
                            let replies = queued
                                .into_iter()
                                .map(|cmd| dispatch(&cmd, &store, &pubsub, &push_tx).unwrap_or(Value::NullBulk))
                                .collect();
                            Some(Value::Array(replies))
                        }
                        None => Some(Value::Error(Bytes::from_static(b"ERR EXEC without MULTI"))),
                    },
                    "DISCARD" => match multi.take() {
                        Some(_) => Some(Value::SimpleString(Bytes::from_static(b"OK"))),
                        None => Some(Value::Error(Bytes::from_static(b"ERR DISCARD without MULTI"))),
                    },
                    _ if multi.is_some() && keyword != "HELLO" => {
                        multi.as_mut().unwrap().push(args);
                        Some(Value::SimpleString(Bytes::from_static(b"QUEUED")))
                    }
                    _ => dispatch(&args, &store, &pubsub, &push_tx),
                };

                if let Some(reply) = reply {
                    if framed.send(reply).await.is_err() {
                        return;
                    }
                }
            }
            Some(pushed) = push_rx.recv() => {
                if framed.send(pushed).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn log_call(log: &Arc<Mutex<Vec<String>>>, args: &[Bytes]) {
    let rendered = args
        .iter()
        .map(|a| String::from_utf8_lossy(a).to_string())
        .collect::<Vec<_>>()
        .join(" ");
    log.lock().unwrap().push(rendered);
}

/// Dispatch one command. `None` means the reply (if any) was already
/// delivered directly via `push_tx` — the caller must not write anything
/// back for this command (used for (p)subscribe acks, which arrive as one
/// frame per name rather than a single aggregate reply).
fn dispatch(
    args: &[Bytes],
    store: &Arc<Mutex<Store>>,
    pubsub: &Arc<Mutex<PubSub>>,
    push_tx: &mpsc::UnboundedSender<Value>,
) -> Option<Value> {
    let keyword = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    let rest = &args[1..];

    if let Some(key) = rest.first() {
        if let Some(target) = store.lock().unwrap().moved.get(key).cloned() {
            return Some(Value::Error(Bytes::from(format!("MOVED {target}"))));
        }
    }

    let value = match keyword.as_str() {
        "PING" => Value::SimpleString(Bytes::from_static(b"PONG")),
        "HELLO" => hello_reply(),
        "AUTH" | "SELECT" | "ASKING" => Value::SimpleString(Bytes::from_static(b"OK")),
        "CLIENT" => Value::SimpleString(Bytes::from_static(b"OK")),
        "CLUSTER" => cluster_slots_reply(store.lock().unwrap().self_port),

        "SET" if rest.len() >= 2 => {
            store.lock().unwrap().strings.insert(rest[0].clone(), rest[1].clone());
            Value::SimpleString(Bytes::from_static(b"OK"))
        }
        "GET" if rest.len() == 1 => match store.lock().unwrap().strings.get(&rest[0]) {
            Some(v) => Value::BulkString(v.clone()),
            None => Value::NullBulk,
        },
        "GETSET" if rest.len() == 2 => {
            let mut guard = store.lock().unwrap();
            let prev = guard.strings.insert(rest[0].clone(), rest[1].clone());
            prev.map(Value::BulkString).unwrap_or(Value::NullBulk)
        }
        "DEL" => {
            let mut guard = store.lock().unwrap();
            let count = rest
                .iter()
                .filter(|k| {
                    let mut hit = guard.strings.remove(*k).is_some();
                    hit |= guard.lists.remove(*k).is_some();
                    hit |= guard.hashes.remove(*k).is_some();
                    hit |= guard.sets.remove(*k).is_some();
                    hit
                })
                .count();
            Value::Integer(count as i64)
        }
        "EXISTS" => {
            let guard = store.lock().unwrap();
            let count = rest
                .iter()
                .filter(|k| {
                    guard.strings.contains_key(*k)
                        || guard.lists.contains_key(*k)
                        || guard.hashes.contains_key(*k)
                        || guard.sets.contains_key(*k)
                })
                .count();
            Value::Integer(count as i64)
        }
        "EXPIRE" => Value::Integer(1),
        "TTL" => Value::Integer(-1),
        "INCR" if rest.len() == 1 => incr_by(store, &rest[0], 1),
        "DECR" if rest.len() == 1 => incr_by(store, &rest[0], -1),
        "INCRBY" if rest.len() == 2 => {
            let delta: i64 = parse_i64(&rest[1]).unwrap_or(0);
            incr_by(store, &rest[0], delta)
        }
        "APPEND" if rest.len() == 2 => {
            let mut guard = store.lock().unwrap();
            let entry = guard.strings.entry(rest[0].clone()).or_insert_with(Bytes::new);
            let mut combined = entry.to_vec();
            combined.extend_from_slice(&rest[1]);
            let len = combined.len();
            *entry = Bytes::from(combined);
            Value::Integer(len as i64)
        }
        "STRLEN" if rest.len() == 1 => {
            let len = store.lock().unwrap().strings.get(&rest[0]).map(|b| b.len()).unwrap_or(0);
            Value::Integer(len as i64)
        }
        "MGET" => {
            let guard = store.lock().unwrap();
            Value::Array(
                rest.iter()
                    .map(|k| guard.strings.get(k).cloned().map(Value::BulkString).unwrap_or(Value::NullBulk))
                    .collect(),
            )
        }

        "LPUSH" if rest.len() >= 2 => {
            let mut guard = store.lock().unwrap();
            let list = guard.lists.entry(rest[0].clone()).or_default();
            for value in &rest[1..] {
                list.push_front(value.clone());
            }
            Value::Integer(list.len() as i64)
        }
        "RPUSH" if rest.len() >= 2 => {
            let mut guard = store.lock().unwrap();
            let list = guard.lists.entry(rest[0].clone()).or_default();
            for value in &rest[1..] {
                list.push_back(value.clone());
            }
            Value::Integer(list.len() as i64)
        }
        "LPOP" if rest.len() == 1 => {
            let mut guard = store.lock().unwrap();
            match guard.lists.get_mut(&rest[0]).and_then(|l| l.pop_front()) {
                Some(v) => Value::BulkString(v),
                None => Value::NullBulk,
            }
        }
        "RPOP" if rest.len() == 1 => {
            let mut guard = store.lock().unwrap();
            match guard.lists.get_mut(&rest[0]).and_then(|l| l.pop_back()) {
                Some(v) => Value::BulkString(v),
                None => Value::NullBulk,
            }
        }
        "LLEN" if rest.len() == 1 => {
            let len = store.lock().unwrap().lists.get(&rest[0]).map(|l| l.len()).unwrap_or(0);
            Value::Integer(len as i64)
        }
        "LRANGE" if rest.len() == 3 => {
            let guard = store.lock().unwrap();
            let Some(list) = guard.lists.get(&rest[0]) else {
                return Some(Value::Array(Vec::new()));
            };
            let start = parse_i64(&rest[1]).unwrap_or(0);
            let stop = parse_i64(&rest[2]).unwrap_or(-1);
            Value::Array(slice_range(list, start, stop).into_iter().map(Value::BulkString).collect())
        }

        "HGET" if rest.len() == 2 => {
            let guard = store.lock().unwrap();
            match guard.hashes.get(&rest[0]).and_then(|h| h.get(&rest[1])) {
                Some(v) => Value::BulkString(v.clone()),
                None => Value::NullBulk,
            }
        }
        "HSET" if rest.len() == 3 => {
            let mut guard = store.lock().unwrap();
            let is_new = guard
                .hashes
                .entry(rest[0].clone())
                .or_default()
                .insert(rest[1].clone(), rest[2].clone())
                .is_none();
            Value::Integer(if is_new { 1 } else { 0 })
        }
        "HGETALL" if rest.len() == 1 => {
            let guard = store.lock().unwrap();
            match guard.hashes.get(&rest[0]) {
                Some(h) => Value::Array(
                    h.iter()
                        .flat_map(|(k, v)| [Value::BulkString(k.clone()), Value::BulkString(v.clone())])
                        .collect(),
                ),
                None => Value::Array(Vec::new()),
            }
        }
        "HDEL" if rest.len() >= 2 => {
            let mut guard = store.lock().unwrap();
            let Some(h) = guard.hashes.get_mut(&rest[0]) else {
                return Some(Value::Integer(0));
            };
            let removed = rest[1..].iter().filter(|f| h.remove(*f).is_some()).count();
            Value::Integer(removed as i64)
        }

        "SADD" if rest.len() >= 2 => {
            let mut guard = store.lock().unwrap();
            let set = guard.sets.entry(rest[0].clone()).or_default();
            let added = rest[1..].iter().filter(|m| set.insert((*m).clone())).count();
            Value::Integer(added as i64)
        }
        "SMEMBERS" if rest.len() == 1 => {
            let guard = store.lock().unwrap();
            match guard.sets.get(&rest[0]) {
                Some(s) => Value::Array(s.iter().cloned().map(Value::BulkString).collect()),
                None => Value::Array(Vec::new()),
            }
        }
        "SISMEMBER" if rest.len() == 2 => {
            let present = store.lock().unwrap().sets.get(&rest[0]).is_some_and(|s| s.contains(&rest[1]));
            Value::Integer(present as i64)
        }

        "PUBLISH" if rest.len() == 2 => Value::Integer(publish(pubsub, &rest[0], &rest[1])),
        "SUBSCRIBE" => {
            send_subscribe_acks(pubsub, rest, push_tx, false);
            return None;
        }
        "PSUBSCRIBE" => {
            send_subscribe_acks(pubsub, rest, push_tx, true);
            return None;
        }
        "UNSUBSCRIBE" | "PUNSUBSCRIBE" => {
            let pattern = keyword == "PUNSUBSCRIBE";
            send_unsubscribe_acks(pubsub, rest, pattern);
            return None;
        }

        _ => Value::Error(Bytes::from(format!("ERR unsupported command '{keyword}' in test stub"))),
    };
    Some(value)
}

fn incr_by(store: &Arc<Mutex<Store>>, key: &Bytes, delta: i64) -> Value {
    let mut guard = store.lock().unwrap();
    let current = guard
        .strings
        .get(key)
        .and_then(|b| parse_i64(b))
        .unwrap_or(0);
    let next = current + delta;
    guard.strings.insert(key.clone(), Bytes::from(next.to_string()));
    Value::Integer(next)
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn slice_range(list: &VecDeque<Bytes>, start: i64, stop: i64) -> Vec<Bytes> {
    let len = list.len() as i64;
    if len == 0 {
        return Vec::new();
    }
    let norm = |i: i64| -> i64 {
        if i < 0 { (len + i).max(0) } else { i.min(len - 1).max(0) }
    };
    let start = norm(start);
    let stop = norm(stop).min(len - 1);
    if start > stop {
        return Vec::new();
    }
    list.iter().skip(start as usize).take((stop - start + 1) as usize).cloned().collect()
}

fn hello_reply() -> Value {
    Value::Map(vec![
        (Value::SimpleString(Bytes::from_static(b"server")), Value::SimpleString(Bytes::from_static(b"redpipe-stub"))),
        (Value::SimpleString(Bytes::from_static(b"proto")), Value::Integer(3)),
    ])
}

/// A single-range slot table covering every slot, owned by this server's
/// own address — enough for `ClusterRouter::bootstrap` to build an
/// initial table, and patched over with `MOVED` via [`StubServer::script_moved`].
fn cluster_slots_reply(self_port: u16) -> Value {
    Value::Array(vec![Value::Array(vec![
        Value::Integer(0),
        Value::Integer(16383),
        Value::Array(vec![
            Value::BulkString(Bytes::from_static(b"127.0.0.1")),
            Value::Integer(self_port as i64),
        ]),
    ])])
}

fn publish(pubsub: &Arc<Mutex<PubSub>>, channel: &Bytes, payload: &Bytes) -> i64 {
    let guard = pubsub.lock().unwrap();
    let mut delivered = 0i64;
    if let Some(subs) = guard.channels.get(channel) {
        for tx in subs {
            let msg = Value::Push(vec![
                Value::BulkString(Bytes::from_static(b"message")),
                Value::BulkString(channel.clone()),
                Value::BulkString(payload.clone()),
            ]);
            if tx.send(msg).is_ok() {
                delivered += 1;
            }
        }
    }
    for (pattern, subs) in guard.patterns.iter() {
        if glob_match(pattern, channel) {
            for tx in subs {
                let msg = Value::Push(vec![
                    Value::BulkString(Bytes::from_static(b"pmessage")),
                    Value::BulkString(pattern.clone()),
                    Value::BulkString(channel.clone()),
                    Value::BulkString(payload.clone()),
                ]);
                if tx.send(msg).is_ok() {
                    delivered += 1;
                }
            }
        }
    }
    delivered
}

/// Real Redis acks `(P)SUBSCRIBE` with one frame per name, each carrying
/// the subscriber's new total subscription count. Sent straight through
/// `push_tx` rather than returned, since `dispatch` only has room for a
/// single reply value per call.
fn send_subscribe_acks(
    pubsub: &Arc<Mutex<PubSub>>,
    names: &[Bytes],
    push_tx: &mpsc::UnboundedSender<Value>,
    pattern: bool,
) {
    let mut guard = pubsub.lock().unwrap();
    for name in names {
        let map = if pattern { &mut guard.patterns } else { &mut guard.channels };
        map.entry(name.clone()).or_default().push(push_tx.clone());
        let count = guard.channels.len() + guard.patterns.len();
        let ack = Value::Array(vec![
            Value::BulkString(Bytes::from_static(if pattern { b"psubscribe" } else { b"subscribe" })),
            Value::BulkString(name.clone()),
            Value::Integer(count as i64),
        ]);
        let _ = push_tx.send(ack);
    }
}

fn send_unsubscribe_acks(pubsub: &Arc<Mutex<PubSub>>, names: &[Bytes], pattern: bool) {
    let mut guard = pubsub.lock().unwrap();
    for name in names {
        let map = if pattern { &mut guard.patterns } else { &mut guard.channels };
        map.remove(name);
    }
}

/// Minimal glob: supports a single trailing or leading `*`, or an exact
/// match — enough for the watch-keyspace patterns this crate issues.
fn glob_match(pattern: &Bytes, channel: &Bytes) -> bool {
    if pattern.as_ref() == channel.as_ref() {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(b"*".as_slice()) {
        return channel.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix(b"*".as_slice()) {
        return channel.ends_with(suffix);
    }
    false
}
