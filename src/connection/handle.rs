use std::net::ToSocketAddrs;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, FramedParts};

use crate::cache::{is_cacheable, CacheHandle, Fingerprint};
use crate::command_table;
use crate::config::{ClientConfig, Protocol};
use crate::error::{RedisError, Result};
use crate::resp::{command as encode_command, Command, RespCodec, Value};

use super::actor::{ConnectionActor, Msg};
use super::ConnectionState;
use crate::pubsub::{Subscription, SubscriptionKind};

/// A handle to one live connection. Cheaply cloneable; every clone talks
/// to the same background actor task that owns the socket.
#[derive(Clone)]
pub struct Connection {
    tx: mpsc::UnboundedSender<Msg>,
    protocol: Protocol,
    cache: CacheHandle,
}

impl Connection {
    /// Open a TCP connection to the configured endpoint, negotiate the
    /// protocol version, authenticate, select the database, and set the
    /// client name, then hand the connection off to its background actor.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let addr = config.socket_addr()?;
        let stream = match config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| RedisError::Disconnected("connect timed out".into()))??,
            None => TcpStream::connect(addr).await?,
        };
        stream.set_nodelay(true).ok();

        let mut parts = FramedParts::new(stream, RespCodec::new(config.max_bulk_len));
        parts.read_buf.reserve(config.stream_read_len);
        parts.write_buf.reserve(config.stream_write_len);
        let mut framed = Framed::from_parts(parts);
        let protocol = negotiate(&mut framed, config).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cache = CacheHandle::new(config.client_side_cache_size, protocol);
        let actor = ConnectionActor::new(framed, config, rx, cache.clone());
        tokio::spawn(actor.run());

        Ok(Self { tx, protocol, cache })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Dispatch a command and await its reply. Fails immediately with
    /// `pubsub-mode` if the connection is subscribed on RESP2 and the
    /// command is not in the pub/sub-allowed set.
    ///
    /// Read commands on the client-side-cache allowlist are served from
    /// the cache when possible. Concurrent misses for the same
    /// fingerprint coalesce onto a single wire request: the first caller
    /// becomes the in-flight owner and every other caller awaits its
    /// result instead of issuing a redundant GET.
    pub async fn execute(&self, args: &[&[u8]]) -> Result<Value> {
        self.gate_pubsub(args).await?;

        let Some(fp) = self.cache_fingerprint(args) else {
            return self.execute_uncached(args).await;
        };

        if let Some(value) = self.cache.get(&fp) {
            return Ok(value);
        }
        if let Some(mut follower) = self.cache.join_in_flight(&fp) {
            return match follower.recv().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(msg)) => Err(RedisError::Server(msg)),
                // The owner's broadcast sender was dropped without
                // completing (e.g. it panicked); fall back to issuing our
                // own request rather than hanging forever.
                Err(_) => self.execute_uncached(args).await,
            };
        }

        self.cache.begin_in_flight(fp.clone());
        let result = self.execute_uncached(args).await;
        match &result {
            Ok(value) if value.as_error_str().is_none() => {
                self.cache.insert(fp.clone(), value.clone());
                self.cache.complete_in_flight(&fp, Ok(value.clone()));
            }
            Ok(value) => {
                let msg = value.as_error_str().unwrap_or("server error").to_string();
                self.cache.complete_in_flight(&fp, Err(msg));
            }
            Err(err) => {
                self.cache.complete_in_flight(&fp, Err(err.to_string()));
            }
        }
        result
    }

    async fn execute_uncached(&self, args: &[&[u8]]) -> Result<Value> {
        let command = encode_command(args);
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(Msg::Execute { command, respond_to })
            .map_err(|_| RedisError::Disconnected("connection actor is gone".into()))?;
        rx.await
            .map_err(|_| RedisError::Disconnected("connection actor dropped the request".into()))?
    }

    /// Fingerprint `args` for the client-side cache if the command is on
    /// the cacheable allowlist and carries a key. `None` for no-key
    /// commands, write commands, or a disabled cache.
    fn cache_fingerprint(&self, args: &[&[u8]]) -> Option<Fingerprint> {
        if !self.cache.is_enabled() {
            return None;
        }
        let keyword = std::str::from_utf8(args.first().copied()?).ok()?;
        if !is_cacheable(keyword) {
            return None;
        }
        let info = command_table::lookup(keyword)?;
        let key = command_table::extract_key(info.key_index, &args[1..])?;
        Some(Fingerprint::new(keyword, key))
    }

    /// Issue a command as part of an open MULTI body: the QUEUED ack is
    /// swallowed by the actor. The user-visible result is resolved
    /// positionally by the transaction coordinator once the matching
    /// EXEC reply arrives, via [`Connection::execute_exec`].
    pub(crate) fn execute_queued(&self, args: &[&[u8]]) -> Result<()> {
        let command = encode_command(args);
        self.tx
            .send(Msg::ExecuteQueued { command })
            .map_err(|_| RedisError::Disconnected("connection actor is gone".into()))
    }

    pub(crate) async fn execute_exec(
        &self,
        args: &[&[u8]],
        deferred: Vec<oneshot::Sender<Result<Value>>>,
    ) -> Result<()> {
        let command = encode_command(args);
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(Msg::ExecuteExec {
                command,
                deferred,
                respond_to,
            })
            .map_err(|_| RedisError::Disconnected("connection actor is gone".into()))?;
        rx.await
            .map_err(|_| RedisError::Disconnected("connection actor dropped EXEC".into()))?
    }

    /// Subscribe to one or more channels or patterns. Idempotent per name.
    pub async fn subscribe(&self, kind: SubscriptionKind, names: Vec<Bytes>) -> Result<Vec<Subscription>> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(Msg::Subscribe {
                kind,
                names,
                respond_to,
            })
            .map_err(|_| RedisError::Disconnected("connection actor is gone".into()))?;
        rx.await
            .map_err(|_| RedisError::Disconnected("connection actor dropped subscribe".into()))
    }

    pub async fn unsubscribe(&self, kind: SubscriptionKind, names: Vec<Bytes>) -> Result<()> {
        self.tx
            .send(Msg::Unsubscribe { kind, names })
            .map_err(|_| RedisError::Disconnected("connection actor is gone".into()))
    }

    pub async fn state(&self) -> Result<ConnectionState> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(Msg::State { respond_to })
            .map_err(|_| RedisError::Disconnected("connection actor is gone".into()))?;
        rx.await
            .map_err(|_| RedisError::Disconnected("connection actor dropped state query".into()))
    }

    pub fn close(&self) {
        let _ = self.tx.send(Msg::Shutdown);
    }

    async fn gate_pubsub(&self, args: &[&[u8]]) -> Result<()> {
        if self.protocol == Protocol::Resp3 {
            // RESP3 push frames are demultiplexable; no gating needed.
            return Ok(());
        }
        let state = self.state().await?;
        if !state.is_subscribed() {
            return Ok(());
        }
        let keyword = std::str::from_utf8(args.first().copied().unwrap_or(b""))
            .unwrap_or_default();
        if command_table::is_pubsub_allowed(keyword) {
            Ok(())
        } else {
            Err(RedisError::PubSubMode)
        }
    }
}

async fn negotiate(
    framed: &mut Framed<TcpStream, RespCodec>,
    config: &ClientConfig,
) -> Result<Protocol> {
    if config.protocol == Protocol::Resp3 {
        let mut hello_args: Vec<Bytes> = vec![Bytes::from_static(b"HELLO"), Bytes::from_static(b"3")];
        if let Some(auth) = &config.auth {
            hello_args.push(Bytes::from_static(b"AUTH"));
            hello_args.push(Bytes::from_static(b"default"));
            hello_args.push(Bytes::copy_from_slice(auth.as_bytes()));
        }
        if let Some(name) = &config.client_name {
            hello_args.push(Bytes::from_static(b"SETNAME"));
            hello_args.push(Bytes::copy_from_slice(name.as_bytes()));
        }
        let reply = roundtrip(framed, Command::new(hello_args)).await?;
        if reply.as_error_str().is_none() {
            apply_post_connect(framed, config, Protocol::Resp3).await?;
            return Ok(Protocol::Resp3);
        }
        tracing::warn!("HELLO 3 rejected, falling back to RESP2");
    }
    apply_post_connect(framed, config, Protocol::Resp2).await?;
    Ok(Protocol::Resp2)
}

async fn apply_post_connect(
    framed: &mut Framed<TcpStream, RespCodec>,
    config: &ClientConfig,
    protocol: Protocol,
) -> Result<()> {
    // When RESP3 negotiation already folded AUTH/SETNAME into HELLO, skip
    // repeating them; RESP2 (or a RESP3 fallback) issues them separately.
    if protocol == Protocol::Resp2 {
        if let Some(auth) = &config.auth {
            let reply = roundtrip(
                framed,
                encode_command(&[b"AUTH", auth.as_bytes()]),
            )
            .await?;
            check_ok(&reply, "AUTH")?;
        }
        if let Some(name) = &config.client_name {
            let reply = roundtrip(
                framed,
                encode_command(&[b"CLIENT", b"SETNAME", name.as_bytes()]),
            )
            .await?;
            check_ok(&reply, "CLIENT SETNAME")?;
        }
    }
    if let Some(db) = config.database {
        let db_str = db.to_string();
        let reply = roundtrip(framed, encode_command(&[b"SELECT", db_str.as_bytes()])).await?;
        check_ok(&reply, "SELECT")?;
    }
    // Client-side cache only applies under RESP3: `CLIENT TRACKING ON`
    // makes the server deliver `invalidate` push frames on this same
    // connection, which `ConnectionActor::handle_incoming` routes to the
    // cache instead of the pending queue.
    if config.client_side_cache_size > 0 && protocol == Protocol::Resp3 {
        let reply = roundtrip(framed, encode_command(&[b"CLIENT", b"TRACKING", b"ON"])).await?;
        check_ok(&reply, "CLIENT TRACKING ON")?;
    }
    Ok(())
}

fn check_ok(reply: &Value, what: &str) -> Result<()> {
    if let Some(err) = reply.as_error_str() {
        return Err(RedisError::Server(format!("{what} failed: {err}")));
    }
    Ok(())
}

async fn roundtrip(framed: &mut Framed<TcpStream, RespCodec>, command: Command) -> Result<Value> {
    framed.send(command).await?;
    framed
        .next()
        .await
        .ok_or_else(|| RedisError::Disconnected("connection closed during handshake".into()))?
}

impl ClientConfig {
    pub(crate) fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        let host = self.host.as_deref().unwrap_or("127.0.0.1");
        let port = self.port.unwrap_or(6379);
        (host, port)
            .to_socket_addrs()
            .map_err(|e| RedisError::Config(format!("could not resolve {host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| RedisError::Config(format!("no address found for {host}:{port}")))
    }
}
