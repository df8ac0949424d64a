use std::collections::VecDeque;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

use crate::cache::CacheHandle;
use crate::config::{ClientConfig, DisconnectHook};
use crate::error::{DisconnectReason, RedisError, Result};
use crate::pubsub::{PubSubMessage, SubscriptionKind, SubscriptionRegistry};
use crate::resp::{Command, RespCodec, Value};

use super::{ConnectionState, Subscription};

pub(crate) enum Msg {
    Execute {
        command: Command,
        respond_to: oneshot::Sender<Result<Value>>,
    },
    /// Sent for a command issued inside an open MULTI body. The wire-level
    /// `QUEUED` ack is consumed and discarded here; the transaction
    /// coordinator holds its own oneshot per command and resolves it
    /// positionally from the `ExecuteExec` reply instead.
    ExecuteQueued { command: Command },
    /// The wire-level EXEC or DISCARD command. `deferred` holds every
    /// promise queued since the matching MULTI, in order.
    ExecuteExec {
        command: Command,
        deferred: Vec<oneshot::Sender<Result<Value>>>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        kind: SubscriptionKind,
        names: Vec<Bytes>,
        respond_to: oneshot::Sender<Vec<Subscription>>,
    },
    Unsubscribe {
        kind: SubscriptionKind,
        names: Vec<Bytes>,
    },
    State {
        respond_to: oneshot::Sender<ConnectionState>,
    },
    Shutdown,
}

enum PendingKind {
    Normal(oneshot::Sender<Result<Value>>),
    Queued,
    Exec {
        deferred: Vec<oneshot::Sender<Result<Value>>>,
        respond_to: oneshot::Sender<Result<()>>,
    },
}

struct WaitingExecute {
    command: Command,
    respond_to: oneshot::Sender<Result<Value>>,
}

pub(crate) struct ConnectionActor {
    framed: Framed<TcpStream, RespCodec>,
    inbox: mpsc::UnboundedReceiver<Msg>,
    pending: VecDeque<PendingKind>,
    waiting: VecDeque<WaitingExecute>,
    subscriptions: SubscriptionRegistry,
    cache: CacheHandle,
    pipeline_depth: usize,
    hashrefs: bool,
    state: ConnectionState,
    on_disconnect: Option<DisconnectHook>,
}

impl ConnectionActor {
    pub(crate) fn new(
        framed: Framed<TcpStream, RespCodec>,
        config: &ClientConfig,
        inbox: mpsc::UnboundedReceiver<Msg>,
        cache: CacheHandle,
    ) -> Self {
        Self {
            framed,
            inbox,
            pending: VecDeque::new(),
            waiting: VecDeque::new(),
            subscriptions: SubscriptionRegistry::new(),
            cache,
            pipeline_depth: config.pipeline_depth,
            hashrefs: config.hashrefs,
            state: ConnectionState::Ready,
            on_disconnect: config.on_disconnect.clone(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                msg = self.inbox.recv() => {
                    match msg {
                        Some(msg) => {
                            if self.handle_message(msg).await.is_err() {
                                self.fail_everything("disconnected: write error").await;
                                return;
                            }
                        }
                        None => {
                            // All handles dropped; nothing left to serve.
                            return;
                        }
                    }
                }
                frame = self.framed.next() => {
                    match frame {
                        Some(Ok(value)) => self.handle_incoming(value).await,
                        Some(Err(err)) => {
                            tracing::warn!(error = %err, "protocol error, closing connection");
                            self.fail_everything(&format!("protocol error: {err}")).await;
                            return;
                        }
                        None => {
                            self.fail_everything("disconnected: connection closed by peer").await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: Msg) -> std::io::Result<()> {
        match msg {
            Msg::Execute { command, respond_to } => {
                if self.pending.len() >= self.pipeline_depth {
                    self.waiting.push_back(WaitingExecute { command, respond_to });
                    return Ok(());
                }
                self.dispatch_normal(command, respond_to).await?;
            }
            Msg::ExecuteQueued { command } => {
                // MULTI-body commands bypass the pipeline_depth backpressure
                // window: they are already committed to an open transaction.
                self.pending.push_back(PendingKind::Queued);
                self.framed.feed(command).await?;
                self.framed.flush().await?;
            }
            Msg::ExecuteExec {
                command,
                deferred,
                respond_to,
            } => {
                self.pending.push_back(PendingKind::Exec { deferred, respond_to });
                self.framed.feed(command).await?;
                self.framed.flush().await?;
            }
            Msg::Subscribe {
                kind,
                names,
                respond_to,
            } => {
                let keyword: &[u8] = match kind {
                    SubscriptionKind::Channel => b"SUBSCRIBE",
                    SubscriptionKind::Pattern => b"PSUBSCRIBE",
                };
                let mut subs = Vec::with_capacity(names.len());
                let mut wire_args: Vec<&[u8]> = vec![keyword];
                for name in &names {
                    wire_args.push(name.as_ref());
                }
                for name in &names {
                    let (sub, _ack) = self.subscriptions.subscribe(kind, name.clone());
                    subs.push(sub);
                }
                let new_count = self.subscriptions.len();
                self.state = if new_count > 0 {
                    ConnectionState::Subscribed(new_count)
                } else {
                    ConnectionState::Ready
                };
                self.framed.feed(crate::resp::command(&wire_args)).await?;
                self.framed.flush().await?;
                let _ = respond_to.send(subs);
            }
            Msg::Unsubscribe { kind, names } => {
                let keyword: &[u8] = match kind {
                    SubscriptionKind::Channel => b"UNSUBSCRIBE",
                    SubscriptionKind::Pattern => b"PUNSUBSCRIBE",
                };
                let mut wire_args: Vec<&[u8]> = vec![keyword];
                for name in &names {
                    wire_args.push(name.as_ref());
                }
                for name in &names {
                    self.subscriptions.unsubscribe(kind, name);
                }
                let new_count = self.subscriptions.len();
                self.state = if new_count > 0 {
                    ConnectionState::Subscribed(new_count)
                } else {
                    ConnectionState::Ready
                };
                self.framed.feed(crate::resp::command(&wire_args)).await?;
                self.framed.flush().await?;
            }
            Msg::State { respond_to } => {
                let _ = respond_to.send(self.state);
            }
            Msg::Shutdown => {
                self.fail_everything("disconnected: local shutdown").await;
            }
        }
        Ok(())
    }

    async fn dispatch_normal(
        &mut self,
        command: Command,
        respond_to: oneshot::Sender<Result<Value>>,
    ) -> std::io::Result<()> {
        self.pending.push_back(PendingKind::Normal(respond_to));
        self.framed.feed(command).await?;
        self.framed.flush().await
    }

    async fn handle_incoming(&mut self, value: Value) {
        if let Some(kind) = value.push_kind() {
            if kind.eq_ignore_ascii_case("invalidate") {
                self.cache.handle_invalidation(&value);
                return;
            }
            if matches!(
                kind.to_ascii_lowercase().as_str(),
                "message" | "pmessage" | "subscribe" | "psubscribe" | "unsubscribe" | "punsubscribe"
            ) {
                self.route_pubsub(kind, &value);
                return;
            }
        }
        if matches!(self.state, ConnectionState::Subscribed(_)) {
            if let Some(items) = value.as_array() {
                if let Some(Value::BulkString(kind_bytes) | Value::SimpleString(kind_bytes)) =
                    items.first()
                {
                    if let Ok(kind) = std::str::from_utf8(kind_bytes) {
                        if matches!(
                            kind.to_ascii_lowercase().as_str(),
                            "message" | "pmessage" | "subscribe" | "psubscribe" | "unsubscribe"
                                | "punsubscribe"
                        ) {
                            self.route_pubsub(kind, &value);
                            return;
                        }
                    }
                }
            }
        }
        self.resolve_next(Ok(value.coerce_hashrefs(self.hashrefs))).await;
    }

    fn route_pubsub(&mut self, kind: &str, value: &Value) {
        let items = match value.as_array() {
            Some(items) => items,
            None => return,
        };
        let lower = kind.to_ascii_lowercase();
        match lower.as_str() {
            "message" => {
                if let (Some(Value::BulkString(channel)), Some(Value::BulkString(payload))) =
                    (items.get(1), items.get(2))
                {
                    if !self.subscriptions.dispatch(
                        SubscriptionKind::Channel,
                        channel,
                        PubSubMessage {
                            channel: channel.clone(),
                            payload: payload.clone(),
                        },
                    ) {
                        tracing::debug!(channel = ?channel, "message for unknown channel dropped");
                    }
                }
            }
            "pmessage" => {
                if let (
                    Some(Value::BulkString(pattern)),
                    Some(Value::BulkString(channel)),
                    Some(Value::BulkString(payload)),
                ) = (items.get(1), items.get(2), items.get(3))
                {
                    if !self.subscriptions.dispatch(
                        SubscriptionKind::Pattern,
                        pattern,
                        PubSubMessage {
                            channel: channel.clone(),
                            payload: payload.clone(),
                        },
                    ) {
                        tracing::debug!(pattern = ?pattern, "message for unknown pattern dropped");
                    }
                }
            }
            "subscribe" => {
                if let Some(Value::BulkString(name)) = items.get(1) {
                    self.subscriptions.ack(SubscriptionKind::Channel, name);
                }
            }
            "psubscribe" => {
                if let Some(Value::BulkString(name)) = items.get(1) {
                    self.subscriptions.ack(SubscriptionKind::Pattern, name);
                }
            }
            "unsubscribe" | "punsubscribe" => {}
            _ => {}
        }
    }

    async fn resolve_next(&mut self, reply: Result<Value>) {
        match self.pending.pop_front() {
            Some(PendingKind::Normal(tx)) => {
                let _ = tx.send(reply);
            }
            Some(PendingKind::Queued) => {
                // The QUEUED ack (or an error if the command was rejected
                // inside the transaction) is discarded; the user-visible
                // promise resolves positionally when EXEC's array arrives.
                if let Ok(value) = &reply {
                    if let Some(err) = value.as_error_str() {
                        tracing::debug!(error = err, "command queued in MULTI was rejected");
                    }
                }
            }
            Some(PendingKind::Exec { deferred, respond_to }) => {
                self.resolve_exec(reply, deferred, respond_to);
            }
            None => {
                tracing::warn!("reply with no matching pending request; dropping");
                return;
            }
        }
        self.drain_waiting().await;
    }

    fn resolve_exec(
        &mut self,
        reply: Result<Value>,
        deferred: Vec<oneshot::Sender<Result<Value>>>,
        respond_to: oneshot::Sender<Result<()>>,
    ) {
        match reply {
            Ok(Value::Array(items)) => {
                for (slot, tx) in deferred.into_iter().enumerate() {
                    let value = items
                        .get(slot)
                        .cloned()
                        .unwrap_or(Value::Null)
                        .coerce_hashrefs(self.hashrefs);
                    let _ = tx.send(Ok(value));
                }
                let _ = respond_to.send(Ok(()));
            }
            Ok(Value::NullArray) | Ok(Value::Null) => {
                for tx in deferred {
                    let _ = tx.send(Err(RedisError::Aborted(
                        "transaction aborted (WATCH key changed)".into(),
                    )));
                }
                let _ = respond_to.send(Err(RedisError::Aborted(
                    "transaction aborted (WATCH key changed)".into(),
                )));
            }
            Ok(other) => {
                // DISCARD or a non-array EXEC reply: nothing to split.
                let _ = respond_to.send(Ok(()));
                let _ = other;
                for tx in deferred {
                    let _ = tx.send(Err(RedisError::Aborted("transaction discarded".into())));
                }
            }
            Err(err) => {
                let msg = err.to_string();
                for tx in deferred {
                    let _ = tx.send(Err(RedisError::Aborted(msg.clone())));
                }
                let _ = respond_to.send(Err(err));
            }
        }
    }

    async fn drain_waiting(&mut self) {
        while self.pending.len() < self.pipeline_depth {
            let Some(next) = self.waiting.pop_front() else {
                break;
            };
            if self.dispatch_normal(next.command, next.respond_to).await.is_err() {
                self.fail_everything("disconnected: write error").await;
                break;
            }
        }
    }

    async fn fail_everything(&mut self, reason: &str) {
        self.state = ConnectionState::Closing;
        for pending in self.pending.drain(..) {
            match pending {
                PendingKind::Normal(tx) => {
                    let _ = tx.send(Err(RedisError::Disconnected(reason.to_string())));
                }
                PendingKind::Queued => {}
                PendingKind::Exec { deferred, respond_to } => {
                    for tx in deferred {
                        let _ = tx.send(Err(RedisError::Disconnected(reason.to_string())));
                    }
                    let _ = respond_to.send(Err(RedisError::Disconnected(reason.to_string())));
                }
            }
        }
        for waiting in self.waiting.drain(..) {
            let _ = waiting.respond_to.send(Err(RedisError::Disconnected(reason.to_string())));
        }
        self.subscriptions.close_all();
        self.state = ConnectionState::Disconnected;
        if let Some(hook) = &self.on_disconnect {
            hook.call(&DisconnectReason(reason.to_string()));
        }
    }
}
