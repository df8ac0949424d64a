//! Single-node connection state machine.

mod actor;
mod handle;

pub use handle::Connection;
pub use pubsub_reexport::*;

mod pubsub_reexport {
    pub use crate::pubsub::{PubSubMessage, Subscription, SubscriptionKind};
}

/// Connection lifecycle state, mirroring:
/// `Disconnected --connect--> Connecting --hello-ok--> Ready`
/// `Ready --subscribe-ack--> Subscribed(n)`
/// `Subscribed(n) --(un)subscribe-ack--> Subscribed(n±1)`
/// `any --io-error--> Closing --> Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Subscribed(usize),
    Closing,
}

impl ConnectionState {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, ConnectionState::Subscribed(_))
    }
}
