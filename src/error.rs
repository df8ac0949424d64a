//! Error taxonomy shared by every component.

use thiserror::Error;

/// Coarse category of a [`RedisError`], useful for callers that want to
/// match on recovery strategy without parsing the display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server returned a generic error reply (e.g. `WRONGTYPE`, `NOAUTH`).
    Server,
    /// The byte stream violated the RESP grammar. The connection is closed.
    Protocol,
    /// The connection is closed and no automatic reconnect was attempted.
    Disconnected,
    /// A command was issued on a subscribed RESP2 connection outside the
    /// pub/sub-allowed command set.
    PubSubMode,
    /// A cluster slot has no owning node in the slot table.
    ClusterNoNode,
    /// A MULTI/EXEC transaction was aborted (DISCARD or WATCH-triggered nil).
    Aborted,
    /// Configuration failed validation before a connection was attempted.
    Config,
    /// An I/O error occurred while reading or writing the socket.
    Io,
}

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum RedisError {
    #[error("{0}")]
    Server(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed: {0}")]
    Disconnected(String),

    #[error("command not allowed while subscribed")]
    PubSubMode,

    #[error("no node owns slot {0}")]
    ClusterNoNode(u16),

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RedisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RedisError::Server(_) => ErrorKind::Server,
            RedisError::Protocol(_) => ErrorKind::Protocol,
            RedisError::Disconnected(_) => ErrorKind::Disconnected,
            RedisError::PubSubMode => ErrorKind::PubSubMode,
            RedisError::ClusterNoNode(_) => ErrorKind::ClusterNoNode,
            RedisError::Aborted(_) => ErrorKind::Aborted,
            RedisError::Config(_) => ErrorKind::Config,
            RedisError::Io(_) => ErrorKind::Io,
            RedisError::Internal(_) => ErrorKind::Server,
        }
    }

    /// True if the raw server error line starts with `MOVED`.
    pub(crate) fn as_moved(&self) -> Option<(u16, String)> {
        match self {
            RedisError::Server(line) => parse_redirect(line, "MOVED"),
            _ => None,
        }
    }

    pub(crate) fn as_ask(&self) -> Option<(u16, String)> {
        match self {
            RedisError::Server(line) => parse_redirect(line, "ASK"),
            _ => None,
        }
    }

    pub(crate) fn is_try_again(&self) -> bool {
        matches!(self, RedisError::Server(line) if line.starts_with("TRYAGAIN"))
    }

    pub(crate) fn is_cluster_down(&self) -> bool {
        matches!(self, RedisError::Server(line) if line.starts_with("CLUSTERDOWN"))
    }
}

fn parse_redirect(line: &str, prefix: &str) -> Option<(u16, String)> {
    let rest = line.strip_prefix(prefix)?.trim_start();
    let mut parts = rest.split_whitespace();
    let slot: u16 = parts.next()?.parse().ok()?;
    let addr = parts.next()?.to_string();
    Some((slot, addr))
}

pub type Result<T> = std::result::Result<T, RedisError>;

/// Passed to a connection's `on_disconnect` hook when its actor tears
/// down every pending request. Carries the same text a pending
/// promise would have failed with, without requiring the hook to match
/// on [`RedisError`] variants it may not care about.
#[derive(Debug, Clone)]
pub struct DisconnectReason(pub String);

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moved_line() {
        let err = RedisError::Server("MOVED 1234 127.0.0.1:6380".into());
        assert_eq!(err.as_moved(), Some((1234, "127.0.0.1:6380".into())));
        assert_eq!(err.as_ask(), None);
    }

    #[test]
    fn parses_ask_line() {
        let err = RedisError::Server("ASK 1234 127.0.0.1:6380".into());
        assert_eq!(err.as_ask(), Some((1234, "127.0.0.1:6380".into())));
    }

    #[test]
    fn recognizes_tryagain_and_clusterdown() {
        assert!(RedisError::Server("TRYAGAIN something".into()).is_try_again());
        assert!(RedisError::Server("CLUSTERDOWN The cluster is down".into()).is_cluster_down());
        assert!(!RedisError::Server("WRONGTYPE bad".into()).is_try_again());
    }
}
