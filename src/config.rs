//! Typed connection configuration: URI/option parsing and validation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DisconnectReason, RedisError, Result};

/// Event hook invoked once per connection close, after every pending
/// promise has already been failed. Set programmatically; not part of
/// the `serde` surface since a closure has no wire representation.
#[derive(Clone)]
pub struct DisconnectHook(pub Arc<dyn Fn(&DisconnectReason) + Send + Sync>);

impl DisconnectHook {
    pub fn new(f: impl Fn(&DisconnectReason) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, reason: &DisconnectReason) {
        (self.0)(reason)
    }
}

impl fmt::Debug for DisconnectHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DisconnectHook(..)")
    }
}

/// RESP protocol version negotiated at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Resp2,
    Resp3,
}

/// Configuration for a single-node connection.
///
/// Every field has a default so a minimal `ClientConfig { host: Some(..),
/// ..Default::default() }` is enough to connect. Use [`ClientConfig::from_uri`]
/// to build one from a `redis://` connection string instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Password for `AUTH`.
    #[serde(default)]
    pub auth: Option<String>,
    /// Issued as `SELECT` post-connect.
    #[serde(default)]
    pub database: Option<i64>,
    /// `resp2` or `resp3`.
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    /// Enable RESP3 map-typed replies. Requires `protocol = resp3`.
    #[serde(default)]
    pub hashrefs: bool,
    /// Maximum number of dispatched-but-unresolved commands.
    #[serde(default = "default_pipeline_depth")]
    pub pipeline_depth: usize,
    /// Read buffer hint, in bytes.
    #[serde(default = "default_stream_len")]
    pub stream_read_len: usize,
    /// Write buffer hint, in bytes.
    #[serde(default = "default_stream_len")]
    pub stream_write_len: usize,
    /// Issued as `CLIENT SETNAME` post-connect.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Positive value enables the client-side cache. Requires RESP3.
    #[serde(default)]
    pub client_side_cache_size: usize,
    /// Cap on a single bulk-string/array/map/set length, enforced by the
    /// decoder: oversized length lines are rejected outright rather than
    /// attempting the allocation.
    #[serde(default = "default_max_bulk_len")]
    pub max_bulk_len: usize,
    /// Caller-supplied timeout for the initial TCP connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "duration_secs_opt")]
    pub connect_timeout: Option<Duration>,
    /// Background `CLUSTER SLOTS` refresh interval (cluster mode only).
    /// Zero disables periodic refresh; MOVED-triggered refresh still runs.
    #[serde(default = "default_slot_refresh_interval_secs")]
    pub slot_refresh_interval_secs: u64,
    /// Invoked once when the connection's actor tears itself down (EOF,
    /// protocol error, or local shutdown). Not serializable; absent by
    /// default.
    #[serde(skip)]
    pub on_disconnect: Option<DisconnectHook>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            auth: None,
            database: None,
            protocol: default_protocol(),
            hashrefs: false,
            pipeline_depth: default_pipeline_depth(),
            stream_read_len: default_stream_len(),
            stream_write_len: default_stream_len(),
            client_name: None,
            client_side_cache_size: 0,
            max_bulk_len: default_max_bulk_len(),
            connect_timeout: None,
            slot_refresh_interval_secs: default_slot_refresh_interval_secs(),
            on_disconnect: None,
        }
    }
}

fn default_protocol() -> Protocol {
    Protocol::Resp2
}

fn default_pipeline_depth() -> usize {
    100
}

fn default_stream_len() -> usize {
    16 * 1024
}

fn default_max_bulk_len() -> usize {
    512 * 1024 * 1024
}

fn default_slot_refresh_interval_secs() -> u64 {
    30
}

impl ClientConfig {
    /// Parse `redis://[:password@]host[:port][/database]`. Unknown query
    /// parameters are ignored.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("redis://")
            .ok_or_else(|| RedisError::Config(format!("unsupported URI scheme: {uri}")))?;

        let (authority_and_path, _query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };

        let (userinfo, hostport_and_db) = match authority_and_path.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, authority_and_path),
        };

        let (hostport, db_segment) = match hostport_and_db.split_once('/') {
            Some((hp, db)) => (hp, Some(db)),
            None => (hostport_and_db, None),
        };

        if hostport.is_empty() {
            return Err(RedisError::Config("redis:// URI missing host".into()));
        }

        let (host, port) = match hostport.rsplit_once(':') {
            Some((h, p)) => (
                h.to_string(),
                Some(
                    p.parse::<u16>()
                        .map_err(|_| RedisError::Config(format!("invalid port: {p}")))?,
                ),
            ),
            None => (hostport.to_string(), None),
        };

        let auth = userinfo.and_then(|u| u.strip_prefix(':')).filter(|p| !p.is_empty());
        let database = match db_segment.filter(|s| !s.is_empty()) {
            Some(db) => Some(
                db.parse::<i64>()
                    .map_err(|_| RedisError::Config(format!("invalid database index: {db}")))?,
            ),
            None => None,
        };

        let mut config = ClientConfig {
            host: Some(host),
            port,
            auth: auth.map(str::to_string),
            database,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints before any socket is opened.
    pub fn validate(&mut self) -> Result<()> {
        if self.pipeline_depth == 0 {
            return Err(RedisError::Config("pipeline_depth must be positive".into()));
        }
        if self.hashrefs && self.protocol != Protocol::Resp3 {
            return Err(RedisError::Config(
                "hashrefs requires protocol = resp3".into(),
            ));
        }
        if self.client_side_cache_size > 0 && self.protocol != Protocol::Resp3 {
            return Err(RedisError::Config(
                "client_side_cache_size requires protocol = resp3".into(),
            ));
        }
        Ok(())
    }
}

mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let config = ClientConfig::from_uri("redis://:secret@example.com:7000/3").unwrap();
        assert_eq!(config.host.as_deref(), Some("example.com"));
        assert_eq!(config.port, Some(7000));
        assert_eq!(config.auth.as_deref(), Some("secret"));
        assert_eq!(config.database, Some(3));
    }

    #[test]
    fn parses_bare_host() {
        let config = ClientConfig::from_uri("redis://localhost").unwrap();
        assert_eq!(config.host.as_deref(), Some("localhost"));
        assert_eq!(config.port, None);
        assert_eq!(config.auth, None);
        assert_eq!(config.database, None);
    }

    #[test]
    fn rejects_non_redis_scheme() {
        assert!(ClientConfig::from_uri("http://localhost").is_err());
    }

    #[test]
    fn hashrefs_requires_resp3() {
        let mut config = ClientConfig {
            hashrefs: true,
            protocol: Protocol::Resp2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.protocol = Protocol::Resp3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cache_size_requires_resp3() {
        let mut config = ClientConfig {
            client_side_cache_size: 100,
            protocol: Protocol::Resp2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
