//! Static command table: command keyword → key-extraction rule, arity
//! hint, and pub/sub-control flag.
//!
//! This replaces the name-to-method reflection an interpreted client
//! would use: every public command method is a thin wrapper that builds
//! an argument list and calls `execute`, and routing decisions are made
//! by looking the already-uppercased keyword up in this table rather
//! than inspecting the call site.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Where to find the routing key in a command's argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIndex {
    /// The command has no key (e.g. `PING`, `INFO`).
    None,
    /// 1-based index into the arguments (not counting the keyword itself).
    Index(usize),
    /// Scan for the literal `STREAMS` token and take the argument after it
    /// (`XREAD`/`XREADGROUP`).
    AfterStreamsMarker,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandInfo {
    pub key_index: KeyIndex,
    pub arity: Option<usize>,
    pub pubsub_control: bool,
}

const fn cmd(key_index: KeyIndex, arity: Option<usize>, pubsub_control: bool) -> CommandInfo {
    CommandInfo {
        key_index,
        arity,
        pubsub_control,
    }
}

/// Commands allowed on a RESP2 connection while it is in `Subscribed` state.
pub const PUBSUB_ALLOWED: &[&str] = &[
    "SUBSCRIBE",
    "PSUBSCRIBE",
    "UNSUBSCRIBE",
    "PUNSUBSCRIBE",
    "PING",
    "QUIT",
    "RESET",
];

fn table() -> &'static HashMap<&'static str, CommandInfo> {
    static TABLE: OnceLock<HashMap<&'static str, CommandInfo>> = OnceLock::new();
    TABLE.get_or_init(|| {
        use KeyIndex::*;
        let mut m = HashMap::new();
        m.insert("GET", cmd(Index(1), Some(2), false));
        m.insert("SET", cmd(Index(1), None, false));
        m.insert("GETSET", cmd(Index(1), Some(3), false));
        m.insert("DEL", cmd(Index(1), None, false));
        m.insert("EXISTS", cmd(Index(1), None, false));
        m.insert("EXPIRE", cmd(Index(1), None, false));
        m.insert("TTL", cmd(Index(1), Some(2), false));
        m.insert("INCR", cmd(Index(1), Some(2), false));
        m.insert("DECR", cmd(Index(1), Some(2), false));
        m.insert("INCRBY", cmd(Index(1), Some(3), false));
        m.insert("APPEND", cmd(Index(1), Some(3), false));
        m.insert("STRLEN", cmd(Index(1), Some(2), false));
        m.insert("MGET", cmd(Index(1), None, false));

        m.insert("LPUSH", cmd(Index(1), None, false));
        m.insert("RPUSH", cmd(Index(1), None, false));
        m.insert("LPOP", cmd(Index(1), None, false));
        m.insert("RPOP", cmd(Index(1), None, false));
        m.insert("LLEN", cmd(Index(1), Some(2), false));
        m.insert("LRANGE", cmd(Index(1), Some(4), false));
        m.insert("LINDEX", cmd(Index(1), Some(3), false));

        m.insert("HGET", cmd(Index(1), Some(3), false));
        m.insert("HSET", cmd(Index(1), None, false));
        m.insert("HGETALL", cmd(Index(1), Some(2), false));
        m.insert("HMGET", cmd(Index(1), None, false));
        m.insert("HDEL", cmd(Index(1), None, false));
        m.insert("HKEYS", cmd(Index(1), Some(2), false));
        m.insert("HVALS", cmd(Index(1), Some(2), false));
        m.insert("HLEN", cmd(Index(1), Some(2), false));

        m.insert("SADD", cmd(Index(1), None, false));
        m.insert("SREM", cmd(Index(1), None, false));
        m.insert("SMEMBERS", cmd(Index(1), Some(2), false));
        m.insert("SISMEMBER", cmd(Index(1), Some(3), false));
        m.insert("SCARD", cmd(Index(1), Some(2), false));

        m.insert("ZADD", cmd(Index(1), None, false));
        m.insert("ZRANGE", cmd(Index(1), None, false));
        m.insert("ZSCORE", cmd(Index(1), Some(3), false));
        m.insert("ZCARD", cmd(Index(1), Some(2), false));

        m.insert("WATCH", cmd(Index(1), None, false));
        m.insert("UNWATCH", cmd(None, Some(1), false));
        m.insert("MULTI", cmd(None, Some(1), false));
        m.insert("EXEC", cmd(None, Some(1), false));
        m.insert("DISCARD", cmd(None, Some(1), false));

        m.insert("XADD", cmd(Index(1), None, false));
        m.insert("XLEN", cmd(Index(1), Some(2), false));
        m.insert("XREAD", cmd(AfterStreamsMarker, None, false));
        m.insert("XREADGROUP", cmd(AfterStreamsMarker, None, false));
        m.insert("XGROUP", cmd(Index(2), None, false));

        m.insert("PUBLISH", cmd(Index(1), Some(3), false));
        m.insert("SUBSCRIBE", cmd(Index(1), None, true));
        m.insert("PSUBSCRIBE", cmd(Index(1), None, true));
        m.insert("UNSUBSCRIBE", cmd(None, None, true));
        m.insert("PUNSUBSCRIBE", cmd(None, None, true));

        m.insert("PING", cmd(None, None, true));
        m.insert("QUIT", cmd(None, Some(1), true));
        m.insert("RESET", cmd(None, Some(1), true));
        m.insert("AUTH", cmd(None, None, false));
        m.insert("SELECT", cmd(None, Some(2), false));
        m.insert("HELLO", cmd(None, None, false));
        m.insert("CLIENT", cmd(None, None, false));
        m.insert("CLUSTER", cmd(None, None, false));
        m.insert("ASKING", cmd(None, Some(1), false));
        m.insert("INFO", cmd(None, None, false));
        m
    })
}

/// Look up a command's routing/arity metadata. Returns `None` for unknown
/// commands, in which case callers should treat the command as keyless.
pub fn lookup(keyword: &str) -> Option<CommandInfo> {
    table().get(keyword.to_ascii_uppercase().as_str()).copied()
}

pub fn is_pubsub_allowed(keyword: &str) -> bool {
    let upper = keyword.to_ascii_uppercase();
    PUBSUB_ALLOWED.contains(&upper.as_str())
}

/// Extract the routing key for `args` (the arguments following the
/// keyword), given the command's [`KeyIndex`] rule.
pub fn extract_key<'a>(key_index: KeyIndex, args: &'a [impl AsRef<[u8]>]) -> Option<&'a [u8]> {
    match key_index {
        KeyIndex::None => None,
        KeyIndex::Index(i) => args.get(i - 1).map(|a| a.as_ref()),
        KeyIndex::AfterStreamsMarker => {
            let marker_pos = args
                .iter()
                .position(|a| a.as_ref().eq_ignore_ascii_case(b"STREAMS"))?;
            args.get(marker_pos + 1).map(|a| a.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_has_key_at_index_one() {
        let info = lookup("get").unwrap();
        assert_eq!(info.key_index, KeyIndex::Index(1));
    }

    #[test]
    fn xgroup_key_is_second_argument() {
        let info = lookup("XGROUP").unwrap();
        assert_eq!(info.key_index, KeyIndex::Index(2));
        let args: Vec<&[u8]> = vec![b"CREATE", b"mystream", b"mygroup"];
        assert_eq!(extract_key(info.key_index, &args), Some(b"mystream".as_slice()));
    }

    #[test]
    fn xread_key_follows_streams_marker() {
        let info = lookup("XREAD").unwrap();
        let args: Vec<&[u8]> = vec![b"COUNT", b"2", b"STREAMS", b"mystream", b"$"];
        assert_eq!(
            extract_key(info.key_index, &args),
            Some(b"mystream".as_slice())
        );
    }

    #[test]
    fn ping_is_pubsub_allowed_while_subscribe_control() {
        assert!(is_pubsub_allowed("PING"));
        assert!(is_pubsub_allowed("subscribe"));
        assert!(!is_pubsub_allowed("GET"));
    }

    #[test]
    fn unknown_command_is_none() {
        assert!(lookup("NOTACOMMAND").is_none());
    }
}
