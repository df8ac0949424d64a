use bytes::Bytes;

/// A single decoded RESP2/RESP3 reply.
///
/// Binary-safe: nothing here assumes UTF-8 except [`Value::Error`] and
/// [`Value::SimpleString`], where the server's own contract is ASCII.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Bytes),
    NullBulk,
    Array(Vec<Value>),
    NullArray,
    // RESP3 extensions
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Null,
    Double(f64),
    Boolean(bool),
    BigNumber(Bytes),
    VerbatimString([u8; 3], Bytes),
    /// Out-of-band push frame (pub/sub messages, invalidation, etc). Routed
    /// around the pending-request queue rather than resolving it.
    Push(Vec<Value>),
}

impl Value {
    /// The server error line, if this is an [`Value::Error`] reply decoded
    /// as UTF-8. Redis error lines are ASCII by contract.
    pub fn as_error_str(&self) -> Option<&str> {
        match self {
            Value::Error(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Value::BulkString(b) | Value::VerbatimString(_, b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Set(items) | Value::Push(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, Value::Push(_))
    }

    /// True for replies that represent "no value" in either protocol version.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Null | Value::NullBulk | Value::NullArray)
    }

    /// Apply the `hashrefs` config toggle to a top-level reply: when
    /// disabled, a RESP3 `Map` reply (e.g. `HGETALL`) is flattened into the
    /// RESP2-shaped alternating array `[k1, v1, k2, v2, ...]` instead of
    /// being handed to the caller as a `Map`. Every other variant passes
    /// through unchanged.
    pub fn coerce_hashrefs(self, enabled: bool) -> Value {
        if enabled {
            return self;
        }
        match self {
            Value::Map(pairs) => Value::Array(pairs.into_iter().flat_map(|(k, v)| [k, v]).collect()),
            other => other,
        }
    }

    /// Construct a `Push` frame whose first element names `kind`, matching
    /// the shape pub/sub and invalidation frames take on the wire.
    pub(crate) fn push_kind(&self) -> Option<&str> {
        let items = match self {
            Value::Push(items) => items,
            _ => return None,
        };
        items.first().and_then(|v| match v {
            Value::SimpleString(b) | Value::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        })
    }
}

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::SimpleString(Bytes::from_static(s.as_bytes()))
    }
}
