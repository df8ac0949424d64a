use std::io;
use std::ops::Range;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::RedisError;

use super::value::Value;

/// Default cap on a single bulk-string/array/map/set length line, matching
/// the Redis server's own `proto-max-bulk-len` default.
const DEFAULT_MAX_FRAME_LEN: usize = 512 * 1024 * 1024;

/// Incremental RESP2/RESP3 decoder and command encoder.
///
/// Decoding is two-phase: [`scan`] walks the buffer read-only, computing
/// byte ranges for every leaf value without copying, and returns `None`
/// the moment it runs out of bytes so a partial frame is simply retried
/// on the next `decode` call once more bytes have arrived. Once a frame
/// scans completely, the consumed region is split off and frozen into a
/// single [`Bytes`], and every leaf value borrows a zero-copy slice of it.
#[derive(Debug, Clone)]
pub struct RespCodec {
    max_frame_len: usize,
}

impl Default for RespCodec {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl RespCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

/// A command ready to be written to the wire: an ordered list of
/// already-binary arguments, encoded as a RESP array of bulk strings.
#[derive(Debug, Clone)]
pub struct Command(pub Vec<Bytes>);

impl Command {
    pub fn new(args: Vec<Bytes>) -> Self {
        Self(args)
    }
}

impl Encoder<Command> for RespCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> io::Result<()> {
        dst.reserve(item.0.iter().map(|a| a.len() + 16).sum::<usize>() + 16);
        dst.extend_from_slice(format!("*{}\r\n", item.0.len()).as_bytes());
        for arg in &item.0 {
            dst.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            dst.extend_from_slice(arg);
            dst.extend_from_slice(b"\r\n");
        }
        Ok(())
    }
}

/// Encode a decoded [`Value`] back onto the wire. The client itself never
/// needs this (it only ever encodes [`Command`]s), but the test harness's
/// stub server replies with programmatic `Value`s and needs the inverse
/// of [`Decoder::decode`] to do it with the same codec.
impl Encoder<Value> for RespCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> io::Result<()> {
        encode_value(&item, dst);
        Ok(())
    }
}

fn encode_value(value: &Value, dst: &mut BytesMut) {
    match value {
        Value::SimpleString(b) => {
            dst.extend_from_slice(b"+");
            dst.extend_from_slice(b);
            dst.extend_from_slice(b"\r\n");
        }
        Value::Error(b) => {
            dst.extend_from_slice(b"-");
            dst.extend_from_slice(b);
            dst.extend_from_slice(b"\r\n");
        }
        Value::Integer(i) => dst.extend_from_slice(format!(":{i}\r\n").as_bytes()),
        Value::BulkString(b) => {
            dst.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
            dst.extend_from_slice(b);
            dst.extend_from_slice(b"\r\n");
        }
        Value::NullBulk => dst.extend_from_slice(b"$-1\r\n"),
        Value::Array(items) => {
            dst.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_value(item, dst);
            }
        }
        Value::NullArray => dst.extend_from_slice(b"*-1\r\n"),
        Value::Map(pairs) => {
            dst.extend_from_slice(format!("%{}\r\n", pairs.len()).as_bytes());
            for (k, v) in pairs {
                encode_value(k, dst);
                encode_value(v, dst);
            }
        }
        Value::Set(items) => {
            dst.extend_from_slice(format!("~{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_value(item, dst);
            }
        }
        Value::Null => dst.extend_from_slice(b"_\r\n"),
        Value::Double(d) => {
            let rendered = if d.is_nan() {
                "nan".to_string()
            } else if d.is_infinite() {
                if *d > 0.0 { "inf".to_string() } else { "-inf".to_string() }
            } else {
                d.to_string()
            };
            dst.extend_from_slice(format!(",{rendered}\r\n").as_bytes());
        }
        Value::Boolean(b) => dst.extend_from_slice(if *b { b"#t\r\n" } else { b"#f\r\n" }),
        Value::BigNumber(b) => {
            dst.extend_from_slice(b"(");
            dst.extend_from_slice(b);
            dst.extend_from_slice(b"\r\n");
        }
        Value::VerbatimString(tag, b) => {
            dst.extend_from_slice(format!("={}\r\n", b.len() + 4).as_bytes());
            dst.extend_from_slice(tag);
            dst.extend_from_slice(b":");
            dst.extend_from_slice(b);
            dst.extend_from_slice(b"\r\n");
        }
        Value::Push(items) => {
            dst.extend_from_slice(format!(">{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_value(item, dst);
            }
        }
    }
}

/// True if `value` contains a RESP3-only variant anywhere in its tree
/// (including nested inside arrays/maps/sets/pushes).
fn has_resp3_only_variant(value: &Value) -> bool {
    match value {
        Value::Map(_) | Value::Set(_) | Value::Null | Value::Double(_) | Value::Boolean(_) | Value::BigNumber(_)
        | Value::VerbatimString(..) | Value::Push(_) => true,
        Value::Array(items) => items.iter().any(has_resp3_only_variant),
        Value::SimpleString(_) | Value::Error(_) | Value::Integer(_) | Value::BulkString(_) | Value::NullBulk
        | Value::NullArray => false,
    }
}

/// Encode `value` for `protocol`, rejecting RESP3-only reply types (`Map`,
/// `Set`, `Null`, `Double`, `Boolean`, `BigNumber`, `VerbatimString`,
/// `Push`, and any of those nested inside an `Array`) when `protocol` is
/// [`crate::config::Protocol::Resp2`].
pub fn encode_for_protocol(
    value: &Value,
    protocol: crate::config::Protocol,
    dst: &mut BytesMut,
) -> Result<(), RedisError> {
    if protocol == crate::config::Protocol::Resp2 && has_resp3_only_variant(value) {
        return Err(protocol_err("RESP3-only reply type cannot be encoded under RESP2"));
    }
    encode_value(value, dst);
    Ok(())
}

impl Decoder for RespCodec {
    type Item = Value;
    type Error = RedisError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Value>, RedisError> {
        let frame = match scan(buf, 0, self.max_frame_len)? {
            Some((frame, consumed)) => {
                let base = buf.split_to(consumed).freeze();
                materialize(frame, &base)
            }
            None => return Ok(None),
        };
        Ok(Some(frame))
    }
}

/// A parsed frame shape: leaf strings are byte ranges into the eventual
/// frozen buffer rather than owned copies, so nested arrays cost no
/// allocation beyond the `Vec` spine itself.
enum Frame {
    Simple(Range<usize>),
    Error(Range<usize>),
    Integer(i64),
    Bulk(Range<usize>),
    NullBulk,
    Array(Vec<Frame>),
    NullArray,
    Map(Vec<(Frame, Frame)>),
    Set(Vec<Frame>),
    Null,
    Double(f64),
    Boolean(bool),
    BigNumber(Range<usize>),
    Verbatim([u8; 3], Range<usize>),
    Push(Vec<Frame>),
}

fn materialize(frame: Frame, base: &Bytes) -> Value {
    match frame {
        Frame::Simple(r) => Value::SimpleString(base.slice(r)),
        Frame::Error(r) => Value::Error(base.slice(r)),
        Frame::Integer(i) => Value::Integer(i),
        Frame::Bulk(r) => Value::BulkString(base.slice(r)),
        Frame::NullBulk => Value::NullBulk,
        Frame::Array(items) => {
            Value::Array(items.into_iter().map(|f| materialize(f, base)).collect())
        }
        Frame::NullArray => Value::NullArray,
        Frame::Map(pairs) => Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (materialize(k, base), materialize(v, base)))
                .collect(),
        ),
        Frame::Set(items) => Value::Set(items.into_iter().map(|f| materialize(f, base)).collect()),
        Frame::Null => Value::Null,
        Frame::Double(d) => Value::Double(d),
        Frame::Boolean(b) => Value::Boolean(b),
        Frame::BigNumber(r) => Value::BigNumber(base.slice(r)),
        Frame::Verbatim(tag, r) => Value::VerbatimString(tag, base.slice(r)),
        Frame::Push(items) => {
            Value::Push(items.into_iter().map(|f| materialize(f, base)).collect())
        }
    }
}

/// Find the `\r\n`-terminated line starting at `pos`. Returns the line's
/// byte range (excluding the terminator) and the position right after it.
fn find_line(data: &[u8], pos: usize) -> Option<(Range<usize>, usize)> {
    let mut i = pos;
    while i + 1 < data.len() {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Some((pos..i, i + 2));
        }
        i += 1;
    }
    None
}

fn protocol_err(msg: impl Into<String>) -> RedisError {
    RedisError::Protocol(msg.into())
}

fn parse_i64(data: &[u8], range: Range<usize>) -> Result<i64, RedisError> {
    std::str::from_utf8(&data[range])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| protocol_err("malformed integer length"))
}

/// Scan one complete frame starting at `pos`. Returns `Ok(None)` if the
/// buffer doesn't yet contain a full frame (caller should wait for more
/// bytes), `Ok(Some((frame, end_pos)))` on success, or a protocol error.
fn scan(data: &[u8], pos: usize, max_len: usize) -> Result<Option<(Frame, usize)>, RedisError> {
    if pos >= data.len() {
        return Ok(None);
    }
    let marker = data[pos];
    let body_start = pos + 1;

    match marker {
        b'+' => match find_line(data, body_start) {
            Some((r, next)) => Ok(Some((Frame::Simple(r), next))),
            None => Ok(None),
        },
        b'-' => match find_line(data, body_start) {
            Some((r, next)) => Ok(Some((Frame::Error(r), next))),
            None => Ok(None),
        },
        b':' => match find_line(data, body_start) {
            Some((r, next)) => Ok(Some((Frame::Integer(parse_i64(data, r)?), next))),
            None => Ok(None),
        },
        b'_' => match find_line(data, body_start) {
            Some((_, next)) => Ok(Some((Frame::Null, next))),
            None => Ok(None),
        },
        b'#' => match find_line(data, body_start) {
            Some((r, next)) => {
                let b = match &data[r] {
                    [b't'] => true,
                    [b'f'] => false,
                    _ => return Err(protocol_err("malformed boolean")),
                };
                Ok(Some((Frame::Boolean(b), next)))
            }
            None => Ok(None),
        },
        b',' => match find_line(data, body_start) {
            Some((r, next)) => {
                let s = std::str::from_utf8(&data[r.clone()])
                    .map_err(|_| protocol_err("malformed double"))?;
                let d = match s {
                    "inf" => f64::INFINITY,
                    "-inf" => f64::NEG_INFINITY,
                    "nan" => f64::NAN,
                    _ => s.parse::<f64>().map_err(|_| protocol_err("malformed double"))?,
                };
                Ok(Some((Frame::Double(d), next)))
            }
            None => Ok(None),
        },
        b'(' => match find_line(data, body_start) {
            Some((r, next)) => Ok(Some((Frame::BigNumber(r), next))),
            None => Ok(None),
        },
        b'$' | b'=' => {
            let (len_range, after_len) = match find_line(data, body_start) {
                Some(v) => v,
                None => return Ok(None),
            };
            let len = parse_i64(data, len_range)?;
            if len == -1 {
                return Ok(Some((Frame::NullBulk, after_len)));
            }
            if len < -1 {
                return Err(protocol_err("negative bulk length"));
            }
            let len = len as usize;
            if len > max_len {
                return Err(protocol_err(format!(
                    "bulk string length {len} exceeds maximum {max_len}"
                )));
            }
            let content_end = after_len + len;
            if data.len() < content_end + 2 {
                return Ok(None);
            }
            if &data[content_end..content_end + 2] != b"\r\n" {
                return Err(protocol_err("bulk string missing CRLF terminator"));
            }
            let next = content_end + 2;
            if marker == b'$' {
                Ok(Some((Frame::Bulk(after_len..content_end), next)))
            } else {
                // Verbatim string: 3-byte format tag, ':', then the text.
                if len < 4 || data[after_len + 3] != b':' {
                    return Err(protocol_err("malformed verbatim string header"));
                }
                let mut tag = [0u8; 3];
                tag.copy_from_slice(&data[after_len..after_len + 3]);
                Ok(Some((
                    Frame::Verbatim(tag, after_len + 4..content_end),
                    next,
                )))
            }
        }
        b'*' | b'~' | b'>' => {
            let (len_range, after_len) = match find_line(data, body_start) {
                Some(v) => v,
                None => return Ok(None),
            };
            let count = parse_i64(data, len_range)?;
            if marker == b'*' && count == -1 {
                return Ok(Some((Frame::NullArray, after_len)));
            }
            if count < 0 {
                return Err(protocol_err("negative array length"));
            }
            let count = count as usize;
            if count > max_len {
                return Err(protocol_err("array length exceeds maximum"));
            }
            let mut items = Vec::with_capacity(count.min(4096));
            let mut cursor = after_len;
            for _ in 0..count {
                match scan(data, cursor, max_len)? {
                    Some((item, next)) => {
                        items.push(item);
                        cursor = next;
                    }
                    None => return Ok(None),
                }
            }
            let frame = match marker {
                b'*' => Frame::Array(items),
                b'~' => Frame::Set(items),
                _ => Frame::Push(items),
            };
            Ok(Some((frame, cursor)))
        }
        b'%' => {
            let (len_range, after_len) = match find_line(data, body_start) {
                Some(v) => v,
                None => return Ok(None),
            };
            let pairs = parse_i64(data, len_range)?;
            if pairs < 0 {
                return Err(protocol_err("negative map length"));
            }
            let pairs = pairs as usize;
            if pairs > max_len {
                return Err(protocol_err("map length exceeds maximum"));
            }
            let mut out = Vec::with_capacity(pairs.min(4096));
            let mut cursor = after_len;
            for _ in 0..pairs {
                let (key, next) = match scan(data, cursor, max_len)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                let (value, next2) = match scan(data, next, max_len)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                out.push((key, value));
                cursor = next2;
            }
            Ok(Some((Frame::Map(out), cursor)))
        }
        b'|' => {
            // Attribute frame: a map of metadata followed by the value it
            // decorates. We consume and discard the map, then return the
            // value frame itself — attributes are transparent to callers.
            let (len_range, after_len) = match find_line(data, body_start) {
                Some(v) => v,
                None => return Ok(None),
            };
            let pairs = parse_i64(data, len_range)?;
            if pairs < 0 {
                return Err(protocol_err("negative attribute length"));
            }
            let mut cursor = after_len;
            for _ in 0..pairs as usize {
                let (_key, next) = match scan(data, cursor, max_len)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                let (_value, next2) = match scan(data, next, max_len)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                cursor = next2;
            }
            scan(data, cursor, max_len)
        }
        _ => Err(protocol_err(format!("unknown RESP type byte {marker:#x}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(mut input: &[u8]) -> Vec<Value> {
        let mut codec = RespCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(input);
        let mut out = Vec::new();
        while let Some(v) = codec.decode(&mut buf).unwrap() {
            out.push(v);
        }
        // silence unused warning if called with empty slices in future edits
        input = &input[input.len()..];
        let _ = input;
        out
    }

    #[test]
    fn decodes_simple_string() {
        let values = decode_all(b"+OK\r\n");
        assert_eq!(values, vec![Value::SimpleString(Bytes::from_static(b"OK"))]);
    }

    #[test]
    fn decodes_integer() {
        let values = decode_all(b":1000\r\n");
        assert_eq!(values, vec![Value::Integer(1000)]);
    }

    #[test]
    fn distinguishes_null_array_and_null_bulk() {
        let values = decode_all(b"*-1\r\n$-1\r\n");
        assert_eq!(values, vec![Value::NullArray, Value::NullBulk]);
    }

    #[test]
    fn decodes_bulk_string_with_embedded_crlf() {
        let values = decode_all(b"$6\r\nfoo\r\n\r\n");
        assert_eq!(
            values,
            vec![Value::BulkString(Bytes::from_static(b"foo\r\n"))]
        );
    }

    #[test]
    fn decodes_nested_array() {
        let values = decode_all(b"*2\r\n:1\r\n*1\r\n+ok\r\n");
        assert_eq!(
            values,
            vec![Value::Array(vec![
                Value::Integer(1),
                Value::Array(vec![Value::SimpleString(Bytes::from_static(b"ok"))])
            ])]
        );
    }

    #[test]
    fn streams_partial_chunks() {
        let whole = b"+OK\r\n:42\r\n".to_vec();
        let mut codec = RespCodec::default();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for byte in whole {
            buf.extend_from_slice(&[byte]);
            while let Some(v) = codec.decode(&mut buf).unwrap() {
                out.push(v);
            }
        }
        assert_eq!(
            out,
            vec![Value::SimpleString(Bytes::from_static(b"OK")), Value::Integer(42)]
        );
    }

    #[test]
    fn decodes_map_set_double_boolean_bignumber_verbatim_push() {
        let input = b"%1\r\n+k\r\n:1\r\n~1\r\n:2\r\n,3.14\r\n#t\r\n(12345\r\n=8\r\ntxt:abcd\r\n>1\r\n+msg\r\n";
        let values = decode_all(input);
        assert_eq!(
            values,
            vec![
                Value::Map(vec![(
                    Value::SimpleString(Bytes::from_static(b"k")),
                    Value::Integer(1)
                )]),
                Value::Set(vec![Value::Integer(2)]),
                Value::Double(3.14),
                Value::Boolean(true),
                Value::BigNumber(Bytes::from_static(b"12345")),
                Value::VerbatimString(*b"txt", Bytes::from_static(b"abcd")),
                Value::Push(vec![Value::SimpleString(Bytes::from_static(b"msg"))]),
            ]
        );
    }

    #[test]
    fn attribute_frame_is_skipped_transparently() {
        let values = decode_all(b"|1\r\n+key\r\n+val\r\n+OK\r\n");
        assert_eq!(values, vec![Value::SimpleString(Bytes::from_static(b"OK"))]);
    }

    #[test]
    fn rejects_oversized_bulk_length() {
        let mut codec = RespCodec::new(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"$32\r\n");
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, RedisError::Protocol(_)));
    }

    #[test]
    fn encodes_command_as_bulk_array() {
        let mut codec = RespCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Command::new(vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")]),
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    }

    fn roundtrip(value: Value) -> Value {
        let mut codec = RespCodec::default();
        let mut buf = BytesMut::new();
        Encoder::<Value>::encode(&mut codec, value, &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn value_encoder_roundtrips_every_variant() {
        let samples = vec![
            Value::SimpleString(Bytes::from_static(b"OK")),
            Value::Error(Bytes::from_static(b"WRONGTYPE bad")),
            Value::Integer(-42),
            Value::BulkString(Bytes::from_static(b"hello\r\nworld")),
            Value::NullBulk,
            Value::Array(vec![Value::Integer(1), Value::NullBulk]),
            Value::NullArray,
            Value::Map(vec![(
                Value::SimpleString(Bytes::from_static(b"k")),
                Value::Integer(1),
            )]),
            Value::Set(vec![Value::Integer(2)]),
            Value::Null,
            Value::Double(3.25),
            Value::Boolean(true),
            Value::BigNumber(Bytes::from_static(b"123456789012345")),
            Value::VerbatimString(*b"txt", Bytes::from_static(b"abcd")),
            Value::Push(vec![Value::SimpleString(Bytes::from_static(b"msg"))]),
        ];
        for sample in samples {
            assert_eq!(roundtrip(sample.clone()), sample);
        }
    }

    #[test]
    fn encode_for_protocol_rejects_resp3_only_under_resp2() {
        let mut buf = BytesMut::new();
        let err = encode_for_protocol(&Value::Boolean(true), crate::config::Protocol::Resp2, &mut buf).unwrap_err();
        assert!(matches!(err, RedisError::Protocol(_)));
        assert!(buf.is_empty());

        let nested = Value::Array(vec![Value::Integer(1), Value::Double(1.0)]);
        assert!(encode_for_protocol(&nested, crate::config::Protocol::Resp2, &mut buf).is_err());
    }

    #[test]
    fn encode_for_protocol_allows_resp2_types_under_resp2() {
        let mut buf = BytesMut::new();
        encode_for_protocol(&Value::Integer(7), crate::config::Protocol::Resp2, &mut buf).unwrap();
        assert_eq!(&buf[..], b":7\r\n");
    }

    #[test]
    fn encode_for_protocol_allows_everything_under_resp3() {
        let mut buf = BytesMut::new();
        encode_for_protocol(&Value::Boolean(false), crate::config::Protocol::Resp3, &mut buf).unwrap();
        assert_eq!(&buf[..], b"#f\r\n");
    }
}

/// Property tests: codec round-trip and streaming-decode equivalence,
/// using `proptest` the way this corpus tests other binary-format code.
#[cfg(test)]
mod proptests {
    use bytes::{Bytes, BytesMut};
    use proptest::prelude::*;
    use tokio_util::codec::Decoder;

    use super::{encode_value, RespCodec};
    use crate::resp::Value;

    fn leaf_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<Vec<u8>>().prop_map(|b| Value::SimpleString(Bytes::from(clean_simple(b)))),
            any::<Vec<u8>>().prop_map(|b| Value::Error(Bytes::from(clean_simple(b)))),
            any::<i64>().prop_map(Value::Integer),
            any::<Vec<u8>>().prop_map(|b| Value::BulkString(Bytes::from(b))),
            Just(Value::NullBulk),
            Just(Value::NullArray),
            Just(Value::Null),
            any::<bool>().prop_map(Value::Boolean),
        ]
    }

    /// Simple strings/errors are single-line-only on the wire: strip any
    /// byte that would itself introduce a premature CRLF.
    fn clean_simple(bytes: Vec<u8>) -> Vec<u8> {
        bytes.into_iter().filter(|b| *b != b'\r' && *b != b'\n').collect()
    }

    fn value_tree() -> impl Strategy<Value = Value> {
        leaf_value().prop_recursive(3, 16, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Value::Array)
        })
    }

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_value(value, &mut buf);
        buf.to_vec()
    }

    proptest! {
        #[test]
        fn codec_round_trip(value in value_tree()) {
            let bytes = encode(&value);
            let mut codec = RespCodec::default();
            let mut buf = BytesMut::new();
            buf.extend_from_slice(&bytes);
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            prop_assert_eq!(decoded, value);
        }

        /// Feeding the same byte stream one byte at a time must yield the
        /// same sequence of decoded values as feeding it all at once.
        #[test]
        fn streaming_decode_matches_whole_buffer(values in prop::collection::vec(value_tree(), 1..6)) {
            let mut whole = Vec::new();
            for v in &values {
                whole.extend_from_slice(&encode(v));
            }

            let mut bulk_codec = RespCodec::default();
            let mut bulk_buf = BytesMut::new();
            bulk_buf.extend_from_slice(&whole);
            let mut bulk_out = Vec::new();
            while let Some(v) = bulk_codec.decode(&mut bulk_buf).unwrap() {
                bulk_out.push(v);
            }

            let mut stream_codec = RespCodec::default();
            let mut stream_buf = BytesMut::new();
            let mut stream_out = Vec::new();
            for byte in &whole {
                stream_buf.extend_from_slice(std::slice::from_ref(byte));
                while let Some(v) = stream_codec.decode(&mut stream_buf).unwrap() {
                    stream_out.push(v);
                }
            }

            prop_assert_eq!(stream_out, bulk_out);
            prop_assert_eq!(stream_codec.decode(&mut BytesMut::new()).unwrap(), None::<Value>);
        }
    }
}
