//! Slot table: a direct-addressed 16384-entry array backed by a sorted
//! list of slot ranges, so bulk rebuilds from `CLUSTER SLOTS` only need
//! to touch the sorted list and a single O(MAX_SLOTS) sweep.

use std::sync::Arc;

use crate::resp::Value;

use super::crc16::MAX_SLOTS;

/// Address of a cluster node, as reported by `CLUSTER SLOTS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.rsplit_once(':')?;
        Some(Self::new(host, port.parse().ok()?))
    }
}

/// One contiguous range of slots and the primary/replica addresses that
/// own it.
#[derive(Debug, Clone)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub primary: Arc<NodeAddr>,
    pub replicas: Vec<Arc<NodeAddr>>,
}

/// Direct-addressed slot ownership table, with a parallel sorted range
/// list used to rebuild it and to serve as a binary-search fallback.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    ranges: Vec<SlotRange>,
    flat: Vec<Option<Arc<NodeAddr>>>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self {
            ranges: Vec::new(),
            flat: vec![None; MAX_SLOTS as usize],
        }
    }

    /// Replace the entire table from a parsed, slot-start-sorted range list.
    pub fn rebuild(&mut self, mut ranges: Vec<SlotRange>) {
        ranges.sort_by_key(|r| r.start);
        self.flat = vec![None; MAX_SLOTS as usize];
        for range in &ranges {
            for slot in range.start..=range.end {
                self.flat[slot as usize] = Some(range.primary.clone());
            }
        }
        self.ranges = ranges;
    }

    /// Point a single slot at a new primary, e.g. after a MOVED redirect.
    /// Does not touch the range list (the range list is only rebuilt
    /// wholesale via `rebuild`; `node_for_slot`'s flat-array fast path is
    /// what callers actually consult after a MOVED).
    pub fn set_slot(&mut self, slot: u16, primary: Arc<NodeAddr>) {
        self.flat[slot as usize] = Some(primary);
    }

    /// Look up the node owning `slot`: flat array first, falling back to a
    /// binary search over the sorted range list (and repairing the flat
    /// entry so subsequent lookups hit the fast path).
    pub fn node_for_slot(&mut self, slot: u16) -> Option<Arc<NodeAddr>> {
        if let Some(node) = &self.flat[slot as usize] {
            return Some(node.clone());
        }
        let idx = self
            .ranges
            .binary_search_by(|r| {
                if slot < r.start {
                    std::cmp::Ordering::Greater
                } else if slot > r.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;
        let node = self.ranges[idx].primary.clone();
        self.flat[slot as usize] = Some(node.clone());
        Some(node)
    }

    /// Read-only counterpart to [`SlotTable::node_for_slot`], for callers
    /// that only hold a shared snapshot (e.g. behind an `ArcSwap`) and so
    /// can't repair the flat-array cache on a binary-search hit.
    pub fn lookup(&self, slot: u16) -> Option<Arc<NodeAddr>> {
        if let Some(node) = &self.flat[slot as usize] {
            return Some(node.clone());
        }
        let idx = self
            .ranges
            .binary_search_by(|r| {
                if slot < r.start {
                    std::cmp::Ordering::Greater
                } else if slot > r.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;
        Some(self.ranges[idx].primary.clone())
    }

    pub fn all_primaries(&self) -> Vec<Arc<NodeAddr>> {
        let mut seen = Vec::new();
        for range in &self.ranges {
            if !seen.iter().any(|n: &Arc<NodeAddr>| **n == *range.primary) {
                seen.push(range.primary.clone());
            }
        }
        seen
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Parse a `CLUSTER SLOTS` reply into a sorted list of [`SlotRange`]s.
///
/// Each top-level array element is `[start, end, [primary_host, primary_port, node_id?],
/// [replica_host, replica_port, ...]*]`.
pub fn parse_cluster_slots(reply: &Value) -> Option<Vec<SlotRange>> {
    let entries = reply.as_array()?;
    let mut ranges = Vec::with_capacity(entries.len());
    for entry in entries {
        let fields = entry.as_array()?;
        if fields.len() < 3 {
            return None;
        }
        let start = as_i64(&fields[0])? as u16;
        let end = as_i64(&fields[1])? as u16;
        let primary = parse_node_entry(&fields[2])?;
        let mut replicas = Vec::new();
        for replica_field in &fields[3..] {
            if let Some(addr) = parse_node_entry(replica_field) {
                replicas.push(Arc::new(addr));
            }
        }
        ranges.push(SlotRange {
            start,
            end,
            primary: Arc::new(primary),
            replicas,
        });
    }
    ranges.sort_by_key(|r| r.start);
    Some(ranges)
}

fn parse_node_entry(value: &Value) -> Option<NodeAddr> {
    let fields = value.as_array()?;
    let host_bytes = fields.first()?.as_bulk()?;
    let host = std::str::from_utf8(host_bytes).ok()?.to_string();
    let port = as_i64(fields.get(1)?)? as u16;
    Some(NodeAddr::new(host, port))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn bulk(s: &str) -> Value {
        Value::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn parses_cluster_slots_reply() {
        let reply = Value::Array(vec![Value::Array(vec![
            Value::Integer(0),
            Value::Integer(5460),
            Value::Array(vec![bulk("127.0.0.1"), Value::Integer(30001)]),
            Value::Array(vec![bulk("127.0.0.1"), Value::Integer(30004)]),
        ])]);
        let ranges = parse_cluster_slots(&reply).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[0].end, 5460);
        assert_eq!(ranges[0].primary.port, 30001);
        assert_eq!(ranges[0].replicas.len(), 1);
    }

    #[test]
    fn node_for_slot_falls_back_to_binary_search_then_caches() {
        let mut table = SlotTable::new();
        table.rebuild(vec![SlotRange {
            start: 100,
            end: 200,
            primary: Arc::new(NodeAddr::new("h1", 7000)),
            replicas: vec![],
        }]);
        let found = table.node_for_slot(150).unwrap();
        assert_eq!(found.port, 7000);
    }

    #[test]
    fn set_slot_overrides_flat_entry_after_moved() {
        let mut table = SlotTable::new();
        table.rebuild(vec![SlotRange {
            start: 0,
            end: 16383,
            primary: Arc::new(NodeAddr::new("h1", 7000)),
            replicas: vec![],
        }]);
        table.set_slot(42, Arc::new(NodeAddr::new("h2", 7001)));
        assert_eq!(table.node_for_slot(42).unwrap().port, 7001);
        assert_eq!(table.node_for_slot(43).unwrap().port, 7000);
    }
}
