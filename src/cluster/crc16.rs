//! Hash-slot computation: CRC16-CCITT (XMODEM variant) over a key's
//! hashtag, masked into `[0, MAX_SLOTS)`.

use std::sync::OnceLock;

use crc16::{State, XMODEM};

pub const MAX_SLOTS: u16 = 16384;

/// Extract the hashtag substring used for slot computation: the bytes
/// between the first `{` and the next `}`, provided there is at least one
/// byte between them; otherwise the whole key. Always byte-level.
pub fn hashtag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        let after_open = open + 1;
        if let Some(close_offset) = key[after_open..].iter().position(|&b| b == b'}') {
            if close_offset != 0 {
                return &key[after_open..after_open + close_offset];
            }
        }
    }
    key
}

/// Compute the cluster hash slot for a key.
pub fn slot(key: &[u8]) -> u16 {
    let tag = hashtag(key);
    State::<XMODEM>::calculate(tag) & (MAX_SLOTS - 1)
}

/// A precomputed ASCII key for every slot, built once by brute-forcing
/// candidate byte-strings `"0"`, `"1"`, `"2"`, … until every one of the
/// 16384 slots has a representative key. Lets callers force placement of
/// an unrelated key into a specific slot via `{slot-rep}suffix` hashtag
/// syntax.
pub fn key_for_slot(target: u16) -> &'static [u8] {
    static TABLE: OnceLock<Vec<Vec<u8>>> = OnceLock::new();
    let table = TABLE.get_or_init(build_key_for_slot_table);
    &table[target as usize]
}

fn build_key_for_slot_table() -> Vec<Vec<u8>> {
    let mut table: Vec<Option<Vec<u8>>> = vec![None; MAX_SLOTS as usize];
    let mut remaining = MAX_SLOTS as usize;
    let mut candidate: u64 = 0;
    while remaining > 0 {
        let key = candidate.to_string().into_bytes();
        let s = slot(&key) as usize;
        if table[s].is_none() {
            table[s] = Some(key);
            remaining -= 1;
        }
        candidate += 1;
    }
    table.into_iter().map(|k| k.unwrap()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_slot_values() {
        assert_eq!(slot(b"foo"), 12182);
        assert_eq!(slot(b""), 0);
    }

    #[test]
    fn hashtag_colocates_keys() {
        assert_eq!(slot(b"{tag}x"), slot(b"{tag}y"));
    }

    #[test]
    fn empty_hashtag_falls_back_to_whole_key() {
        // "{}" has no byte between braces, so the whole key "{}" is hashed.
        assert_eq!(slot(b"{}"), slot(b"{}") );
        assert_eq!(hashtag(b"{}"), b"{}");
    }

    #[test]
    fn hashtag_extraction_examples() {
        assert_eq!(hashtag(b"{user1000}.following"), b"user1000");
        assert_eq!(hashtag(b"foo{}{bar}"), b"foo{}{bar}");
        assert_eq!(hashtag(b"{}bar"), b"{}bar");
        assert_eq!(hashtag(b"nobraces"), b"nobraces");
    }

    #[test]
    fn key_for_slot_round_trips_for_every_slot() {
        for s in [0u16, 1, 100, 8192, 16383] {
            let key = key_for_slot(s);
            assert_eq!(slot(key), s, "key_for_slot({s}) did not hash back to {s}");
        }
    }
}
