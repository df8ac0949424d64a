//! Cluster routing: hash-slot ownership table, per-node connection pool,
//! MOVED/ASK redirect recovery, and cross-node fan-out.

pub mod crc16;
pub mod router;
pub mod slots;

pub use crc16::{hashtag, key_for_slot, slot, MAX_SLOTS};
pub use router::ClusterRouter;
pub use slots::{parse_cluster_slots, NodeAddr, SlotRange, SlotTable};
