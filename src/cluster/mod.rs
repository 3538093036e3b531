//! Cluster topology and slot routing
//!
//! This module provides:
//! - Topology discovery via CLUSTER NODES, with single-instance fallback
//! - Slot mapping and CRC16 calculation with hash tags
//! - Key to node routing over a topology snapshot

pub mod node;
pub mod slot;
pub mod topology;

pub use node::{ClusterNode, SlotRange};
pub use slot::{slot_for_key, SLOT_COUNT};
pub use topology::{ClusterTopology, TopologyMode};
