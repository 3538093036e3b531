//! Cluster topology discovery and slot routing
//!
//! A topology is a snapshot taken when an endpoint is first used. Routing
//! never follows MOVED/ASK redirections; a key whose slot no known node
//! owns is a routing error.

use tracing::debug;

use super::node::{parse_cluster_node_line, ClusterNode};
use super::slot::{slot_for_key, SLOT_COUNT};
use crate::client::{ControlPlane, ControlPlaneExt};
use crate::utils::{ClusterError, Result};

/// How an endpoint is deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyMode {
    /// Standalone server: one node, no hashing
    SingleInstance,
    /// Cluster: keys routed by hash slot
    Cluster,
}

/// Topology snapshot of one endpoint
#[derive(Debug)]
pub struct ClusterTopology {
    mode: TopologyMode,
    /// All slot-owning nodes (exactly one in single-instance mode)
    nodes: Vec<ClusterNode>,
    /// Slot to node index mapping (empty in single-instance mode)
    slot_map: Vec<Option<u16>>,
}

impl ClusterTopology {
    /// Topology of a standalone server
    pub fn single_instance(host: impl Into<String>, port: u16) -> Self {
        Self {
            mode: TopologyMode::SingleInstance,
            nodes: vec![ClusterNode::new(host, port, Vec::new())],
            slot_map: Vec::new(),
        }
    }

    /// Parse CLUSTER NODES response
    ///
    /// Nodes reported with an empty host are given `bootstrap_host`, the
    /// address the report was fetched from.
    pub fn from_cluster_nodes(
        response: &str,
        bootstrap_host: &str,
    ) -> std::result::Result<Self, ClusterError> {
        let mut nodes: Vec<ClusterNode> = Vec::new();
        let mut slot_map = vec![None; SLOT_COUNT as usize];

        for line in response.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some(mut node) = parse_cluster_node_line(line)? else {
                continue;
            };
            if node.host.is_empty() {
                node.host = bootstrap_host.to_string();
            }

            let idx = nodes.len() as u16;
            for range in &node.slots {
                for slot in range.start..=range.end {
                    let owner = &mut slot_map[slot as usize];
                    if owner.is_some() {
                        return Err(ClusterError::OverlappingSlot(slot));
                    }
                    *owner = Some(idx);
                }
            }
            nodes.push(node);
        }

        if nodes.is_empty() {
            return Err(ClusterError::ParseFailed(
                "no node owns any slot".to_string(),
            ));
        }

        Ok(Self {
            mode: TopologyMode::Cluster,
            nodes,
            slot_map,
        })
    }

    /// Discover the topology of the server behind `conn`
    ///
    /// A server that rejects CLUSTER NODES is treated as a single instance
    /// reachable at `host:port`.
    pub fn discover<C: ControlPlane + ?Sized>(conn: &mut C, host: &str, port: u16) -> Result<Self> {
        match conn.cluster_nodes()? {
            None => {
                debug!("{}:{} is a single instance", host, port);
                Ok(Self::single_instance(host, port))
            }
            Some(report) => {
                let topology = Self::from_cluster_nodes(&report, host)?;
                debug!(
                    "{}:{} is a cluster of {} slot-owning node(s), {} slots assigned",
                    host,
                    port,
                    topology.nodes.len(),
                    topology.assigned_slots()
                );
                Ok(topology)
            }
        }
    }

    pub fn mode(&self) -> TopologyMode {
        self.mode
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut ClusterNode {
        &mut self.nodes[idx]
    }

    /// Index of the node that serves `key`
    pub fn route(&self, key: &[u8]) -> std::result::Result<usize, ClusterError> {
        match self.mode {
            TopologyMode::SingleInstance => Ok(0),
            TopologyMode::Cluster => {
                let slot = slot_for_key(key);
                self.slot_map[slot as usize]
                    .map(usize::from)
                    .ok_or(ClusterError::UnassignedSlot(slot))
            }
        }
    }

    /// Number of slots owned by some node
    pub fn assigned_slots(&self) -> usize {
        self.slot_map.iter().filter(|s| s.is_some()).count()
    }

    /// Close every node connection
    pub fn disconnect_all(&mut self) {
        for node in &mut self.nodes {
            node.disconnect();
        }
    }
}
