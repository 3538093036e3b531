//! Cluster node representation and CLUSTER NODES line parsing

use std::fmt;
use std::sync::Arc;

use super::slot::SLOT_COUNT;
use crate::client::BoxedConnection;
use crate::config::TlsDomain;
use crate::utils::ClusterError;

/// Inclusive slot range as reported by CLUSTER NODES (`0-5460`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, slot: u16) -> bool {
        self.start <= slot && slot <= self.end
    }
}

/// One slot-owning server of a topology, with its lazily opened connection
pub struct ClusterNode {
    /// Hostname or IP
    pub host: String,
    pub port: u16,
    /// Owned slots; empty for the single-instance node, whose routing never looks at them
    pub slots: Vec<SlotRange>,
    pub(crate) connection: Option<BoxedConnection>,
    /// TLS domain resolved on first connect and kept while connections succeed
    pub(crate) tls_domain: Option<Arc<TlsDomain>>,
}

impl fmt::Debug for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterNode")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("slots", &self.slots)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl ClusterNode {
    pub fn new(host: impl Into<String>, port: u16, slots: Vec<SlotRange>) -> Self {
        Self {
            host: host.into(),
            port,
            slots,
            connection: None,
            tls_domain: None,
        }
    }

    /// Get node address as string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn owns(&self, slot: u16) -> bool {
        self.slots.iter().any(|r| r.contains(slot))
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Drop the connection, closing the socket
    pub fn disconnect(&mut self) {
        self.connection = None;
    }
}

/// Parse a line from CLUSTER NODES response
///
/// Format: `<id> <ip:port@cport> <flags> <master> <ping-sent> <pong-recv> <config-epoch> <link-state> <slot> <slot> ... <slot>`
///
/// Only the address and the slot tokens matter; flags, epochs and link
/// state are ignored. Returns `Ok(None)` for lines that own no slot
/// (replicas, masters without assigned slots).
///
/// Example:
/// ```text
/// 07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30001@31001 master - 0 1426238316232 1 connected 0-5460
/// ```
pub fn parse_cluster_node_line(line: &str) -> Result<Option<ClusterNode>, ClusterError> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    let mut slots = Vec::new();
    for &token in parts.iter().skip(8) {
        if let Some(range) = parse_slot_range(token)? {
            slots.push(range);
        }
    }
    if slots.is_empty() {
        return Ok(None);
    }

    let (host, port) = parse_node_address(parts[1])
        .ok_or_else(|| ClusterError::ParseFailed(format!("bad node address in {:?}", line)))?;

    Ok(Some(ClusterNode::new(host, port, slots)))
}

/// Parse node address from CLUSTER NODES
/// Formats: "host:port@cport", "host:port", "host:port@cport,hostname"
///
/// The host may come back empty (`:7000`) from a node that does not know
/// its own address yet.
fn parse_node_address(addr: &str) -> Option<(String, u16)> {
    let addr = addr.split(',').next().unwrap_or(addr);
    let host_port = addr.split('@').next().unwrap_or(addr);
    let (host, port) = host_port.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

/// Parse slot range: "0-5460" or "0"
///
/// Migrating/importing markers like "[123->-node_id]" are skipped.
fn parse_slot_range(s: &str) -> Result<Option<SlotRange>, ClusterError> {
    if s.starts_with('[') {
        return Ok(None);
    }

    let bad = || ClusterError::ParseFailed(format!("bad slot token {:?}", s));
    let parse_slot = |t: &str| -> Result<u16, ClusterError> {
        match t.parse::<u16>() {
            Ok(slot) if slot < SLOT_COUNT => Ok(slot),
            _ => Err(bad()),
        }
    };

    let range = match s.split_once('-') {
        Some((start, end)) => SlotRange::new(parse_slot(start)?, parse_slot(end)?),
        None => {
            let slot = parse_slot(s)?;
            SlotRange::new(slot, slot)
        }
    };
    if range.start > range.end {
        return Err(bad());
    }
    Ok(Some(range))
}
