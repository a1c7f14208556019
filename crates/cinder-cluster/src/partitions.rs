//! Immutable topology snapshots built from `CLUSTER NODES` output.
//!
//! A `Partitions` value is the unit of topology exchange inside the driver:
//! refresh builds a new snapshot, everything else reads it through an atomic
//! reference and never mutates it.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::ParseError;
use crate::node::{ClusterNode, NodeFlags, NodeId, NodeRole};
use crate::slots::{SlotMap, SlotRange};

/// One immutable view of the cluster: all known nodes plus a prebuilt
/// slot → node index.
///
/// Node order follows the `CLUSTER NODES` response that produced the
/// snapshot.
#[derive(Debug, Clone, Default)]
pub struct Partitions {
    nodes: Vec<ClusterNode>,
    by_id: HashMap<NodeId, usize>,
    slot_map: SlotMap,
}

impl Partitions {
    /// Builds a snapshot from a list of nodes, indexing their slot ranges.
    pub fn new(nodes: Vec<ClusterNode>) -> Self {
        let mut slot_map = SlotMap::new();
        let mut by_id = HashMap::with_capacity(nodes.len());

        for (idx, node) in nodes.iter().enumerate() {
            by_id.insert(node.id.clone(), idx);
            for range in &node.slots {
                slot_map.assign_range(*range, &node.id);
            }
        }

        Self {
            nodes,
            by_id,
            slot_map,
        }
    }

    /// Parses `CLUSTER NODES` output into a snapshot.
    ///
    /// Line format:
    /// `<id> <ip:port@bus-port> <flags> <primary-id> <ping-sent> <pong-recv>
    /// <config-epoch> <link-state> [slots...]`
    ///
    /// Slot migration annotations (`[slot->-id]`, `[slot-<-id]`) describe
    /// in-flight resharding on the reporting node and are skipped; the
    /// stable owner stays authoritative until the migration commits.
    pub fn from_cluster_nodes(input: &str) -> Result<Self, ParseError> {
        let mut nodes = Vec::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            nodes.push(parse_node_line(line)?);
        }

        Ok(Self::new(nodes))
    }

    /// Returns the node serving the given slot, if any.
    pub fn node_for_slot(&self, slot: u16) -> Option<&ClusterNode> {
        let id = self.slot_map.owner(slot)?;
        self.node_by_id(id)
    }

    /// Returns the node with the given id, if known.
    pub fn node_by_id(&self, id: &NodeId) -> Option<&ClusterNode> {
        self.by_id.get(id).and_then(|&idx| self.nodes.get(idx))
    }

    /// Returns all nodes in the snapshot.
    pub fn iter(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter()
    }

    /// Returns all primary nodes.
    pub fn primaries(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| n.role == NodeRole::Primary)
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the snapshot contains no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if every slot is served by some node.
    pub fn is_complete(&self) -> bool {
        self.slot_map.is_complete()
    }

    /// Returns every slot without a serving node.
    pub fn uncovered_slots(&self) -> Vec<u16> {
        self.slot_map.uncovered_slots()
    }
}

/// Parses a single `CLUSTER NODES` line.
fn parse_node_line(line: &str) -> Result<ClusterNode, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return Err(ParseError::InvalidNodeLine(line.to_string()));
    }

    if parts[0].is_empty() {
        return Err(ParseError::InvalidNodeId(line.to_string()));
    }
    let id = NodeId::new(parts[0]);

    let addr = parse_addr_field(parts[1])?;

    let flags_str = parts[2];
    let mut flags = NodeFlags {
        myself: has_flag(flags_str, "myself"),
        fail: has_flag(flags_str, "fail"),
        pfail: has_flag(flags_str, "fail?"),
        handshake: has_flag(flags_str, "handshake"),
        noaddr: has_flag(flags_str, "noaddr"),
    };
    if addr.is_none() {
        flags.noaddr = true;
    }
    let role = if has_flag(flags_str, "slave") {
        NodeRole::Replica
    } else {
        NodeRole::Primary
    };

    let replicates = if parts[3] == "-" {
        None
    } else {
        Some(NodeId::new(parts[3]))
    };

    // parts[4] (ping-sent) and parts[5] (pong-recv) are the reporting
    // node's internal probe stamps; the client has no use for them.

    let config_epoch: u64 = parts[6]
        .parse()
        .map_err(|_| ParseError::InvalidEpoch(parts[6].to_string()))?;

    let connected = parts[7] == "connected";

    let mut slots = Vec::new();
    for part in &parts[8..] {
        // migration annotation, e.g. "[93->-targetid]" or "[93-<-sourceid]"
        if part.starts_with('[') {
            continue;
        }
        slots.push(parse_slot_range(part)?);
    }

    Ok(ClusterNode {
        id,
        addr,
        role,
        flags,
        slots,
        replicates,
        config_epoch,
        connected,
    })
}

fn has_flag(flags: &str, wanted: &str) -> bool {
    flags.split(',').any(|f| f == wanted)
}

/// Parses the `ip:port@bus-port` field.
///
/// Returns `None` for nodes without a usable address: `noaddr` nodes report
/// an empty host (`:0@0`). Redis 7 may append `,hostname` after the bus
/// port; the hostname is ignored.
fn parse_addr_field(s: &str) -> Result<Option<SocketAddr>, ParseError> {
    let client_part = match s.split_once('@') {
        Some((client, _)) => client,
        None => s,
    };
    let client_part = match client_part.split_once(',') {
        Some((addr, _)) => addr,
        None => client_part,
    };

    if client_part.is_empty() || client_part.starts_with(':') {
        return Ok(None);
    }

    client_part
        .parse()
        .map(Some)
        .map_err(|_| ParseError::InvalidAddress(s.to_string()))
}

/// Parses a slot span like "0-5460" or "100".
///
/// A bare slot is the degenerate span `slot-slot`, so both shapes go
/// through the same bounds check in [`SlotRange::new`].
fn parse_slot_range(s: &str) -> Result<SlotRange, ParseError> {
    let (start, end) = s.split_once('-').unwrap_or((s, s));
    let bound = |text: &str| {
        text.parse::<u16>()
            .map_err(|_| ParseError::InvalidSlotRange(s.to_string()))
    };
    SlotRange::new(bound(start)?, bound(end)?)
}
