//! Hash slot bookkeeping for the client's cluster view.
//!
//! Tracks which of the 16384 slots is served by which node. Key hashing
//! itself happens in the routing layer; this module only models slot
//! ownership and coverage.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::NodeId;

/// Total number of hash slots in the cluster (Redis Cluster standard).
pub const SLOT_COUNT: u16 = 16384;

/// An inclusive span of hash slots served by one node.
///
/// `start == end` describes a single slot. Construction goes through
/// [`SlotRange::new`], so a held value always satisfies
/// `start <= end < SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16, // inclusive
}

impl SlotRange {
    /// Validates and builds a range. Slot spans arrive in server responses,
    /// i.e. untrusted input, so out-of-order or out-of-bounds bounds are a
    /// parse error rather than a panic.
    pub fn new(start: u16, end: u16) -> Result<Self, ParseError> {
        if start > end || end >= SLOT_COUNT {
            return Err(ParseError::InvalidSlotRange(format!("{start}-{end}")));
        }
        Ok(Self { start, end })
    }

    /// Range describing exactly one slot.
    pub fn single(slot: u16) -> Self {
        Self {
            start: slot,
            end: slot,
        }
    }

    /// Number of slots spanned (at least 1).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u16 {
        self.end - self.start + 1
    }

    /// Whether `slot` falls inside the span.
    pub fn contains(&self, slot: u16) -> bool {
        (self.start..=self.end).contains(&slot)
    }

    /// Iterates every slot in the span.
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl std::fmt::Display for SlotRange {
    /// Renders in the wire notation: `"42"` for one slot, `"0-5460"` for a
    /// span.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.len() {
            1 => write!(f, "{}", self.start),
            _ => write!(f, "{}-{}", self.start, self.end),
        }
    }
}

/// Maps each of the 16384 slots to the id of the node serving it.
///
/// When a slot is `None`, no known node serves it — the cluster view has a
/// coverage gap, which is one of the signals that triggers a topology
/// refresh.
#[derive(Debug, Clone)]
pub struct SlotMap {
    slots: Box<[Option<NodeId>]>,
}

impl Default for SlotMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotMap {
    /// Creates an empty slot map with no assignments.
    pub fn new() -> Self {
        Self {
            slots: vec![None; SLOT_COUNT as usize].into_boxed_slice(),
        }
    }

    /// Returns the id of the node serving the given slot, if any.
    pub fn owner(&self, slot: u16) -> Option<&NodeId> {
        self.slots.get(slot as usize).and_then(|s| s.as_ref())
    }

    /// Assigns a slot to a node.
    pub fn assign(&mut self, slot: u16, node: NodeId) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            *entry = Some(node);
        }
    }

    /// Assigns a range of slots to a node.
    pub fn assign_range(&mut self, range: SlotRange, node: &NodeId) {
        for slot in range.iter() {
            self.assign(slot, node.clone());
        }
    }

    /// Clears the assignment for a slot.
    pub fn unassign(&mut self, slot: u16) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            *entry = None;
        }
    }

    /// Returns true if every slot is served by some node.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    /// Returns the number of slots without a serving node.
    pub fn unassigned_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Returns every slot without a serving node.
    pub fn uncovered_slots(&self) -> Vec<u16> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, owner)| owner.is_none())
            .map(|(slot, _)| slot as u16)
            .collect()
    }

    /// Returns all slots served by a specific node as a list of ranges.
    ///
    /// Consecutive slots are merged into ranges for compact representation.
    pub fn slots_for_node(&self, node: &NodeId) -> Vec<SlotRange> {
        let mut ranges = Vec::new();
        let mut open: Option<SlotRange> = None;

        for (slot_idx, owner) in self.slots.iter().enumerate() {
            let slot = slot_idx as u16;
            let owned = owner.as_ref() == Some(node);
            // indices stay in bounds by construction, so ranges are built
            // directly instead of revalidating through `SlotRange::new`
            open = match (open, owned) {
                (Some(mut range), true) => {
                    range.end = slot;
                    Some(range)
                }
                (None, true) => Some(SlotRange { start: slot, end: slot }),
                (Some(range), false) => {
                    ranges.push(range);
                    None
                }
                (None, false) => None,
            };
        }

        if let Some(range) = open {
            ranges.push(range);
        }

        ranges
    }
}
