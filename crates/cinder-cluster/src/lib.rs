//! cinder-cluster: the client's view of a Redis cluster topology.
//!
//! This crate defines the immutable data model a cluster-aware client keeps
//! about the servers it talks to:
//!
//! - **Slot ranges**: the 16384 hash slots and their per-node assignments
//! - **Nodes**: identity, address, role, and health flags as reported by
//!   the cluster itself
//! - **Partitions**: one immutable snapshot of the whole topology, built
//!   from `CLUSTER NODES` output and swapped atomically on refresh
//!
//! A `Partitions` value is never mutated after construction. Topology
//! refresh builds a new snapshot and publishes it through an atomic
//! reference, so readers on hot paths only ever dereference.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use cinder_cluster::Partitions;
//!
//! let partitions = Partitions::from_cluster_nodes(&cluster_nodes_output)?;
//! if let Some(node) = partitions.node_for_slot(12182) {
//!     println!("slot 12182 lives on {}", node.id);
//! }
//! ```

mod error;
mod node;
mod partitions;
mod slots;

pub use error::ParseError;
pub use node::{ClusterNode, NodeFlags, NodeId, NodeRole};
pub use partitions::Partitions;
pub use slots::{SlotMap, SlotRange, SLOT_COUNT};
