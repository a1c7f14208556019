//! Error types for topology parsing.

/// Error returned when parsing `CLUSTER NODES` output fails.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid node line: {0}")]
    InvalidNodeLine(String),
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid slot range: {0}")]
    InvalidSlotRange(String),
    #[error("invalid config epoch: {0}")]
    InvalidEpoch(String),
}
