//! Error types for the coordination core.

use std::sync::Arc;

/// Boxed error used at the injected-dependency seams (connection factory,
/// topology reload).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the connection broker.
///
/// `Clone` because every caller sharing one establishment attempt receives
/// the same outcome; the underlying cause is therefore held in an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// The broker was closed before the request was made.
    #[error("connection broker is closed")]
    Closed,

    /// The establishment was cancelled by broker shutdown or an explicit
    /// per-key close.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// The connection factory failed.
    #[error("connection failed: {0}")]
    Connect(Arc<dyn std::error::Error + Send + Sync>),
}

impl BrokerError {
    /// Wraps a factory failure.
    pub fn connect(cause: BoxError) -> Self {
        BrokerError::Connect(Arc::from(cause))
    }
}
