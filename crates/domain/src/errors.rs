//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for FlashMart
///
/// Business rejections (`SoldOut`, `Duplicate`) are terminal and reported
/// synchronously to the caller. `LockUnavailable` and `Store` are transient;
/// call sites retry with backoff or skip the optimization. `Persistence`
/// failures leave the queue message unacknowledged so recovery can retry.
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum FlashMartError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Voucher is sold out")]
    SoldOut,

    #[error("Order already placed by this user")]
    Duplicate,

    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlashMartError {
    /// Whether a retry with backoff can reasonably succeed.
    ///
    /// Business rejections and missing entities are final; only transient
    /// store trouble and lock contention are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::LockUnavailable(_))
    }
}

/// Result type alias for FlashMart operations
pub type Result<T> = std::result::Result<T, FlashMartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FlashMartError::Store("timeout".into()).is_transient());
        assert!(FlashMartError::LockUnavailable("order:1".into()).is_transient());
        assert!(!FlashMartError::SoldOut.is_transient());
        assert!(!FlashMartError::Duplicate.is_transient());
        assert!(!FlashMartError::NotFound("shop 7".into()).is_transient());
    }

    #[test]
    fn serializes_with_type_tag() {
        let err = FlashMartError::Store("connection reset".into());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Store\""));
        assert!(json.contains("connection reset"));
    }
}
