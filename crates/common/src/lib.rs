//! Shared utilities for FlashMart crates.
//!
//! Kept deliberately small and side-effect free: the time abstraction that
//! makes lease/expiry behavior deterministic under test, and the bounded
//! backoff helper used wherever a transient failure is worth another try.

#![forbid(unsafe_code)]

pub mod resilience;
pub mod time;

// Re-export commonly used types and traits for convenience
pub use resilience::{retry_with_backoff, BackoffStrategy, RetryError};
pub use time::{Clock, MockClock, SystemClock};
