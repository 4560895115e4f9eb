//! Resilience primitives
//!
//! Bounded retry with configurable backoff. Lock acquisition is non-blocking
//! by contract, so any caller that wants to wait loops here with an explicit
//! attempt bound instead of spinning.

mod backoff;

pub use backoff::{retry_with_backoff, BackoffStrategy, RetryError};
