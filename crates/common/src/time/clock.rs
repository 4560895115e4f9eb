//! Clock abstraction for deterministic time-based testing
//!
//! Lock leases, logical cache expiry and the daily ID counter all depend on
//! the current time. Production code uses [`SystemClock`]; tests inject
//! [`MockClock`] and advance it manually instead of sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Trait for time operations
pub trait Clock: Send + Sync {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }

    /// Get whole seconds since UNIX epoch
    fn unix_seconds(&self) -> i64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same underlying elapsed offset, so a test can hold one
/// handle while the code under test holds another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    base_system_time: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock anchored at the current real time
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            base_system_time: SystemTime::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the mock clock by a duration without real time passing
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by whole seconds (convenience)
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Total simulated time elapsed since construction
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or_default()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_monotonic_and_wall_time_together() {
        let clock = MockClock::new();
        let instant0 = clock.now();
        let millis0 = clock.millis_since_epoch();

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now().duration_since(instant0), Duration::from_secs(90));
        assert_eq!(clock.millis_since_epoch() - millis0, 90_000);
    }

    #[test]
    fn mock_clock_clones_share_time() {
        let clock = MockClock::new();
        let other = clock.clone();

        other.advance_secs(30);

        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn system_clock_is_nondecreasing() {
        let clock = SystemClock;
        let a = clock.unix_seconds();
        let b = clock.unix_seconds();
        assert!(b >= a);
    }
}
