//! Clock seam for resolving "now" timestamps.

use chrono::Utc;
use parking_lot::RwLock;
use std::fmt::Debug;

/// Source of the current wall-clock time in nanoseconds since the epoch.
pub trait TimeProvider: Debug + Send + Sync + 'static {
    fn now_nanos(&self) -> i64;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl SystemProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemProvider {
    fn now_nanos(&self) -> i64 {
        // `None` only past the year 2262
        Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct MockProvider {
    now: RwLock<i64>,
}

impl MockProvider {
    pub fn new(start_nanos: i64) -> Self {
        Self {
            now: RwLock::new(start_nanos),
        }
    }

    pub fn set(&self, nanos: i64) {
        *self.now.write() = nanos;
    }

    pub fn inc(&self, delta_nanos: i64) -> i64 {
        let mut now = self.now.write();
        *now += delta_nanos;
        *now
    }
}

impl TimeProvider for MockProvider {
    fn now_nanos(&self) -> i64 {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_moves_on_demand() {
        let clock = MockProvider::new(1_000);
        assert_eq!(clock.now_nanos(), 1_000);
        assert_eq!(clock.inc(500), 1_500);
        clock.set(42);
        assert_eq!(clock.now_nanos(), 42);
    }

    #[test]
    fn system_provider_is_after_2020() {
        assert!(SystemProvider::new().now_nanos() > 1_577_836_800_000_000_000);
    }
}
