//! Bounded poll loops
//!
//! The daemon offers no notification hook the harness could wait on, so every
//! wait is a fixed-interval sleep/check loop with an overall deadline. A loop
//! that runs out of time reports `false` (or `None`); it never blocks forever
//! and never raises on its own.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::config::PollConfig;

/// Sleep/check loop with a fixed interval and deadline
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Same interval, different deadline
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Poll `check` until it yields a value or the deadline passes
    ///
    /// `check` always runs at least once, even with a zero timeout.
    pub fn poll<T>(&self, mut check: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            if let Some(value) = check() {
                return Some(value);
            }
            if Instant::now() >= deadline {
                trace!(attempts, timeout_ms = self.timeout.as_millis() as u64, "poll exhausted");
                return None;
            }
            std::thread::sleep(self.interval);
        }
    }

    pub fn wait_until_true(&self, mut condition: impl FnMut() -> bool) -> bool {
        self.poll(|| condition().then_some(())).is_some()
    }

    pub fn wait_until_false(&self, mut condition: impl FnMut() -> bool) -> bool {
        self.wait_until_true(|| !condition())
    }
}

impl From<PollConfig> for Poller {
    fn from(config: PollConfig) -> Self {
        Self::new(config.interval(), config.timeout())
    }
}

impl Default for Poller {
    fn default() -> Self {
        PollConfig::default().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_immediately_when_true() {
        let poller = Poller::new(Duration::from_millis(50), Duration::from_secs(5));
        let start = Instant::now();
        assert!(poller.wait_until_true(|| true));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_times_out_with_false() {
        let poller = Poller::new(Duration::from_millis(1), Duration::from_millis(30));
        let start = Instant::now();
        assert!(!poller.wait_until_true(|| false));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_eventually_true() {
        let poller = Poller::new(Duration::from_millis(1), Duration::from_secs(5));
        let mut calls = 0;
        assert!(poller.wait_until_true(|| {
            calls += 1;
            calls == 5
        }));
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_zero_timeout_checks_once() {
        let poller = Poller::new(Duration::from_millis(1), Duration::ZERO);
        let mut calls = 0;
        let result: Option<()> = poller.poll(|| {
            calls += 1;
            None
        });
        assert!(result.is_none());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_wait_until_false() {
        let poller = Poller::new(Duration::from_millis(1), Duration::from_secs(1));
        let mut remaining = 3;
        assert!(poller.wait_until_false(|| {
            remaining -= 1;
            remaining > 0
        }));
    }
}
