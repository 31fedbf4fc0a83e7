//! Consecutive-failure circuit breaker
//!
//! Opens after `threshold` consecutive failures and stays open for the rest of
//! the run. Shared across concurrent classification tasks, so all state is
//! atomic.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Circuit breaker for the classification service
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: usize,
    consecutive_failures: AtomicUsize,
    open: AtomicBool,
    total_failures: AtomicUsize,
}

impl CircuitBreaker {
    /// Create breaker; a threshold of 0 never opens
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            consecutive_failures: AtomicUsize::new(0),
            open: AtomicBool::new(false),
            total_failures: AtomicUsize::new(0),
        }
    }

    /// True once the breaker has tripped
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Reset the consecutive failure counter
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    /// Count a failure; returns true if this failure opened the breaker
    pub fn record_failure(&self) -> bool {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let consecutive = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        if self.threshold == 0 || consecutive < self.threshold {
            return false;
        }

        // Only the caller that flips the flag reports the transition
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Current consecutive failures
    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Failures recorded over the whole run
    pub fn total_failures(&self) -> usize {
        self.total_failures.load(Ordering::Relaxed)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3);
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(!breaker.is_open());
        assert!(breaker.record_failure());
        assert!(breaker.is_open());
        // Already open: later failures do not report the transition again
        assert!(!breaker.record_failure());
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let breaker = CircuitBreaker::new(2);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
        assert_eq!(breaker.consecutive_failures(), 1);
        assert_eq!(breaker.total_failures(), 2);
    }

    #[test]
    fn test_zero_threshold_never_opens() {
        let breaker = CircuitBreaker::new(0);
        for _ in 0..100 {
            breaker.record_failure();
        }
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn test_concurrent_failures_open_exactly_once() {
        let breaker = Arc::new(CircuitBreaker::new(5));
        let mut tasks = tokio::task::JoinSet::new();

        for _ in 0..32 {
            let breaker = Arc::clone(&breaker);
            tasks.spawn(async move { breaker.record_failure() });
        }

        let mut transitions = 0;
        while let Some(opened) = tasks.join_next().await {
            if opened.unwrap() {
                transitions += 1;
            }
        }

        assert_eq!(transitions, 1);
        assert!(breaker.is_open());
        assert_eq!(breaker.total_failures(), 32);
    }
}
