use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::constants::MAX_MEMORY_BYTES;

/// Tracks bytes handed to subscribers but not yet assumed consumed.
///
/// Emitted frames schedule a delayed release; the engine loop drains due
/// entries on its own task so shutdown can cancel everything at once.
#[derive(Debug, Default)]
pub struct MemoryAccountant {
    total: AtomicU64,
    scheduled: Mutex<VecDeque<(Instant, u64)>>,
}

impl MemoryAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn release(&self, bytes: u64) {
        // Saturating: a release can race a reset, never underflow.
        let mut current = self.total.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.total.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn pressure(&self) -> bool {
        self.total() > MAX_MEMORY_BYTES
    }

    /// Queue a release for `delay` from now. Entries are drained by
    /// `release_due`.
    pub fn schedule_release(&self, bytes: u64, delay: Duration) {
        self.scheduled
            .lock()
            .push_back((Instant::now() + delay, bytes));
    }

    /// Deadline of the earliest scheduled release, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        // Entries share a fixed delay, so the queue is already ordered.
        self.scheduled.lock().front().map(|(at, _)| *at)
    }

    /// Release every entry whose deadline has passed.
    pub fn release_due(&self, now: Instant) {
        let mut due = Vec::new();
        {
            let mut scheduled = self.scheduled.lock();
            while let Some((at, _)) = scheduled.front() {
                if *at > now {
                    break;
                }
                if let Some((_, bytes)) = scheduled.pop_front() {
                    due.push(bytes);
                }
            }
        }
        for bytes in due {
            self.release(bytes);
        }
    }

    /// Drops every scheduled release and zeroes the total.
    pub fn clear(&self) {
        self.scheduled.lock().clear();
        self.total.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_release_pair_restores_total() {
        let accountant = MemoryAccountant::new();
        accountant.add(1000);
        let before = accountant.total();
        accountant.add(4096);
        accountant.release(4096);
        assert_eq!(accountant.total(), before);
    }

    #[test]
    fn test_release_never_underflows() {
        let accountant = MemoryAccountant::new();
        accountant.add(10);
        accountant.release(100);
        assert_eq!(accountant.total(), 0);
    }

    #[test]
    fn test_pressure_latches_above_limit() {
        let accountant = MemoryAccountant::new();
        accountant.add(MAX_MEMORY_BYTES);
        assert!(!accountant.pressure());
        accountant.add(1);
        assert!(accountant.pressure());
        accountant.release(1);
        assert!(!accountant.pressure());
    }

    #[test]
    fn test_scheduled_releases_drain_when_due() {
        let accountant = MemoryAccountant::new();
        accountant.add(500);
        accountant.schedule_release(500, Duration::from_millis(10));
        assert!(accountant.next_deadline().is_some());

        // Not yet due.
        accountant.release_due(Instant::now());
        assert_eq!(accountant.total(), 500);

        accountant.release_due(Instant::now() + Duration::from_millis(20));
        assert_eq!(accountant.total(), 0);
        assert!(accountant.next_deadline().is_none());
    }

    #[test]
    fn test_clear_cancels_everything() {
        let accountant = MemoryAccountant::new();
        accountant.add(1024);
        accountant.schedule_release(1024, Duration::from_secs(1));
        accountant.clear();
        assert_eq!(accountant.total(), 0);
        assert!(accountant.next_deadline().is_none());
    }
}
