//! Overlap protection for scheduled classification runs.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// TTL-guarded mutual exclusion.
///
/// At most one classification run holds the lock at a time; a trigger that
/// cannot acquire it is a no-op. The TTL caps worst-case run duration: a
/// holder that outlives it loses the lock, so a crashed or wedged run can
/// never block the schedule forever.
pub struct OverlapLock {
    ttl: Duration,
    held_until: Mutex<Option<Instant>>,
}

impl OverlapLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held_until: Mutex::new(None),
        }
    }

    /// Try to take the lock. Fails if another holder is still within its TTL.
    pub fn try_acquire(&self) -> bool {
        let mut held = self.held_until.lock();
        match *held {
            Some(until) if Instant::now() < until => false,
            _ => {
                *held = Some(Instant::now() + self.ttl);
                true
            }
        }
    }

    /// Whether the current holder is still within its TTL. A continuation
    /// loop checks this between passes and stops once its time is up.
    pub fn still_held(&self) -> bool {
        match *self.held_until.lock() {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    /// Release the lock.
    pub fn release(&self) {
        *self.held_until.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_until_released() {
        let lock = OverlapLock::new(Duration::from_secs(60));
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
        assert!(lock.still_held());

        lock.release();
        assert!(!lock.still_held());
        assert!(lock.try_acquire());
    }

    #[test]
    fn test_ttl_expiry_frees_lock() {
        let lock = OverlapLock::new(Duration::from_millis(5));
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());

        std::thread::sleep(Duration::from_millis(10));
        assert!(!lock.still_held());
        assert!(lock.try_acquire());
    }
}
