//! Shared call-rate limiter for the external classification API.
//!
//! A counter with a fixed window: the window starts at the first admitted
//! call and expires after the configured duration, at which point the
//! counter resets. Check-and-increment happens under one lock so concurrent
//! callers (job run vs. request-path classification) cannot double-spend
//! the budget.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

struct WindowState {
    count: u32,
    window_expires: Option<Instant>,
}

/// Sliding-window call counter (N calls per window).
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            state: Mutex::new(WindowState {
                count: 0,
                window_expires: None,
            }),
        }
    }

    /// Try to claim one call from the current window's budget.
    pub fn try_acquire(&self) -> bool {
        if self.max_calls == 0 {
            return false;
        }

        let mut state = self.state.lock();
        match state.window_expires {
            Some(expires) if Instant::now() < expires => {
                if state.count < self.max_calls {
                    state.count += 1;
                    true
                } else {
                    false
                }
            }
            _ => {
                // First call of a fresh window starts its TTL.
                state.window_expires = Some(Instant::now() + self.window);
                state.count = 1;
                true
            }
        }
    }

    /// Calls admitted in the current window (0 once it has expired).
    pub fn current_count(&self) -> u32 {
        let state = self.state.lock();
        match state.window_expires {
            Some(expires) if Instant::now() < expires => state.count,
            _ => 0,
        }
    }
}

/// How a caller behaves when the budget is exhausted.
#[derive(Debug, Clone)]
pub enum RatePolicy {
    /// Fail immediately; the caller degrades to UNKNOWN. Request-path use.
    Reject,
    /// Poll until budget frees up, bounded. Background-job use, where
    /// stalling a worker beats burning quota.
    Wait {
        max_attempts: u32,
        poll_interval: Duration,
    },
}

/// Acquire a call slot under the given policy. Returns false once the
/// policy is out of options.
pub async fn acquire(limiter: &RateLimiter, policy: &RatePolicy) -> bool {
    match policy {
        RatePolicy::Reject => limiter.try_acquire(),
        RatePolicy::Wait {
            max_attempts,
            poll_interval,
        } => {
            for attempt in 0..(*max_attempts).max(1) {
                if limiter.try_acquire() {
                    return true;
                }
                debug!(
                    "Rate budget exhausted, waiting (attempt {}/{})",
                    attempt + 1,
                    max_attempts
                );
                tokio::time::sleep(*poll_interval).await;
            }
            limiter.try_acquire()
        }
    }
}
