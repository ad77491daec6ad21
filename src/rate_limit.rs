use crate::error::RelayError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use log::warn;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Per-caller fixed-window counter kept in process memory.
///
/// Not shared across instances and reset on restart.
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, caller: &str) -> Result<(), RelayError> {
        self.check_at(caller, Instant::now())
    }

    /// Purges expired windows, then counts this request against `caller`.
    /// A rejected request does not increment the counter.
    pub fn check_at(&self, caller: &str, now: Instant) -> Result<(), RelayError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RelayError::Unexpected("rate limit store poisoned".into()))?;

        let window = self.window;
        entries.retain(|_, entry| now.saturating_duration_since(entry.window_start) <= window);

        let entry = entries.entry(caller.to_string()).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if entry.count >= self.max_requests {
            warn!("Rate limit exceeded for {} ({} requests in window)", caller, entry.count);
            return Err(RelayError::RateLimited);
        }

        entry.count += 1;
        Ok(())
    }

    pub fn tracked_callers(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

/// Process-wide burst guard applied before the per-caller window.
pub struct GlobalLimiter {
    inner: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl GlobalLimiter {
    pub fn per_second(rate: NonZeroU32) -> Self {
        Self {
            inner: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    pub fn check(&self) -> Result<(), RelayError> {
        if self.inner.check().is_err() {
            warn!("Global request rate limit exceeded.");
            return Err(RelayError::RateLimited);
        }
        Ok(())
    }
}
