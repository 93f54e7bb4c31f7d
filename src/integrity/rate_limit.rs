use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const LONG_WINDOW: Duration = Duration::from_secs(3600);
const BURST_WINDOW: Duration = Duration::from_secs(60);
const BURST_MAX: u32 = 30;

/// A single timestamp history shared by both windows: retention is pruned
/// against the longer cutoff, and the burst count is taken from the same
/// history rather than a second parallel buffer.
#[derive(Debug, Default)]
struct Window {
    timestamps: Vec<Instant>,
}

impl Window {
    /// Returns `(burst_count, long_count)` after recording `now`.
    fn record_and_count(&mut self) -> (usize, usize) {
        let now = Instant::now();
        let long_cutoff = now.checked_sub(LONG_WINDOW).unwrap_or(now);
        self.timestamps.retain(|t| *t > long_cutoff);
        self.timestamps.push(now);

        let burst_cutoff = now.checked_sub(BURST_WINDOW).unwrap_or(now);
        let burst_count = self.timestamps.iter().filter(|t| **t > burst_cutoff).count();
        (burst_count, self.timestamps.len())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RateLimitError {
    GlobalBurstExhausted,
    GlobalExhausted,
    SessionBurstExhausted,
    SessionExhausted,
}

/// Two independent sliding windows, global plus per-session: a 60s/cap-30
/// burst window and an hourly backstop, guarding against both a rapid burst
/// and sustained scripted traffic against one session. Spec §4.5.
#[derive(Debug)]
pub struct SessionRateLimiter {
    global: Mutex<Window>,
    per_session: Mutex<HashMap<String, Window>>,
    global_max: u32,
    per_session_max: u32,
}

impl SessionRateLimiter {
    #[must_use]
    pub fn new(global_max: u32, per_session_max: u32) -> Self {
        Self {
            global: Mutex::new(Window::default()),
            per_session: Mutex::new(HashMap::new()),
            global_max,
            per_session_max,
        }
    }

    pub fn record(&self, session_key: &str) -> Result<(), RateLimitError> {
        let mut global = self.global.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (burst_count, long_count) = global.record_and_count();
        if burst_count > BURST_MAX as usize {
            return Err(RateLimitError::GlobalBurstExhausted);
        }
        if long_count > self.global_max as usize {
            return Err(RateLimitError::GlobalExhausted);
        }
        drop(global);

        let mut per_session = self
            .per_session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let window = per_session.entry(session_key.to_string()).or_default();
        let (burst_count, long_count) = window.record_and_count();
        if burst_count > BURST_MAX as usize {
            return Err(RateLimitError::SessionBurstExhausted);
        }
        if long_count > self.per_session_max as usize {
            return Err(RateLimitError::SessionExhausted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_sessions_get_independent_buckets() {
        let limiter = SessionRateLimiter::new(100, 2);
        assert!(limiter.record("a").is_ok());
        assert!(limiter.record("a").is_ok());
        assert!(matches!(limiter.record("a"), Err(RateLimitError::SessionExhausted)));
        assert!(limiter.record("b").is_ok());
    }

    #[test]
    fn global_backstop_applies_across_sessions() {
        let limiter = SessionRateLimiter::new(2, 100);
        assert!(limiter.record("a").is_ok());
        assert!(limiter.record("b").is_ok());
        assert!(matches!(limiter.record("c"), Err(RateLimitError::GlobalExhausted)));
    }
}
