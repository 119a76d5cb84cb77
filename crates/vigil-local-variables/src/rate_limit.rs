//! Pause rate limiting
//!
//! Capturing variables is expensive. When more than the configured number of
//! exceptions pause the debugger within one second, capture is switched off
//! for a backoff period that doubles on every trip.

use chrono::Duration;
use tracing::{info, warn};
use vigil_core::UtcDateTime;

pub const INITIAL_BACKOFF_SECS: i64 = 5;
pub const MAX_BACKOFF_SECS: i64 = 24 * 60 * 60;

pub struct RateLimiter {
    max_per_second: u32,
    window_start: Option<UtcDateTime>,
    count: u32,
    disabled_until: Option<UtcDateTime>,
    backoff: Duration,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            window_start: None,
            count: 0,
            disabled_until: None,
            backoff: Duration::seconds(INITIAL_BACKOFF_SECS),
        }
    }

    /// Count one pause and decide whether it may be captured
    pub fn allow(&mut self, now: UtcDateTime) -> bool {
        if let Some(until) = self.disabled_until {
            if now < until {
                return false;
            }
            self.disabled_until = None;
            self.window_start = None;
            info!("Local variables capture re-enabled");
        }

        match self.window_start {
            Some(start) if now - start < Duration::seconds(1) => {}
            _ => {
                self.window_start = Some(now);
                self.count = 0;
            }
        }

        self.count += 1;
        if self.count <= self.max_per_second {
            return true;
        }

        warn!(
            "More than {} exceptions per second, disabling local variables capture for {}s",
            self.max_per_second,
            self.backoff.num_seconds()
        );
        self.disabled_until = Some(now + self.backoff);
        self.backoff = (self.backoff * 2).min(Duration::seconds(MAX_BACKOFF_SECS));
        false
    }

    pub fn is_disabled(&self, now: UtcDateTime) -> bool {
        self.disabled_until.map(|until| now < until).unwrap_or(false)
    }

    /// Backoff that the next trip will apply
    pub fn next_backoff(&self) -> Duration {
        self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn exhaust(limiter: &mut RateLimiter, now: UtcDateTime, count: u32) -> bool {
        (0..count).all(|_| limiter.allow(now))
    }

    #[test]
    fn test_allows_up_to_limit() {
        let mut limiter = RateLimiter::new(3);
        let now = Utc::now();

        assert!(exhaust(&mut limiter, now, 3));
        assert!(!limiter.allow(now));
        assert!(limiter.is_disabled(now));
    }

    #[test]
    fn test_window_resets_each_second() {
        let mut limiter = RateLimiter::new(2);
        let now = Utc::now();

        assert!(exhaust(&mut limiter, now, 2));
        assert!(exhaust(&mut limiter, now + Duration::seconds(1), 2));
    }

    #[test]
    fn test_backoff_doubles_and_reenables() {
        let mut limiter = RateLimiter::new(1);
        let now = Utc::now();

        limiter.allow(now);
        assert!(!limiter.allow(now));
        assert!(!limiter.allow(now + Duration::milliseconds(4_999)));
        assert!(limiter.allow(now + Duration::seconds(5)));
        assert_eq!(limiter.next_backoff(), Duration::seconds(10));

        let later = now + Duration::seconds(5);
        assert!(!limiter.allow(later));
        assert!(limiter.is_disabled(later + Duration::seconds(9)));
        assert!(limiter.allow(later + Duration::seconds(10)));
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut limiter = RateLimiter::new(0);
        let mut now = Utc::now();

        for _ in 0..20 {
            assert!(!limiter.allow(now));
            now += Duration::seconds(MAX_BACKOFF_SECS);
        }
        assert_eq!(limiter.next_backoff(), Duration::seconds(MAX_BACKOFF_SECS));
    }
}
