use std::time::{Duration, Instant};

/// Fixed-window rate limiter, one per connection.
///
/// Every inbound frame is counted, `ping` included. The count resets when
/// the wall clock moves past the end of the current window; a frame that
/// would push the count beyond the limit is refused and not recorded.
#[derive(Debug)]
pub struct RateLimiter {
    max: u32,
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    /// Creates a limiter admitting `max` frames per `window`.
    #[must_use]
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Check the limit and record the frame in a single pass.
    /// Returns `false` if the frame must be refused.
    pub fn check_and_record(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.max {
            return false;
        }
        self.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit() {
        let mut limiter = RateLimiter::new(60, Duration::from_secs(10));
        for _ in 0..60 {
            assert!(limiter.check_and_record());
        }
        assert_eq!(limiter.count, 60);
    }

    #[test]
    fn refuses_the_frame_past_the_limit() {
        let mut limiter = RateLimiter::new(60, Duration::from_secs(10));
        for _ in 0..60 {
            assert!(limiter.check_and_record());
        }
        assert!(!limiter.check_and_record());
        // A refused frame is not recorded.
        assert_eq!(limiter.count, 60);
    }

    #[test]
    fn count_resets_after_the_window_elapses() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.check_and_record());
        assert!(limiter.check_and_record());
        assert!(!limiter.check_and_record());

        limiter.window_start = Instant::now() - Duration::from_secs(11);
        assert!(limiter.check_and_record());
        assert_eq!(limiter.count, 1);
    }

    #[test]
    fn window_boundary_is_inclusive_of_reset() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(10));
        assert!(limiter.check_and_record());
        // Exactly one window old: the next frame starts a fresh window.
        limiter.window_start = Instant::now() - Duration::from_secs(10);
        assert!(limiter.check_and_record());
    }
}
