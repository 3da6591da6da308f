use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-client token bucket rate limiter.
///
/// Default: 120 tokens per 60 second interval. Consumed
/// only at method dispatch time, never on events.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, interval: Duration) -> Self {
        let capacity = capacity as f64;
        let refill_per_sec = capacity / interval.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn default_limit() -> Self {
        Self::new(120, Duration::from_secs(60))
    }

    /// Attempt to consume `n` tokens atomically. Returns `true` on success.
    pub fn try_consume(&self, n: u32) -> bool {
        let n = n as f64;
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_capacity_then_denies() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.try_consume(1));
        assert!(limiter.try_consume(1));
        assert!(limiter.try_consume(1));
        assert!(!limiter.try_consume(1));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.try_consume(1));
        assert!(!limiter.try_consume(1));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_consume(1));
    }

    #[test]
    fn default_limit_matches_spec() {
        let limiter = RateLimiter::default_limit();
        for _ in 0..120 {
            assert!(limiter.try_consume(1));
        }
        assert!(!limiter.try_consume(1));
    }
}
