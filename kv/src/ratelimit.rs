//! Per-client sliding-window rate limiter.
//!
//! Admits at most `limit` requests per client within any trailing `window`
//! of time. Time is sourced from a pluggable [`Clock`] rather than the wall
//! clock, so the monotonicity the sliding window relies on is structural
//! (the default clock is `Instant`-backed) rather than an assumption about
//! `SystemTime` never jumping backward.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A source of monotonic instants, abstracted so tests can drive time
/// deterministically instead of racing the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The default clock, backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    #[inline]
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Sliding-window admission filter: "at most `limit` requests per `window`."
pub struct RateLimiter<C: Clock = SystemClock> {
    limit: usize,
    window: Duration,
    clock: C,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter<SystemClock> {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::with_clock(limit, window, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(limit: usize, window: Duration, clock: C) -> Self {
        Self { limit, window, clock, clients: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` if `client_id` is admitted under the current window,
    /// recording the admission. Returns `false` (without recording
    /// anything) if the client has already used its full quota.
    pub fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now();
        let mut clients = self.clients.lock().unwrap();
        let timestamps = clients.entry(client_id.to_string()).or_default();

        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.limit {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Number of requests currently counted against `client_id`'s window.
    pub fn current_count(&self, client_id: &str) -> usize {
        self.clients.lock().unwrap().get(client_id).map(|t| t.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// A clock that only advances when `advance` is called, for
    /// deterministic window-boundary tests.
    struct MockClock {
        now: StdMutex<Instant>,
    }

    impl MockClock {
        fn new() -> Self {
            Self { now: StdMutex::new(Instant::now()) }
        }

        fn advance(&self, d: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += d;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    #[test]
    fn admits_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        for _ in 0..5 {
            assert!(limiter.allow("client-a"));
        }
        assert!(!limiter.allow("client-a"));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn admits_again_once_the_window_slides_past() {
        let clock = MockClock::new();
        let limiter = RateLimiter::with_clock(2, Duration::from_millis(100), &clock);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));

        clock.advance(Duration::from_millis(101));
        assert!(limiter.allow("a"));
    }

    #[test]
    fn denied_requests_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("a"));
        for _ in 0..10 {
            assert!(!limiter.allow("a"));
        }
        assert_eq!(limiter.current_count("a"), 1);
    }
}
