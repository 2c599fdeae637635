//! Per-path hit counter with explicit, demonstrable concurrency modes.
//!
//! `race` mode exists on purpose: it reproduces a classic lost-update bug
//! by splitting the read and the write into two separate lock
//! acquisitions with an artificial delay between them, rather than by
//! reaching for `unsafe`. Every individual map access stays memory-safe;
//! only the read-modify-write *as a whole* is unsynchronized, which is
//! exactly the shape of the bug this mode is meant to demonstrate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// The artificial delay inserted between the read and the write half of an
/// increment, in both `race` and `threadsafe` mode. Large enough to make
/// interleavings likely under concurrent load, small enough not to matter
/// for a single request.
const ARTIFICIAL_DELAY: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMode {
    /// Requests are handled one at a time; no counter is maintained.
    Single,
    /// Requests are handled concurrently; no counter is maintained.
    Multi,
    /// Requests are handled concurrently; the counter is updated with an
    /// unsynchronized read-modify-write, losing updates under load.
    Race,
    /// Requests are handled concurrently; the counter is updated under a
    /// single mutex held across the whole read-modify-write.
    ThreadSafe,
    /// As `ThreadSafe`, plus the caller is expected to apply rate limiting
    /// before doing any work. This is the mode the leader and follower
    /// HTTP servers use.
    RateLimit,
}

impl CounterMode {
    fn maintains_count(self) -> bool {
        !matches!(self, CounterMode::Single | CounterMode::Multi)
    }
}

/// Per-path request counter. See [`CounterMode`] for the five operational
/// shapes this type can take.
pub struct HitCounter {
    mode: CounterMode,
    counts: Mutex<HashMap<String, u64>>,
}

impl HitCounter {
    pub fn new(mode: CounterMode) -> Self {
        Self { mode, counts: Mutex::new(HashMap::new()) }
    }

    pub fn mode(&self) -> CounterMode {
        self.mode
    }

    /// Records one hit against `path`, per the configured mode's update
    /// discipline. In `single`/`multi` mode this is a no-op.
    pub fn increment(&self, path: &str) {
        match self.mode {
            CounterMode::Single | CounterMode::Multi => {}
            CounterMode::Race => self.increment_race(path),
            CounterMode::ThreadSafe | CounterMode::RateLimit => self.increment_locked(path),
        }
    }

    /// Current count for `path`. Always 0 in `single`/`multi` mode, since
    /// those modes maintain no counter at all.
    pub fn get(&self, path: &str) -> u64 {
        if !self.mode.maintains_count() {
            return 0;
        }
        *self.counts.lock().unwrap().get(path).unwrap_or(&0)
    }

    pub fn clear(&self) {
        self.counts.lock().unwrap().clear();
    }

    /// Read-then-unlock, sleep, lock-then-write: the gap between the two
    /// critical sections is where concurrent increments clobber each
    /// other.
    fn increment_race(&self, path: &str) {
        let current = {
            let counts = self.counts.lock().unwrap();
            *counts.get(path).unwrap_or(&0)
        };
        std::thread::sleep(ARTIFICIAL_DELAY);
        let mut counts = self.counts.lock().unwrap();
        counts.insert(path.to_string(), current + 1);
    }

    /// Single critical section spanning the read, the artificial delay and
    /// the write — no lost updates are possible.
    fn increment_locked(&self, path: &str) {
        let mut counts = self.counts.lock().unwrap();
        let current = *counts.get(path).unwrap_or(&0);
        std::thread::sleep(ARTIFICIAL_DELAY);
        counts.insert(path.to_string(), current + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_and_multi_modes_maintain_no_counter() {
        for mode in [CounterMode::Single, CounterMode::Multi] {
            let counter = HitCounter::new(mode);
            counter.increment("/a");
            counter.increment("/a");
            assert_eq!(counter.get("/a"), 0);
        }
    }

    #[test]
    fn threadsafe_mode_never_loses_updates() {
        let counter = Arc::new(HitCounter::new(CounterMode::ThreadSafe));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || counter.increment("/file"))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.get("/file"), 100);
    }

    #[test]
    fn ratelimit_mode_behaves_like_threadsafe() {
        let counter = Arc::new(HitCounter::new(CounterMode::RateLimit));
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || counter.increment("/file"))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.get("/file"), 50);
    }

    #[test]
    fn race_mode_can_lose_updates() {
        // Not deterministic by nature of the bug it demonstrates: assert
        // the safe upper bound rather than a guaranteed loss, so the test
        // is not flaky on a single-core or unusually scheduled runner.
        let counter = Arc::new(HitCounter::new(CounterMode::Race));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || counter.increment("/file"))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(counter.get("/file") <= 100);
    }

    #[test]
    fn clear_resets_counts() {
        let counter = HitCounter::new(CounterMode::ThreadSafe);
        counter.increment("/a");
        counter.clear();
        assert_eq!(counter.get("/a"), 0);
    }
}
