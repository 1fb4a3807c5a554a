//! Time and timer abstractions.
//!
//! spec.md treats timers as an external collaborator presenting
//! `arm(cp, timeout) -> token` / `disarm(token)`. `Clock` lets the engine's
//! notion of "now" be swapped for tests; `TimerWheel` is the minimal
//! in-process implementation of the arm/disarm facility itself, so the
//! engine and its tests don't need a real timer thread.

use std::sync::RwLock;
use std::time::{Duration, Instant};

/// A source of "now". Swappable so client-timeout behavior (spec.md §4.4,
/// §8 S5) is testable without real sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The default clock: the operating system's monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock whose value is only ever advanced explicitly by the test driving
/// it, so timeout behavior is deterministic without real sleeps.
#[derive(Debug)]
pub struct ManualClock {
    instant: RwLock<Instant>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            instant: RwLock::new(start),
        }
    }

    pub fn set(&self, instant: Instant) {
        *self.instant.write().unwrap() = instant;
    }

    pub fn advance(&self, duration: Duration) {
        *self.instant.write().unwrap() += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.instant.read().unwrap()
    }
}

/// Opaque handle to an armed timer, returned by `TimerWheel::arm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

struct Armed<K> {
    token: TimerToken,
    deadline: Instant,
    /// Key identifying what this timer belongs to (a pool `Handle`, in
    /// practice), so a fired timer maps back to its owner without a second
    /// lookup and without aliasing a slot that's since been freed and
    /// reused — the generation embedded in a `Handle` makes that safe.
    key: K,
}

/// A minimal arm/disarm facility: at most one armed timer per client pair
/// (spec.md §5), polled explicitly rather than running its own thread.
/// Generic over the key type so it can hold a `pool::Handle` directly
/// instead of a bare slot index.
pub struct TimerWheel<K> {
    armed: Vec<Armed<K>>,
    next_token: u64,
}

impl<K> Default for TimerWheel<K> {
    fn default() -> Self {
        Self {
            armed: Vec::new(),
            next_token: 0,
        }
    }
}

impl<K: Copy> TimerWheel<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, key: K, now: Instant, timeout: Duration) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.armed.push(Armed {
            token,
            deadline: now + timeout,
            key,
        });
        token
    }

    pub fn disarm(&mut self, token: TimerToken) {
        self.armed.retain(|a| a.token != token);
    }

    /// Removes and returns every key whose timer has fired by `now`, in
    /// the order they were armed.
    pub fn poll_expired(&mut self, now: Instant) -> Vec<K> {
        let mut expired = Vec::new();
        self.armed.retain(|a| {
            if a.deadline <= now {
                expired.push(a.key);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
