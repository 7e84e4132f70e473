use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached value together with the time it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub data: V,
    pub cached_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl<V> CacheEntry<V> {
    pub fn new(data: V, cached_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            data,
            cached_at,
            ttl_ms: duration_ms(ttl),
        }
    }

    /// Milliseconds elapsed since the entry was stored.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.cached_at).num_milliseconds()
    }

    /// An entry is fresh while its age is strictly below `max_age`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age_ms(now) < i64::try_from(duration_ms(max_age)).unwrap_or(i64::MAX)
    }
}

/// Only the timestamp of a persisted entry, used when scanning for eviction
/// without knowing the value type.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryStamp {
    pub cached_at: DateTime<Utc>,
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Useful for exercising expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::milliseconds(duration_ms(by) as i64);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
