//! Freshness tracking for cached collections.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use rusqlite::Connection;

use super::store::{read_timestamp, write_timestamp, StoreError};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Manually advanced clock for deterministic freshness checks.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Lifetime of one cached collection, read inside a transaction.
#[derive(Debug, Clone)]
pub struct Lifetime {
    key: String,
    ttl: Duration,
    last_update: Option<i64>,
    now: i64,
}

impl Lifetime {
    /// Reads the stored lifetime of `key`.
    pub fn read(
        tx: &Connection,
        key: &str,
        ttl: Duration,
        clock: &dyn Clock,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            key: key.to_string(),
            ttl,
            last_update: read_timestamp(tx, key)?,
            now: clock.now_secs(),
        })
    }

    /// Lifetime treated as never updated.
    pub fn expired(key: &str, ttl: Duration, clock: &dyn Clock) -> Self {
        Self {
            key: key.to_string(),
            ttl,
            last_update: None,
            now: clock.now_secs(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fresh iff `now - last_update < ttl`.
    pub fn is_expired(&self) -> bool {
        match self.last_update {
            Some(stamp) => self.now.saturating_sub(stamp) >= self.ttl.as_secs() as i64,
            None => true,
        }
    }

    /// Marks the collection as updated now.
    pub fn update(&self, tx: &Connection) -> Result<(), StoreError> {
        write_timestamp(tx, &self.key, self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::Store;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_never_updated_is_expired() {
        let store = Store::open_in_memory("").unwrap();
        let clock = ManualClock::new(1_000_000);
        let lifetime = store
            .transaction(|tx| Lifetime::read(tx, "authors", DAY, &clock))
            .unwrap();
        assert!(lifetime.is_expired());
    }

    #[test]
    fn test_fresh_until_ttl() {
        let store = Store::open_in_memory("").unwrap();
        let clock = ManualClock::new(1_000_000);
        store
            .transaction(|tx| Lifetime::read(tx, "authors", DAY, &clock)?.update(tx))
            .unwrap();

        clock.advance(DAY - Duration::from_secs(1));
        let lifetime = store
            .transaction(|tx| Lifetime::read(tx, "authors", DAY, &clock))
            .unwrap();
        assert!(!lifetime.is_expired());

        clock.advance(Duration::from_secs(1));
        let lifetime = store
            .transaction(|tx| Lifetime::read(tx, "authors", DAY, &clock))
            .unwrap();
        assert!(lifetime.is_expired());
    }

    #[test]
    fn test_keys_are_independent() {
        let store = Store::open_in_memory("").unwrap();
        let clock = ManualClock::new(10);
        store
            .transaction(|tx| Lifetime::read(tx, "authors", DAY, &clock)?.update(tx))
            .unwrap();
        let other = store
            .transaction(|tx| Lifetime::read(tx, "authors7", DAY, &clock))
            .unwrap();
        assert!(other.is_expired());
    }
}
