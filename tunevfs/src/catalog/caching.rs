//! TTL-gated read-through / write-through caching.
//!
//! Every remote collection (authors, an author's tracks, parties, ...) is
//! queried through the same state machine:
//!
//! ```text
//!            ┌──────────── transaction ────────────┐
//! query ──>  │ read lifetime ── fresh? ── local ≥1 ─┼──> visit local rows
//!            │        │ stale/empty                 │
//!            │        v                             │
//!            │ remote fetch ──> visit + write row   │
//!            │        │ ok                          │
//!            │        v                             │
//!            │ lifetime = now ──> commit            │
//!            └──────────── error: rollback ────────┘
//! ```
//!
//! A failing remote fetch rolls the transaction back, so neither rows nor
//! the lifetime change and the collection stays stale for the next query.
//! A failing local read is treated as a miss.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, warn};

use super::lifetime::{Clock, Lifetime};
use super::store::{Store, StoreError};
use crate::vfs::{VfsError, VfsResult};

/// One remotely sourced collection with a local mirror.
pub trait CachedCollection {
    type Item;

    /// Lifetime key, e.g. `authors` or `authors7`.
    fn key(&self) -> String;

    /// Freshness window.
    fn ttl(&self) -> Duration;

    /// Visits locally stored rows and returns how many were visited.
    fn query_local(
        &self,
        db: &Connection,
        visitor: &mut dyn FnMut(Self::Item) -> VfsResult<()>,
    ) -> VfsResult<usize>;

    /// Fetches the collection from the remote source.
    fn query_remote(&self, visitor: &mut dyn FnMut(Self::Item) -> VfsResult<()>) -> VfsResult<()>;

    /// Persists one remote item, including its grouping rows.
    fn store(&self, db: &Connection, item: &Self::Item) -> Result<(), StoreError>;
}

/// Local visitor signature shared by [`CollectionFn`] parts.
pub type ItemVisitor<'v, T> = dyn FnMut(T) -> VfsResult<()> + 'v;

/// Collection assembled from borrowed closures.
///
/// Sources describe each collection inline instead of declaring a type per
/// collection:
///
/// ```ignore
/// catalog.query(&CollectionFn {
///     key: format!("authors{}", id),
///     ttl: config.tracks_ttl,
///     local: &|db, visit| query_author_tracks(db, id, visit),
///     remote: &|visit| api.author_tracks(id, visit),
///     store: &|db, track| store_author_track(db, id, track),
/// }, visitor)
/// ```
pub struct CollectionFn<'a, T> {
    pub key: String,
    pub ttl: Duration,
    pub local: &'a dyn Fn(&Connection, &mut ItemVisitor<'_, T>) -> VfsResult<usize>,
    pub remote: &'a dyn Fn(&mut ItemVisitor<'_, T>) -> VfsResult<()>,
    pub store: &'a dyn Fn(&Connection, &T) -> Result<(), StoreError>,
}

impl<T> CachedCollection for CollectionFn<'_, T> {
    type Item = T;

    fn key(&self) -> String {
        self.key.clone()
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn query_local(
        &self,
        db: &Connection,
        visitor: &mut dyn FnMut(T) -> VfsResult<()>,
    ) -> VfsResult<usize> {
        (self.local)(db, visitor)
    }

    fn query_remote(&self, visitor: &mut dyn FnMut(T) -> VfsResult<()>) -> VfsResult<()> {
        (self.remote)(visitor)
    }

    fn store(&self, db: &Connection, item: &T) -> Result<(), StoreError> {
        (self.store)(db, item)
    }
}

/// How a query was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the local store.
    Hit,
    /// Refetched from the remote source.
    Refreshed,
}

/// Runs [`CachedCollection`] queries against one store.
#[derive(Clone)]
pub struct CachingCatalog {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl CachingCatalog {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Visits every item of `collection`, refreshing it first if stale.
    pub fn query<C: CachedCollection>(
        &self,
        collection: &C,
        visitor: &mut dyn FnMut(C::Item) -> VfsResult<()>,
    ) -> VfsResult<CacheOutcome> {
        let key = collection.key();
        let ttl = collection.ttl();
        self.store.transaction(|tx| {
            let lifetime = Lifetime::read(tx, &key, ttl, self.clock.as_ref()).unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "Failed to read lifetime, treating as stale");
                Lifetime::expired(&key, ttl, self.clock.as_ref())
            });

            if !lifetime.is_expired() {
                match collection.query_local(tx, visitor) {
                    Ok(count) if count > 0 => {
                        debug!(key = %key, count, "Served from cache");
                        return Ok(CacheOutcome::Hit);
                    }
                    Ok(_) => debug!(key = %key, "Fresh but empty, refetching"),
                    Err(VfsError::Store(e)) => {
                        warn!(key = %key, error = %e, "Local query failed, refetching");
                    }
                    Err(e) => return Err(e),
                }
            }

            debug!(key = %key, "Fetching from remote");
            let mut stored = 0usize;
            let mut write_failed = false;
            collection.query_remote(&mut |item| {
                match collection.store(tx, &item) {
                    Ok(()) => stored += 1,
                    Err(e) => {
                        if !write_failed {
                            warn!(key = %key, error = %e, "Failed to cache remote item");
                        }
                        write_failed = true;
                    }
                }
                visitor(item)
            })?;

            // An incomplete mirror must not be marked fresh
            if !write_failed {
                lifetime.update(tx)?;
            }
            debug!(key = %key, stored, "Remote fetch complete");
            Ok(CacheOutcome::Refreshed)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::lifetime::ManualClock;
    use crate::remote::RemoteError;
    use parking_lot::Mutex;
    use rusqlite::params;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    /// Collection of names mirrored into table `names`.
    pub(crate) struct Names {
        pub remote: Mutex<Result<Vec<String>, RemoteError>>,
        pub calls: AtomicUsize,
    }

    impl Names {
        pub fn new(names: &[&str]) -> Self {
            Self {
                remote: Mutex::new(Ok(names.iter().map(|s| s.to_string()).collect())),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CachedCollection for Names {
        type Item = String;

        fn key(&self) -> String {
            "names".to_string()
        }

        fn ttl(&self) -> Duration {
            HOUR
        }

        fn query_local(
            &self,
            db: &Connection,
            visitor: &mut dyn FnMut(String) -> VfsResult<()>,
        ) -> VfsResult<usize> {
            let mut stmt = db
                .prepare("SELECT name FROM names ORDER BY name")
                .map_err(StoreError::from)?;
            let names: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(StoreError::from)?
                .collect::<Result<_, _>>()
                .map_err(StoreError::from)?;
            let count = names.len();
            for name in names {
                visitor(name)?;
            }
            Ok(count)
        }

        fn query_remote(&self, visitor: &mut dyn FnMut(String) -> VfsResult<()>) -> VfsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let names = self.remote.lock().clone()?;
            for name in names {
                visitor(name)?;
            }
            Ok(())
        }

        fn store(&self, db: &Connection, item: &String) -> Result<(), StoreError> {
            db.execute("INSERT OR REPLACE INTO names (name) VALUES (?1)", params![item])?;
            Ok(())
        }
    }

    fn catalog(clock: Arc<ManualClock>) -> CachingCatalog {
        let store = Store::open_in_memory("CREATE TABLE names (name TEXT PRIMARY KEY);").unwrap();
        CachingCatalog::new(Arc::new(store), clock)
    }

    fn collect(catalog: &CachingCatalog, names: &Names) -> VfsResult<(CacheOutcome, Vec<String>)> {
        let mut seen = Vec::new();
        let outcome = catalog.query(names, &mut |name| {
            seen.push(name);
            Ok(())
        })?;
        Ok((outcome, seen))
    }

    #[test]
    fn test_fresh_collection_skips_remote() {
        let clock = Arc::new(ManualClock::new(0));
        let catalog = catalog(Arc::clone(&clock));
        let names = Names::new(&["b", "a"]);

        let (outcome, first) = collect(&catalog, &names).unwrap();
        assert_eq!(outcome, CacheOutcome::Refreshed);
        assert_eq!(first, vec!["b", "a"]);

        clock.advance(HOUR / 2);
        let (outcome, second) = collect(&catalog, &names).unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(second, vec!["a", "b"]);
        assert_eq!(names.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_collection_refetches_once() {
        let clock = Arc::new(ManualClock::new(0));
        let catalog = catalog(Arc::clone(&clock));
        let names = Names::new(&["a"]);

        collect(&catalog, &names).unwrap();
        clock.advance(HOUR);
        collect(&catalog, &names).unwrap();
        collect(&catalog, &names).unwrap();
        assert_eq!(names.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_write_through_is_idempotent() {
        let clock = Arc::new(ManualClock::new(0));
        let catalog = catalog(Arc::clone(&clock));
        let names = Names::new(&["a", "b", "a"]);

        for _ in 0..3 {
            collect(&catalog, &names).unwrap();
            clock.advance(HOUR);
        }
        assert_eq!(catalog.store().count("names").unwrap(), 2);
    }

    #[test]
    fn test_remote_error_leaves_cache_untouched() {
        let clock = Arc::new(ManualClock::new(0));
        let catalog = catalog(Arc::clone(&clock));
        let names = Names::new(&["a"]);
        collect(&catalog, &names).unwrap();

        clock.advance(HOUR);
        *names.remote.lock() = Err(RemoteError::NoConnection);
        let err = collect(&catalog, &names).unwrap_err();
        assert!(matches!(err, VfsError::Remote(RemoteError::NoConnection)));

        // Still stale: the next query goes remote again
        *names.remote.lock() = Ok(vec!["c".to_string()]);
        let (outcome, seen) = collect(&catalog, &names).unwrap();
        assert_eq!(outcome, CacheOutcome::Refreshed);
        assert_eq!(seen, vec!["c"]);
    }

    #[test]
    fn test_empty_fresh_collection_goes_remote() {
        let clock = Arc::new(ManualClock::new(0));
        let catalog = catalog(Arc::clone(&clock));
        let names = Names::new(&[]);
        collect(&catalog, &names).unwrap();
        collect(&catalog, &names).unwrap();
        assert_eq!(names.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_visitor_error_rolls_back() {
        let clock = Arc::new(ManualClock::new(0));
        let catalog = catalog(Arc::clone(&clock));
        let names = Names::new(&["a", "b"]);

        let result = catalog.query(&names, &mut |_| Err(VfsError::Cancelled));
        assert!(matches!(result, Err(VfsError::Cancelled)));
        assert_eq!(catalog.store().count("names").unwrap(), 0);
    }
}
