//! zxtunes.com catalog (`zxtunes:` scheme).
//!
//! ```text
//! zxtunes:/
//!   └── authors/{nickname}?author={id}
//!         ├── {year}/{file}?author={id}&track={id}     dated tracks
//!         └── {file}?author={id}&track={id}            undated tracks
//! ```
//!
//! zxtunes has no remote search; [`ZxtunesCatalog::search`] only looks at
//! the tracks already mirrored locally.

mod api;
mod db;
mod root;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use api::ZxtunesApi;
pub use root::ZxtunesRoot;

use super::{
    format_duration, CacheOutcome, CachingCatalog, CatalogConfig, Clock, CollectionFn, Store,
    StoreError, SystemClock,
};
use crate::blob::BlobCache;
use crate::remote::HttpClient;
use crate::vfs::VfsResult;

/// Duration of one frame in the published track lengths.
const FRAME_DURATION: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u32,
    pub nickname: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: u32,
    pub filename: String,
    pub title: String,
    /// Length in 50Hz frames, 0 if unknown.
    pub duration_frames: u32,
    /// Release year, 0 if unknown.
    pub date: u32,
}

impl Track {
    pub fn duration(&self) -> Duration {
        FRAME_DURATION * self.duration_frames
    }

    /// `m:ss`, empty if unknown.
    pub fn duration_text(&self) -> String {
        if self.duration_frames == 0 {
            String::new()
        } else {
            format_duration(self.duration())
        }
    }
}

/// Cached zxtunes catalog.
pub struct ZxtunesCatalog {
    catalog: CachingCatalog,
    api: ZxtunesApi,
    config: CatalogConfig,
    blobs: Arc<BlobCache>,
}

impl ZxtunesCatalog {
    pub fn new(store: Arc<Store>, http: Arc<dyn HttpClient>, blobs: Arc<BlobCache>) -> Self {
        Self {
            catalog: CachingCatalog::new(store, Arc::new(SystemClock)),
            api: ZxtunesApi::new(http),
            config: CatalogConfig::default(),
            blobs,
        }
    }

    /// Opens (or creates) the catalog database at `path`.
    pub fn open(
        path: &Path,
        http: Arc<dyn HttpClient>,
        blobs: Arc<BlobCache>,
    ) -> Result<Self, StoreError> {
        let store = Store::open(path, &Self::schema())?;
        Ok(Self::new(Arc::new(store), http, blobs))
    }

    pub fn schema() -> String {
        db::schema()
    }

    pub fn with_config(mut self, config: CatalogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.catalog = CachingCatalog::new(Arc::clone(self.catalog.store()), clock);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        self.catalog.store()
    }

    pub fn blobs(&self) -> &Arc<BlobCache> {
        &self.blobs
    }

    pub fn authors(&self) -> VfsResult<Vec<Author>> {
        let api = &self.api;
        let mut authors = Vec::new();
        self.query(
            &CollectionFn {
                key: "authors".to_string(),
                ttl: self.config.authors_ttl,
                local: &|db, visit| db::query_authors(db, visit),
                remote: &|visit| api.authors(visit),
                store: &|db, author| db::add_author(db, author),
            },
            &mut authors,
        )?;
        Ok(authors)
    }

    pub fn author_tracks(&self, author: u32) -> VfsResult<Vec<Track>> {
        let api = &self.api;
        let mut tracks = Vec::new();
        self.query(
            &CollectionFn {
                key: format!("authors{}", author),
                ttl: self.config.tracks_ttl,
                local: &|db, visit| db::query_author_tracks(db, author, visit),
                remote: &|visit| api.author_tracks(author, visit),
                store: &|db, track| db::add_author_track(db, author, track),
            },
            &mut tracks,
        )?;
        Ok(tracks)
    }

    /// Locally mirrored tracks matching `query`.
    pub fn search(&self, query: &str) -> VfsResult<Vec<(Author, Track)>> {
        Ok(self
            .store()
            .transaction(|tx| db::search_tracks(tx, query))?)
    }

    pub fn cache_key(track: u32) -> String {
        format!("zxtunes.com/{}", track)
    }

    /// Content of a track, downloaded on first access.
    pub fn fetch_track(&self, track: u32) -> VfsResult<Vec<u8>> {
        let uris: Vec<_> = ZxtunesApi::track_uri(track).into_iter().collect();
        self.blobs
            .fetch(&Self::cache_key(track), &uris, self.api.http().as_ref())
    }

    fn query<T>(
        &self,
        collection: &CollectionFn<'_, T>,
        out: &mut Vec<T>,
    ) -> VfsResult<CacheOutcome> {
        self.catalog.query(collection, &mut |item| {
            out.push(item);
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::api::tests::{AUTHORS_XML, TRACKS_XML};
    use super::*;
    use crate::catalog::ManualClock;
    use crate::remote::MockHttpClient;
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        pub http: Arc<MockHttpClient>,
        pub clock: Arc<ManualClock>,
        pub catalog: Arc<ZxtunesCatalog>,
        pub _temp: TempDir,
    }

    pub(crate) fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let http = Arc::new(MockHttpClient::new());
        http.respond("scope=authors", AUTHORS_XML);
        http.respond("author_id=10", TRACKS_XML);
        http.respond_bytes("downloads.php?id=500", vec![7; 600]);

        let clock = Arc::new(ManualClock::new(0));
        let store = Store::open_in_memory(&ZxtunesCatalog::schema()).unwrap();
        let blobs = Arc::new(BlobCache::new(temp.path()));
        let catalog = ZxtunesCatalog::new(Arc::new(store), http.clone(), blobs)
            .with_clock(clock.clone());
        Fixture {
            http,
            clock,
            catalog: Arc::new(catalog),
            _temp: temp,
        }
    }

    #[test]
    fn test_track_duration() {
        let track = Track {
            id: 1,
            filename: "a.pt3".to_string(),
            title: String::new(),
            duration_frames: 9000,
            date: 0,
        };
        assert_eq!(track.duration(), Duration::from_secs(180));
        assert_eq!(track.duration_text(), "3:00");
    }

    #[test]
    fn test_author_tracks_cached_per_author() {
        let f = fixture();
        assert_eq!(f.catalog.author_tracks(10).unwrap().len(), 3);
        assert_eq!(f.catalog.author_tracks(10).unwrap().len(), 3);
        assert_eq!(f.http.calls(), 1);

        f.clock.advance(crate::catalog::DEFAULT_TRACKS_TTL);
        f.catalog.author_tracks(10).unwrap();
        assert_eq!(f.http.calls(), 2);
        assert_eq!(f.catalog.store().count("author_tracks").unwrap(), 3);
    }

    #[test]
    fn test_local_search() {
        let f = fixture();
        f.catalog.authors().unwrap();
        assert!(f.catalog.search("intro").unwrap().is_empty());

        f.catalog.author_tracks(10).unwrap();
        let found = f.catalog.search("intro").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.nickname, "Karbofos");
        assert_eq!(found[0].1.id, 500);
    }

    #[test]
    fn test_fetch_track() {
        let f = fixture();
        assert_eq!(f.catalog.fetch_track(500).unwrap().len(), 600);
        assert!(f.catalog.blobs().contains("zxtunes.com/500"));
    }
}
