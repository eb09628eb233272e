//! zxart.ee catalog (`zxart:` scheme).
//!
//! # Tree
//!
//! ```text
//! zxart:/
//!   ├── authors/{nickname}?author={id}/{file}?author={id}&track={id}
//!   ├── parties/{year}/{party}?party={id}/{file}?party={id}&track={id}
//!   └── top/{file}?track={id}                       (feed, vote order)
//! ```
//!
//! Collections are mirrored through [`CachingCatalog`]; track content goes
//! through the shared [`BlobCache`] under `zxart.ee/{id}`.

mod api;
mod db;
mod root;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

pub use api::ZxartApi;
pub use root::ZxartRoot;

use super::{
    CacheOutcome, CachingCatalog, CatalogConfig, Clock, CollectionFn, Store, StoreError,
    SystemClock,
};
use crate::blob::BlobCache;
use crate::remote::{HttpClient, RemoteError};
use crate::vfs::{VfsError, VfsResult};

/// Number of tracks in the top chart.
pub const TOP_TRACKS_LIMIT: u32 = 500;

/// Author record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u32,
    pub nickname: String,
    pub name: String,
}

impl Author {
    /// Placeholder for tracks whose author is not known locally.
    pub fn unknown() -> Self {
        Self {
            id: 0,
            nickname: "Unknown".to_string(),
            name: String::new(),
        }
    }
}

/// Party (demoscene event) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub id: u32,
    pub name: String,
    pub year: u32,
}

/// Track record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: u32,
    pub filename: String,
    pub title: String,
    /// Average vote as published, e.g. `4.21`.
    pub votes: String,
    /// Playing time as `m:ss`.
    pub duration: String,
    pub year: u32,
    pub compo: String,
    pub party_place: u32,
}

impl Track {
    /// File name shown in listings.
    pub fn display_name(&self) -> String {
        if self.filename.is_empty() {
            format!("{}.{}", self.title, self.id)
        } else {
            self.filename.clone()
        }
    }
}

/// Cached zxart catalog.
pub struct ZxartCatalog {
    catalog: CachingCatalog,
    api: ZxartApi,
    config: CatalogConfig,
    blobs: Arc<BlobCache>,
}

impl ZxartCatalog {
    /// Wraps an already opened store.
    pub fn new(store: Arc<Store>, http: Arc<dyn HttpClient>, blobs: Arc<BlobCache>) -> Self {
        Self {
            catalog: CachingCatalog::new(store, Arc::new(SystemClock)),
            api: ZxartApi::new(http),
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

    /// DDL of the catalog database.
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
        collect(|visitor| {
            self.catalog.query(
                &CollectionFn {
                    key: "authors".to_string(),
                    ttl: self.config.authors_ttl,
                    local: &|db, visit| db::query_authors(db, visit),
                    remote: &|visit| api.authors(visit),
                    store: &|db, author| db::add_author(db, author),
                },
                visitor,
            )
        })
    }

    pub fn author_tracks(&self, author: u32) -> VfsResult<Vec<Track>> {
        let api = &self.api;
        collect(|visitor| {
            self.catalog.query(
                &CollectionFn {
                    key: format!("authors{}", author),
                    ttl: self.config.tracks_ttl,
                    local: &|db, visit| {
                        db::query_grouped_tracks(db, db::AUTHOR_TRACKS, author, visit)
                    },
                    remote: &|visit| api.author_tracks(author, visit),
                    store: &|db, track| {
                        db::add_track(db, track)?;
                        db::AUTHOR_TRACKS.add(db, author, track.id)
                    },
                },
                visitor,
            )
        })
    }

    pub fn parties(&self) -> VfsResult<Vec<Party>> {
        let api = &self.api;
        collect(|visitor| {
            self.catalog.query(
                &CollectionFn {
                    key: "parties".to_string(),
                    ttl: self.config.parties_ttl,
                    local: &|db, visit| db::query_parties(db, visit),
                    remote: &|visit| api.parties(visit),
                    store: &|db, party| db::add_party(db, party),
                },
                visitor,
            )
        })
    }

    pub fn party_tracks(&self, party: u32) -> VfsResult<Vec<Track>> {
        let api = &self.api;
        collect(|visitor| {
            self.catalog.query(
                &CollectionFn {
                    key: format!("parties{}", party),
                    ttl: self.config.tracks_ttl,
                    local: &|db, visit| {
                        db::query_grouped_tracks(db, db::PARTY_TRACKS, party, visit)
                    },
                    remote: &|visit| api.party_tracks(party, visit),
                    store: &|db, track| {
                        db::add_track(db, track)?;
                        db::PARTY_TRACKS.add(db, party, track.id)
                    },
                },
                visitor,
            )
        })
    }

    /// Best voted tracks, best first.
    pub fn top_tracks(&self) -> VfsResult<Vec<Track>> {
        let api = &self.api;
        collect(|visitor| {
            self.catalog.query(
                &CollectionFn {
                    key: "top".to_string(),
                    ttl: self.config.top_ttl,
                    local: &|db, visit| db::query_top_tracks(db, TOP_TRACKS_LIMIT, visit),
                    remote: &|visit| api.top_tracks(TOP_TRACKS_LIMIT, visit),
                    store: &|db, track| db::add_track(db, track),
                },
                visitor,
            )
        })
    }

    /// Tracks matching `query`, one entry per (author, track) pair.
    ///
    /// Uses the remote search engine when online, the local mirror otherwise.
    pub fn search(&self, query: &str) -> VfsResult<Vec<(Author, Track)>> {
        if !self.api.has_connection() {
            debug!(query = %query, "Offline, searching local zxart mirror");
            return self.search_local(query);
        }

        let mut remote = Vec::new();
        let searched = self.api.search(query, &mut |authors, track| {
            remote.push((authors, track));
            Ok(())
        });
        match searched {
            Ok(()) => {}
            Err(VfsError::Remote(RemoteError::NoConnection)) => {
                debug!(query = %query, "Connection lost, searching local zxart mirror");
                return self.search_local(query);
            }
            Err(e) => return Err(e),
        }

        let mut found = Vec::new();
        let known: HashMap<u32, Author> = match self.authors() {
            Ok(authors) => authors.into_iter().map(|a| (a.id, a)).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to load zxart authors for search results");
                HashMap::new()
            }
        };
        let author_of = |id: u32| known.get(&id).cloned().unwrap_or_else(Author::unknown);
        for (authors, track) in remote {
            if authors.is_empty() {
                found.push((Author::unknown(), track));
                continue;
            }
            for id in authors {
                found.push((author_of(id), track.clone()));
            }
        }
        Ok(found)
    }

    fn search_local(&self, query: &str) -> VfsResult<Vec<(Author, Track)>> {
        let mut found = Vec::new();
        self.store().transaction(|tx| {
            db::search_tracks(tx, query, &mut |author, track| {
                found.push((author, track));
                Ok(())
            })
        })?;
        Ok(found)
    }

    /// Blob cache key of a track.
    pub fn cache_key(track: u32) -> String {
        format!("zxart.ee/{}", track)
    }

    /// Content of a track, downloaded on first access.
    pub fn fetch_track(&self, track: u32) -> VfsResult<Vec<u8>> {
        let uris: Vec<_> = ZxartApi::track_uri(track).into_iter().collect();
        self.blobs
            .fetch(&Self::cache_key(track), &uris, self.api.http().as_ref())
    }
}

/// Runs a catalog query and gathers its items.
///
/// Items are handed out only after the store transaction ends, so callers
/// may query the catalog again while processing them.
fn collect<T>(
    query: impl FnOnce(&mut dyn FnMut(T) -> VfsResult<()>) -> VfsResult<CacheOutcome>,
) -> VfsResult<Vec<T>> {
    let mut items = Vec::new();
    query(&mut |item| {
        items.push(item);
        Ok(())
    })?;
    Ok(items)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::api::tests::{AUTHORS_XML, PARTIES_XML, TUNES_XML};
    use super::*;
    use crate::catalog::ManualClock;
    use crate::remote::{MockHttpClient, ReqwestClient};
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) const PARTY_TUNES_XML: &str = r#"<response><responseData><tunes>
        <tune id="200"><originalFileName>compo.pt3</originalFileName><title>Compo</title>
          <votes>4.9</votes><time>2:00</time><year>1999</year><compo>music</compo>
          <partyplace>1</partyplace><authors><id>2</id></authors></tune>
    </tunes></responseData></response>"#;

    pub(crate) struct Fixture {
        pub http: Arc<MockHttpClient>,
        pub clock: Arc<ManualClock>,
        pub catalog: Arc<ZxartCatalog>,
        pub _temp: TempDir,
    }

    pub(crate) fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let http = Arc::new(MockHttpClient::new());
        http.respond("action:authors", AUTHORS_XML);
        http.respond("action:tunes/authorId:1", TUNES_XML);
        http.respond("action:parties", PARTIES_XML);
        http.respond("action:tunes/partyId:7", PARTY_TUNES_XML);
        http.respond("action:topTunes", TUNES_XML);
        http.respond("action:search/query:bass", TUNES_XML);
        http.respond_bytes("file/id:100", vec![0x42; 1024]);

        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Store::open_in_memory(&ZxartCatalog::schema()).unwrap();
        let blobs = Arc::new(BlobCache::new(temp.path()));
        let catalog = ZxartCatalog::new(Arc::new(store), http.clone(), blobs)
            .with_clock(clock.clone());
        Fixture {
            http,
            clock,
            catalog: Arc::new(catalog),
            _temp: temp,
        }
    }

    #[test]
    fn test_authors_cached() {
        let f = fixture();
        let first = f.catalog.authors().unwrap();
        let second = f.catalog.authors().unwrap();
        assert_eq!(first.len(), 2);
        // Local order is by nickname, remote order is as published
        assert_eq!(second[0].nickname, "Mmcm");
        assert_eq!(f.http.calls(), 1);
    }

    #[test]
    fn test_authors_refetched_after_ttl() {
        let f = fixture();
        f.catalog.authors().unwrap();
        f.clock.advance(Duration::from_secs(31 * 24 * 3600));
        f.catalog.authors().unwrap();
        f.catalog.authors().unwrap();
        assert_eq!(f.http.calls(), 2);
    }

    #[test]
    fn test_author_tracks_grouped() {
        let f = fixture();
        let tracks = f.catalog.author_tracks(1).unwrap();
        assert_eq!(tracks.len(), 2);
        f.catalog.author_tracks(1).unwrap();
        assert_eq!(f.http.calls(), 1);
        assert_eq!(f.catalog.store().count("author_tracks").unwrap(), 2);
        assert_eq!(f.catalog.store().count("tracks").unwrap(), 2);
    }

    #[test]
    fn test_party_tracks() {
        let f = fixture();
        let parties = f.catalog.parties().unwrap();
        assert_eq!(parties.len(), 2);
        let tracks = f.catalog.party_tracks(7).unwrap();
        assert_eq!(tracks[0].compo, "music");
        assert_eq!(tracks[0].party_place, 1);
    }

    #[test]
    fn test_top_tracks_by_votes() {
        let f = fixture();
        f.catalog.top_tracks().unwrap();
        let cached = f.catalog.top_tracks().unwrap();
        assert_eq!(cached[0].id, 100);
        assert_eq!(cached[1].id, 101);
    }

    #[test]
    fn test_remote_search_resolves_authors() {
        let f = fixture();
        let found = f.catalog.search("bass").unwrap();
        let pairs: Vec<(String, u32)> = found
            .iter()
            .map(|(author, track)| (author.nickname.clone(), track.id))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Nik-O".to_string(), 100),
                ("Nik-O".to_string(), 101),
                ("Mmcm".to_string(), 101)
            ]
        );
    }

    #[test]
    fn test_offline_search_uses_mirror() {
        let f = fixture();
        f.catalog.authors().unwrap();
        f.catalog.author_tracks(1).unwrap();
        f.http.set_offline(true);

        let found = f.catalog.search("drive").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.nickname, "Nik-O");
        assert_eq!(found[0].1.title, "Drive");
    }

    #[test]
    fn test_search_falls_back_when_connection_drops() {
        let f = fixture();
        f.catalog.authors().unwrap();
        f.catalog.author_tracks(1).unwrap();
        f.http.fail("action:search", RemoteError::NoConnection);

        let found = f.catalog.search("drive").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.title, "Drive");
    }

    #[test]
    fn test_offline_reqwest_client_searches_mirror() {
        let f = fixture();
        f.catalog.authors().unwrap();
        f.catalog.author_tracks(1).unwrap();

        let client = ReqwestClient::with_timeout(2).unwrap();
        assert!(client.get(&crate::remote::unreachable_url()).is_err());
        let offline = ZxartCatalog::new(
            Arc::clone(f.catalog.store()),
            Arc::new(client),
            Arc::clone(f.catalog.blobs()),
        );

        let found = offline.search("drive").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.nickname, "Nik-O");
    }

    #[test]
    fn test_failed_refetch_keeps_stale_rows() {
        let f = fixture();
        f.catalog.authors().unwrap();
        f.clock.advance(Duration::from_secs(31 * 24 * 3600));
        f.http.fail("action:authors", RemoteError::NoConnection);
        assert!(f.catalog.authors().is_err());
        assert_eq!(f.catalog.store().count("authors").unwrap(), 2);
    }

    #[test]
    fn test_fetch_track_uses_blob_cache() {
        let f = fixture();
        assert_eq!(f.catalog.fetch_track(100).unwrap().len(), 1024);
        assert_eq!(f.catalog.fetch_track(100).unwrap().len(), 1024);
        assert_eq!(f.http.calls(), 1);
        assert!(f.catalog.blobs().contains("zxart.ee/100"));
    }
}
