//! modarchive.org catalog (`modarchive:` scheme).
//!
//! ```text
//! modarchive:/
//!   ├── authors/{alias}?author={id}
//!   │     └── {file}?author={id}&track={id}
//!   └── genres/{name}?genre={id}
//!         └── {file}?genre={id}&track={id}
//! ```
//!
//! The API requires a personal key, so the source is only registered when
//! `catalog.modarchive_key` is configured. Modules without an artist are
//! listed under [`Author::unknown`].

mod api;
mod db;
mod root;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

pub use api::ModarchiveApi;
pub use root::ModarchiveRoot;

use super::{
    CacheOutcome, CachingCatalog, CatalogConfig, Clock, CollectionFn, Store, StoreError,
    SystemClock,
};
use crate::blob::BlobCache;
use crate::remote::{HttpClient, RemoteError};
use crate::vfs::{format_size, VfsError, VfsResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u32,
    pub alias: String,
}

impl Author {
    /// Pseudo artist owning unattributed modules.
    pub fn unknown() -> Self {
        Self {
            id: 0,
            alias: "!Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: u32,
    pub name: String,
    /// Number of modules, as reported by the site.
    pub files: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: u32,
    pub filename: String,
    pub title: String,
    /// Size in bytes, 0 if unknown.
    pub size: u32,
}

impl Track {
    /// Human readable size, empty if unknown.
    pub fn size_text(&self) -> String {
        if self.size == 0 {
            String::new()
        } else {
            format_size(u64::from(self.size))
        }
    }
}

/// Cached modarchive catalog.
pub struct ModarchiveCatalog {
    catalog: CachingCatalog,
    api: ModarchiveApi,
    config: CatalogConfig,
    blobs: Arc<BlobCache>,
}

impl ModarchiveCatalog {
    pub fn new(
        store: Arc<Store>,
        http: Arc<dyn HttpClient>,
        key: &str,
        blobs: Arc<BlobCache>,
    ) -> Self {
        Self {
            catalog: CachingCatalog::new(store, Arc::new(SystemClock)),
            api: ModarchiveApi::new(http, key),
            config: CatalogConfig::default(),
            blobs,
        }
    }

    /// Opens (or creates) the catalog database at `path`.
    pub fn open(
        path: &Path,
        http: Arc<dyn HttpClient>,
        key: &str,
        blobs: Arc<BlobCache>,
    ) -> Result<Self, StoreError> {
        let store = Store::open(path, &Self::schema())?;
        Ok(Self::new(Arc::new(store), http, key, blobs))
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

    pub fn genres(&self) -> VfsResult<Vec<Genre>> {
        let api = &self.api;
        let mut genres = Vec::new();
        self.query(
            &CollectionFn {
                key: "genres".to_string(),
                ttl: self.config.authors_ttl,
                local: &|db, visit| db::query_genres(db, visit),
                remote: &|visit| api.genres(visit),
                store: &|db, genre| db::add_genre(db, genre),
            },
            &mut genres,
        )?;
        Ok(genres)
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

    pub fn genre_tracks(&self, genre: u32) -> VfsResult<Vec<Track>> {
        let api = &self.api;
        let mut tracks = Vec::new();
        self.query(
            &CollectionFn {
                key: format!("genres{}", genre),
                ttl: self.config.tracks_ttl,
                local: &|db, visit| db::query_genre_tracks(db, genre, visit),
                remote: &|visit| api.genre_tracks(genre, visit),
                store: &|db, track| db::add_genre_track(db, genre, track),
            },
            &mut tracks,
        )?;
        Ok(tracks)
    }

    /// Tracks matching `query` with their author.
    ///
    /// Uses the remote search when online, the local mirror otherwise.
    pub fn search(&self, query: &str) -> VfsResult<Vec<(Author, Track)>> {
        if !self.api.has_connection() {
            debug!(query = %query, "Offline, searching local modarchive mirror");
            return self.search_local(query);
        }
        let mut found = Vec::new();
        let searched = self.api.search(query, &mut |author, track| {
            found.push((author, track));
            Ok(())
        });
        match searched {
            Ok(()) => Ok(found),
            Err(VfsError::Remote(RemoteError::NoConnection)) => {
                debug!(query = %query, "Connection lost, searching local modarchive mirror");
                self.search_local(query)
            }
            Err(e) => Err(e),
        }
    }

    fn search_local(&self, query: &str) -> VfsResult<Vec<(Author, Track)>> {
        Ok(self
            .store()
            .transaction(|tx| db::search_tracks(tx, query))?)
    }

    pub fn cache_key(track: u32) -> String {
        format!("modarchive.org/{}", track)
    }

    /// Content of a module, downloaded on first access.
    pub fn fetch_track(&self, track: u32) -> VfsResult<Vec<u8>> {
        let uris: Vec<_> = ModarchiveApi::track_uri(track).into_iter().collect();
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
