//! Cached remote music catalogs.
//!
//! Each remote archive is mirrored into a local SQLite [`Store`] and
//! queried through the same [`CachingCatalog`] state machine: fresh
//! collections are served locally, stale ones are refetched and written
//! through inside one transaction.
//!
//! # Sources
//!
//! | Scheme        | Source         | Collections                                        |
//! |---------------|----------------|----------------------------------------------------|
//! | `zxart:`      | zxart.ee       | authors, author tracks, parties, party tracks, top |
//! | `zxtunes:`    | zxtunes.com    | authors, author tracks                             |
//! | `modarchive:` | modarchive.org | authors, author tracks, genres, genre tracks       |
//!
//! Track content is downloaded on demand into the [`BlobCache`]
//! (`crate::blob`) and never expires.
//!
//! [`BlobCache`]: crate::blob::BlobCache

mod caching;
mod lifetime;
pub mod modarchive;
mod store;
pub mod xml;
pub mod zxart;
pub mod zxtunes;

use std::time::Duration;

use url::Url;

use crate::vfs::parent_path_uri;

pub use caching::{CacheOutcome, CachedCollection, CachingCatalog, CollectionFn, ItemVisitor};
pub use lifetime::{Clock, Lifetime, ManualClock, SystemClock};
pub use store::{read_timestamp, write_timestamp, Grouping, Store, StoreError};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default freshness of author lists.
pub const DEFAULT_AUTHORS_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Default freshness of an author's or a party's track list.
pub const DEFAULT_TRACKS_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);
/// Default freshness of party lists.
pub const DEFAULT_PARTIES_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Default freshness of the top tracks chart.
pub const DEFAULT_TOP_TTL: Duration = DAY;

/// Freshness windows per collection kind, plus per-source credentials.
///
/// Genre lists share `authors_ttl`; genre track lists share `tracks_ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub authors_ttl: Duration,
    pub tracks_ttl: Duration,
    pub parties_ttl: Duration,
    pub top_ttl: Duration,
    /// modarchive.org API key; the source stays disabled while empty.
    pub modarchive_key: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            authors_ttl: DEFAULT_AUTHORS_TTL,
            tracks_ttl: DEFAULT_TRACKS_TTL,
            parties_ttl: DEFAULT_PARTIES_TTL,
            top_ttl: DEFAULT_TOP_TTL,
            modarchive_key: String::new(),
        }
    }
}

impl CatalogConfig {
    pub fn with_authors_ttl(mut self, ttl: Duration) -> Self {
        self.authors_ttl = ttl;
        self
    }

    pub fn with_tracks_ttl(mut self, ttl: Duration) -> Self {
        self.tracks_ttl = ttl;
        self
    }

    pub fn with_parties_ttl(mut self, ttl: Duration) -> Self {
        self.parties_ttl = ttl;
        self
    }

    pub fn with_top_ttl(mut self, ttl: Duration) -> Self {
        self.top_ttl = ttl;
        self
    }

    pub fn with_modarchive_key(mut self, key: impl Into<String>) -> Self {
        self.modarchive_key = key.into();
        self
    }
}

// =============================================================================
// Catalog URIs
// =============================================================================

/// Builds `base` + `segments` with `params` as query.
pub(crate) fn build_uri(base: &Url, segments: &[&str], params: &[(&str, u32)]) -> Url {
    let mut uri = base.clone();
    uri.set_query(None);
    if let Ok(mut path) = uri.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    if !params.is_empty() {
        let mut query = uri.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, &value.to_string());
        }
    }
    uri
}

/// Decoded non-empty path segments.
pub(crate) fn path_segments(uri: &Url) -> Vec<String> {
    uri.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| {
                    urlencoding::decode(s)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| s.to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Numeric query parameter.
pub(crate) fn query_id(uri: &Url, name: &str) -> Option<u32> {
    uri.query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.parse().ok())
}

/// Parent path of `uri`, carrying over the query parameters named in `keep`.
///
/// Catalog dirs are addressed by name plus id (`/authors/Nik-O?author=1`);
/// a child track drops its own id but must keep its ancestors'.
pub(crate) fn parent_keeping(uri: &Url, keep: &[&str]) -> Option<Url> {
    let mut parent = parent_path_uri(uri)?;
    let kept: Vec<(String, String)> = uri
        .query_pairs()
        .filter(|(key, _)| keep.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if !kept.is_empty() {
        parent.query_pairs_mut().extend_pairs(kept);
    }
    Some(parent)
}

/// Formats a duration as `m:ss`.
pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_parse_uri() {
        let base = Url::parse("zxart:/").unwrap();
        let uri = build_uri(&base, &["authors", "Nik O"], &[("author", 12)]);
        assert_eq!(uri.as_str(), "zxart:/authors/Nik%20O?author=12");
        assert_eq!(path_segments(&uri), vec!["authors", "Nik O"]);
        assert_eq!(query_id(&uri, "author"), Some(12));
        assert_eq!(query_id(&uri, "track"), None);
    }

    #[test]
    fn test_build_nested_uri() {
        let base = Url::parse("zxart:/").unwrap();
        let author = build_uri(&base, &["authors", "X"], &[("author", 1)]);
        let track = build_uri(&author, &["a.pt3"], &[("author", 1), ("track", 9)]);
        assert_eq!(track.as_str(), "zxart:/authors/X/a.pt3?author=1&track=9");
    }

    #[test]
    fn test_parent_keeping() {
        let track = Url::parse("zxart:/authors/X/a.pt3?author=1&track=9").unwrap();
        let parent = parent_keeping(&track, &["author"]).unwrap();
        assert_eq!(parent.as_str(), "zxart:/authors/X?author=1");

        let top = Url::parse("zxart:/top/a.pt3?track=9").unwrap();
        assert_eq!(
            parent_keeping(&top, &["author"]).unwrap().as_str(),
            "zxart:/top"
        );
    }

    #[test]
    fn test_default_ttls() {
        let config = CatalogConfig::default();
        assert_eq!(config.authors_ttl, DAY * 30);
        assert_eq!(config.tracks_ttl, DAY * 14);
        assert_eq!(config.top_ttl, DAY);
        let config = config.with_top_ttl(Duration::from_secs(60));
        assert_eq!(config.top_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
    }
}
