//! zxtunes.com remote API.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::{Author, Track};
use crate::catalog::xml::{for_each_record, XmlRecord};
use crate::remote::HttpClient;
use crate::vfs::VfsResult;

const SITE: &str = "http://zxtunes.com/";
const AUTHORS_QUERY: &str = "xml.php?scope=authors&fields=nickname,name,tracks";
const TRACKS_QUERY: &str = "xml.php?scope=tracks&fields=filename,title,duration,date";

/// Thin client over the zxtunes XML endpoints. There is no remote search.
#[derive(Clone)]
pub struct ZxtunesApi {
    http: Arc<dyn HttpClient>,
}

impl ZxtunesApi {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// Authors with at least one track.
    pub fn authors(&self, visitor: &mut dyn FnMut(Author) -> VfsResult<()>) -> VfsResult<()> {
        let data = self.fetch(AUTHORS_QUERY)?;
        for_each_record(&data, "author", |record| match parse_author(&record) {
            Some(author) => visitor(author),
            None => Ok(()),
        })
    }

    pub fn author_tracks(
        &self,
        author: u32,
        visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let data = self.fetch(&format!("{}&author_id={}", TRACKS_QUERY, author))?;
        for_each_record(&data, "track", |record| match parse_track(&record) {
            Some(track) => visitor(track),
            None => Ok(()),
        })
    }

    /// Download location of a track.
    pub fn track_uri(id: u32) -> Option<Url> {
        Url::parse(&format!("{}downloads.php?id={}", SITE, id)).ok()
    }

    fn fetch(&self, query: &str) -> VfsResult<Vec<u8>> {
        let url = format!("{}{}", SITE, query);
        debug!(url = %url, "Querying zxtunes");
        Ok(self.http.get(&url)?)
    }
}

fn parse_author(record: &XmlRecord) -> Option<Author> {
    let tracks = record.number("tracks").unwrap_or(0);
    if tracks == 0 {
        return None;
    }
    Some(Author {
        id: record.id()?,
        nickname: record.field("nickname")?.to_string(),
        name: record.text("name"),
    })
}

fn parse_track(record: &XmlRecord) -> Option<Track> {
    Some(Track {
        id: record.id()?,
        filename: record.field("filename").filter(|s| !s.is_empty())?.to_string(),
        title: record.text("title"),
        duration_frames: record.number("duration").unwrap_or(0),
        date: record.number("date").unwrap_or(0),
    })
}
