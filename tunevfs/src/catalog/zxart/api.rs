//! zxart.ee remote API.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::{Author, Party, Track};
use crate::catalog::xml::{for_each_record, XmlRecord};
use crate::remote::HttpClient;
use crate::vfs::VfsResult;

const API_BASE: &str = "https://zxart.ee/zxtune/language:eng";
const DOWNLOAD_BASE: &str = "https://zxart.ee/file/id:";

/// Thin client over the zxart XML endpoints.
#[derive(Clone)]
pub struct ZxartApi {
    http: Arc<dyn HttpClient>,
}

impl ZxartApi {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    pub fn has_connection(&self) -> bool {
        self.http.has_connection()
    }

    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    pub fn authors(&self, visitor: &mut dyn FnMut(Author) -> VfsResult<()>) -> VfsResult<()> {
        let data = self.fetch("action:authors")?;
        for_each_record(&data, "author", |record| match parse_author(&record) {
            Some(author) => visitor(author),
            None => Ok(()),
        })
    }

    pub fn parties(&self, visitor: &mut dyn FnMut(Party) -> VfsResult<()>) -> VfsResult<()> {
        let data = self.fetch("action:parties")?;
        for_each_record(&data, "party", |record| match parse_party(&record) {
            Some(party) => visitor(party),
            None => Ok(()),
        })
    }

    pub fn author_tracks(
        &self,
        author: u32,
        visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        self.tunes(&format!("action:tunes/authorId:{}", author), &mut |_, track| {
            visitor(track)
        })
    }

    pub fn party_tracks(
        &self,
        party: u32,
        visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        self.tunes(&format!("action:tunes/partyId:{}", party), &mut |_, track| {
            visitor(track)
        })
    }

    pub fn top_tracks(
        &self,
        limit: u32,
        visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        self.tunes(&format!("action:topTunes/limit:{}", limit), &mut |_, track| {
            visitor(track)
        })
    }

    /// Remote search; each match comes with the ids of its authors.
    pub fn search(
        &self,
        query: &str,
        visitor: &mut dyn FnMut(Vec<u32>, Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let query = urlencoding::encode(query);
        self.tunes(&format!("action:search/query:{}", query), visitor)
    }

    /// Download location of a track.
    pub fn track_uri(id: u32) -> Option<Url> {
        Url::parse(&format!("{}{}", DOWNLOAD_BASE, id)).ok()
    }

    fn tunes(
        &self,
        action: &str,
        visitor: &mut dyn FnMut(Vec<u32>, Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let data = self.fetch(action)?;
        for_each_record(&data, "tune", |record| match parse_track(&record) {
            Some(track) => {
                let authors = record
                    .fields("authors/id")
                    .filter_map(|id| id.trim().parse().ok())
                    .collect();
                visitor(authors, track)
            }
            None => Ok(()),
        })
    }

    fn fetch(&self, action: &str) -> VfsResult<Vec<u8>> {
        let url = format!("{}/{}", API_BASE, action);
        debug!(url = %url, "Querying zxart");
        Ok(self.http.get(&url)?)
    }
}

fn parse_author(record: &XmlRecord) -> Option<Author> {
    Some(Author {
        id: record.id()?,
        nickname: record.field("title").filter(|s| !s.is_empty())?.to_string(),
        name: record.text("realName"),
    })
}

fn parse_party(record: &XmlRecord) -> Option<Party> {
    Some(Party {
        id: record.id()?,
        name: record.field("title").filter(|s| !s.is_empty())?.to_string(),
        year: record.number("year").unwrap_or(0),
    })
}

fn parse_track(record: &XmlRecord) -> Option<Track> {
    let filename = record.text("originalFileName");
    let title = Some(record.text("title"))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| record.text("internalTitle"));
    if filename.is_empty() && title.is_empty() {
        return None;
    }
    Some(Track {
        id: record.id()?,
        filename,
        title,
        votes: record.text("votes"),
        duration: normalize_time(&record.text("time")),
        year: record.number("year").unwrap_or(0),
        compo: record.text("compo"),
        party_place: record.number("partyplace").unwrap_or(0),
    })
}

/// `3:05.20` -> `3:05`
fn normalize_time(time: &str) -> String {
    time.split('.').next().unwrap_or_default().trim().to_string()
}
