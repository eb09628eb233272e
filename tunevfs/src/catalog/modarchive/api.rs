//! modarchive.org remote API.
//!
//! Every request goes through `xml-tools.php` with the user's API key.
//! Listings are paged; the first page carries `<totalpages>` and the rest
//! are fetched with `&page=N`.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::{Author, Genre, Track};
use crate::catalog::xml::{first_text, for_each_record, XmlRecord};
use crate::remote::HttpClient;
use crate::vfs::VfsResult;

const API_BASE: &str = "https://api.modarchive.org/";

/// Thin client over the modarchive XML endpoints.
#[derive(Clone)]
pub struct ModarchiveApi {
    http: Arc<dyn HttpClient>,
    key: String,
}

impl ModarchiveApi {
    pub fn new(http: Arc<dyn HttpClient>, key: impl Into<String>) -> Self {
        Self {
            http,
            key: key.into(),
        }
    }

    pub fn has_connection(&self) -> bool {
        self.http.has_connection()
    }

    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// Every artist, followed by [`Author::unknown`] for unattributed modules.
    pub fn authors(&self, visitor: &mut dyn FnMut(Author) -> VfsResult<()>) -> VfsResult<()> {
        self.pages("request=search_artist", "item", &mut |record| {
            match parse_author(record, "") {
                Some(author) => visitor(author),
                None => Ok(()),
            }
        })?;
        visitor(Author::unknown())
    }

    /// Genres; the list is not paged.
    pub fn genres(&self, visitor: &mut dyn FnMut(Genre) -> VfsResult<()>) -> VfsResult<()> {
        let data = self.fetch("request=view_genres")?;
        for_each_record(&data, "child", |record| match parse_genre(&record) {
            Some(genre) => visitor(genre),
            None => Ok(()),
        })
    }

    pub fn author_tracks(
        &self,
        author: u32,
        visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let request = format!("request=view_modules_by_artistid&query={}", author);
        self.tracks(&request, visitor)
    }

    pub fn genre_tracks(
        &self,
        genre: u32,
        visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let request = format!("request=search&type=genre&query={}", genre);
        self.tracks(&request, visitor)
    }

    /// Modules whose filename or title contains `query`, with their artist.
    pub fn search(
        &self,
        query: &str,
        visitor: &mut dyn FnMut(Author, Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let pattern = format!("*{}*", query);
        let request = format!(
            "request=search&type=filename_or_songtitle&query={}",
            urlencoding::encode(&pattern)
        );
        self.pages(&request, "module", &mut |record| match parse_track(record) {
            Some(track) => {
                let author =
                    parse_author(record, "artist_info/artist/").unwrap_or_else(Author::unknown);
                visitor(author, track)
            }
            None => Ok(()),
        })
    }

    /// Download location of a module.
    pub fn track_uri(id: u32) -> Option<Url> {
        Url::parse(&format!("{}downloads.php?moduleid={}", API_BASE, id)).ok()
    }

    fn tracks(
        &self,
        request: &str,
        visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
    ) -> VfsResult<()> {
        self.pages(request, "module", &mut |record| match parse_track(record) {
            Some(track) => visitor(track),
            None => Ok(()),
        })
    }

    /// Visits the `tag` records of every page of `request`.
    fn pages(
        &self,
        request: &str,
        tag: &str,
        visitor: &mut dyn FnMut(&XmlRecord) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let mut total = 1;
        let mut page = 1;
        while page <= total {
            let data = self.fetch(&format!("{}&page={}", request, page))?;
            if page == 1 {
                total = first_text(&data, "totalpages")?
                    .and_then(|text| text.trim().parse().ok())
                    .unwrap_or(1);
                if total > 1 {
                    debug!(request = %request, pages = total, "Loading paged modarchive listing");
                }
            }
            for_each_record(&data, tag, |record| visitor(&record))?;
            page += 1;
        }
        Ok(())
    }

    fn fetch(&self, request: &str) -> VfsResult<Vec<u8>> {
        let url = format!(
            "{}xml-tools.php?key={}&{}",
            API_BASE,
            urlencoding::encode(&self.key),
            request
        );
        debug!(request = %request, "Querying modarchive");
        Ok(self.http.get(&url)?)
    }
}

/// Author from the `id` and `alias` fields below `prefix`.
fn parse_author(record: &XmlRecord, prefix: &str) -> Option<Author> {
    let id = record
        .field(&format!("{}id", prefix))
        .and_then(|v| v.trim().parse().ok())?;
    let alias = record
        .field(&format!("{}alias", prefix))
        .filter(|s| !s.is_empty())?;
    Some(Author {
        id,
        alias: alias.to_string(),
    })
}

fn parse_genre(record: &XmlRecord) -> Option<Genre> {
    Some(Genre {
        id: record.number("id")?,
        name: record.field("text").filter(|s| !s.is_empty())?.to_string(),
        files: record.number("files").unwrap_or(0),
    })
}

fn parse_track(record: &XmlRecord) -> Option<Track> {
    Some(Track {
        id: record.number("id")?,
        filename: record.field("filename").filter(|s| !s.is_empty())?.to_string(),
        title: record.text("songtitle"),
        size: record.number("bytes").unwrap_or(0),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::remote::MockHttpClient;

    pub(crate) const ARTISTS_PAGE1_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<modarchive><total_results>3</total_results><totalpages>2</totalpages>
  <items>
    <item><id>69141</id><alias>Purple Motion</alias></item>
    <item><id>70001</id><alias></alias></item>
  </items>
</modarchive>"#;

    pub(crate) const ARTISTS_PAGE2_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<modarchive><total_results>3</total_results><totalpages>2</totalpages>
  <items><item><id>83460</id><alias>Skaven</alias></item></items>
</modarchive>"#;

    pub(crate) const GENRES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<modarchive><results>2</results>
  <parent><id>1</id><text>Electronic</text>
    <children>
      <child><id>2</id><text>Techno</text><files>1742</files></child>
      <child><id>7</id><text>Chiptune</text><files>640</files></child>
    </children>
  </parent>
</modarchive>"#;

    pub(crate) const MODULES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<modarchive><total_results>2</total_results><totalpages>1</totalpages>
  <module><id>41213</id><filename>2ND_PM.S3M</filename><bytes>494368</bytes><songtitle><![CDATA[Second Reality]]></songtitle></module>
  <module><id>41214</id><filename>satellite.s3m</filename><bytes>100000</bytes><songtitle>Satellite One</songtitle></module>
</modarchive>"#;

    pub(crate) const SEARCH_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<modarchive><results>2</results><totalpages>1</totalpages>
  <module><id>41213</id><filename>2ND_PM.S3M</filename><bytes>494368</bytes><songtitle>Second Reality</songtitle>
    <artist_info><artists>1</artists><artist><id>69141</id><alias>Purple Motion</alias></artist></artist_info>
  </module>
  <module><id>50000</id><filename>anon.mod</filename><bytes>2048</bytes><songtitle>Second hand</songtitle>
    <artist_info><artists>0</artists></artist_info>
  </module>
</modarchive>"#;

    fn api() -> (Arc<MockHttpClient>, ModarchiveApi) {
        let http = Arc::new(MockHttpClient::new());
        http.respond("request=search_artist&page=1", ARTISTS_PAGE1_XML);
        http.respond("request=search_artist&page=2", ARTISTS_PAGE2_XML);
        http.respond("request=view_genres", GENRES_XML);
        http.respond("view_modules_by_artistid&query=69141", MODULES_XML);
        http.respond("type=filename_or_songtitle", SEARCH_XML);
        (http.clone(), ModarchiveApi::new(http, "secret"))
    }

    #[test]
    fn test_authors_over_pages() {
        let (http, api) = api();
        let mut authors = Vec::new();
        api.authors(&mut |a| {
            authors.push(a);
            Ok(())
        })
        .unwrap();
        let ids: Vec<_> = authors.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![69141, 83460, 0]);
        assert_eq!(authors[2], Author::unknown());
        assert_eq!(http.calls(), 2);
    }

    #[test]
    fn test_genres() {
        let (_, api) = api();
        let mut genres = Vec::new();
        api.genres(&mut |g| {
            genres.push(g);
            Ok(())
        })
        .unwrap();
        assert_eq!(genres.len(), 2);
        assert_eq!(genres[1].name, "Chiptune");
        assert_eq!(genres[1].files, 640);
    }

    #[test]
    fn test_author_tracks() {
        let (_, api) = api();
        let mut tracks = Vec::new();
        api.author_tracks(69141, &mut |t| {
            tracks.push(t);
            Ok(())
        })
        .unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "Second Reality");
        assert_eq!(tracks[0].size, 494368);
    }

    #[test]
    fn test_search_attributes_artists() {
        let (_, api) = api();
        let mut found = Vec::new();
        api.search("second", &mut |author, track| {
            found.push((author.alias, track.id));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            found,
            vec![
                ("Purple Motion".to_string(), 41213),
                (Author::unknown().alias, 50000)
            ]
        );
    }

    #[test]
    fn test_unanswered_request_fails() {
        let (_, api) = api();
        let result = api.genre_tracks(2, &mut |_| Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn test_track_uri() {
        assert_eq!(
            ModarchiveApi::track_uri(41213).unwrap().as_str(),
            "https://api.modarchive.org/downloads.php?moduleid=41213"
        );
    }
}
