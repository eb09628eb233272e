//! VFS view of the zxtunes catalog.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use super::{Author, Track, ZxtunesApi, ZxtunesCatalog};
use crate::catalog::{build_uri, parent_keeping, path_segments, query_id};
use crate::vfs::{
    parent_path_uri, root_uri, DirVisitor, Extension, ExtensionId, ProgressCallback,
    SearchEngine, VfsDir, VfsFile, VfsNode, VfsObject, VfsResult, VfsRoot,
};

const SCHEME_ROOT: &str = "zxtunes:/";

/// Root of the `zxtunes:` tree.
#[derive(Clone)]
pub struct ZxtunesRoot {
    uri: Url,
    catalog: Arc<ZxtunesCatalog>,
}

impl ZxtunesRoot {
    pub fn new(catalog: Arc<ZxtunesCatalog>) -> Self {
        let uri = Url::parse(SCHEME_ROOT).unwrap_or_else(|_| root_uri());
        Self { uri, catalog }
    }

    fn authors(&self) -> AuthorsDir {
        AuthorsDir {
            uri: build_uri(&self.uri, &["authors"], &[]),
            catalog: Arc::clone(&self.catalog),
        }
    }

    fn author_dir(&self, uri: &Url) -> VfsResult<Option<AuthorDir>> {
        let Some(id) = query_id(uri, "author") else {
            return Ok(None);
        };
        let authors = self.authors();
        Ok(self
            .catalog
            .authors()?
            .into_iter()
            .find(|a| a.id == id)
            .map(|author| authors.author(author)))
    }
}

impl VfsNode for ZxtunesRoot {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        "zxtunes.com".to_string()
    }

    fn description(&self) -> String {
        "ZX Spectrum tunes collection".to_string()
    }

    fn parent_uri(&self) -> Option<Url> {
        Some(root_uri())
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("zxtunes".to_string())),
            ExtensionId::SearchEngine => Some(Extension::SearchEngine(Arc::new(LocalSearch {
                authors: self.authors(),
            }))),
            _ => None,
        }
    }
}

impl VfsDir for ZxtunesRoot {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        visitor.on_items_count(1)?;
        visitor.on_dir(Arc::new(self.authors()))
    }
}

impl VfsRoot for ZxtunesRoot {
    fn resolve(&self, uri: &Url, progress: &dyn ProgressCallback) -> VfsResult<Option<VfsObject>> {
        if uri.scheme() != self.uri.scheme() {
            return Ok(None);
        }
        let segments = path_segments(uri);
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let track_id = query_id(uri, "track");

        let object = match (segments.as_slice(), track_id) {
            ([], _) => Some(VfsObject::Dir(Arc::new(self.clone()))),
            (["authors"], _) => Some(VfsObject::Dir(Arc::new(self.authors()))),
            (["authors", _], _) => {
                progress.on_progress(0, 0)?;
                self.author_dir(uri)?
                    .map(|dir| VfsObject::Dir(Arc::new(dir)))
            }
            (["authors", _, year], None) => {
                progress.on_progress(0, 0)?;
                match (self.author_dir(uri)?, year.parse::<u32>()) {
                    (Some(dir), Ok(year)) if year != 0 => {
                        Some(VfsObject::Dir(Arc::new(dir.year(year))))
                    }
                    _ => None,
                }
            }
            (["authors", _, _], Some(track)) | (["authors", _, _, _], Some(track)) => {
                progress.on_progress(0, 0)?;
                match self.author_dir(uri)? {
                    Some(dir) => {
                        progress.on_progress(1, 2)?;
                        self.catalog
                            .author_tracks(dir.author.id)?
                            .into_iter()
                            .find(|t| t.id == track)
                            .map(|t| VfsObject::File(Arc::new(dir.track(t))))
                    }
                    None => None,
                }
            }
            _ => None,
        };
        // A track only exists at its canonical location
        Ok(object.filter(|obj| obj.as_file().is_none() || obj.uri() == uri))
    }

    fn as_dir(self: Arc<Self>) -> Arc<dyn VfsDir> {
        self
    }
}

// =============================================================================
// Dirs
// =============================================================================

#[derive(Clone)]
struct AuthorsDir {
    uri: Url,
    catalog: Arc<ZxtunesCatalog>,
}

impl AuthorsDir {
    fn author(&self, author: Author) -> AuthorDir {
        AuthorDir {
            uri: build_uri(&self.uri, &[author.nickname.as_str()], &[("author", author.id)]),
            author,
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl VfsNode for AuthorsDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        "Authors".to_string()
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_path_uri(&self.uri)
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("author".to_string())),
            _ => None,
        }
    }
}

impl VfsDir for AuthorsDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        let authors = self.catalog.authors()?;
        visitor.on_items_count(authors.len())?;
        for author in authors {
            visitor.on_dir(Arc::new(self.author(author)))?;
        }
        Ok(())
    }
}

/// Author's tracks, dated ones grouped by year.
struct AuthorDir {
    uri: Url,
    author: Author,
    catalog: Arc<ZxtunesCatalog>,
}

impl AuthorDir {
    fn year(&self, year: u32) -> YearDir {
        let segment = year.to_string();
        YearDir {
            uri: build_uri(&self.uri, &[segment.as_str()], &[("author", self.author.id)]),
            year,
            author: self.author.clone(),
            catalog: Arc::clone(&self.catalog),
        }
    }

    /// Track file at its canonical location, under its year dir if dated.
    fn track(&self, track: Track) -> TrackFile {
        let params = [("author", self.author.id), ("track", track.id)];
        let uri = if track.date == 0 {
            build_uri(&self.uri, &[track.filename.as_str()], &params)
        } else {
            let year = track.date.to_string();
            build_uri(&self.uri, &[year.as_str(), track.filename.as_str()], &params)
        };
        TrackFile {
            uri,
            track,
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl VfsNode for AuthorDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        self.author.nickname.clone()
    }

    fn description(&self) -> String {
        self.author.name.clone()
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_path_uri(&self.uri)
    }
}

impl VfsDir for AuthorDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        let tracks = self.catalog.author_tracks(self.author.id)?;
        let mut years: BTreeMap<u32, usize> = BTreeMap::new();
        let mut undated = Vec::new();
        for track in tracks {
            if track.date == 0 {
                undated.push(track);
            } else {
                *years.entry(track.date).or_default() += 1;
            }
        }
        visitor.on_items_count(years.len() + undated.len())?;
        for year in years.into_keys() {
            visitor.on_dir(Arc::new(self.year(year)))?;
        }
        for track in undated {
            visitor.on_file(Arc::new(self.track(track)))?;
        }
        Ok(())
    }
}

struct YearDir {
    uri: Url,
    year: u32,
    author: Author,
    catalog: Arc<ZxtunesCatalog>,
}

impl VfsNode for YearDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        self.year.to_string()
    }

    fn description(&self) -> String {
        self.author.nickname.clone()
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_keeping(&self.uri, &["author"])
    }
}

impl VfsDir for YearDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        let author = AuthorDir {
            uri: parent_keeping(&self.uri, &["author"]).unwrap_or_else(|| self.uri.clone()),
            author: self.author.clone(),
            catalog: Arc::clone(&self.catalog),
        };
        for track in self.catalog.author_tracks(self.author.id)? {
            if track.date == self.year {
                visitor.on_file(Arc::new(author.track(track)))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Files
// =============================================================================

struct TrackFile {
    uri: Url,
    track: Track,
    catalog: Arc<ZxtunesCatalog>,
}

impl VfsNode for TrackFile {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        self.track.filename.clone()
    }

    fn description(&self) -> String {
        self.track.title.clone()
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_keeping(&self.uri, &["author"])
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::CachePath => {
                Some(Extension::CachePath(ZxtunesCatalog::cache_key(self.track.id)))
            }
            ExtensionId::DownloadUris => Some(Extension::DownloadUris(
                ZxtunesApi::track_uri(self.track.id).into_iter().collect(),
            )),
            _ => None,
        }
    }
}

impl VfsFile for TrackFile {
    fn details(&self) -> String {
        self.track.duration_text()
    }

    fn content(&self) -> VfsResult<Vec<u8>> {
        self.catalog.fetch_track(self.track.id)
    }

    fn local_path(&self) -> Option<PathBuf> {
        let key = ZxtunesCatalog::cache_key(self.track.id);
        let blobs = self.catalog.blobs();
        blobs.contains(&key).then(|| blobs.path_for(&key)).flatten()
    }
}

/// Search over the locally mirrored tracks.
struct LocalSearch {
    authors: AuthorsDir,
}

impl SearchEngine for LocalSearch {
    fn find(
        &self,
        query: &str,
        visitor: &mut dyn FnMut(Arc<dyn VfsFile>) -> VfsResult<()>,
    ) -> VfsResult<()> {
        for (author, track) in self.authors.catalog.search(query)? {
            visitor(Arc::new(self.authors.author(author).track(track)))?;
        }
        Ok(())
    }
}
