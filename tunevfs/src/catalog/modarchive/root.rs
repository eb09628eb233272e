//! VFS view of the modarchive catalog.

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use super::{Author, Genre, ModarchiveApi, ModarchiveCatalog, Track};
use crate::catalog::{build_uri, parent_keeping, path_segments, query_id};
use crate::vfs::{
    parent_path_uri, root_uri, DirVisitor, Extension, ExtensionId, ProgressCallback,
    SearchEngine, VfsDir, VfsFile, VfsNode, VfsObject, VfsResult, VfsRoot,
};

const SCHEME_ROOT: &str = "modarchive:/";

/// Query parameters naming a track's containing dir.
const GROUP_PARAMS: [&str; 2] = ["author", "genre"];

/// Root of the `modarchive:` tree.
#[derive(Clone)]
pub struct ModarchiveRoot {
    uri: Url,
    catalog: Arc<ModarchiveCatalog>,
}

impl ModarchiveRoot {
    pub fn new(catalog: Arc<ModarchiveCatalog>) -> Self {
        let uri = Url::parse(SCHEME_ROOT).unwrap_or_else(|_| root_uri());
        Self { uri, catalog }
    }

    fn authors(&self) -> AuthorsDir {
        AuthorsDir {
            uri: build_uri(&self.uri, &["authors"], &[]),
            catalog: Arc::clone(&self.catalog),
        }
    }

    fn genres(&self) -> GenresDir {
        GenresDir {
            uri: build_uri(&self.uri, &["genres"], &[]),
            catalog: Arc::clone(&self.catalog),
        }
    }

    fn author_dir(&self, uri: &Url) -> VfsResult<Option<TracksDir>> {
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

    fn genre_dir(&self, uri: &Url) -> VfsResult<Option<TracksDir>> {
        let Some(id) = query_id(uri, "genre") else {
            return Ok(None);
        };
        let genres = self.genres();
        Ok(self
            .catalog
            .genres()?
            .into_iter()
            .find(|g| g.id == id)
            .map(|genre| genres.genre(genre)))
    }

    fn track_in(
        &self,
        dir: Option<TracksDir>,
        track: u32,
        progress: &dyn ProgressCallback,
    ) -> VfsResult<Option<VfsObject>> {
        let Some(dir) = dir else {
            return Ok(None);
        };
        progress.on_progress(1, 2)?;
        Ok(dir
            .tracks()?
            .into_iter()
            .find(|t| t.id == track)
            .map(|t| VfsObject::File(Arc::new(dir.track(t)))))
    }
}

impl VfsNode for ModarchiveRoot {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        "modarchive.org".to_string()
    }

    fn description(&self) -> String {
        "The Mod Archive".to_string()
    }

    fn parent_uri(&self) -> Option<Url> {
        Some(root_uri())
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("modarchive".to_string())),
            ExtensionId::SearchEngine => {
                Some(Extension::SearchEngine(Arc::new(ModarchiveSearch {
                    authors: self.authors(),
                })))
            }
            _ => None,
        }
    }
}

impl VfsDir for ModarchiveRoot {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        visitor.on_items_count(2)?;
        visitor.on_dir(Arc::new(self.authors()))?;
        visitor.on_dir(Arc::new(self.genres()))
    }
}

impl VfsRoot for ModarchiveRoot {
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
            (["genres"], _) => Some(VfsObject::Dir(Arc::new(self.genres()))),
            (["authors", _], None) => {
                progress.on_progress(0, 0)?;
                self.author_dir(uri)?.map(|dir| VfsObject::Dir(Arc::new(dir)))
            }
            (["genres", _], None) => {
                progress.on_progress(0, 0)?;
                self.genre_dir(uri)?.map(|dir| VfsObject::Dir(Arc::new(dir)))
            }
            (["authors", _, _], Some(track)) => {
                progress.on_progress(0, 0)?;
                let dir = self.author_dir(uri)?;
                self.track_in(dir, track, progress)?
            }
            (["genres", _, _], Some(track)) => {
                progress.on_progress(0, 0)?;
                let dir = self.genre_dir(uri)?;
                self.track_in(dir, track, progress)?
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
    catalog: Arc<ModarchiveCatalog>,
}

impl AuthorsDir {
    fn author(&self, author: Author) -> TracksDir {
        TracksDir {
            uri: build_uri(&self.uri, &[author.alias.as_str()], &[("author", author.id)]),
            group: Group::Author(author),
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

struct GenresDir {
    uri: Url,
    catalog: Arc<ModarchiveCatalog>,
}

impl GenresDir {
    fn genre(&self, genre: Genre) -> TracksDir {
        TracksDir {
            uri: build_uri(&self.uri, &[genre.name.as_str()], &[("genre", genre.id)]),
            group: Group::Genre(genre),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl VfsNode for GenresDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        "Genres".to_string()
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_path_uri(&self.uri)
    }
}

impl VfsDir for GenresDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        let genres = self.catalog.genres()?;
        visitor.on_items_count(genres.len())?;
        for genre in genres {
            visitor.on_dir(Arc::new(self.genre(genre)))?;
        }
        Ok(())
    }
}

enum Group {
    Author(Author),
    Genre(Genre),
}

/// Flat track list of one author or one genre.
struct TracksDir {
    uri: Url,
    group: Group,
    catalog: Arc<ModarchiveCatalog>,
}

impl TracksDir {
    fn tracks(&self) -> VfsResult<Vec<Track>> {
        match &self.group {
            Group::Author(author) => self.catalog.author_tracks(author.id),
            Group::Genre(genre) => self.catalog.genre_tracks(genre.id),
        }
    }

    fn track(&self, track: Track) -> TrackFile {
        let group = match &self.group {
            Group::Author(author) => ("author", author.id),
            Group::Genre(genre) => ("genre", genre.id),
        };
        TrackFile {
            uri: build_uri(&self.uri, &[track.filename.as_str()], &[group, ("track", track.id)]),
            track,
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl VfsNode for TracksDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        match &self.group {
            Group::Author(author) => author.alias.clone(),
            Group::Genre(genre) => genre.name.clone(),
        }
    }

    fn description(&self) -> String {
        match &self.group {
            Group::Author(_) => String::new(),
            Group::Genre(genre) => format!("{} modules", genre.files),
        }
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_path_uri(&self.uri)
    }
}

impl VfsDir for TracksDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        let tracks = self.tracks()?;
        visitor.on_items_count(tracks.len())?;
        for track in tracks {
            visitor.on_file(Arc::new(self.track(track)))?;
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
    catalog: Arc<ModarchiveCatalog>,
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
        parent_keeping(&self.uri, &GROUP_PARAMS)
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::CachePath => Some(Extension::CachePath(ModarchiveCatalog::cache_key(
                self.track.id,
            ))),
            ExtensionId::DownloadUris => Some(Extension::DownloadUris(
                ModarchiveApi::track_uri(self.track.id).into_iter().collect(),
            )),
            _ => None,
        }
    }
}

impl VfsFile for TrackFile {
    fn details(&self) -> String {
        self.track.size_text()
    }

    fn content(&self) -> VfsResult<Vec<u8>> {
        self.catalog.fetch_track(self.track.id)
    }

    fn local_path(&self) -> Option<PathBuf> {
        let key = ModarchiveCatalog::cache_key(self.track.id);
        let blobs = self.catalog.blobs();
        blobs.contains(&key).then(|| blobs.path_for(&key)).flatten()
    }
}

/// Remote search, reporting matches under their artists.
struct ModarchiveSearch {
    authors: AuthorsDir,
}

impl SearchEngine for ModarchiveSearch {
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

#[cfg(test)]
mod tests {
    use super::super::tests::fixture;
    use super::*;
    use crate::vfs::{format_size, search_engine_of, ListingCollector, NoProgress};

    fn list(dir: &dyn VfsDir) -> ListingCollector {
        let mut collector = ListingCollector::new();
        dir.enumerate(&mut collector).unwrap();
        collector
    }

    fn resolve(root: &ModarchiveRoot, uri: &str) -> Option<VfsObject> {
        root.resolve(&Url::parse(uri).unwrap(), &NoProgress).unwrap()
    }

    #[test]
    fn test_root_lists_authors_and_genres() {
        let f = fixture();
        let root = ModarchiveRoot::new(f.catalog.clone());
        let uris: Vec<String> = list(&root).dirs.iter().map(|d| d.uri().to_string()).collect();
        assert_eq!(uris, vec!["modarchive:/authors", "modarchive:/genres"]);
        assert_eq!(f.http.calls(), 0);
    }

    #[test]
    fn test_genre_dir_and_track_parent() {
        let f = fixture();
        let root = ModarchiveRoot::new(f.catalog.clone());
        let genres = resolve(&root, "modarchive:/genres").unwrap().into_dir().unwrap();
        let listing = list(genres.as_ref());
        let chiptune = listing
            .dirs
            .iter()
            .find(|d| d.name() == "Chiptune")
            .unwrap();
        assert_eq!(chiptune.uri().as_str(), "modarchive:/genres/Chiptune?genre=7");
        assert_eq!(chiptune.description(), "640 modules");

        let genre = resolve(&root, "modarchive:/genres/Chiptune?genre=7")
            .unwrap()
            .into_dir()
            .unwrap();
        let files = list(genre.as_ref()).files;
        assert_eq!(files.len(), 2);
        assert_eq!(
            files[0].uri().as_str(),
            "modarchive:/genres/Chiptune/2ND_PM.S3M?genre=7&track=41213"
        );
        assert_eq!(files[0].details(), format_size(494368));
        assert_eq!(
            files[0].parent_uri().unwrap().as_str(),
            "modarchive:/genres/Chiptune?genre=7"
        );
    }

    #[test]
    fn test_resolve_author_track() {
        let f = fixture();
        let root = ModarchiveRoot::new(f.catalog.clone());
        let uri = "modarchive:/authors/Purple%20Motion/2ND_PM.S3M?author=69141&track=41213";
        let track = resolve(&root, uri).unwrap().into_file().unwrap();
        assert_eq!(track.description(), "Second Reality");
        assert!(matches!(
            track.extension(ExtensionId::CachePath),
            Some(Extension::CachePath(key)) if key == "modarchive.org/41213"
        ));
        assert_eq!(track.content().unwrap().len(), 700);
        assert!(track.local_path().is_some());

        assert!(resolve(&root, "modarchive:/authors/Skaven/2ND_PM.S3M?author=69141&track=41213").is_none());
        assert!(resolve(&root, "modarchive:/authors/Nobody?author=1").is_none());
    }

    #[test]
    fn test_search_engine_places_tracks_under_artists() {
        let f = fixture();
        let root = ModarchiveRoot::new(f.catalog.clone());
        let engine = search_engine_of(&root).unwrap();
        let mut found = Vec::new();
        engine
            .find("second", &mut |file| {
                found.push(file.uri().to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(
            found,
            vec![
                "modarchive:/authors/Purple%20Motion/2ND_PM.S3M?author=69141&track=41213",
                "modarchive:/authors/!Unknown/anon.mod?author=0&track=50000",
            ]
        );
    }
}
