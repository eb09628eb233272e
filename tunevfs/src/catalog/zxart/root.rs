//! VFS view of the zxart catalog.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::trace;
use url::Url;

use super::{Author, Party, Track, ZxartApi, ZxartCatalog};
use crate::catalog::{build_uri, parent_keeping, path_segments, query_id};
use crate::vfs::{
    parent_path_uri, root_uri, DirVisitor, Extension, ExtensionId, PositionComparator,
    ProgressCallback, SearchEngine, VfsDir, VfsFile, VfsNode, VfsObject, VfsResult, VfsRoot,
};

const SCHEME_ROOT: &str = "zxart:/";

/// Root of the `zxart:` tree.
#[derive(Clone)]
pub struct ZxartRoot {
    uri: Url,
    catalog: Arc<ZxartCatalog>,
}

impl ZxartRoot {
    pub fn new(catalog: Arc<ZxartCatalog>) -> Self {
        let uri = Url::parse(SCHEME_ROOT).unwrap_or_else(|_| root_uri());
        Self { uri, catalog }
    }

    fn dir(&self, segment: &str, kind: DirKind) -> ZxartDir {
        ZxartDir {
            uri: build_uri(&self.uri, &[segment], &[]),
            kind,
            catalog: Arc::clone(&self.catalog),
        }
    }

    fn authors(&self) -> ZxartDir {
        self.dir("authors", DirKind::Authors)
    }

    fn parties(&self) -> ZxartDir {
        self.dir("parties", DirKind::Parties)
    }

    fn top(&self) -> ZxartDir {
        self.dir("top", DirKind::Top)
    }

    fn find_author(&self, uri: &Url) -> VfsResult<Option<Author>> {
        let Some(id) = query_id(uri, "author") else {
            return Ok(None);
        };
        Ok(self.catalog.authors()?.into_iter().find(|a| a.id == id))
    }

    fn find_party(&self, uri: &Url, year: &str) -> VfsResult<Option<Party>> {
        let Some(id) = query_id(uri, "party") else {
            return Ok(None);
        };
        Ok(self
            .catalog
            .parties()?
            .into_iter()
            .find(|p| p.id == id && p.year.to_string() == year))
    }

    fn resolve_segments(
        &self,
        uri: &Url,
        segments: &[&str],
        progress: &dyn ProgressCallback,
    ) -> VfsResult<Option<VfsObject>> {
        let track_id = query_id(uri, "track");
        let object = match segments {
            [] => Some(dir_object(self.clone())),
            ["authors"] => Some(dir_object(self.authors())),
            ["parties"] => Some(dir_object(self.parties())),
            ["top"] => Some(dir_object(self.top())),
            ["authors", _] => {
                progress.on_progress(0, 0)?;
                self.find_author(uri)?
                    .map(|author| dir_object(self.authors().author(author)))
            }
            ["authors", _, _] => {
                progress.on_progress(0, 0)?;
                match self.find_author(uri)? {
                    Some(author) => {
                        progress.on_progress(1, 2)?;
                        let tracks = self.catalog.author_tracks(author.id)?;
                        let dir = self.authors().author(author);
                        find_track(tracks, track_id).map(|(_, t)| file_object(dir.track(t, None)))
                    }
                    None => None,
                }
            }
            ["parties", year] => year
                .parse()
                .ok()
                .map(|year| dir_object(self.parties().year(year))),
            ["parties", year, _] => {
                progress.on_progress(0, 0)?;
                self.find_party(uri, year)?
                    .map(|party| dir_object(self.parties().year(party.year).party(party)))
            }
            ["parties", year, _, _] => {
                progress.on_progress(0, 0)?;
                match self.find_party(uri, year)? {
                    Some(party) => {
                        progress.on_progress(1, 2)?;
                        let tracks = self.catalog.party_tracks(party.id)?;
                        let dir = self.parties().year(party.year).party(party);
                        find_track(tracks, track_id).map(|(_, t)| file_object(dir.track(t, None)))
                    }
                    None => None,
                }
            }
            ["top", _] => {
                progress.on_progress(0, 0)?;
                let tracks = self.catalog.top_tracks()?;
                find_track(tracks, track_id)
                    .map(|(pos, t)| file_object(self.top().track(t, Some(pos))))
            }
            _ => None,
        };
        Ok(object)
    }
}

impl VfsNode for ZxartRoot {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        "zxart.ee".to_string()
    }

    fn description(&self) -> String {
        "ZX Spectrum music archive".to_string()
    }

    fn parent_uri(&self) -> Option<Url> {
        Some(root_uri())
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("zxart".to_string())),
            ExtensionId::SearchEngine => Some(Extension::SearchEngine(Arc::new(ZxartSearch {
                authors: self.authors(),
            }))),
            _ => None,
        }
    }
}

impl VfsDir for ZxartRoot {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        visitor.on_items_count(3)?;
        visitor.on_dir(Arc::new(self.authors()))?;
        visitor.on_dir(Arc::new(self.parties()))?;
        visitor.on_dir(Arc::new(self.top()))
    }
}

impl VfsRoot for ZxartRoot {
    fn resolve(&self, uri: &Url, progress: &dyn ProgressCallback) -> VfsResult<Option<VfsObject>> {
        if uri.scheme() != self.uri.scheme() {
            return Ok(None);
        }
        let segments = path_segments(uri);
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        trace!(uri = %uri, "Resolving zxart object");
        self.resolve_segments(uri, &segments, progress)
    }

    fn as_dir(self: Arc<Self>) -> Arc<dyn VfsDir> {
        self
    }
}

fn dir_object(dir: impl VfsDir + 'static) -> VfsObject {
    VfsObject::Dir(Arc::new(dir))
}

fn file_object(file: TrackFile) -> VfsObject {
    VfsObject::File(Arc::new(file))
}

/// Track with id `id` and its position in `tracks`.
fn find_track(tracks: Vec<Track>, id: Option<u32>) -> Option<(u32, Track)> {
    let id = id?;
    tracks
        .into_iter()
        .enumerate()
        .find(|(_, t)| t.id == id)
        .map(|(pos, t)| (pos as u32, t))
}

// =============================================================================
// Dirs
// =============================================================================

#[derive(Clone)]
enum DirKind {
    Authors,
    Author(Author),
    Parties,
    Year(u32),
    Party(Party),
    Top,
}

/// Any dir below the zxart root.
#[derive(Clone)]
pub struct ZxartDir {
    uri: Url,
    kind: DirKind,
    catalog: Arc<ZxartCatalog>,
}

impl ZxartDir {
    fn child(&self, name: &str, params: &[(&str, u32)], kind: DirKind) -> ZxartDir {
        ZxartDir {
            uri: build_uri(&self.uri, &[name], params),
            kind,
            catalog: Arc::clone(&self.catalog),
        }
    }

    fn author(&self, author: Author) -> ZxartDir {
        let nickname = author.nickname.clone();
        self.child(&nickname, &[("author", author.id)], DirKind::Author(author))
    }

    fn year(&self, year: u32) -> ZxartDir {
        self.child(&year.to_string(), &[], DirKind::Year(year))
    }

    fn party(&self, party: Party) -> ZxartDir {
        let name = party.name.clone();
        self.child(&name, &[("party", party.id)], DirKind::Party(party))
    }

    fn track(&self, track: Track, position: Option<u32>) -> TrackFile {
        let owner = match &self.kind {
            DirKind::Author(author) => Some(("author", author.id)),
            DirKind::Party(party) => Some(("party", party.id)),
            _ => None,
        };
        let mut params: Vec<(&str, u32)> = owner.into_iter().collect();
        params.push(("track", track.id));
        TrackFile {
            uri: build_uri(&self.uri, &[track.display_name().as_str()], &params),
            track,
            position,
            catalog: Arc::clone(&self.catalog),
        }
    }

    fn emit_tracks(
        &self,
        tracks: Vec<Track>,
        ranked: bool,
        visitor: &mut dyn DirVisitor,
    ) -> VfsResult<()> {
        visitor.on_items_count(tracks.len())?;
        for (pos, track) in tracks.into_iter().enumerate() {
            let position = ranked.then_some(pos as u32);
            visitor.on_file(Arc::new(self.track(track, position)))?;
        }
        Ok(())
    }
}

impl VfsNode for ZxartDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        match &self.kind {
            DirKind::Authors => "Authors".to_string(),
            DirKind::Author(author) => author.nickname.clone(),
            DirKind::Parties => "Parties".to_string(),
            DirKind::Year(year) => year.to_string(),
            DirKind::Party(party) => party.name.clone(),
            DirKind::Top => "Top".to_string(),
        }
    }

    fn description(&self) -> String {
        match &self.kind {
            DirKind::Author(author) => author.name.clone(),
            DirKind::Top => "Best voted tracks".to_string(),
            _ => String::new(),
        }
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_path_uri(&self.uri)
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match (id, &self.kind) {
            (ExtensionId::Icon, DirKind::Authors | DirKind::Author(_)) => {
                Some(Extension::Icon("author".to_string()))
            }
            (ExtensionId::Icon, DirKind::Parties | DirKind::Year(_) | DirKind::Party(_)) => {
                Some(Extension::Icon("party".to_string()))
            }
            (ExtensionId::Icon, DirKind::Top) => Some(Extension::Icon("top".to_string())),
            (ExtensionId::Feed, DirKind::Top) => Some(Extension::Feed),
            (ExtensionId::Comparator, DirKind::Top) => {
                Some(Extension::Comparator(Arc::new(PositionComparator)))
            }
            (ExtensionId::SearchEngine, DirKind::Authors) => {
                Some(Extension::SearchEngine(Arc::new(ZxartSearch {
                    authors: self.clone(),
                })))
            }
            _ => None,
        }
    }
}

impl VfsDir for ZxartDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        match &self.kind {
            DirKind::Authors => {
                let authors = self.catalog.authors()?;
                visitor.on_items_count(authors.len())?;
                for author in authors {
                    visitor.on_dir(Arc::new(self.author(author)))?;
                }
                Ok(())
            }
            DirKind::Author(author) => {
                let tracks = self.catalog.author_tracks(author.id)?;
                self.emit_tracks(tracks, false, visitor)
            }
            DirKind::Parties => {
                let years: BTreeSet<u32> =
                    self.catalog.parties()?.iter().map(|p| p.year).collect();
                visitor.on_items_count(years.len())?;
                for year in years {
                    visitor.on_dir(Arc::new(self.year(year)))?;
                }
                Ok(())
            }
            DirKind::Year(year) => {
                let parties: Vec<Party> = self
                    .catalog
                    .parties()?
                    .into_iter()
                    .filter(|p| p.year == *year)
                    .collect();
                visitor.on_items_count(parties.len())?;
                for party in parties {
                    visitor.on_dir(Arc::new(self.party(party)))?;
                }
                Ok(())
            }
            DirKind::Party(party) => {
                let tracks = self.catalog.party_tracks(party.id)?;
                self.emit_tracks(tracks, false, visitor)
            }
            DirKind::Top => {
                let tracks = self.catalog.top_tracks()?;
                self.emit_tracks(tracks, true, visitor)
            }
        }
    }
}

// =============================================================================
// Files
// =============================================================================

/// Remote track, downloaded through the blob cache.
pub struct TrackFile {
    uri: Url,
    track: Track,
    position: Option<u32>,
    catalog: Arc<ZxartCatalog>,
}

impl TrackFile {
    fn cache_key(&self) -> String {
        ZxartCatalog::cache_key(self.track.id)
    }
}

impl VfsNode for TrackFile {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        self.track.display_name()
    }

    fn description(&self) -> String {
        self.track.title.clone()
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_keeping(&self.uri, &["author", "party"])
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::CachePath => Some(Extension::CachePath(self.cache_key())),
            ExtensionId::DownloadUris => Some(Extension::DownloadUris(
                ZxartApi::track_uri(self.track.id).into_iter().collect(),
            )),
            ExtensionId::SortPosition => self.position.map(Extension::SortPosition),
            _ => None,
        }
    }
}

impl VfsFile for TrackFile {
    fn details(&self) -> String {
        self.track.duration.clone()
    }

    fn content(&self) -> VfsResult<Vec<u8>> {
        self.catalog.fetch_track(self.track.id)
    }

    fn local_path(&self) -> Option<PathBuf> {
        let key = self.cache_key();
        let blobs = self.catalog.blobs();
        if blobs.contains(&key) {
            blobs.path_for(&key)
        } else {
            None
        }
    }
}

// =============================================================================
// Search
// =============================================================================

/// Native zxart search, reporting matches under their authors.
struct ZxartSearch {
    authors: ZxartDir,
}

impl SearchEngine for ZxartSearch {
    fn find(
        &self,
        query: &str,
        visitor: &mut dyn FnMut(Arc<dyn VfsFile>) -> VfsResult<()>,
    ) -> VfsResult<()> {
        for (author, track) in self.authors.catalog.search(query)? {
            visitor(Arc::new(self.authors.author(author).track(track, None)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::fixture;
    use super::*;
    use crate::vfs::{search_engine_of, ListingCollector, NoProgress};

    fn list(dir: &dyn VfsDir) -> ListingCollector {
        let mut collector = ListingCollector::new();
        dir.enumerate(&mut collector).unwrap();
        collector
    }

    fn resolve(root: &ZxartRoot, uri: &str) -> Option<VfsObject> {
        root.resolve(&Url::parse(uri).unwrap(), &NoProgress).unwrap()
    }

    #[test]
    fn test_root_children() {
        let f = fixture();
        let root = ZxartRoot::new(f.catalog.clone());
        let names: Vec<String> = list(&root).dirs.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Authors", "Parties", "Top"]);
        assert_eq!(root.parent_uri(), Some(root_uri()));
    }

    #[test]
    fn test_authors_listing() {
        let f = fixture();
        let root = ZxartRoot::new(f.catalog.clone());
        let authors = resolve(&root, "zxart:/authors").unwrap().into_dir().unwrap();
        let listing = list(authors.as_ref());
        let uris: Vec<String> = listing.dirs.iter().map(|d| d.uri().to_string()).collect();
        assert_eq!(
            uris,
            vec!["zxart:/authors/Nik-O?author=1", "zxart:/authors/Mmcm?author=2"]
        );
    }

    #[test]
    fn test_track_resolve_and_parent() {
        let f = fixture();
        let root = ZxartRoot::new(f.catalog.clone());
        let track = resolve(&root, "zxart:/authors/Nik-O/bass.pt3?author=1&track=100")
            .unwrap()
            .into_file()
            .unwrap();
        assert_eq!(track.name(), "bass.pt3");
        assert_eq!(track.description(), "Bass Sorrow");
        assert_eq!(track.details(), "3:05");
        assert!(track.local_path().is_none());
        assert_eq!(track.content().unwrap().len(), 1024);
        assert!(track.local_path().is_some());

        let parent_uri = track.parent_uri().unwrap();
        assert_eq!(parent_uri.as_str(), "zxart:/authors/Nik-O?author=1");
        let parent = root.resolve(&parent_uri, &NoProgress).unwrap().unwrap();
        let listing = list(parent.into_dir().unwrap().as_ref());
        assert!(listing.files.iter().any(|f| f.uri() == track.uri()));
    }

    #[test]
    fn test_parties_grouped_by_year() {
        let f = fixture();
        let root = ZxartRoot::new(f.catalog.clone());
        let parties = resolve(&root, "zxart:/parties").unwrap().into_dir().unwrap();
        let years: Vec<String> = list(parties.as_ref()).dirs.iter().map(|d| d.name()).collect();
        assert_eq!(years, vec!["1999", "2001"]);

        let party = resolve(&root, "zxart:/parties/1999/CC%201999?party=7")
            .unwrap()
            .into_dir()
            .unwrap();
        let tracks = list(party.as_ref());
        assert_eq!(
            tracks.files[0].uri().as_str(),
            "zxart:/parties/1999/CC%201999/compo.pt3?party=7&track=200"
        );
        assert_eq!(
            tracks.files[0].parent_uri().unwrap().as_str(),
            "zxart:/parties/1999/CC%201999?party=7"
        );
    }

    #[test]
    fn test_top_is_ranked_feed() {
        let f = fixture();
        let root = ZxartRoot::new(f.catalog.clone());
        let top = resolve(&root, "zxart:/top").unwrap().into_dir().unwrap();
        assert!(matches!(top.extension(ExtensionId::Feed), Some(Extension::Feed)));
        let listing = list(top.as_ref());
        assert!(matches!(
            listing.files[1].extension(ExtensionId::SortPosition),
            Some(Extension::SortPosition(1))
        ));
        let second = resolve(&root, listing.files[1].uri().as_str()).unwrap();
        assert_eq!(second.uri(), listing.files[1].uri());
    }

    #[test]
    fn test_unknown_paths() {
        let f = fixture();
        let root = ZxartRoot::new(f.catalog.clone());
        assert!(resolve(&root, "zxart:/nothing").is_none());
        assert!(resolve(&root, "zxart:/authors/Nobody?author=99").is_none());
        assert!(resolve(&root, "zxart:/authors/Nik-O").is_none());
        assert!(resolve(&root, "file:///tmp").is_none());
    }

    #[test]
    fn test_native_search() {
        let f = fixture();
        let root = ZxartRoot::new(f.catalog.clone());
        let engine = search_engine_of(&root).unwrap();
        let mut found = Vec::new();
        engine
            .find("bass", &mut |file| {
                found.push(file.uri().to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.contains(&"zxart:/authors/Mmcm/drive.stc?author=2&track=101".to_string()));
    }
}
