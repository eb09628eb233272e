//! Object model shared by every VFS backend.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use super::error::{VfsError, VfsResult};

// =============================================================================
// Extensions
// =============================================================================

/// Identifies an optional capability of a VFS object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionId {
    /// Display icon name (dirs).
    Icon,
    /// Ordering for the children of a dir.
    Comparator,
    /// Native search for a dir subtree.
    SearchEngine,
    /// Dir whose content changes over time (e.g. top charts).
    Feed,
    /// Blob cache key for remote file content.
    CachePath,
    /// Ordered download locations for remote file content.
    DownloadUris,
    /// Number of playable tracks inside an object.
    TrackCount,
    /// Position of an object in its source order.
    SortPosition,
}

/// Value of an optional capability.
#[derive(Clone)]
pub enum Extension {
    Icon(String),
    Comparator(Arc<dyn NodeComparator>),
    SearchEngine(Arc<dyn SearchEngine>),
    Feed,
    CachePath(String),
    DownloadUris(Vec<Url>),
    TrackCount(u32),
    SortPosition(u32),
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extension::Icon(icon) => write!(f, "Icon({})", icon),
            Extension::Comparator(_) => write!(f, "Comparator"),
            Extension::SearchEngine(_) => write!(f, "SearchEngine"),
            Extension::Feed => write!(f, "Feed"),
            Extension::CachePath(path) => write!(f, "CachePath({})", path),
            Extension::DownloadUris(uris) => write!(f, "DownloadUris({})", uris.len()),
            Extension::TrackCount(count) => write!(f, "TrackCount({})", count),
            Extension::SortPosition(pos) => write!(f, "SortPosition({})", pos),
        }
    }
}

/// Orders sibling objects within a dir listing.
pub trait NodeComparator: Send + Sync {
    fn compare(&self, a: &dyn VfsNode, b: &dyn VfsNode) -> Ordering;
}

/// Case-insensitive name ordering, the default for every dir.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameComparator;

impl NodeComparator for NameComparator {
    fn compare(&self, a: &dyn VfsNode, b: &dyn VfsNode) -> Ordering {
        let left = a.name().to_lowercase();
        let right = b.name().to_lowercase();
        left.cmp(&right).then_with(|| a.name().cmp(&b.name()))
    }
}

/// Orders objects by their [`Extension::SortPosition`], falling back to name.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionComparator;

impl NodeComparator for PositionComparator {
    fn compare(&self, a: &dyn VfsNode, b: &dyn VfsNode) -> Ordering {
        let position = |node: &dyn VfsNode| match node.extension(ExtensionId::SortPosition) {
            Some(Extension::SortPosition(pos)) => pos,
            _ => u32::MAX,
        };
        position(a)
            .cmp(&position(b))
            .then_with(|| NameComparator.compare(a, b))
    }
}

/// Native search over a dir subtree.
pub trait SearchEngine: Send + Sync {
    /// Reports every file whose metadata matches `query`.
    fn find(&self, query: &str, visitor: &mut dyn FnMut(Arc<dyn VfsFile>) -> VfsResult<()>)
        -> VfsResult<()>;
}

// =============================================================================
// Nodes
// =============================================================================

/// Common surface of every VFS object.
pub trait VfsNode: Send + Sync {
    /// Stable identity, also used as cache and comparison key.
    fn uri(&self) -> &Url;

    /// Display name.
    fn name(&self) -> String;

    /// Secondary display text.
    fn description(&self) -> String {
        String::new()
    }

    /// URI of the containing object, derived from this object's own URI.
    ///
    /// `None` only for the top-level root. The parent is never stored; it is
    /// re-resolved through the composite root when needed.
    fn parent_uri(&self) -> Option<Url>;

    /// Optional capability lookup.
    fn extension(&self, _id: ExtensionId) -> Option<Extension> {
        None
    }
}

/// Container object.
pub trait VfsDir: VfsNode {
    /// Pushes every child into `visitor`.
    ///
    /// An error returned by the visitor stops the enumeration and is
    /// propagated unchanged, which is how cancellation short-circuits a walk.
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()>;
}

/// Leaf object with content.
pub trait VfsFile: VfsNode {
    /// Human readable size or duration.
    fn details(&self) -> String {
        String::new()
    }

    /// Reads the whole content.
    fn content(&self) -> VfsResult<Vec<u8>>;

    /// Path of the content on the local filesystem, if it lives there.
    fn local_path(&self) -> Option<PathBuf> {
        None
    }
}

/// Reports resolution progress; an error aborts the resolution.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, done: u64, total: u64) -> VfsResult<()>;
}

/// Callback that ignores progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _done: u64, _total: u64) -> VfsResult<()> {
        Ok(())
    }
}

/// A dir that can turn URIs of its subtree into objects.
pub trait VfsRoot: VfsDir {
    /// Resolves `uri` to an object, `Ok(None)` if nothing matches.
    fn resolve(&self, uri: &Url, progress: &dyn ProgressCallback) -> VfsResult<Option<VfsObject>>;

    /// Upcast for enumeration as a plain dir.
    fn as_dir(self: Arc<Self>) -> Arc<dyn VfsDir>;
}

/// Push-style receiver of dir children.
pub trait DirVisitor {
    /// Hint of how many children will follow.
    fn on_items_count(&mut self, _count: usize) -> VfsResult<()> {
        Ok(())
    }

    fn on_dir(&mut self, dir: Arc<dyn VfsDir>) -> VfsResult<()>;

    fn on_file(&mut self, file: Arc<dyn VfsFile>) -> VfsResult<()>;

    /// Progress of a slow enumeration; `total == 0` means indeterminate.
    fn on_progress(&mut self, _done: u64, _total: u64) -> VfsResult<()> {
        Ok(())
    }
}

/// Resolved VFS object.
#[derive(Clone)]
pub enum VfsObject {
    Dir(Arc<dyn VfsDir>),
    File(Arc<dyn VfsFile>),
}

impl VfsObject {
    pub fn uri(&self) -> &Url {
        match self {
            VfsObject::Dir(dir) => dir.uri(),
            VfsObject::File(file) => file.uri(),
        }
    }

    pub fn name(&self) -> String {
        self.as_node().name()
    }

    pub fn parent_uri(&self) -> Option<Url> {
        self.as_node().parent_uri()
    }

    pub fn as_node(&self) -> &dyn VfsNode {
        match self {
            VfsObject::Dir(dir) => dir.as_ref(),
            VfsObject::File(file) => file.as_ref(),
        }
    }

    pub fn as_dir(&self) -> Option<&Arc<dyn VfsDir>> {
        match self {
            VfsObject::Dir(dir) => Some(dir),
            VfsObject::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<dyn VfsFile>> {
        match self {
            VfsObject::File(file) => Some(file),
            VfsObject::Dir(_) => None,
        }
    }

    /// Converts to a dir or fails with [`VfsError::WrongKind`].
    pub fn into_dir(self) -> VfsResult<Arc<dyn VfsDir>> {
        match self {
            VfsObject::Dir(dir) => Ok(dir),
            VfsObject::File(file) => Err(VfsError::WrongKind {
                uri: file.uri().to_string(),
                expected: "directory",
            }),
        }
    }

    /// Converts to a file or fails with [`VfsError::WrongKind`].
    pub fn into_file(self) -> VfsResult<Arc<dyn VfsFile>> {
        match self {
            VfsObject::File(file) => Ok(file),
            VfsObject::Dir(dir) => Err(VfsError::WrongKind {
                uri: dir.uri().to_string(),
                expected: "file",
            }),
        }
    }
}

impl fmt::Debug for VfsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsObject::Dir(dir) => write!(f, "Dir({})", dir.uri()),
            VfsObject::File(file) => write!(f, "File({})", file.uri()),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Visitor that accumulates children split into dirs and files.
#[derive(Default)]
pub struct ListingCollector {
    pub dirs: Vec<Arc<dyn VfsDir>>,
    pub files: Vec<Arc<dyn VfsFile>>,
}

impl ListingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts both partitions with `comparator`.
    pub fn sort_by(&mut self, comparator: &dyn NodeComparator) {
        self.dirs
            .sort_by(|a, b| comparator.compare(a.as_ref(), b.as_ref()));
        self.files
            .sort_by(|a, b| comparator.compare(a.as_ref(), b.as_ref()));
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}

impl DirVisitor for ListingCollector {
    fn on_items_count(&mut self, count: usize) -> VfsResult<()> {
        self.files.reserve(count);
        Ok(())
    }

    fn on_dir(&mut self, dir: Arc<dyn VfsDir>) -> VfsResult<()> {
        self.dirs.push(dir);
        Ok(())
    }

    fn on_file(&mut self, file: Arc<dyn VfsFile>) -> VfsResult<()> {
        self.files.push(file);
        Ok(())
    }
}

/// Comparator for the children of `dir`, the name order if it has none.
pub fn comparator_of(dir: &dyn VfsDir) -> Arc<dyn NodeComparator> {
    match dir.extension(ExtensionId::Comparator) {
        Some(Extension::Comparator(comparator)) => comparator,
        _ => Arc::new(NameComparator),
    }
}

/// Searches `dir` by its native engine, if it has one.
pub fn search_engine_of(dir: &dyn VfsDir) -> Option<Arc<dyn SearchEngine>> {
    match dir.extension(ExtensionId::SearchEngine) {
        Some(Extension::SearchEngine(engine)) => Some(engine),
        _ => None,
    }
}

/// URI one path level above `uri`, without query or fragment.
///
/// Returns `None` when `uri` is already at the top of its hierarchy.
pub fn parent_path_uri(uri: &Url) -> Option<Url> {
    let mut parent = uri.clone();
    parent.set_query(None);
    parent.set_fragment(None);
    let trimmed = parent.path().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        return None;
    }
    let cut = trimmed.rfind('/')?;
    parent.set_path(&format!("{}/", &trimmed[..cut]));
    // Dirs are addressed without a trailing slash except for the top level
    if parent.path().len() > 1 {
        let path = parent.path().trim_end_matches('/').to_string();
        parent.set_path(&path);
    }
    Some(parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        uri: Url,
        name: &'static str,
        position: Option<u32>,
    }

    impl Named {
        fn new(name: &'static str) -> Self {
            Self {
                uri: Url::parse(&format!("test:/{}", name)).unwrap(),
                name,
                position: None,
            }
        }
    }

    impl VfsNode for Named {
        fn uri(&self) -> &Url {
            &self.uri
        }
        fn name(&self) -> String {
            self.name.to_string()
        }
        fn parent_uri(&self) -> Option<Url> {
            None
        }
        fn extension(&self, id: ExtensionId) -> Option<Extension> {
            match (id, self.position) {
                (ExtensionId::SortPosition, Some(pos)) => Some(Extension::SortPosition(pos)),
                _ => None,
            }
        }
    }

    #[test]
    fn test_name_comparator_case_insensitive() {
        let a = Named::new("alpha");
        let b = Named::new("Beta");
        assert_eq!(NameComparator.compare(&a, &b), Ordering::Less);
        assert_eq!(NameComparator.compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_position_comparator() {
        let mut first = Named::new("zzz");
        first.position = Some(1);
        let mut second = Named::new("aaa");
        second.position = Some(2);
        assert_eq!(PositionComparator.compare(&first, &second), Ordering::Less);
    }

    #[test]
    fn test_parent_path_uri() {
        let uri = Url::parse("file:///music/chip/a.pt3").unwrap();
        let parent = parent_path_uri(&uri).unwrap();
        assert_eq!(parent.as_str(), "file:///music/chip");

        let top = parent_path_uri(&Url::parse("file:///music").unwrap()).unwrap();
        assert_eq!(top.as_str(), "file:///");

        assert!(parent_path_uri(&Url::parse("file:///").unwrap()).is_none());
    }

    #[test]
    fn test_parent_path_uri_drops_query() {
        let uri = Url::parse("zxart:/authors/Nik-O?author=12").unwrap();
        let parent = parent_path_uri(&uri).unwrap();
        assert_eq!(parent.as_str(), "zxart:/authors");
    }
}
