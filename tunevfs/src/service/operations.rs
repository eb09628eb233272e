//! One operation per request kind.

use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::request::{Request, RequestKind};
use crate::blob::BlobCache;
use crate::operation::{check_cancelled, Operation, ProgressCell, QueryResult, Row};
use crate::vfs::{
    comparator_of, search_engine_of, CompositeRoot, DirVisitor, Extension, ExtensionId,
    ListingCollector, NoProgress, ProgressCallback, VfsDir, VfsError, VfsFile, VfsNode, VfsObject,
    VfsResult, VfsRoot,
};

/// Upper bound on the length of a parent chain.
const MAX_PARENTS_DEPTH: usize = 64;

/// Longest URI-derived cache file name; most filesystems allow 255 bytes.
const MAX_KEY_NAME_LEN: usize = 200;

/// Collaborators shared by every operation.
pub(crate) struct Context {
    pub root: Arc<CompositeRoot>,
    pub blobs: Arc<BlobCache>,
}

impl Context {
    fn resolve(&self, uri: &Url, progress: &dyn ProgressCallback) -> VfsResult<VfsObject> {
        self.root
            .resolve(uri, progress)?
            .ok_or_else(|| VfsError::not_found(uri))
    }

    fn row(&self, object: &VfsObject) -> Row {
        match object {
            VfsObject::Dir(dir) => Row::dir(dir.as_ref()),
            VfsObject::File(file) => self.file_row(file.as_ref()),
        }
    }

    fn file_row(&self, file: &dyn VfsFile) -> Row {
        let cached = match file.extension(ExtensionId::CachePath) {
            Some(Extension::CachePath(key)) => self.blobs.contains(&key),
            _ => false,
        };
        Row::file(file, cached)
    }

    /// Size and local path of the file content, downloading it if needed.
    fn materialize(&self, file: &dyn VfsFile) -> VfsResult<(u64, Option<PathBuf>)> {
        if let Some(path) = file.local_path() {
            let size = fs::metadata(&path)?.len();
            return Ok((size, Some(path)));
        }
        let key = cache_key(file);
        if let Some(path) = self.cached_path(&key) {
            return Ok((fs::metadata(&path)?.len(), Some(path)));
        }
        let data = file.content()?;
        if let Err(e) = self.blobs.put(&key, &data) {
            warn!(uri = %file.uri(), key = %key, error = %e, "Failed to cache content");
            return Ok((data.len() as u64, None));
        }
        Ok((data.len() as u64, self.cached_path(&key)))
    }

    /// Read-only stream over the content at `uri`.
    pub fn open(&self, uri: &Url) -> VfsResult<Box<dyn Read + Send>> {
        let file = self.resolve(uri, &NoProgress)?.into_file()?;
        if let Some(path) = file.local_path() {
            return Ok(Box::new(fs::File::open(path)?));
        }
        if let Some(path) = self.cached_path(&cache_key(file.as_ref())) {
            return Ok(Box::new(fs::File::open(path)?));
        }
        Ok(Box::new(Cursor::new(file.content()?)))
    }

    fn cached_path(&self, key: &str) -> Option<PathBuf> {
        self.blobs.path_for(key).filter(|path| path.is_file())
    }
}

/// Blob cache key of a file: its own, or one derived from its URI.
///
/// Derived keys are the encoded URI when it fits in one file name, its
/// SHA-256 digest otherwise.
fn cache_key(file: &dyn VfsFile) -> String {
    if let Some(Extension::CachePath(key)) = file.extension(ExtensionId::CachePath) {
        return key;
    }
    let uri = file.uri().as_str();
    let encoded = urlencoding::encode(uri);
    if encoded.len() <= MAX_KEY_NAME_LEN {
        format!("vfs/{}", encoded)
    } else {
        format!("vfs/{:x}", Sha256::digest(uri.as_bytes()))
    }
}

/// Builds the operation serving `request`.
pub(crate) fn create(request: &Request, context: Arc<Context>) -> Arc<dyn Operation> {
    let uri = request.uri.clone();
    match request.kind {
        RequestKind::Resolve => Arc::new(ResolveOperation::new(context, uri)),
        RequestKind::Listing => Arc::new(ListingOperation::new(context, uri)),
        RequestKind::Parents => Arc::new(ParentsOperation::new(context, uri)),
        RequestKind::Search => Arc::new(SearchOperation::new(
            context,
            uri,
            request.query.as_deref().unwrap_or_default(),
        )),
        RequestKind::File => Arc::new(FileOperation::new(context, uri)),
    }
}

// =============================================================================
// Listing support
// =============================================================================

/// Accumulates children, polling cancellation at each one.
struct TrackedListing<'a> {
    listing: ListingCollector,
    cancel: &'a CancellationToken,
    progress: Option<&'a ProgressCell>,
}

impl<'a> TrackedListing<'a> {
    fn new(cancel: &'a CancellationToken, progress: Option<&'a ProgressCell>) -> Self {
        Self {
            listing: ListingCollector::new(),
            cancel,
            progress,
        }
    }

    fn collect(mut self, dir: &dyn VfsDir) -> VfsResult<ListingCollector> {
        dir.enumerate(&mut self)?;
        Ok(self.listing)
    }
}

impl DirVisitor for TrackedListing<'_> {
    fn on_items_count(&mut self, count: usize) -> VfsResult<()> {
        self.listing.on_items_count(count)
    }

    fn on_dir(&mut self, dir: Arc<dyn VfsDir>) -> VfsResult<()> {
        check_cancelled(self.cancel)?;
        self.listing.on_dir(dir)
    }

    fn on_file(&mut self, file: Arc<dyn VfsFile>) -> VfsResult<()> {
        check_cancelled(self.cancel)?;
        self.listing.on_file(file)
    }

    fn on_progress(&mut self, done: u64, total: u64) -> VfsResult<()> {
        check_cancelled(self.cancel)?;
        if let Some(progress) = self.progress {
            progress.set(done, total);
        }
        Ok(())
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Single object; unknown URIs give an empty result.
pub(crate) struct ResolveOperation {
    context: Arc<Context>,
    uri: Url,
    progress: ProgressCell,
}

impl ResolveOperation {
    fn new(context: Arc<Context>, uri: Url) -> Self {
        Self {
            context,
            uri,
            progress: ProgressCell::new(),
        }
    }
}

impl Operation for ResolveOperation {
    fn call(&self, cancel: &CancellationToken) -> VfsResult<Vec<Row>> {
        check_cancelled(cancel)?;
        let progress = self.progress.forwarder(cancel);
        match self.context.resolve(&self.uri, &progress) {
            Ok(object) => Ok(vec![self.context.row(&object)]),
            Err(VfsError::NotFound(_)) => {
                debug!(uri = %self.uri, "Nothing to resolve");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn status(&self) -> QueryResult {
        self.progress.snapshot()
    }
}

/// Sorted children of a dir, dirs first.
pub(crate) struct ListingOperation {
    context: Arc<Context>,
    uri: Url,
    progress: ProgressCell,
}

impl ListingOperation {
    fn new(context: Arc<Context>, uri: Url) -> Self {
        Self {
            context,
            uri,
            progress: ProgressCell::new(),
        }
    }
}

impl Operation for ListingOperation {
    fn call(&self, cancel: &CancellationToken) -> VfsResult<Vec<Row>> {
        let forwarder = self.progress.forwarder(cancel);
        let dir = self.context.resolve(&self.uri, &forwarder)?.into_dir()?;
        let mut listing = TrackedListing::new(cancel, Some(&self.progress)).collect(dir.as_ref())?;
        listing.sort_by(comparator_of(dir.as_ref()).as_ref());

        let mut rows = Vec::with_capacity(listing.dirs.len() + listing.files.len());
        rows.extend(listing.dirs.iter().map(|dir| Row::dir(dir.as_ref())));
        for file in &listing.files {
            check_cancelled(cancel)?;
            rows.push(self.context.file_row(file.as_ref()));
        }
        debug!(uri = %self.uri, rows = rows.len(), "Listed dir");
        Ok(rows)
    }

    fn status(&self) -> QueryResult {
        self.progress.snapshot()
    }
}

/// Chain from the top-level root down to the object itself.
pub(crate) struct ParentsOperation {
    context: Arc<Context>,
    uri: Url,
    progress: ProgressCell,
}

impl ParentsOperation {
    fn new(context: Arc<Context>, uri: Url) -> Self {
        Self {
            context,
            uri,
            progress: ProgressCell::new(),
        }
    }
}

impl Operation for ParentsOperation {
    fn call(&self, cancel: &CancellationToken) -> VfsResult<Vec<Row>> {
        let forwarder = self.progress.forwarder(cancel);
        let mut object = self.context.resolve(&self.uri, &forwarder)?;
        let mut chain = vec![Row::parent(object.as_node())];
        for _ in 0..MAX_PARENTS_DEPTH {
            check_cancelled(cancel)?;
            let Some(parent_uri) = object.parent_uri() else {
                break;
            };
            match self.context.root.resolve(&parent_uri, &forwarder)? {
                Some(parent) => {
                    chain.push(Row::parent(parent.as_node()));
                    object = parent;
                }
                None => {
                    warn!(uri = %self.uri, parent = %parent_uri, "Parent does not resolve");
                    break;
                }
            }
        }
        chain.reverse();
        Ok(chain)
    }

    fn status(&self) -> QueryResult {
        self.progress.snapshot()
    }
}

/// Incremental search below a dir.
///
/// Matches accumulate in a buffer that every status poll swaps out, so a
/// polling client sees each row exactly once; the final result carries the
/// rows found since the last poll and an end marker.
pub(crate) struct SearchOperation {
    context: Arc<Context>,
    uri: Url,
    query: String,
    found: Mutex<Vec<Row>>,
    matched: AtomicU64,
}

impl SearchOperation {
    fn new(context: Arc<Context>, uri: Url, query: &str) -> Self {
        Self {
            context,
            uri,
            query: query.to_string(),
            found: Mutex::new(Vec::new()),
            matched: AtomicU64::new(0),
        }
    }

    fn report(&self, file: &dyn VfsFile) {
        let row = self.context.file_row(file);
        self.found.lock().push(row);
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    /// Recursive fallback for dirs without a native engine.
    fn walk(&self, dir: &dyn VfsDir, needle: &str, cancel: &CancellationToken) -> VfsResult<()> {
        let listing = TrackedListing::new(cancel, None).collect(dir)?;
        for file in &listing.files {
            check_cancelled(cancel)?;
            if matches_text(file.as_ref(), needle) {
                self.report(file.as_ref());
            }
        }
        for sub in &listing.dirs {
            check_cancelled(cancel)?;
            match self.walk(sub.as_ref(), needle, cancel) {
                Err(e) if !e.is_fatal() => {
                    debug!(uri = %sub.uri(), error = %e, "Search skipped dir");
                }
                other => other?,
            }
        }
        Ok(())
    }
}

impl Operation for SearchOperation {
    fn call(&self, cancel: &CancellationToken) -> VfsResult<Vec<Row>> {
        let dir = self.context.resolve(&self.uri, &NoProgress)?.into_dir()?;
        match search_engine_of(dir.as_ref()) {
            Some(engine) => {
                debug!(uri = %self.uri, query = %self.query, "Native search");
                engine.find(&self.query, &mut |file| {
                    check_cancelled(cancel)?;
                    self.report(file.as_ref());
                    Ok(())
                })?;
            }
            None => {
                debug!(uri = %self.uri, query = %self.query, "Recursive search");
                self.walk(dir.as_ref(), &self.query.to_lowercase(), cancel)?;
            }
        }
        let mut rows = std::mem::take(&mut *self.found.lock());
        rows.push(Row::EndOfResults);
        Ok(rows)
    }

    fn status(&self) -> QueryResult {
        let rows = std::mem::take(&mut *self.found.lock());
        if rows.is_empty() {
            QueryResult::Progress {
                done: self.matched.load(Ordering::Relaxed),
                total: 0,
            }
        } else {
            QueryResult::Partial(rows)
        }
    }
}

fn matches_text(file: &dyn VfsFile, needle: &str) -> bool {
    file.name().to_lowercase().contains(needle)
        || file.description().to_lowercase().contains(needle)
}

/// File content made available locally.
pub(crate) struct FileOperation {
    context: Arc<Context>,
    uri: Url,
    progress: ProgressCell,
}

impl FileOperation {
    fn new(context: Arc<Context>, uri: Url) -> Self {
        Self {
            context,
            uri,
            progress: ProgressCell::new(),
        }
    }
}

impl Operation for FileOperation {
    fn call(&self, cancel: &CancellationToken) -> VfsResult<Vec<Row>> {
        let forwarder = self.progress.forwarder(cancel);
        let file = self.context.resolve(&self.uri, &forwarder)?.into_file()?;
        check_cancelled(cancel)?;
        let (size, path) = self.context.materialize(file.as_ref())?;
        Ok(vec![Row::Content {
            uri: file.uri().to_string(),
            name: file.name(),
            size,
            path: path.map(|path| path.display().to_string()),
        }])
    }

    fn status(&self) -> QueryResult {
        self.progress.snapshot()
    }
}
