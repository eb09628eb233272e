//! Recursive discovery of playable modules.
//!
//! The [`Scanner`] turns a list of starting identifiers into a stream of
//! `(Identifier, Module)` pairs, expanding everything that can contain
//! modules along the way.
//!
//! # Walk order
//!
//! ```text
//! identifier
//!   ├── has subpath ──► archive handle cache (keyed by data URI) ──► member
//!   └── resolve via VFS
//!         ├── Dir  ──► sorted subdirs (recursively), then sorted files
//!         └── File
//!               ├── *.ayl / *.xspf ──► each entry, resolved against the playlist
//!               ├── zip / gzip     ──► members, dirs before files
//!               └── other          ──► decoder detection: 0..n modules
//! ```
//!
//! Failures on one item go to [`ScanCallback::on_error`] and the walk moves
//! on to the next sibling. Fatal errors and cancellation abort the scan;
//! a module handed over when the abort happens is dropped, which releases it.

mod playlist;
mod stream;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

pub use playlist::{parse as parse_playlist, PlaylistKind};
pub use stream::{ScanEvent, ScanHandle, ScanSummary, DEFAULT_QUEUE_SIZE};

use crate::decoder::{Module, ModuleDecoder};
use crate::identifier::Identifier;
use crate::operation::check_cancelled;
use crate::vfs::{
    comparator_of, ArchiveCache, ArchiveHandle, ContainerKind, ListingCollector, MemberRef,
    NoProgress, VfsDir, VfsError, VfsFile, VfsObject, VfsResult, VfsRoot,
};

/// Nesting limit for playlists referencing playlists.
const MAX_PLAYLIST_DEPTH: usize = 8;

/// Receiver of scan results.
pub trait ScanCallback {
    /// A module was found. Returning an error stops the scan.
    fn on_module(&mut self, id: Identifier, module: Box<dyn Module>) -> VfsResult<()>;

    /// An item could not be scanned; the walk continues.
    fn on_error(&mut self, id: &Identifier, error: &VfsError);
}

/// Depth-first module discovery over the VFS.
#[derive(Clone)]
pub struct Scanner {
    root: Arc<dyn VfsRoot>,
    archives: Arc<ArchiveCache>,
    decoder: Arc<dyn ModuleDecoder>,
    cancel: CancellationToken,
}

impl Scanner {
    /// `archives` should be the cache shared with the local root so that
    /// browsing and scanning open each archive once.
    pub fn new(
        root: Arc<dyn VfsRoot>,
        archives: Arc<ArchiveCache>,
        decoder: Arc<dyn ModuleDecoder>,
    ) -> Self {
        Self {
            root,
            archives,
            decoder,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Scans every identifier in order.
    ///
    /// Returns `Err` only for fatal errors, cancellation and errors returned
    /// by the callback itself.
    pub fn scan(&self, ids: &[Identifier], callback: &mut dyn ScanCallback) -> VfsResult<()> {
        let mut walk = Walk {
            scanner: self,
            callback,
            playlist_depth: 0,
        };
        for id in ids {
            walk.guarded(id, |walk| walk.identifier(id))?;
        }
        debug!(roots = ids.len(), "Scan complete");
        Ok(())
    }

    fn resolve(&self, uri: &Url) -> VfsResult<VfsObject> {
        self.root
            .resolve(uri, &NoProgress)?
            .ok_or_else(|| VfsError::not_found(uri))
    }

    /// Raw bytes behind a data URI.
    fn load(&self, uri: &Url) -> VfsResult<Vec<u8>> {
        if uri.scheme() == "file" {
            if let Ok(path) = uri.to_file_path() {
                return Ok(std::fs::read(path)?);
            }
        }
        self.resolve(uri)?.into_file()?.content()
    }
}

struct Walk<'a> {
    scanner: &'a Scanner,
    callback: &'a mut dyn ScanCallback,
    playlist_depth: usize,
}

impl Walk<'_> {
    /// Runs one item, reporting non-fatal failures and continuing.
    fn guarded<F>(&mut self, id: &Identifier, step: F) -> VfsResult<()>
    where
        F: FnOnce(&mut Self) -> VfsResult<()>,
    {
        match step(self) {
            Err(e) if !e.is_fatal() => {
                debug!(uri = %id, error = %e, "Skipped item");
                self.callback.on_error(id, &e);
                Ok(())
            }
            other => other,
        }
    }

    fn identifier(&mut self, id: &Identifier) -> VfsResult<()> {
        check_cancelled(&self.scanner.cancel)?;
        if id.has_subpath() {
            return self.member(id);
        }
        let object = self.scanner.resolve(id.full())?;
        self.object(object)
    }

    fn member(&mut self, id: &Identifier) -> VfsResult<()> {
        let scanner = self.scanner;
        let cached = scanner.archives.get(id.data()).is_some();
        let mut member = scanner
            .archives
            .resolve_member(id, || scanner.load(id.data()));
        if cached && member.as_ref().is_err_and(|e| !e.is_fatal()) {
            debug!(uri = %id, "Cached archive handle missed, reopening");
            member = scanner
                .archives
                .reopen(id.data(), || scanner.load(id.data()))
                .and_then(|_| {
                    scanner
                        .archives
                        .resolve_member(id, || scanner.load(id.data()))
                });
        }
        match member {
            Ok(member) => self.member_data(member),
            Err(e) if e.is_fatal() => Err(e),
            // Not a member: a directory inside the archive, or an object
            // whose own root understands the subpath
            Err(e) => match scanner.root.resolve(id.full(), &NoProgress)? {
                Some(object) => self.object(object),
                None => Err(e),
            },
        }
    }

    fn member_data(&mut self, member: MemberRef) -> VfsResult<()> {
        if member.remainder.is_empty() {
            return self.data(&member.member, &member.data);
        }
        let module = self
            .scanner
            .decoder
            .open_module(&member.data, &member.remainder)?;
        let id = member.member.join_subpath(&member.remainder);
        self.callback.on_module(id, module)
    }

    fn object(&mut self, object: VfsObject) -> VfsResult<()> {
        match object {
            VfsObject::Dir(dir) => self.dir(dir.as_ref()),
            VfsObject::File(file) => self.file(file.as_ref()),
        }
    }

    fn dir(&mut self, dir: &dyn VfsDir) -> VfsResult<()> {
        let mut listing = ListingCollector::new();
        dir.enumerate(&mut listing)?;
        listing.sort_by(comparator_of(dir).as_ref());
        trace!(
            uri = %dir.uri(),
            dirs = listing.dirs.len(),
            files = listing.files.len(),
            "Scanning dir"
        );

        for sub in &listing.dirs {
            check_cancelled(&self.scanner.cancel)?;
            let id = Identifier::from_url(sub.uri().clone());
            self.guarded(&id, |walk| walk.dir(sub.as_ref()))?;
        }
        for file in &listing.files {
            check_cancelled(&self.scanner.cancel)?;
            let id = Identifier::from_url(file.uri().clone());
            self.guarded(&id, |walk| walk.file(file.as_ref()))?;
        }
        Ok(())
    }

    fn file(&mut self, file: &dyn VfsFile) -> VfsResult<()> {
        let id = Identifier::from_url(file.uri().clone());
        if let Some(kind) = PlaylistKind::detect(&file.name()) {
            return self.playlist(kind, &id, file);
        }
        let data = file.content()?;
        self.data(&id, &data)
    }

    fn playlist(&mut self, kind: PlaylistKind, id: &Identifier, file: &dyn VfsFile) -> VfsResult<()> {
        if self.playlist_depth >= MAX_PLAYLIST_DEPTH {
            warn!(uri = %id, "Playlist nesting too deep, skipped");
            return Ok(());
        }
        let entries = playlist::parse(kind, file.uri(), &file.content()?)?;

        self.playlist_depth += 1;
        let mut result = Ok(());
        for uri in entries {
            let entry = Identifier::from_url(uri);
            result = self.guarded(&entry, |walk| walk.identifier(&entry));
            if result.is_err() {
                break;
            }
        }
        self.playlist_depth -= 1;
        result
    }

    /// Modules inside raw file content.
    fn data(&mut self, id: &Identifier, data: &[u8]) -> VfsResult<()> {
        let scanner = self.scanner;
        if ContainerKind::detect(data).is_archive() {
            let handle = scanner
                .archives
                .get_or_open(id.full(), || Ok(data.to_vec()))?;
            return self.container(id, &handle, "");
        }
        let callback = &mut *self.callback;
        scanner.decoder.detect(data, &mut |subpath, module| {
            callback.on_module(id.join_subpath(subpath), module)
        })
    }

    fn container(&mut self, id: &Identifier, handle: &ArchiveHandle, prefix: &str) -> VfsResult<()> {
        let (dirs, mut files) = handle.children(prefix);
        let mut dirs: Vec<String> = dirs.into_iter().collect();
        dirs.sort_by_cached_key(|path| path.to_lowercase());
        files.sort_by_cached_key(|path| path.to_lowercase());

        for dir in &dirs {
            check_cancelled(&self.scanner.cancel)?;
            let dir_id = id.join_subpath(dir);
            self.guarded(&dir_id, |walk| walk.container(id, handle, dir))?;
        }
        for path in &files {
            check_cancelled(&self.scanner.cancel)?;
            let member_id = id.join_subpath(path);
            self.guarded(&member_id, |walk| {
                let data = handle.member(path).ok_or_else(|| {
                    VfsError::Archive(format!("no member '{}' in {}", path, handle.uri()))
                })?;
                walk.data(&member_id, &data)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::fixtures::{psid, pt3};
    use crate::decoder::{ProbeDecoder, PROPERTY_TITLE};
    use crate::vfs::archive::tests::make_zip;
    use crate::vfs::{CompositeRoot, LocalRoot};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Records every module title and error.
    #[derive(Default)]
    pub(crate) struct Collected {
        pub modules: Vec<(Identifier, String)>,
        pub errors: Vec<(Identifier, String)>,
    }

    impl Collected {
        pub(crate) fn titles(&self) -> Vec<&str> {
            self.modules.iter().map(|(_, title)| title.as_str()).collect()
        }
    }

    impl ScanCallback for Collected {
        fn on_module(&mut self, id: Identifier, module: Box<dyn Module>) -> VfsResult<()> {
            self.modules.push((id, module.property(PROPERTY_TITLE, "")));
            Ok(())
        }

        fn on_error(&mut self, id: &Identifier, error: &VfsError) {
            self.errors.push((id.clone(), error.to_string()));
        }
    }

    pub(crate) fn scanner() -> (Scanner, Arc<ArchiveCache>) {
        let archives = Arc::new(ArchiveCache::default());
        let root = CompositeRoot::new().with_root(Arc::new(LocalRoot::new(Arc::clone(&archives))));
        let scanner = Scanner::new(Arc::new(root), Arc::clone(&archives), Arc::new(ProbeDecoder));
        (scanner, archives)
    }

    pub(crate) fn id_of(path: &Path) -> Identifier {
        Identifier::from_url(Url::from_file_path(path).unwrap())
    }

    fn scan(scanner: &Scanner, ids: &[Identifier]) -> Collected {
        let mut collected = Collected::default();
        scanner.scan(ids, &mut collected).unwrap();
        collected
    }

    #[test]
    fn test_subdirs_before_sibling_files() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("A");
        fs::create_dir_all(a.join("C")).unwrap();
        fs::write(a.join("b.pt3"), pt3("B")).unwrap();
        fs::write(a.join("C").join("d.pt3"), pt3("D")).unwrap();
        fs::write(a.join("readme.txt"), b"not a module").unwrap();

        let (scanner, _) = scanner();
        let collected = scan(&scanner, &[id_of(&a)]);
        assert_eq!(collected.titles(), vec!["D", "B"]);
        assert!(collected.errors.is_empty());
    }

    #[test]
    fn test_members_of_one_archive_share_handle() {
        let temp = TempDir::new().unwrap();
        let zip = temp.path().join("pack.zip");
        let x = pt3("X");
        let y = pt3("Y");
        fs::write(&zip, make_zip(&[("x.pt3", &x), ("y.pt3", &y)])).unwrap();

        let (scanner, archives) = scanner();
        let ids = [
            id_of(&zip).with_subpath("x.pt3"),
            id_of(&zip).with_subpath("y.pt3"),
        ];
        let collected = scan(&scanner, &ids);
        assert_eq!(collected.titles(), vec!["X", "Y"]);
        assert_eq!(collected.modules[1].0.subpath(), "y.pt3");
        assert_eq!(archives.opens(), 1);
    }

    #[test]
    fn test_archive_file_expanded_in_dir_walk() {
        let temp = TempDir::new().unwrap();
        let x = pt3("X");
        let nested = pt3("N");
        fs::write(
            temp.path().join("pack.zip"),
            make_zip(&[("sub/n.pt3", &nested), ("x.pt3", &x)]),
        )
        .unwrap();
        fs::write(temp.path().join("z.pt3"), pt3("Z")).unwrap();

        let (scanner, _) = scanner();
        let collected = scan(&scanner, &[id_of(temp.path())]);
        assert_eq!(collected.titles(), vec!["N", "X", "Z"]);
        assert_eq!(collected.modules[0].0.subpath(), "sub/n.pt3");
    }

    #[test]
    fn test_multi_song_file_yields_each_song() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("songs.sid");
        fs::write(&path, psid("Songs", "Composer", 3)).unwrap();

        let (scanner, _) = scanner();
        let collected = scan(&scanner, &[id_of(&path)]);
        let subpaths: Vec<_> = collected.modules.iter().map(|(id, _)| id.subpath()).collect();
        assert_eq!(subpaths, vec!["#1", "#2", "#3"]);
    }

    #[test]
    fn test_playlist_entries_resolved_relative_to_playlist() {
        let temp = TempDir::new().unwrap();
        let lists = temp.path().join("lists");
        let tunes = temp.path().join("tunes");
        fs::create_dir_all(&lists).unwrap();
        fs::create_dir_all(&tunes).unwrap();
        fs::write(tunes.join("one.pt3"), pt3("One")).unwrap();
        fs::write(
            lists.join("best.ayl"),
            "ZX Spectrum Sound Chip Emulator Play List File v1.\n\
             ..\\tunes\\one.pt3\n<\nName=One\n>\nC:\\Games\\gone.pt3\n",
        )
        .unwrap();

        let (scanner, _) = scanner();
        let collected = scan(&scanner, &[id_of(&lists.join("best.ayl"))]);
        assert_eq!(collected.titles(), vec!["One"]);
        assert!(collected.errors.is_empty());
    }

    #[test]
    fn test_missing_item_reported_and_walk_continues() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("here.pt3");
        fs::write(&present, pt3("Here")).unwrap();

        let (scanner, _) = scanner();
        let missing = id_of(&temp.path().join("gone.pt3"));
        let collected = scan(&scanner, &[missing.clone(), id_of(&present)]);
        assert_eq!(collected.titles(), vec!["Here"]);
        assert_eq!(collected.errors.len(), 1);
        assert_eq!(collected.errors[0].0, missing);
    }

    #[test]
    fn test_cancelled_scan_aborts() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.pt3"), pt3("A")).unwrap();

        let (scanner, _) = scanner();
        scanner.cancellation().cancel();
        let mut collected = Collected::default();
        let result = scanner.scan(&[id_of(temp.path())], &mut collected);
        assert!(matches!(result, Err(VfsError::Cancelled)));
        assert!(collected.modules.is_empty());
    }

    #[test]
    fn test_fatal_callback_error_aborts() {
        struct FailFirst(usize);

        impl ScanCallback for FailFirst {
            fn on_module(&mut self, _: Identifier, _: Box<dyn Module>) -> VfsResult<()> {
                self.0 += 1;
                Err(VfsError::Fatal("out of memory".into()))
            }
            fn on_error(&mut self, _: &Identifier, _: &VfsError) {}
        }

        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.pt3"), pt3("A")).unwrap();
        fs::write(temp.path().join("b.pt3"), pt3("B")).unwrap();

        let (scanner, _) = scanner();
        let mut callback = FailFirst(0);
        let result = scanner.scan(&[id_of(temp.path())], &mut callback);
        assert!(matches!(result, Err(VfsError::Fatal(_))));
        assert_eq!(callback.0, 1);
    }
}
