//! Archive containers and the process-wide archive handle cache.
//!
//! An [`ArchiveHandle`] is an opened container: the members of a zip file,
//! the payload of a gzip stream (exposed as the single member `+unGZIP`),
//! or a plain file whose subpath is interpreted by the module decoder
//! (e.g. `#2` for the second song of a multi-song file).
//!
//! Handles are cached by the container's URI so that repeated references
//! into the same archive open it once:
//!
//! ```text
//! file:///pack.zip#a/x.pt3 ─┐
//! file:///pack.zip#a/y.pt3 ─┼─> ArchiveCache[file:///pack.zip] -> ArchiveHandle
//! file:///pack.zip#b/z.pt3 ─┘
//! ```
//!
//! Nested containers (a gzip inside a zip) are cached under the URI of the
//! outer container plus the member path.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flate2::read::GzDecoder;
use moka::sync::Cache;
use tracing::debug;
use url::Url;

use super::error::{VfsError, VfsResult};
use super::format_size;
use super::object::{
    parent_path_uri, DirVisitor, Extension, ExtensionId, VfsDir, VfsFile, VfsNode, VfsObject,
};
use crate::identifier::{last_path_segment, Identifier, SUBPATH_DELIMITER};

/// Member name of a gzip payload.
pub const GZIP_MEMBER: &str = "+unGZIP";

/// Default weight limit of the handle cache (64 MiB of container data).
pub const DEFAULT_ARCHIVE_CACHE_BYTES: u64 = 64 * 1024 * 1024;

/// Upper bound on the unpacked size of one container.
const MAX_UNPACKED_SIZE: u64 = 256 * 1024 * 1024;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const GZIP_SIGNATURE: &[u8] = &[0x1f, 0x8b];

/// Kind of an opened container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Zip,
    Gzip,
    /// Not an archive; the subpath goes to the module decoder as is.
    Plain,
}

impl ContainerKind {
    /// Sniffs the container kind from leading bytes.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(ZIP_SIGNATURE) {
            ContainerKind::Zip
        } else if data.starts_with(GZIP_SIGNATURE) {
            ContainerKind::Gzip
        } else {
            ContainerKind::Plain
        }
    }

    pub fn is_archive(self) -> bool {
        self != ContainerKind::Plain
    }
}

/// Member located inside a container chain.
#[derive(Debug, Clone)]
pub struct MemberRef {
    /// Identifier of the member itself (no decoder remainder).
    pub member: Identifier,
    /// Member content.
    pub data: Arc<Vec<u8>>,
    /// Part of the subpath left for the module decoder, e.g. `#2`.
    pub remainder: String,
}

/// Opened container.
#[derive(Debug)]
pub struct ArchiveHandle {
    uri: Url,
    kind: ContainerKind,
    raw: Arc<Vec<u8>>,
    members: BTreeMap<String, Arc<Vec<u8>>>,
}

impl ArchiveHandle {
    /// Opens `data` as a container addressed by `uri`.
    pub fn open(uri: Url, data: Vec<u8>) -> VfsResult<Self> {
        let kind = ContainerKind::detect(&data);
        let members = match kind {
            ContainerKind::Zip => read_zip(&data)?,
            ContainerKind::Gzip => {
                let mut payload = Vec::new();
                GzDecoder::new(data.as_slice())
                    .take(MAX_UNPACKED_SIZE)
                    .read_to_end(&mut payload)
                    .map_err(|e| VfsError::Archive(format!("gzip {}: {}", uri, e)))?;
                BTreeMap::from([(GZIP_MEMBER.to_string(), Arc::new(payload))])
            }
            ContainerKind::Plain => BTreeMap::new(),
        };
        debug!(uri = %uri, kind = ?kind, members = members.len(), "Opened container");
        Ok(Self {
            uri,
            kind,
            raw: Arc::new(data),
            members,
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Size of the container data, used as cache weight.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Member paths in lexical order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Content of an exact member path.
    pub fn member(&self, path: &str) -> Option<Arc<Vec<u8>>> {
        self.members.get(path).cloned()
    }

    /// Splits `subpath` into the longest matching member and a remainder.
    ///
    /// Plain containers match the empty member with the whole subpath as
    /// remainder.
    pub fn locate(&self, subpath: &str) -> Option<(String, Arc<Vec<u8>>, String)> {
        if self.kind == ContainerKind::Plain {
            return Some((String::new(), Arc::clone(&self.raw), subpath.to_string()));
        }
        self.members
            .iter()
            .filter(|(path, _)| {
                subpath == path.as_str()
                    || subpath
                        .strip_prefix(path.as_str())
                        .is_some_and(|rest| rest.starts_with(SUBPATH_DELIMITER))
            })
            .max_by_key(|(path, _)| path.len())
            .map(|(path, data)| {
                let remainder = subpath[path.len()..]
                    .trim_start_matches(SUBPATH_DELIMITER)
                    .to_string();
                (path.clone(), Arc::clone(data), remainder)
            })
    }

    /// Returns true if `prefix` names a directory inside the container.
    pub fn is_dir(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return self.kind.is_archive();
        }
        let prefix = format!("{}{}", prefix, SUBPATH_DELIMITER);
        self.members.keys().any(|path| path.starts_with(&prefix))
    }

    /// Immediate children of `prefix`: subdirectory names and member paths.
    pub fn children(&self, prefix: &str) -> (BTreeSet<String>, Vec<String>) {
        let base = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}{}", prefix, SUBPATH_DELIMITER)
        };
        let mut dirs = BTreeSet::new();
        let mut files = Vec::new();
        for path in self.members.keys() {
            let Some(rest) = path.strip_prefix(&base) else {
                continue;
            };
            match rest.split_once(SUBPATH_DELIMITER) {
                Some((dir, _)) => {
                    dirs.insert(format!("{}{}", base, dir));
                }
                None => files.push(path.clone()),
            }
        }
        (dirs, files)
    }
}

fn read_zip(data: &[u8]) -> VfsResult<BTreeMap<String, Arc<Vec<u8>>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| VfsError::Archive(format!("zip: {}", e)))?;
    let mut members = BTreeMap::new();
    let mut unpacked = 0u64;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| VfsError::Archive(format!("zip entry {}: {}", index, e)))?;
        if entry.is_dir() {
            continue;
        }
        unpacked += entry.size();
        if unpacked > MAX_UNPACKED_SIZE {
            return Err(VfsError::Archive(format!(
                "zip unpacks to more than {}",
                format_size(MAX_UNPACKED_SIZE)
            )));
        }
        let name = entry.name().trim_matches(SUBPATH_DELIMITER).to_string();
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|e| VfsError::Archive(format!("zip member {}: {}", name, e)))?;
        members.insert(name, Arc::new(content));
    }
    Ok(members)
}

// =============================================================================
// Handle cache
// =============================================================================

/// Bounded cache of opened containers keyed by container URI.
///
/// Shared by the local root (archive browsing) and the scanner (member
/// resolution). Eviction is by total container size.
pub struct ArchiveCache {
    handles: Cache<Url, Arc<ArchiveHandle>>,
    opens: AtomicU64,
}

impl ArchiveCache {
    /// Creates a cache holding up to `max_bytes` of container data.
    pub fn new(max_bytes: u64) -> Self {
        let handles = Cache::builder()
            .weigher(|_key: &Url, handle: &Arc<ArchiveHandle>| -> u32 {
                handle.size().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_bytes)
            .build();
        Self {
            handles,
            opens: AtomicU64::new(0),
        }
    }

    /// Cached handle for `uri`, if any.
    pub fn get(&self, uri: &Url) -> Option<Arc<ArchiveHandle>> {
        self.handles.get(uri)
    }

    /// Cached handle for `uri`, opening it from `load` on a miss.
    ///
    /// Concurrent callers missing on the same URI wait for a single open.
    pub fn get_or_open<F>(&self, uri: &Url, load: F) -> VfsResult<Arc<ArchiveHandle>>
    where
        F: FnOnce() -> VfsResult<Vec<u8>>,
    {
        self.handles
            .try_get_with(uri.clone(), || -> VfsResult<Arc<ArchiveHandle>> {
                let handle = ArchiveHandle::open(uri.clone(), load()?)?;
                self.opens.fetch_add(1, Ordering::Relaxed);
                Ok(Arc::new(handle))
            })
            .map_err(|e| {
                Arc::try_unwrap(e).unwrap_or_else(|shared| VfsError::Archive(shared.to_string()))
            })
    }

    /// Opens `uri` from `load` unconditionally, replacing any cached handle.
    pub fn reopen<F>(&self, uri: &Url, load: F) -> VfsResult<Arc<ArchiveHandle>>
    where
        F: FnOnce() -> VfsResult<Vec<u8>>,
    {
        let handle = Arc::new(ArchiveHandle::open(uri.clone(), load()?)?);
        self.opens.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(uri.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Follows `id`'s subpath through nested containers.
    ///
    /// The outermost container is loaded with `load` on a cache miss;
    /// nested containers are opened from their parent's member data.
    pub fn resolve_member<F>(&self, id: &Identifier, load: F) -> VfsResult<MemberRef>
    where
        F: FnOnce() -> VfsResult<Vec<u8>>,
    {
        let mut handle = self.get_or_open(id.data(), load)?;
        let mut container = Identifier::from_url(id.data().clone());
        let mut subpath = id.subpath().to_string();
        loop {
            let (path, data, remainder) = handle.locate(&subpath).ok_or_else(|| {
                VfsError::Archive(format!("no member '{}' in {}", subpath, handle.uri()))
            })?;
            let member = container.join_subpath(&path);
            if remainder.is_empty() || !ContainerKind::detect(&data).is_archive() {
                return Ok(MemberRef {
                    member,
                    data,
                    remainder,
                });
            }
            let nested = Arc::clone(&data);
            handle = self.get_or_open(member.full(), move || Ok(nested.as_ref().clone()))?;
            container = member;
            subpath = remainder;
        }
    }

    /// Number of containers opened so far.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Drops every cached handle.
    pub fn clear(&self) {
        self.handles.invalidate_all();
    }
}

impl Default for ArchiveCache {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_CACHE_BYTES)
    }
}

// =============================================================================
// VFS objects
// =============================================================================

/// Dir view of a container or of a directory inside it.
pub struct ArchiveDir {
    uri: Url,
    handle: Arc<ArchiveHandle>,
    prefix: String,
}

impl ArchiveDir {
    /// Dir for the whole container.
    pub fn new(handle: Arc<ArchiveHandle>) -> Self {
        Self::at(handle, "")
    }

    /// Dir for `prefix` inside the container.
    pub fn at(handle: Arc<ArchiveHandle>, prefix: &str) -> Self {
        let uri = Identifier::new(handle.uri().clone(), prefix).full().clone();
        Self {
            uri,
            handle,
            prefix: prefix.to_string(),
        }
    }
}

impl VfsNode for ArchiveDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        member_name(&self.handle, &self.prefix)
    }

    fn parent_uri(&self) -> Option<Url> {
        member_parent(&self.handle, &self.prefix)
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("archive".to_string())),
            ExtensionId::TrackCount if self.prefix.is_empty() => {
                Some(Extension::TrackCount(self.handle.member_count() as u32))
            }
            _ => None,
        }
    }
}

impl VfsDir for ArchiveDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        let (dirs, files) = self.handle.children(&self.prefix);
        visitor.on_items_count(dirs.len() + files.len())?;
        for dir in dirs {
            visitor.on_dir(Arc::new(ArchiveDir::at(Arc::clone(&self.handle), &dir)))?;
        }
        for path in files {
            visitor.on_file(Arc::new(ArchiveFile::new(Arc::clone(&self.handle), &path)))?;
        }
        Ok(())
    }
}

/// Single member of a container.
pub struct ArchiveFile {
    uri: Url,
    handle: Arc<ArchiveHandle>,
    path: String,
}

impl ArchiveFile {
    pub fn new(handle: Arc<ArchiveHandle>, path: &str) -> Self {
        let uri = Identifier::new(handle.uri().clone(), path).full().clone();
        Self {
            uri,
            handle,
            path: path.to_string(),
        }
    }
}

impl VfsNode for ArchiveFile {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        member_name(&self.handle, &self.path)
    }

    fn parent_uri(&self) -> Option<Url> {
        member_parent(&self.handle, &self.path)
    }
}

impl VfsFile for ArchiveFile {
    fn details(&self) -> String {
        self.handle
            .member(&self.path)
            .map(|data| format_size(data.len() as u64))
            .unwrap_or_default()
    }

    fn content(&self) -> VfsResult<Vec<u8>> {
        self.handle
            .member(&self.path)
            .map(|data| data.as_ref().clone())
            .ok_or_else(|| VfsError::not_found(&self.uri))
    }
}

/// File reached through nested containers or addressing one song of a
/// multi-song file (`songs.sid#2`).
///
/// The content is the whole member; the decoder interprets the remainder.
pub struct MemberFile {
    uri: Url,
    member: MemberRef,
}

impl MemberFile {
    pub fn new(id: &Identifier, member: MemberRef) -> Self {
        Self {
            uri: id.full().clone(),
            member,
        }
    }

    /// Subpath left for the module decoder, empty for plain members.
    pub fn remainder(&self) -> &str {
        &self.member.remainder
    }
}

impl VfsNode for MemberFile {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        let name = self.member.member.display_name();
        if self.member.remainder.is_empty() {
            name
        } else {
            format!("{} {}", name, self.member.remainder)
        }
    }

    /// Dir holding the member, so every song of a file shares one parent.
    fn parent_uri(&self) -> Option<Url> {
        let member = &self.member.member;
        if !member.has_subpath() {
            return parent_path_uri(member.data());
        }
        let parent = member
            .subpath()
            .rsplit_once(SUBPATH_DELIMITER)
            .map(|(parent, _)| parent)
            .unwrap_or("");
        Some(member.with_subpath(parent).full().clone())
    }
}

impl VfsFile for MemberFile {
    fn details(&self) -> String {
        format_size(self.member.data.len() as u64)
    }

    fn content(&self) -> VfsResult<Vec<u8>> {
        Ok(self.member.data.as_ref().clone())
    }
}

/// Resolves `subpath` inside `handle` to a dir or file object.
pub fn member_object(handle: &Arc<ArchiveHandle>, subpath: &str) -> Option<VfsObject> {
    if handle.member(subpath).is_some() {
        Some(VfsObject::File(Arc::new(ArchiveFile::new(
            Arc::clone(handle),
            subpath,
        ))))
    } else if handle.is_dir(subpath) {
        Some(VfsObject::Dir(Arc::new(ArchiveDir::at(
            Arc::clone(handle),
            subpath,
        ))))
    } else {
        debug!(uri = %handle.uri(), subpath = %subpath, "Member not in archive");
        None
    }
}

fn member_name(handle: &ArchiveHandle, path: &str) -> String {
    path.rsplit(SUBPATH_DELIMITER)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| last_path_segment(handle.uri()))
}

fn member_parent(handle: &ArchiveHandle, path: &str) -> Option<Url> {
    if path.is_empty() {
        return parent_path_uri(handle.uri());
    }
    let parent = path
        .rsplit_once(SUBPATH_DELIMITER)
        .map(|(parent, _)| parent)
        .unwrap_or("");
    Some(Identifier::new(handle.uri().clone(), parent).full().clone())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vfs::object::ListingCollector;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Builds an in-memory zip with the given members.
    pub(crate) fn make_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn make_gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_zip_members() {
        let data = make_zip(&[
            ("coop-Jeffie/bass sorrow.pt3", b"PT3 one"),
            ("coop-Jeffie/other.pt3", b"PT3 two"),
            ("readme.txt", b"hello"),
        ]);
        let handle = ArchiveHandle::open(uri("file:///pack.zip"), data).unwrap();
        assert_eq!(handle.kind(), ContainerKind::Zip);
        assert_eq!(handle.member_count(), 3);
        assert_eq!(
            handle.member("coop-Jeffie/bass sorrow.pt3").unwrap().as_slice(),
            b"PT3 one"
        );
        assert!(handle.is_dir("coop-Jeffie"));
        assert!(!handle.is_dir("readme.txt"));
    }

    #[test]
    fn test_gzip_member() {
        let data = make_gzip(b"payload");
        let handle = ArchiveHandle::open(uri("file:///a.pt3.gz"), data).unwrap();
        assert_eq!(handle.kind(), ContainerKind::Gzip);
        assert_eq!(handle.members().collect::<Vec<_>>(), vec![GZIP_MEMBER]);
        assert_eq!(handle.member(GZIP_MEMBER).unwrap().as_slice(), b"payload");
    }

    #[test]
    fn test_locate_with_remainder() {
        let data = make_zip(&[("dir/multi.sid", b"PSID"), ("dir/multi.sidx", b"x")]);
        let handle = ArchiveHandle::open(uri("file:///a.zip"), data).unwrap();

        let (path, _, remainder) = handle.locate("dir/multi.sid/#2").unwrap();
        assert_eq!(path, "dir/multi.sid");
        assert_eq!(remainder, "#2");

        let (path, _, remainder) = handle.locate("dir/multi.sidx").unwrap();
        assert_eq!(path, "dir/multi.sidx");
        assert!(remainder.is_empty());

        assert!(handle.locate("dir/missing").is_none());
    }

    #[test]
    fn test_plain_locate_passes_subpath() {
        let handle = ArchiveHandle::open(uri("file:///a.sid"), b"PSID....".to_vec()).unwrap();
        let (path, data, remainder) = handle.locate("#3").unwrap();
        assert!(path.is_empty());
        assert_eq!(data.as_slice(), b"PSID....");
        assert_eq!(remainder, "#3");
    }

    #[test]
    fn test_cache_opens_once() {
        let cache = ArchiveCache::default();
        let data = make_zip(&[("a.pt3", b"1"), ("b.pt3", b"2")]);
        let key = uri("file:///pack.zip");

        let id_a = Identifier::new(key.clone(), "a.pt3");
        let id_b = Identifier::new(key.clone(), "b.pt3");
        let a = cache.resolve_member(&id_a, || Ok(data.clone())).unwrap();
        let b = cache
            .resolve_member(&id_b, || panic!("archive must not be reloaded"))
            .unwrap();

        assert_eq!(a.data.as_slice(), b"1");
        assert_eq!(b.data.as_slice(), b"2");
        assert_eq!(cache.opens(), 1);
    }

    #[test]
    fn test_concurrent_opens_share_one_load() {
        let cache = Arc::new(ArchiveCache::default());
        let data = make_zip(&[("a.pt3", b"1")]);
        let loads = Arc::new(AtomicU64::new(0));
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let data = data.clone();
                let loads = Arc::clone(&loads);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_open(&uri("file:///pack.zip"), || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(50));
                            Ok(data)
                        })
                        .unwrap()
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap().member_count(), 1);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.opens(), 1);
    }

    #[test]
    fn test_failed_open_is_not_cached() {
        let cache = ArchiveCache::default();
        let key = uri("file:///broken.zip");
        let err = cache
            .get_or_open(&key, || Err(VfsError::not_found("file:///broken.zip")))
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_nested_gzip_in_zip() {
        let inner = make_gzip(b"tune");
        let data = make_zip(&[("song.pt3.gz", &inner)]);
        let cache = ArchiveCache::default();
        let id = Identifier::new(uri("file:///pack.zip"), "song.pt3.gz/+unGZIP");

        let member = cache.resolve_member(&id, || Ok(data.clone())).unwrap();
        assert_eq!(member.data.as_slice(), b"tune");
        assert_eq!(member.member.subpath(), "song.pt3.gz/+unGZIP");
        assert!(member.remainder.is_empty());
        assert_eq!(cache.opens(), 2);
    }

    #[test]
    fn test_archive_browses_as_dir() {
        let data = make_zip(&[
            ("coop-Jeffie/bass sorrow.pt3", b"1"),
            ("top.pt3", b"2"),
        ]);
        let handle = Arc::new(ArchiveHandle::open(uri("file:///m/pack.zip"), data).unwrap());
        let dir = ArchiveDir::new(Arc::clone(&handle));
        assert_eq!(dir.name(), "pack.zip");
        assert_eq!(dir.parent_uri().unwrap().as_str(), "file:///m");

        let mut collector = ListingCollector::new();
        dir.enumerate(&mut collector).unwrap();
        assert_eq!(collector.dirs.len(), 1);
        assert_eq!(collector.files.len(), 1);

        let sub = &collector.dirs[0];
        assert_eq!(sub.name(), "coop-Jeffie");
        assert_eq!(sub.uri().as_str(), "file:///m/pack.zip#coop-Jeffie");
        assert_eq!(sub.parent_uri().unwrap().as_str(), "file:///m/pack.zip");

        let mut inner = ListingCollector::new();
        sub.enumerate(&mut inner).unwrap();
        let file = &inner.files[0];
        assert_eq!(file.name(), "bass sorrow.pt3");
        assert_eq!(
            file.parent_uri().unwrap().as_str(),
            "file:///m/pack.zip#coop-Jeffie"
        );
        assert_eq!(file.content().unwrap(), b"1");
    }

    #[test]
    fn test_member_object_kinds() {
        let data = make_zip(&[("d/x.pt3", b"1")]);
        let handle = Arc::new(ArchiveHandle::open(uri("file:///a.zip"), data).unwrap());
        assert!(member_object(&handle, "d").unwrap().as_dir().is_some());
        assert!(member_object(&handle, "d/x.pt3").unwrap().as_file().is_some());
        assert!(member_object(&handle, "nope").is_none());
    }

    #[test]
    fn test_member_file_for_song_of_plain_file() {
        let cache = ArchiveCache::default();
        let id = Identifier::new(uri("file:///m/songs.sid"), "#2");
        let member = cache
            .resolve_member(&id, || Ok(b"PSID songs".to_vec()))
            .unwrap();
        let file = MemberFile::new(&id, member);

        assert_eq!(file.uri(), id.full());
        assert_eq!(file.name(), "songs.sid #2");
        assert_eq!(file.remainder(), "#2");
        assert_eq!(file.parent_uri().unwrap().as_str(), "file:///m");
        assert_eq!(file.content().unwrap(), b"PSID songs");
    }

    #[test]
    fn test_member_file_parent_inside_archive() {
        let data = make_zip(&[("dir/multi.sid", b"PSID")]);
        let cache = ArchiveCache::default();
        let id = Identifier::new(uri("file:///a.zip"), "dir/multi.sid/#3");
        let member = cache.resolve_member(&id, || Ok(data.clone())).unwrap();
        let file = MemberFile::new(&id, member);
        assert_eq!(file.name(), "multi.sid #3");
        assert_eq!(file.parent_uri().unwrap().as_str(), "file:///a.zip#dir");
    }

    #[test]
    fn test_corrupt_zip() {
        let result = ArchiveHandle::open(uri("file:///bad.zip"), b"PK\x03\x04garbage".to_vec());
        assert!(matches!(result, Err(VfsError::Archive(_))));
    }
}
