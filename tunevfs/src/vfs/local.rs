//! Local filesystem root (`file:` scheme).
//!
//! Plain directories and files map one to one. Zip and gzip files resolve
//! as [`ArchiveDir`]s so their members can be browsed; a URI with a
//! fragment addresses a member inside such a container.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};
use url::Url;

use super::archive::{member_object, ArchiveCache, ArchiveDir, ContainerKind, MemberFile};
use super::error::{VfsError, VfsResult};
use super::format_size;
use super::object::{
    parent_path_uri, DirVisitor, Extension, ExtensionId, ProgressCallback, VfsDir, VfsFile,
    VfsNode, VfsObject, VfsRoot,
};
use crate::identifier::Identifier;
use crate::vfs::composite::root_uri;

/// Root of the local filesystem.
pub struct LocalRoot {
    uri: Url,
    archives: Arc<ArchiveCache>,
}

impl LocalRoot {
    pub fn new(archives: Arc<ArchiveCache>) -> Self {
        Self {
            uri: file_uri(Path::new("/")).unwrap_or_else(root_uri),
            archives,
        }
    }

    /// Archive member addressed by `id`.
    ///
    /// Tries the cached handle first; when that misses or the member is not
    /// found there, the container is reopened from disk and the fresh handle
    /// is authoritative. Subpaths that are not a plain member (a song of a
    /// multi-song file, a member of a nested container) are followed through
    /// the archive cache.
    fn resolve_member(&self, id: &Identifier, path: &Path) -> VfsResult<Option<VfsObject>> {
        if let Some(handle) = self.archives.get(id.data()) {
            if let Some(obj) = member_object(&handle, id.subpath()) {
                return Ok(Some(obj));
            }
            debug!(uri = %id, "Cached archive handle missed, reopening");
        }
        let handle = self.archives.reopen(id.data(), || Ok(fs::read(path)?))?;
        if let Some(obj) = member_object(&handle, id.subpath()) {
            return Ok(Some(obj));
        }
        match self.archives.resolve_member(id, || Ok(fs::read(path)?)) {
            Ok(member) => Ok(Some(VfsObject::File(Arc::new(MemberFile::new(id, member))))),
            Err(VfsError::Archive(reason)) => {
                debug!(uri = %id, reason = %reason, "No such member");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_path(&self, uri: &Url, path: &Path) -> VfsResult<Option<VfsObject>> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            return Ok(Some(VfsObject::Dir(Arc::new(LocalDir::new(
                uri.clone(),
                path.to_path_buf(),
                Arc::clone(&self.archives),
            )))));
        }
        if sniff_container(path)?.is_archive() {
            let handle = self
                .archives
                .get_or_open(uri, || Ok(fs::read(path)?))?;
            return Ok(Some(VfsObject::Dir(Arc::new(ArchiveDir::new(handle)))));
        }
        Ok(Some(VfsObject::File(Arc::new(LocalFile::new(
            uri.clone(),
            path.to_path_buf(),
            metadata.len(),
        )))))
    }
}

impl VfsNode for LocalRoot {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        "Local".to_string()
    }

    fn parent_uri(&self) -> Option<Url> {
        Some(root_uri())
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("storage".to_string())),
            _ => None,
        }
    }
}

impl VfsDir for LocalRoot {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        LocalDir::new(self.uri.clone(), PathBuf::from("/"), Arc::clone(&self.archives))
            .enumerate(visitor)
    }
}

impl VfsRoot for LocalRoot {
    fn resolve(&self, uri: &Url, _progress: &dyn ProgressCallback) -> VfsResult<Option<VfsObject>> {
        if uri.scheme() != "file" {
            return Ok(None);
        }
        let id = Identifier::from_url(uri.clone());
        let Ok(path) = id.data().to_file_path() else {
            return Ok(None);
        };
        trace!(uri = %uri, path = %path.display(), "Resolving local object");
        if id.has_subpath() {
            return self.resolve_member(&id, &path);
        }
        if path == Path::new("/") {
            return Ok(Some(VfsObject::Dir(Arc::new(LocalRoot {
                uri: self.uri.clone(),
                archives: Arc::clone(&self.archives),
            }))));
        }
        self.resolve_path(id.data(), &path)
    }

    fn as_dir(self: Arc<Self>) -> Arc<dyn VfsDir> {
        self
    }
}

/// Local directory.
pub struct LocalDir {
    uri: Url,
    path: PathBuf,
    archives: Arc<ArchiveCache>,
}

impl LocalDir {
    pub fn new(uri: Url, path: PathBuf, archives: Arc<ArchiveCache>) -> Self {
        Self {
            uri,
            path,
            archives,
        }
    }
}

impl VfsNode for LocalDir {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        file_name(&self.path)
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_path_uri(&self.uri)
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("folder".to_string())),
            _ => None,
        }
    }
}

impl VfsDir for LocalDir {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        let entries: Vec<fs::DirEntry> = fs::read_dir(&self.path)?
            .filter_map(Result::ok)
            .collect();
        visitor.on_items_count(entries.len())?;
        for entry in entries {
            let path = entry.path();
            let Some(uri) = file_uri(&path) else {
                continue;
            };
            let Ok(metadata) = fs::metadata(&path) else {
                trace!(path = %path.display(), "Skipping unreadable entry");
                continue;
            };
            if metadata.is_dir() {
                visitor.on_dir(Arc::new(LocalDir::new(
                    uri,
                    path,
                    Arc::clone(&self.archives),
                )))?;
            } else if let Some(handle) = self.archives.get(&uri) {
                // Already opened archives list as dirs
                visitor.on_dir(Arc::new(ArchiveDir::new(handle)))?;
            } else {
                visitor.on_file(Arc::new(LocalFile::new(uri, path, metadata.len())))?;
            }
        }
        Ok(())
    }
}

/// Local regular file.
pub struct LocalFile {
    uri: Url,
    path: PathBuf,
    size: u64,
}

impl LocalFile {
    pub fn new(uri: Url, path: PathBuf, size: u64) -> Self {
        Self { uri, path, size }
    }
}

impl VfsNode for LocalFile {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        file_name(&self.path)
    }

    fn parent_uri(&self) -> Option<Url> {
        parent_path_uri(&self.uri)
    }
}

impl VfsFile for LocalFile {
    fn details(&self) -> String {
        format_size(self.size)
    }

    fn content(&self) -> VfsResult<Vec<u8>> {
        fs::read(&self.path).map_err(VfsError::from)
    }

    fn local_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}

/// `file:` URI for an absolute path.
pub fn file_uri(path: &Path) -> Option<Url> {
    Url::from_file_path(path).ok()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn sniff_container(path: &Path) -> VfsResult<ContainerKind> {
    let mut header = [0u8; 4];
    let mut file = fs::File::open(path)?;
    let read = file.read(&mut header)?;
    Ok(ContainerKind::detect(&header[..read]))
}
