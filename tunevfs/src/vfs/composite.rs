//! Composite root merging several backends behind one resolver.
//!
//! Each sub-root owns a URI scheme (`file`, `zxart`, ...). The composite
//! dispatches resolution by scheme and enumerates its sub-roots as dirs.
//! It is built once at startup and passed to whatever needs it; there is
//! no process-wide instance.

use std::sync::{Arc, OnceLock};

use tracing::debug;
use url::Url;

use super::error::VfsResult;
use super::object::{
    DirVisitor, Extension, ExtensionId, ProgressCallback, VfsDir, VfsNode, VfsObject, VfsRoot,
};

/// URI of the top-level root.
pub const ROOT_URI: &str = "root:/";

/// Top-level root dispatching to per-scheme sub-roots.
#[derive(Clone)]
pub struct CompositeRoot {
    uri: Url,
    roots: Vec<Arc<dyn VfsRoot>>,
}

impl CompositeRoot {
    /// Creates an empty composite root.
    pub fn new() -> Self {
        Self {
            uri: root_uri(),
            roots: Vec::new(),
        }
    }

    /// Adds a sub-root. Its URI scheme becomes routable.
    pub fn with_root(mut self, root: Arc<dyn VfsRoot>) -> Self {
        debug!(root = %root.uri(), "Registered VFS root");
        self.roots.push(root);
        self
    }

    /// Registered sub-roots in registration order.
    pub fn roots(&self) -> &[Arc<dyn VfsRoot>] {
        &self.roots
    }

    /// Resolves without progress reporting.
    pub fn resolve_uri(&self, uri: &Url) -> VfsResult<Option<VfsObject>> {
        self.resolve(uri, &super::object::NoProgress)
    }

    fn root_for(&self, uri: &Url) -> Option<&Arc<dyn VfsRoot>> {
        self.roots
            .iter()
            .find(|root| root.uri().scheme() == uri.scheme())
    }
}

impl Default for CompositeRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsNode for CompositeRoot {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        String::new()
    }

    fn parent_uri(&self) -> Option<Url> {
        None
    }

    fn extension(&self, id: ExtensionId) -> Option<Extension> {
        match id {
            ExtensionId::Icon => Some(Extension::Icon("root".to_string())),
            _ => None,
        }
    }
}

impl VfsDir for CompositeRoot {
    fn enumerate(&self, visitor: &mut dyn DirVisitor) -> VfsResult<()> {
        visitor.on_items_count(self.roots.len())?;
        for root in &self.roots {
            visitor.on_dir(Arc::clone(root).as_dir())?;
        }
        Ok(())
    }
}

impl VfsRoot for CompositeRoot {
    fn resolve(&self, uri: &Url, progress: &dyn ProgressCallback) -> VfsResult<Option<VfsObject>> {
        if uri.scheme() == self.uri.scheme() {
            return Ok(Some(VfsObject::Dir(Arc::new(self.clone()))));
        }
        match self.root_for(uri) {
            Some(root) => root.resolve(uri, progress),
            None => {
                debug!(uri = %uri, "No VFS root for scheme");
                Ok(None)
            }
        }
    }

    fn as_dir(self: Arc<Self>) -> Arc<dyn VfsDir> {
        self
    }
}

/// Parsed [`ROOT_URI`].
pub fn root_uri() -> Url {
    static ROOT: OnceLock<Url> = OnceLock::new();
    ROOT.get_or_init(|| Url::parse(ROOT_URI).expect("root URI literal is valid"))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::object::{ListingCollector, NoProgress};
    use crate::vfs::VfsError;

    struct StubRoot {
        uri: Url,
    }

    impl VfsNode for StubRoot {
        fn uri(&self) -> &Url {
            &self.uri
        }
        fn name(&self) -> String {
            self.uri.scheme().to_string()
        }
        fn parent_uri(&self) -> Option<Url> {
            Some(root_uri())
        }
    }

    impl VfsDir for StubRoot {
        fn enumerate(&self, _visitor: &mut dyn DirVisitor) -> VfsResult<()> {
            Ok(())
        }
    }

    impl VfsRoot for StubRoot {
        fn resolve(&self, uri: &Url, _: &dyn ProgressCallback) -> VfsResult<Option<VfsObject>> {
            if uri == &self.uri {
                Ok(Some(VfsObject::Dir(Arc::new(StubRoot {
                    uri: self.uri.clone(),
                }))))
            } else {
                Err(VfsError::not_found(uri))
            }
        }

        fn as_dir(self: Arc<Self>) -> Arc<dyn VfsDir> {
            self
        }
    }

    fn composite() -> CompositeRoot {
        CompositeRoot::new()
            .with_root(Arc::new(StubRoot {
                uri: Url::parse("alpha:/").unwrap(),
            }))
            .with_root(Arc::new(StubRoot {
                uri: Url::parse("beta:/").unwrap(),
            }))
    }

    #[test]
    fn test_dispatch_by_scheme() {
        let root = composite();
        let obj = root
            .resolve(&Url::parse("beta:/").unwrap(), &NoProgress)
            .unwrap()
            .unwrap();
        assert_eq!(obj.uri().as_str(), "beta:/");
    }

    #[test]
    fn test_unknown_scheme_is_none() {
        let root = composite();
        let obj = root.resolve_uri(&Url::parse("gamma:/x").unwrap()).unwrap();
        assert!(obj.is_none());
    }

    #[test]
    fn test_resolve_self() {
        let root = composite();
        let obj = root.resolve_uri(&root_uri()).unwrap().unwrap();
        assert!(obj.as_dir().is_some());
        assert!(obj.parent_uri().is_none());
    }

    #[test]
    fn test_enumerate_sub_roots() {
        let root = composite();
        let mut collector = ListingCollector::new();
        root.enumerate(&mut collector).unwrap();
        let names: Vec<String> = collector.dirs.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(collector.files.is_empty());
    }
}
