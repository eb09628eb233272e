//! Federated virtual filesystem.
//!
//! Every backend exposes the same object model: dirs that push their
//! children into a [`DirVisitor`], files with content, and roots that
//! resolve URIs of their subtree. A [`CompositeRoot`] routes URIs to the
//! backend owning their scheme.
//!
//! # Architecture
//!
//! ```text
//! CompositeRoot (root:/)
//!   ├── LocalRoot (file:///)      plain files, zip/gzip archives
//!   ├── ZxartRoot (zxart:/)       cached remote catalog
//!   ├── ZxtunesRoot (zxtunes:/)   cached remote catalog
//!   └── ModarchiveRoot (modarchive:/)   optional, needs an API key
//! ```
//!
//! Objects never hold references to their parent. [`VfsNode::parent_uri`]
//! derives the parent's URI from the object's own URI and the composite
//! root resolves it again on demand.

pub mod archive;
pub mod composite;
mod error;
pub mod local;
mod object;

pub use archive::{
    ArchiveCache, ArchiveDir, ArchiveFile, ArchiveHandle, ContainerKind, MemberFile, MemberRef,
};
pub use composite::{root_uri, CompositeRoot, ROOT_URI};
pub use error::{VfsError, VfsResult};
pub use local::LocalRoot;
pub use object::{
    comparator_of, parent_path_uri, search_engine_of, DirVisitor, Extension, ExtensionId,
    ListingCollector, NameComparator, NoProgress, NodeComparator, PositionComparator,
    ProgressCallback, SearchEngine, VfsDir, VfsFile, VfsNode, VfsObject, VfsRoot,
};

/// Formats a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
