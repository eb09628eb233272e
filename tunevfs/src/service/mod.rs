//! Query dispatcher over the federated VFS.
//!
//! [`VfsService`] owns the composite root, the shared caches and the
//! operation engine, and turns each [`Request`] into an operation keyed by
//! the request itself.
//!
//! # Startup Sequence
//!
//! [`VfsService::from_config`] wires everything from a [`ConfigFile`]:
//!
//! 1. Cache directory is created
//! 2. HTTP client with the configured timeout and size limit
//! 3. Blob cache under `<cache>/blobs` and the in-memory archive cache
//! 4. Catalog databases `<cache>/zxart.db` and `<cache>/zxtunes.db`, plus
//!    `<cache>/modarchive.db` when an API key is configured
//! 5. Local and catalog roots registered on the composite root
//! 6. Operation engine started
//!
//! # Example
//!
//! ```ignore
//! use tunevfs::config::ConfigFile;
//! use tunevfs::service::{Request, VfsService};
//!
//! let service = VfsService::from_config(&ConfigFile::load()?)?;
//! let result = service.query(&Request::listing(uri)).await;
//! if !result.is_terminal() {
//!     // Wait for a notification carrying the request key, then ask again
//! }
//! service.shutdown();
//! ```

mod operations;
mod request;

use std::io::Read;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

pub use request::{Request, RequestKind};

use crate::blob::BlobCache;
use crate::catalog::modarchive::{ModarchiveCatalog, ModarchiveRoot};
use crate::catalog::zxart::{ZxartCatalog, ZxartRoot};
use crate::catalog::zxtunes::{ZxtunesCatalog, ZxtunesRoot};
use crate::catalog::StoreError;
use crate::config::ConfigFile;
use crate::decoder::ModuleDecoder;
use crate::operation::{EngineConfig, OperationEngine, QueryResult};
use crate::remote::{HttpClient, RemoteError, ReqwestClient};
use crate::scanner::Scanner;
use crate::vfs::{ArchiveCache, CompositeRoot, LocalRoot, VfsResult, VfsRoot};
use operations::Context;

/// Errors raised while assembling the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder for [`VfsService`].
#[derive(Default)]
pub struct VfsServiceBuilder {
    roots: Vec<Arc<dyn VfsRoot>>,
    local: bool,
    blobs: Option<Arc<BlobCache>>,
    archives: Option<Arc<ArchiveCache>>,
    engine: EngineConfig,
}

impl VfsServiceBuilder {
    /// Registers a sub-root. Roots are consulted in registration order.
    pub fn with_root(mut self, root: Arc<dyn VfsRoot>) -> Self {
        self.roots.push(root);
        self
    }

    /// Registers the `file:` root, sharing the service's archive cache.
    pub fn with_local_root(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_blob_cache(mut self, blobs: Arc<BlobCache>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_archive_cache(mut self, archives: Arc<ArchiveCache>) -> Self {
        self.archives = Some(archives);
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    /// Assembles the service. A blob cache is required.
    pub fn build(self) -> Result<VfsService, ServiceError> {
        let blobs = self
            .blobs
            .ok_or_else(|| ServiceError::Config("blob cache not configured".to_string()))?;
        let archives = self.archives.unwrap_or_default();

        let mut root = CompositeRoot::new();
        if self.local {
            root = root.with_root(Arc::new(LocalRoot::new(Arc::clone(&archives))));
        }
        for sub in self.roots {
            root = root.with_root(sub);
        }

        Ok(VfsService {
            context: Arc::new(Context {
                root: Arc::new(root),
                blobs,
            }),
            archives,
            engine: OperationEngine::new(self.engine),
        })
    }
}

/// Entry point for VFS queries.
pub struct VfsService {
    context: Arc<Context>,
    archives: Arc<ArchiveCache>,
    engine: OperationEngine,
}

impl VfsService {
    pub fn builder() -> VfsServiceBuilder {
        VfsServiceBuilder::default()
    }

    /// Builds the complete service from configuration.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(&config.cache.directory)?;

        let http: Arc<dyn HttpClient> = Arc::new(
            ReqwestClient::with_timeout(config.network.timeout_secs)?
                .with_max_response_size(config.network.max_response_size),
        );
        let blobs = Arc::new(
            BlobCache::new(config.blobs_directory()).with_min_size(config.cache.min_file_size),
        );

        let zxart = ZxartCatalog::open(
            &config.database_path("zxart"),
            Arc::clone(&http),
            Arc::clone(&blobs),
        )?
        .with_config(config.catalog.clone());
        let zxtunes = ZxtunesCatalog::open(
            &config.database_path("zxtunes"),
            Arc::clone(&http),
            Arc::clone(&blobs),
        )?
        .with_config(config.catalog.clone());

        let mut builder = Self::builder()
            .with_local_root()
            .with_root(Arc::new(ZxartRoot::new(Arc::new(zxart))))
            .with_root(Arc::new(ZxtunesRoot::new(Arc::new(zxtunes))));
        if config.catalog.modarchive_key.is_empty() {
            debug!("No modarchive API key, modarchive source disabled");
        } else {
            let modarchive = ModarchiveCatalog::open(
                &config.database_path("modarchive"),
                Arc::clone(&http),
                &config.catalog.modarchive_key,
                Arc::clone(&blobs),
            )?
            .with_config(config.catalog.clone());
            builder = builder.with_root(Arc::new(ModarchiveRoot::new(Arc::new(modarchive))));
        }

        let service = builder
            .with_blob_cache(blobs)
            .with_engine_config(config.operations.clone())
            .build()?;

        info!(
            cache = %config.cache.directory.display(),
            roots = service.root().roots().len(),
            "VFS service started"
        );
        Ok(service)
    }

    /// Runs or polls the operation serving `request`.
    ///
    /// A non-terminal result means the operation keeps running; a
    /// notification carrying [`Request::key`] is broadcast while it does and
    /// once more when it completes.
    pub async fn query(&self, request: &Request) -> QueryResult {
        let context = Arc::clone(&self.context);
        self.engine
            .query(&request.key(), || operations::create(request, context))
            .await
    }

    pub async fn resolve(&self, uri: &Url) -> QueryResult {
        self.query(&Request::resolve(uri.clone())).await
    }

    pub async fn list(&self, uri: &Url) -> QueryResult {
        self.query(&Request::listing(uri.clone())).await
    }

    pub async fn parents(&self, uri: &Url) -> QueryResult {
        self.query(&Request::parents(uri.clone())).await
    }

    pub async fn search(&self, uri: &Url, text: &str) -> QueryResult {
        self.query(&Request::search(uri.clone(), text)).await
    }

    pub async fn file(&self, uri: &Url) -> QueryResult {
        self.query(&Request::file(uri.clone())).await
    }

    /// Cancels the operation serving `request`, if one is running.
    pub fn cancel(&self, request: &Request) -> bool {
        self.engine.cancel(&request.key())
    }

    /// Read-only stream over a file's content.
    ///
    /// Blocks on I/O; call from a blocking context.
    pub fn open_file(&self, uri: &Url) -> VfsResult<Box<dyn Read + Send>> {
        self.context.open(uri)
    }

    /// Keys of requests worth asking again.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.engine.subscribe()
    }

    pub fn root(&self) -> &Arc<CompositeRoot> {
        &self.context.root
    }

    pub fn blobs(&self) -> &Arc<BlobCache> {
        &self.context.blobs
    }

    pub fn archives(&self) -> &Arc<ArchiveCache> {
        &self.archives
    }

    /// Scanner over this service's root, sharing its archive cache.
    pub fn scanner(&self, decoder: Arc<dyn ModuleDecoder>) -> Scanner {
        let root: Arc<dyn VfsRoot> = Arc::clone(&self.context.root) as Arc<dyn VfsRoot>;
        Scanner::new(root, Arc::clone(&self.archives), decoder)
    }

    /// Cancels running operations and drops cached archive handles.
    pub fn shutdown(&self) {
        let running = self.engine.holders_count();
        self.engine.cancel_all();
        self.archives.clear();
        info!(cancelled = running, "VFS service stopped");
    }
}
