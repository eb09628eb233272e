//! TuneVFS - federated virtual filesystem over chiptune music archives
//!
//! This library presents local files, archive contents and remote music
//! catalogs (zxart.ee, zxtunes.com, modarchive.org) as one browsable tree, answers queries
//! against it without blocking the caller, and scans subtrees for playable
//! modules.
//!
//! # Layout
//!
//! - [`identifier`]: data location plus a subpath inside containers
//! - [`vfs`]: object model, composite root, local files and archives
//! - [`catalog`]: TTL-cached remote catalogs backed by SQLite
//! - [`blob`]: on-disk cache of downloaded content
//! - [`operation`]: asynchronous operations with bounded initial wait
//! - [`service`]: query dispatcher and bootstrap
//! - [`scanner`]: depth-first module discovery
//! - [`decoder`]: module detection seam
//! - [`config`], [`logging`]: ambient setup

pub mod blob;
pub mod catalog;
pub mod config;
pub mod decoder;
pub mod identifier;
pub mod logging;
pub mod operation;
pub mod remote;
pub mod scanner;
pub mod service;
pub mod vfs;

pub use identifier::Identifier;
pub use service::{Request, RequestKind, ServiceError, VfsService};
