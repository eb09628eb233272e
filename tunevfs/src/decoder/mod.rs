//! Module decoder boundary.
//!
//! Playable modules are opaque to the VFS: the scanner hands raw bytes to a
//! [`ModuleDecoder`] and receives [`Module`] handles carrying metadata and a
//! duration. Releasing a module is dropping it.
//!
//! [`ProbeDecoder`] recognises common chiptune containers by their headers
//! and is what the CLI uses; embedding applications plug in a full engine.

mod probe;

use std::time::Duration;

use thiserror::Error;

use crate::vfs::VfsResult;

pub use probe::{song_subpath, ProbeDecoder, ProbedModule, DEFAULT_MODULE_DURATION};

#[cfg(test)]
pub(crate) use probe::tests as fixtures;

/// Property name of the module title.
pub const PROPERTY_TITLE: &str = "Title";
/// Property name of the module author.
pub const PROPERTY_AUTHOR: &str = "Author";
/// Property name of the module format identifier.
pub const PROPERTY_TYPE: &str = "Type";

/// Errors raised by a decoder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Data is not a module the decoder understands.
    #[error("Unsupported module format")]
    Unsupported,

    /// Subpath does not address a module inside the data.
    #[error("No module at '{0}'")]
    NoSuchSubpath(String),

    /// Data looks like a module but is damaged.
    #[error("Corrupt module: {0}")]
    Corrupt(String),
}

/// Opened module.
pub trait Module: Send {
    /// Named metadata property, `default` when absent.
    fn property(&self, name: &str, default: &str) -> String;

    /// Playback duration.
    fn duration(&self) -> Duration;
}

/// Turns raw bytes into modules.
pub trait ModuleDecoder: Send + Sync {
    /// Opens the module at `subpath` inside `data` (empty for the whole data).
    fn open_module(&self, data: &[u8], subpath: &str) -> Result<Box<dyn Module>, DecodeError>;

    /// Reports every module found in `data` with its subpath.
    ///
    /// A single-module file is reported once with an empty subpath; a
    /// multi-song file once per song. Unrecognised data reports nothing.
    /// An error returned by `visitor` stops detection and is propagated.
    fn detect(
        &self,
        data: &[u8],
        visitor: &mut dyn FnMut(&str, Box<dyn Module>) -> VfsResult<()>,
    ) -> VfsResult<()>;
}
