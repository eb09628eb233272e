//! Tabular results crossing the operation boundary.

use serde::Serialize;

use crate::vfs::{Extension, ExtensionId, VfsDir, VfsFile, VfsNode};

/// One row of a result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    Dir {
        uri: String,
        name: String,
        description: String,
        icon: Option<String>,
        tracks: Option<u32>,
        feed: bool,
    },
    File {
        uri: String,
        name: String,
        description: String,
        details: String,
        tracks: Option<u32>,
        cached: bool,
    },
    Parent {
        uri: String,
        name: String,
        icon: Option<String>,
    },
    Content {
        uri: String,
        name: String,
        size: u64,
        /// Local file holding the content, `None` if it was not persisted.
        path: Option<String>,
    },
    /// Marks the end of an incremental result stream.
    EndOfResults,
}

impl Row {
    pub fn dir(dir: &dyn VfsDir) -> Self {
        Row::Dir {
            uri: dir.uri().to_string(),
            name: dir.name(),
            description: dir.description(),
            icon: icon_of(dir),
            tracks: tracks_of(dir),
            feed: matches!(dir.extension(ExtensionId::Feed), Some(Extension::Feed)),
        }
    }

    /// File row; `cached` tells whether its remote content is already local.
    pub fn file(file: &dyn VfsFile, cached: bool) -> Self {
        Row::File {
            uri: file.uri().to_string(),
            name: file.name(),
            description: file.description(),
            details: file.details(),
            tracks: tracks_of(file),
            cached,
        }
    }

    pub fn parent(node: &dyn VfsNode) -> Self {
        Row::Parent {
            uri: node.uri().to_string(),
            name: node.name(),
            icon: icon_of(node),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Row::Dir { uri, .. }
            | Row::File { uri, .. }
            | Row::Parent { uri, .. }
            | Row::Content { uri, .. } => Some(uri),
            Row::EndOfResults => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Row::Dir { name, .. }
            | Row::File { name, .. }
            | Row::Parent { name, .. }
            | Row::Content { name, .. } => Some(name),
            Row::EndOfResults => None,
        }
    }
}

fn icon_of(node: &dyn VfsNode) -> Option<String> {
    match node.extension(ExtensionId::Icon) {
        Some(Extension::Icon(icon)) => Some(icon),
        _ => None,
    }
}

fn tracks_of(node: &dyn VfsNode) -> Option<u32> {
    match node.extension(ExtensionId::TrackCount) {
        Some(Extension::TrackCount(count)) => Some(count),
        _ => None,
    }
}

/// State of a query as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum QueryResult {
    /// Terminal: the complete result.
    Finished(Vec<Row>),
    /// Still running; `total == 0` means indeterminate.
    Progress { done: u64, total: u64 },
    /// Still running; rows produced since the previous poll.
    Partial(Vec<Row>),
    /// Terminal: the operation failed.
    Failed(String),
    /// Terminal: the operation was cancelled. Never reported as a failure.
    Cancelled,
}

impl QueryResult {
    /// Indeterminate progress.
    pub fn pending() -> Self {
        QueryResult::Progress { done: 0, total: 0 }
    }

    /// True if polling again cannot change the result.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryResult::Finished(_) | QueryResult::Failed(_) | QueryResult::Cancelled
        )
    }

    /// Rows carried by this result, if any.
    pub fn rows(&self) -> &[Row] {
        match self {
            QueryResult::Finished(rows) | QueryResult::Partial(rows) => rows,
            _ => &[],
        }
    }
}
