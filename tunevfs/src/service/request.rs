//! Requests accepted by the query dispatcher.

use std::fmt;

use url::Url;

/// Kind of a VFS query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Single object.
    Resolve,
    /// Sorted children of a dir.
    Listing,
    /// Chain from the top-level root down to the object.
    Parents,
    /// Incremental search below a dir.
    Search,
    /// Materialized file content.
    File,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Resolve => "resolve",
            RequestKind::Listing => "listing",
            RequestKind::Parents => "parents",
            RequestKind::Search => "search",
            RequestKind::File => "file",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query against the VFS.
///
/// Two requests with the same [`key`](Request::key) share one running
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    pub kind: RequestKind,
    pub uri: Url,
    /// Search text; ignored by the other kinds.
    pub query: Option<String>,
}

impl Request {
    pub fn new(kind: RequestKind, uri: Url) -> Self {
        Self {
            kind,
            uri,
            query: None,
        }
    }

    pub fn resolve(uri: Url) -> Self {
        Self::new(RequestKind::Resolve, uri)
    }

    pub fn listing(uri: Url) -> Self {
        Self::new(RequestKind::Listing, uri)
    }

    pub fn parents(uri: Url) -> Self {
        Self::new(RequestKind::Parents, uri)
    }

    pub fn search(uri: Url, query: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Search,
            uri,
            query: Some(query.into()),
        }
    }

    pub fn file(uri: Url) -> Self {
        Self::new(RequestKind::File, uri)
    }

    /// Registry key of the operation serving this request.
    pub fn key(&self) -> String {
        match (&self.kind, &self.query) {
            (RequestKind::Search, Some(query)) => {
                format!("{} {} {}", self.kind, self.uri, query)
            }
            _ => format!("{} {}", self.kind, self.uri),
        }
    }
}
