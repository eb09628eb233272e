//! Addressing scheme for VFS objects and archive members.
//!
//! An [`Identifier`] is a URI whose fragment, when present, names an item
//! inside the object addressed by the rest of the URI. The part without the
//! fragment is the *data* URI, the fragment is the *subpath*:
//!
//! ```text
//! file:///music/pack.zip#coop-Jeffie/bass%20sorrow.pt3
//! \______________________/ \__________________________/
//!          data                      subpath
//! ```
//!
//! Identifiers are plain values: deriving a new one never mutates the source.
//!
//! # Example
//!
//! ```
//! use tunevfs::identifier::Identifier;
//!
//! let id = Identifier::parse("file:///a.zip#track2").unwrap();
//! assert_eq!(id.data().as_str(), "file:///a.zip");
//! assert_eq!(id.subpath(), "track2");
//!
//! let next = id.with_subpath("track3");
//! assert_eq!(next.to_string(), "file:///a.zip#track3");
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Separator between nested subpath components.
pub const SUBPATH_DELIMITER: char = '/';

/// Errors produced while parsing an identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The string is not a valid absolute URI.
    #[error("Invalid identifier '{input}': {reason}")]
    InvalidUri { input: String, reason: String },
}

/// URI with an optional subpath addressing an item inside a container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    full: Url,
    data: Url,
    subpath: String,
}

impl Identifier {
    /// Parses an identifier from its string form.
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let url = Url::parse(input).map_err(|e| IdentifierError::InvalidUri {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_url(url))
    }

    /// Splits an already parsed URI into data and subpath.
    pub fn from_url(url: Url) -> Self {
        let subpath = url.fragment().map(decode_fragment).unwrap_or_default();
        let mut data = url;
        data.set_fragment(None);
        Self::new(data, &subpath)
    }

    /// Composes an identifier from a data URI and a subpath.
    ///
    /// Any fragment already present on `data` is dropped.
    pub fn new(data: Url, subpath: &str) -> Self {
        let mut data = data;
        data.set_fragment(None);
        let subpath = normalize_subpath(subpath);
        let mut full = data.clone();
        if !subpath.is_empty() {
            full.set_fragment(Some(&encode_fragment(&subpath)));
        }
        Self {
            full,
            data,
            subpath,
        }
    }

    /// Full URI, data plus encoded subpath.
    pub fn full(&self) -> &Url {
        &self.full
    }

    /// URI of the underlying data object.
    pub fn data(&self) -> &Url {
        &self.data
    }

    /// Subpath inside the data object, empty when the identifier is plain.
    pub fn subpath(&self) -> &str {
        &self.subpath
    }

    /// Returns true if the identifier addresses an item inside a container.
    pub fn has_subpath(&self) -> bool {
        !self.subpath.is_empty()
    }

    /// Derives an identifier with the same data URI and another subpath.
    pub fn with_subpath(&self, subpath: &str) -> Self {
        Self::new(self.data.clone(), subpath)
    }

    /// Derives an identifier addressing `child` below the current subpath.
    pub fn join_subpath(&self, child: &str) -> Self {
        if self.subpath.is_empty() {
            self.with_subpath(child)
        } else if child.is_empty() {
            self.clone()
        } else {
            self.with_subpath(&format!("{}{}{}", self.subpath, SUBPATH_DELIMITER, child))
        }
    }

    /// Last meaningful name component, used for display.
    ///
    /// For `file:///a.zip#dir/b.pt3` this is `b.pt3`; for a plain
    /// identifier it is the last path segment of the data URI.
    pub fn display_name(&self) -> String {
        if let Some(last) = self
            .subpath
            .rsplit(SUBPATH_DELIMITER)
            .find(|s| !s.is_empty())
        {
            return last.to_string();
        }
        last_path_segment(&self.data)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Url> for Identifier {
    fn from(url: Url) -> Self {
        Self::from_url(url)
    }
}

/// Decoded last non-empty path segment of `url`, or an empty string.
pub fn last_path_segment(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(decode_fragment)
        .unwrap_or_default()
}

/// Escapes `%` so that the fragment decodes back to `subpath`.
///
/// `Url::set_fragment` percent-encodes spaces and controls but keeps `%`
/// literal, which decoding would otherwise treat as an escape.
fn encode_fragment(subpath: &str) -> String {
    subpath.replace('%', "%25")
}

fn decode_fragment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn normalize_subpath(subpath: &str) -> String {
    subpath.trim_matches(SUBPATH_DELIMITER).to_string()
}
