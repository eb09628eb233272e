//! Playlist files the scanner expands in place.
//!
//! Two formats are recognised by extension:
//!
//! - `.ayl`: the AY-Emul list. A signature line, then one path per line,
//!   each optionally followed by a `<` ... `>` block of `name=value`
//!   parameters. Paths are relative to the playlist with `\` separators.
//! - `.xspf`: XML Shareable Playlist Format, one `<location>` per `<track>`.
//!
//! Locations are resolved against the playlist's own URI. Entries that
//! look like an absolute Windows path (`C:\...`) cannot be located from
//! here and are skipped.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::catalog::xml::for_each_record;
use crate::vfs::{VfsError, VfsResult};

/// Signature prefix of AY-Emul playlists.
const AYL_SIGNATURE: &str = "ZX Spectrum Sound Chip Emulator Play List File";

const PARAMETERS_BEGIN: &str = "<";
const PARAMETERS_END: &str = ">";

/// Supported playlist formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Ayl,
    Xspf,
}

impl PlaylistKind {
    /// Format of a file named `name`, if it is a playlist.
    pub fn detect(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "ayl" => Some(PlaylistKind::Ayl),
            "xspf" => Some(PlaylistKind::Xspf),
            _ => None,
        }
    }
}

/// Locations referenced by the playlist at `base`, resolved to URIs.
pub fn parse(kind: PlaylistKind, base: &Url, data: &[u8]) -> VfsResult<Vec<Url>> {
    let locations = match kind {
        PlaylistKind::Ayl => ayl_locations(data)?,
        PlaylistKind::Xspf => xspf_locations(data)?,
    };
    let mut uris = Vec::with_capacity(locations.len());
    for location in locations {
        if is_drive_path(&location) {
            debug!(playlist = %base, location = %location, "Skipped absolute drive path");
            continue;
        }
        match resolve_location(base, &location) {
            Some(uri) => uris.push(uri),
            None => warn!(playlist = %base, location = %location, "Unresolvable playlist entry"),
        }
    }
    debug!(playlist = %base, entries = uris.len(), "Parsed playlist");
    Ok(uris)
}

fn ayl_locations(data: &[u8]) -> VfsResult<Vec<String>> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    match lines.next() {
        Some(first) if first.starts_with(AYL_SIGNATURE) => {}
        _ => return Err(VfsError::Parse("not an AYL playlist".to_string())),
    }

    let mut locations = Vec::new();
    let mut in_parameters = false;
    for line in lines {
        if in_parameters {
            in_parameters = line != PARAMETERS_END;
        } else if line == PARAMETERS_BEGIN {
            in_parameters = true;
        } else {
            locations.push(line.replace('\\', "/"));
        }
    }
    Ok(locations)
}

fn xspf_locations(data: &[u8]) -> VfsResult<Vec<String>> {
    let mut locations = Vec::new();
    for_each_record(data, "track", |track| {
        if let Some(location) = track.field("location") {
            locations.push(location.trim().to_string());
        }
        Ok(())
    })?;
    Ok(locations)
}

/// Windows absolute path with a drive letter, in either separator style.
fn is_drive_path(location: &str) -> bool {
    static DRIVE: OnceLock<Regex> = OnceLock::new();
    DRIVE
        .get_or_init(|| Regex::new(r"^[A-Za-z]:[\\/]").expect("drive path regex is valid"))
        .is_match(location)
}

fn resolve_location(base: &Url, location: &str) -> Option<Url> {
    // Absolute URIs carry a scheme of more than one letter
    if let Ok(uri) = Url::parse(location) {
        if uri.scheme().len() > 1 {
            return Some(uri);
        }
    }
    base.join(location).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("file:///music/lists/best.ayl").unwrap()
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(PlaylistKind::detect("best.AYL"), Some(PlaylistKind::Ayl));
        assert_eq!(PlaylistKind::detect("mix.xspf"), Some(PlaylistKind::Xspf));
        assert_eq!(PlaylistKind::detect("tune.pt3"), None);
        assert_eq!(PlaylistKind::detect("noext"), None);
    }

    #[test]
    fn test_ayl_with_parameters() {
        let data = "ZX Spectrum Sound Chip Emulator Play List File v1.\r\n\
            <\r\nChipType=AY\r\n>\r\n\
            ..\\tunes\\one.pt3\r\n\
            <\r\nName=One\r\nAuthor=Someone\r\n>\r\n\
            two.stc\r\n";
        let uris = parse(PlaylistKind::Ayl, &base(), data.as_bytes()).unwrap();
        let uris: Vec<_> = uris.iter().map(Url::as_str).collect();
        assert_eq!(
            uris,
            vec!["file:///music/tunes/one.pt3", "file:///music/lists/two.stc"]
        );
    }

    #[test]
    fn test_ayl_skips_drive_paths() {
        let data = "ZX Spectrum Sound Chip Emulator Play List File v1.\n\
            C:\\Games\\tune.pt3\n\
            d:/other/tune.pt2\n\
            tune.ay\n";
        let uris = parse(PlaylistKind::Ayl, &base(), data.as_bytes()).unwrap();
        assert_eq!(uris.len(), 1);
        assert_eq!(uris[0].as_str(), "file:///music/lists/tune.ay");
    }

    #[test]
    fn test_ayl_requires_signature() {
        let result = parse(PlaylistKind::Ayl, &base(), b"just some text\nfile.pt3\n");
        assert!(matches!(result, Err(VfsError::Parse(_))));
    }

    #[test]
    fn test_xspf_locations() {
        let data = r#"<?xml version="1.0" encoding="UTF-8"?>
<playlist version="1" xmlns="http://xspf.org/ns/0/">
  <trackList>
    <track><location>tunes/first%20song.pt3</location><title>First</title></track>
    <track><location>file:///abs/second.ay</location></track>
    <track><title>No location</title></track>
    <track><location>zxart:/authors/Nik-O/x.pt3?author=1&amp;track=2</location></track>
  </trackList>
</playlist>"#;
        let base = Url::parse("file:///music/mix.xspf").unwrap();
        let uris = parse(PlaylistKind::Xspf, &base, data.as_bytes()).unwrap();
        let uris: Vec<_> = uris.iter().map(Url::as_str).collect();
        assert_eq!(
            uris,
            vec![
                "file:///music/tunes/first%20song.pt3",
                "file:///abs/second.ay",
                "zxart:/authors/Nik-O/x.pt3?author=1&track=2",
            ]
        );
    }
}
