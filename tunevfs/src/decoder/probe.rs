//! Header-probing decoder for common chiptune formats.
//!
//! Recognised formats:
//!
//! | Format  | Signature          | Songs | Metadata             | Duration        |
//! |---------|--------------------|-------|----------------------|-----------------|
//! | PSID    | `PSID` / `RSID`    | many  | title, author        | default         |
//! | NSF     | `NESM\x1a`         | many  | title, artist        | default         |
//! | AY      | `ZXAYEMUL`         | many  | author               | default         |
//! | PT3     | `ProTracker 3.`    | one   | title, author        | default         |
//! | VGM     | `Vgm `             | one   | none                 | sample count    |
//! | PSG     | `PSG\x1a`          | one   | none                 | default         |
//!
//! Songs of multi-song files are addressed by the subpath `#<n>` (1-based).

use std::time::Duration;

use super::{DecodeError, Module, ModuleDecoder, PROPERTY_AUTHOR, PROPERTY_TITLE, PROPERTY_TYPE};
use crate::vfs::VfsResult;

/// Duration reported when the format does not carry one.
pub const DEFAULT_MODULE_DURATION: Duration = Duration::from_secs(180);

const VGM_SAMPLE_RATE: u64 = 44_100;

/// Module described by its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedModule {
    pub format: &'static str,
    pub title: String,
    pub author: String,
    pub duration: Duration,
    /// 1-based song index for multi-song files.
    pub song: Option<u32>,
}

impl Module for ProbedModule {
    fn property(&self, name: &str, default: &str) -> String {
        let value = match name {
            PROPERTY_TITLE => &self.title,
            PROPERTY_AUTHOR => &self.author,
            PROPERTY_TYPE => self.format,
            _ => "",
        };
        if value.is_empty() {
            default.to_string()
        } else {
            value.to_string()
        }
    }

    fn duration(&self) -> Duration {
        self.duration
    }
}

/// Header-level parse result before song selection.
struct Header {
    format: &'static str,
    title: String,
    author: String,
    duration: Duration,
    songs: u32,
}

/// Decoder that identifies modules by header signatures.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeDecoder;

impl ProbeDecoder {
    pub fn new() -> Self {
        Self
    }

    fn probe(data: &[u8]) -> Option<Header> {
        if data.starts_with(b"PSID") || data.starts_with(b"RSID") {
            return probe_sid(data);
        }
        if data.starts_with(b"NESM\x1a") {
            return probe_nsf(data);
        }
        if data.starts_with(b"ZXAYEMUL") {
            return probe_ay(data);
        }
        if data.starts_with(b"ProTracker 3.") {
            return Some(Header {
                format: "PT3",
                title: fixed_string(data, 0x1e, 32),
                author: fixed_string(data, 0x42, 32),
                duration: DEFAULT_MODULE_DURATION,
                songs: 1,
            });
        }
        if data.starts_with(b"Vgm ") {
            let samples = read_u32_le(data, 0x18)? as u64;
            return Some(Header {
                format: "VGM",
                title: String::new(),
                author: String::new(),
                duration: Duration::from_millis(samples * 1000 / VGM_SAMPLE_RATE),
                songs: 1,
            });
        }
        if data.starts_with(b"PSG\x1a") {
            return Some(Header {
                format: "PSG",
                title: String::new(),
                author: String::new(),
                duration: DEFAULT_MODULE_DURATION,
                songs: 1,
            });
        }
        None
    }
}

impl ModuleDecoder for ProbeDecoder {
    fn open_module(&self, data: &[u8], subpath: &str) -> Result<Box<dyn Module>, DecodeError> {
        let header = Self::probe(data).ok_or(DecodeError::Unsupported)?;
        let song = parse_song(subpath)?;
        match song {
            None => Ok(Box::new(make_module(&header, None))),
            Some(index) if index >= 1 && index <= header.songs && header.songs > 1 => {
                Ok(Box::new(make_module(&header, Some(index))))
            }
            Some(_) => Err(DecodeError::NoSuchSubpath(subpath.to_string())),
        }
    }

    fn detect(
        &self,
        data: &[u8],
        visitor: &mut dyn FnMut(&str, Box<dyn Module>) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let Some(header) = Self::probe(data) else {
            return Ok(());
        };
        if header.songs <= 1 {
            return visitor("", Box::new(make_module(&header, None)));
        }
        for index in 1..=header.songs {
            visitor(&song_subpath(index), Box::new(make_module(&header, Some(index))))?;
        }
        Ok(())
    }
}

/// Subpath addressing song `index` of a multi-song file.
pub fn song_subpath(index: u32) -> String {
    format!("#{}", index)
}

fn parse_song(subpath: &str) -> Result<Option<u32>, DecodeError> {
    if subpath.is_empty() {
        return Ok(None);
    }
    subpath
        .strip_prefix('#')
        .and_then(|n| n.parse::<u32>().ok())
        .map(Some)
        .ok_or_else(|| DecodeError::NoSuchSubpath(subpath.to_string()))
}

fn make_module(header: &Header, song: Option<u32>) -> ProbedModule {
    ProbedModule {
        format: header.format,
        title: header.title.clone(),
        author: header.author.clone(),
        duration: header.duration,
        song,
    }
}

fn probe_sid(data: &[u8]) -> Option<Header> {
    Some(Header {
        format: if data.starts_with(b"RSID") { "RSID" } else { "PSID" },
        title: fixed_string(data, 0x16, 32),
        author: fixed_string(data, 0x36, 32),
        duration: DEFAULT_MODULE_DURATION,
        songs: read_u16_be(data, 0x0e)?.max(1) as u32,
    })
}

fn probe_nsf(data: &[u8]) -> Option<Header> {
    Some(Header {
        format: "NSF",
        title: fixed_string(data, 0x0e, 32),
        author: fixed_string(data, 0x2e, 32),
        duration: DEFAULT_MODULE_DURATION,
        songs: (*data.get(0x06)?).max(1) as u32,
    })
}

fn probe_ay(data: &[u8]) -> Option<Header> {
    // Pointers are big-endian offsets relative to their own position
    let author = read_u16_be(data, 0x0c)
        .map(|offset| 0x0c + offset as i16 as isize)
        .filter(|&pos| pos > 0)
        .map(|pos| zero_terminated(data, pos as usize))
        .unwrap_or_default();
    Some(Header {
        format: "AY",
        title: String::new(),
        author,
        duration: DEFAULT_MODULE_DURATION,
        songs: *data.get(0x10)? as u32 + 1,
    })
}

fn fixed_string(data: &[u8], offset: usize, len: usize) -> String {
    let end = (offset + len).min(data.len());
    if offset >= end {
        return String::new();
    }
    let raw = &data[offset..end];
    let raw = raw.split(|&b| b == 0).next().unwrap_or(raw);
    String::from_utf8_lossy(raw).trim().to_string()
}

fn zero_terminated(data: &[u8], offset: usize) -> String {
    fixed_string(data, offset, data.len().saturating_sub(offset))
}

fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
