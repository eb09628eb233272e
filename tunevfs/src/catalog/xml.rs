//! Record extraction from the XML catalog APIs.
//!
//! Both remote catalogs answer with flat lists of records such as
//!
//! ```xml
//! <author id="12"><nickname>Nik-O</nickname><name>Nikolay</name></author>
//! ```
//!
//! [`for_each_record`] walks the document and yields one [`XmlRecord`] per
//! element with the requested tag, carrying its attributes and the text of
//! its descendants keyed by their path relative to the record.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::vfs::{VfsError, VfsResult};

/// One record element.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XmlRecord {
    attributes: HashMap<String, String>,
    fields: Vec<(String, String)>,
}

impl XmlRecord {
    /// Attribute of the record element.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Text of the first descendant at `path` (e.g. `title` or `authors/id`).
    pub fn field(&self, path: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == path)
            .map(|(_, value)| value.as_str())
    }

    /// Text of the field, or an empty string.
    pub fn text(&self, path: &str) -> String {
        self.field(path).unwrap_or_default().to_string()
    }

    /// Texts of every descendant at `path`.
    pub fn fields<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(key, _)| key == path)
            .map(|(_, value)| value.as_str())
    }

    /// Numeric id taken from attribute `id` or field `id`.
    pub fn id(&self) -> Option<u32> {
        self.attribute("id")
            .or_else(|| self.field("id"))
            .and_then(|v| v.trim().parse().ok())
    }

    /// Field parsed as an unsigned number.
    pub fn number(&self, path: &str) -> Option<u32> {
        self.field(path).and_then(|v| v.trim().parse().ok())
    }
}

/// Calls `visitor` for every element named `tag` in `data`.
pub fn for_each_record<F>(data: &[u8], tag: &str, mut visitor: F) -> VfsResult<()>
where
    F: FnMut(XmlRecord) -> VfsResult<()>,
{
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    // Path below the current record, empty when outside one
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<XmlRecord> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| VfsError::Parse(format!("XML at {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(element) => {
                let name = element_name(&element);
                if current.is_some() {
                    path.push(name);
                } else if name == tag {
                    current = Some(start_record(&element));
                }
            }
            Event::Empty(element) => {
                if current.is_none() && element_name(&element) == tag {
                    visitor(start_record(&element))?;
                }
            }
            Event::Text(text) => {
                if let Some(record) = current.as_mut().filter(|_| !path.is_empty()) {
                    let value = text
                        .unescape()
                        .map_err(|e| VfsError::Parse(format!("XML text: {}", e)))?;
                    record.fields.push((path.join("/"), value.into_owned()));
                }
            }
            Event::CData(data) => {
                if let Some(record) = current.as_mut().filter(|_| !path.is_empty()) {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    record.fields.push((path.join("/"), value));
                }
            }
            Event::End(_) => {
                if current.is_some() {
                    if path.pop().is_none() {
                        if let Some(record) = current.take() {
                            visitor(record)?;
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Text of the first element named `tag`, wherever it is nested.
///
/// Used for document-level values such as page counts that sit outside
/// any record.
pub fn first_text(data: &[u8], tag: &str) -> VfsResult<Option<String>> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut inside = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| VfsError::Parse(format!("XML at {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(element) => inside = element_name(&element) == tag,
            Event::Empty(element) if element_name(&element) == tag => {
                return Ok(Some(String::new()))
            }
            Event::Text(text) if inside => {
                let value = text
                    .unescape()
                    .map_err(|e| VfsError::Parse(format!("XML text: {}", e)))?;
                return Ok(Some(value.into_owned()));
            }
            Event::End(_) if inside => return Ok(Some(String::new())),
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn start_record(element: &BytesStart<'_>) -> XmlRecord {
    let attributes = element
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            (key, value)
        })
        .collect();
    XmlRecord {
        attributes,
        fields: Vec::new(),
    }
}
