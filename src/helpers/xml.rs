//! XML reading utilities shared by the XLSX and ODS readers.
//! Wraps `quick_xml::Reader` with a reusable buffer and adds small helper
//! traits for attribute lookup and text accumulation.

use crate::error::RecordsError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Unknown XML entity '&{0};'")]
    UnknownEntity(String),

    #[error("Invalid value '{value}' for attribute '{name}'")]
    InvalidAttributeValue { name: String, value: String },
}

/// Streaming XML reader configured for spreadsheet parts.
///
/// Empty elements are expanded into start/end pairs so callers only ever
/// match on `Start` and `End`.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(source: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);
        XmlReader {
            reader,
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Reads the next event, `None` at end of input.
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, RecordsError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer)? {
            Event::Eof => Ok(None),
            event => Ok(Some(event)),
        }
    }

    /// Consumes events up to and including the end tag `name`,
    /// used to skip annotations and other subtrees we never read.
    pub(crate) fn skip_to_end(&mut self, name: QName<'_>) -> Result<(), RecordsError> {
        let mut depth = 0usize;
        while let Some(event) = self.next()? {
            match event {
                Event::Start(event) if event.name() == name => depth += 1,
                Event::End(event) if event.name() == name => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => (),
            }
        }
        Ok(())
    }
}

pub(crate) trait AttributeValue<'a> {
    /// Unescaped attribute value.
    fn text(&self) -> Result<Cow<'a, str>, RecordsError>;

    /// Attribute value parsed with `FromStr`.
    fn parse<T: FromStr>(&self) -> Result<T, RecordsError>;
}

impl<'a> AttributeValue<'a> for Attribute<'a> {
    fn text(&self) -> Result<Cow<'a, str>, RecordsError> {
        Ok(self.unescape_value()?)
    }

    fn parse<T: FromStr>(&self) -> Result<T, RecordsError> {
        let text = self.text()?;
        text.parse().map_err(|_| {
            RecordsError::XmlHelperError(XmlError::InvalidAttributeValue {
                name: String::from_utf8_lossy(self.key.as_ref()).into_owned(),
                value: text.to_string(),
            })
        })
    }
}

pub(crate) trait StartTagExt<'a> {
    /// Value of the named attribute, if present.
    fn attribute(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RecordsError>;

    /// Parsed value of the named attribute, if present.
    fn parse_attribute<T: FromStr>(&self, name: &str) -> Result<Option<T>, RecordsError>;
}

impl<'a> StartTagExt<'a> for BytesStart<'a> {
    fn attribute(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RecordsError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.text())
            .transpose()
    }

    fn parse_attribute<T: FromStr>(&self, name: &str) -> Result<Option<T>, RecordsError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse())
            .transpose()
    }
}

/// Accumulates character data, resolving entity and character references.
pub(crate) trait TextSink {
    fn push_text(&mut self, text: &BytesText) -> Result<(), RecordsError>;

    fn push_reference(&mut self, reference: &BytesRef) -> Result<(), RecordsError>;
}

impl TextSink for String {
    fn push_text(&mut self, text: &BytesText) -> Result<(), RecordsError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_reference(&mut self, reference: &BytesRef) -> Result<(), RecordsError> {
        let raw = reference.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::UnknownEntity(raw.to_string()))?;
        }
        Ok(())
    }
}

/// Loops over the events of an [`XmlReader`], dispatching to the given arms
/// and ignoring every event no arm matches.
#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(event) = $reader.next()? {
            match event {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_xml_events;

    fn reader(xml: &str) -> XmlReader<&[u8]> {
        XmlReader::new(xml.as_bytes())
    }

    #[test]
    fn attributes_and_text() -> Result<(), RecordsError> {
        let mut reader = reader(r#"<root><item id="7" name="a &amp; b">x &lt; y &#65;&#x42;</item></root>"#);
        let mut id = None::<u32>;
        let mut name = String::new();
        let mut text = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == QName(b"item") => {
                id = event.parse_attribute("id")?;
                name = event.attribute("name")?.unwrap_or_default().to_string();
            }
            Event::Text(event) => text.push_text(&event)?,
            Event::GeneralRef(event) => text.push_reference(&event)?,
        });
        assert_eq!(id, Some(7));
        assert_eq!(name, "a & b");
        assert_eq!(text, "x < y AB");
        Ok(())
    }

    #[test]
    fn empty_elements_are_expanded() -> Result<(), RecordsError> {
        let mut reader = reader(r#"<row><c r="A1"/></row>"#);
        let mut ends = 0;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == QName(b"c") => ends += 1,
        });
        assert_eq!(ends, 1);
        Ok(())
    }

    #[test]
    fn skip_nested_subtree() -> Result<(), RecordsError> {
        let mut reader = reader("<a><note><note>inner</note>outer</note><b>kept</b></a>");
        let mut text = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == QName(b"note") => reader.skip_to_end(QName(b"note"))?,
            Event::Text(event) => text.push_text(&event)?,
        });
        assert_eq!(text, "kept");
        Ok(())
    }

    #[test]
    fn invalid_attribute_value() {
        let mut reader = reader(r#"<c n="abc"/>"#);
        let result: Result<(), RecordsError> = (|| {
            match_xml_events!(reader => {
                Event::Start(event) => {
                    event.parse_attribute::<u32>("n")?;
                }
            });
            Ok(())
        })();
        assert!(result.is_err());
    }
}
