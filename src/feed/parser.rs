use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;

/// One feed item as it came off the wire. Every field is optional because the
/// ODIN feed is not guaranteed to be well-formed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawFeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    /// Dedicated content body (`<content>` / `<content:encoded>`), when present.
    pub description: Option<String>,
    pub published: Option<String>,
}

impl RawFeedEntry {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.link.is_none()
            && self.summary.is_none()
            && self.description.is_none()
            && self.published.is_none()
    }
}

/// Result of parsing a feed body.
///
/// Parsing never fails outright: a body that is not a valid feed yields
/// whatever entries could be salvaged (possibly none) with `warning` set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub entries: Vec<RawFeedEntry>,
    /// Why the strict parse was rejected, if it was.
    pub warning: Option<String>,
}

impl ParsedFeed {
    pub fn has_warnings(&self) -> bool {
        self.warning.is_some()
    }

    /// A feed with no entries and the given warning.
    pub fn failed(warning: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            warning: Some(warning.into()),
        }
    }
}

/// Parses RSS, Atom or JSON Feed bytes into raw entries, in feed order.
///
/// Tries `feed-rs` first. If that rejects the document, falls back to a
/// non-validating scan that keeps every `<item>`/`<entry>` readable before the
/// markup breaks.
pub fn parse_feed(bytes: &[u8]) -> ParsedFeed {
    match feed_rs::parser::parse(bytes) {
        Ok(feed) => ParsedFeed {
            entries: feed.entries.into_iter().map(raw_entry).collect(),
            warning: None,
        },
        Err(e) => ParsedFeed {
            entries: salvage_entries(bytes),
            warning: Some(e.to_string()),
        },
    }
}

fn raw_entry(entry: feed_rs::model::Entry) -> RawFeedEntry {
    let published = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.to_rfc3339());

    RawFeedEntry {
        title: entry.title.and_then(|t| non_empty(t.content)),
        link: entry
            .links
            .into_iter()
            .next()
            .and_then(|l| non_empty(l.href)),
        summary: entry.summary.and_then(|s| non_empty(s.content)),
        description: entry.content.and_then(|c| c.body).and_then(non_empty),
        published,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
    Description,
    Published,
    Updated,
}

impl Field {
    fn from_tag(local_name: &[u8]) -> Option<Self> {
        match local_name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" | b"summary" => Some(Field::Summary),
            b"content" | b"encoded" => Some(Field::Description),
            b"pubDate" | b"published" | b"date" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            _ => None,
        }
    }
}

/// Entry being assembled by the salvage scan.
#[derive(Default)]
struct PartialEntry {
    entry: RawFeedEntry,
    updated: Option<String>,
}

impl PartialEntry {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.entry.title,
            Field::Link => &mut self.entry.link,
            Field::Summary => &mut self.entry.summary,
            Field::Description => &mut self.entry.description,
            Field::Published => &mut self.entry.published,
            Field::Updated => &mut self.updated,
        }
    }

    /// Opens `field` for text, or returns `None` when an earlier element
    /// already filled it. The first value wins.
    fn open(&mut self, field: Field, start: &BytesStart<'_>) -> Option<Field> {
        if self.slot(field).is_some() {
            return None;
        }
        if field == Field::Link {
            self.atom_link(start);
            if self.entry.link.is_some() {
                return None;
            }
        }
        Some(field)
    }

    /// Appends to the open element's value; text and CDATA runs inside one
    /// element are joined.
    fn push_text(&mut self, field: Field, text: &str) {
        self.slot(field).get_or_insert_with(String::new).push_str(text);
    }

    fn atom_link(&mut self, start: &BytesStart<'_>) {
        if self.entry.link.is_some() {
            return;
        }
        if let Ok(Some(href)) = start.try_get_attribute("href") {
            if let Ok(value) = href.unescape_value() {
                self.entry.link = non_empty(value.into_owned());
            }
        }
    }

    fn finish(self) -> Option<RawFeedEntry> {
        let mut entry = self.entry;
        if entry.published.is_none() {
            entry.published = self.updated;
        }
        entry.title = entry.title.and_then(non_empty);
        entry.link = entry.link.and_then(non_empty);
        entry.summary = entry.summary.and_then(non_empty);
        entry.description = entry.description.and_then(non_empty);
        entry.published = entry.published.and_then(non_empty);
        if entry.is_empty() {
            None
        } else {
            Some(entry)
        }
    }
}

/// Best-effort scan for items in a document `feed-rs` rejected.
///
/// End tag names are not checked, and the scan stops at the first hard XML
/// error, keeping what it collected so far (including the item in progress).
fn salvage_entries(bytes: &[u8]) -> Vec<RawFeedEntry> {
    let mut reader = Reader::from_reader(bytes);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut current: Option<PartialEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(entry) = current.take().and_then(PartialEntry::finish) {
                        entries.push(entry);
                    }
                    current = Some(PartialEntry::default());
                    field = None;
                }
                name => {
                    if let Some(partial) = current.as_mut() {
                        if let Some(f) = Field::from_tag(name) {
                            field = partial.open(f, &start);
                        }
                    }
                }
            },
            Ok(Event::Empty(start)) => {
                if let Some(partial) = current.as_mut() {
                    if start.local_name().as_ref() == b"link" {
                        partial.atom_link(&start);
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(partial), Some(f)) = (current.as_mut(), field) {
                    let decoded = match text.unescape() {
                        Ok(s) => s.into_owned(),
                        Err(_) => String::from_utf8_lossy(&text).into_owned(),
                    };
                    partial.push_text(f, &decoded);
                }
            }
            Ok(Event::CData(data)) => {
                if let (Some(partial), Some(f)) = (current.as_mut(), field) {
                    partial.push_text(f, &String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::End(end)) => match end.local_name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(entry) = current.take().and_then(PartialEntry::finish) {
                        entries.push(entry);
                    }
                    field = None;
                }
                name => {
                    if field.is_some() && Field::from_tag(name) == field {
                        field = None;
                    }
                }
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    position = reader.buffer_position(),
                    error = %e,
                    "Salvage scan stopped at malformed markup"
                );
                break;
            }
        }
        buf.clear();
    }

    if let Some(entry) = current.take().and_then(PartialEntry::finish) {
        entries.push(entry);
    }

    entries
}
