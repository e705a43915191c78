//! Streaming entry decoder
//!
//! Pulls `Record` elements out of a health export one at a time:
//!
//! ```text
//! <HealthData locale="en_US">
//!   <ExportDate value="2024-05-01 09:00:00 +0200"/>
//!   <Record type="HKQuantityTypeIdentifierHeartRate" startDate="..." ...>
//!     <MetadataEntry key="HKMetadataKeyHeartRateMotionContext" value="0"/>
//!   </Record>
//!   ...
//! </HealthData>
//! ```
//!
//! Only the current entry (its attributes and direct children) is held in
//! memory. The read buffer is reused between events, and grandchildren of an
//! entry are read past without being kept.

use futures::Stream;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::trace;

use crate::error::IngestError;

/// Element name of one entry
pub const ENTRY_TAG: &[u8] = b"Record";

const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Attribute bag of one entry plus its direct children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Byte offset of the entry's start tag in the document
    pub position: u64,
    pub attributes: HashMap<String, String>,
    pub children: Vec<RawChild>,
}

impl RawEntry {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A direct child element of an entry, e.g. `MetadataEntry`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawChild {
    pub name: String,
    pub attributes: HashMap<String, String>,
}

impl RawChild {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// What one top-level event means for the decoder
enum Step {
    EntryOpened(HashMap<String, String>),
    EntryClosed(HashMap<String, String>),
    Opened,
    Leaf,
    Closed,
    /// Character data that is not just whitespace
    Text,
    Eof,
    Other,
}

/// Single forward pass over a document. Re-open the source to start over.
pub struct EntryDecoder<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    /// Open elements outside of any entry
    depth: usize,
    saw_root: bool,
    root_closed: bool,
    finished: bool,
    entries_read: u64,
}

impl EntryDecoder<BufReader<File>> {
    /// Open a staged file for decoding
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self::new(BufReader::with_capacity(READ_BUFFER_CAPACITY, file)))
    }
}

impl<R: AsyncBufRead + Unpin> EntryDecoder<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::with_capacity(4096),
            depth: 0,
            saw_root: false,
            root_closed: false,
            finished: false,
            entries_read: 0,
        }
    }

    /// Number of entries yielded so far
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Next entry in document order, or `None` once the document is done.
    ///
    /// Any syntax problem is a [`IngestError::MalformedDocument`]; after an
    /// error the decoder must not be polled again.
    pub async fn next_entry(&mut self) -> Result<Option<RawEntry>, IngestError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            self.buf.clear();
            let position = self.position();

            // Copy what is needed out of the event so the buffer borrow ends here
            let step = match self.reader.read_event_into_async(&mut self.buf).await {
                Ok(Event::Start(start)) if start.local_name().as_ref() == ENTRY_TAG => {
                    Step::EntryOpened(read_attributes(&start, position)?)
                },
                Ok(Event::Empty(start)) if start.local_name().as_ref() == ENTRY_TAG => {
                    Step::EntryClosed(read_attributes(&start, position)?)
                },
                Ok(Event::Start(_)) => Step::Opened,
                Ok(Event::Empty(_)) => Step::Leaf,
                Ok(Event::End(_)) => Step::Closed,
                Ok(Event::Text(text)) if !is_blank(&text) => Step::Text,
                Ok(Event::CData(_)) => Step::Text,
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Other,
                Err(e) => return Err(IngestError::malformed(position, e.to_string())),
            };

            match step {
                Step::EntryOpened(_) | Step::EntryClosed(_) if self.depth == 0 => {
                    return Err(self.fail(position, "Record outside of a root element"));
                },
                Step::EntryOpened(attributes) => {
                    let children = self.read_children(position).await?;
                    return Ok(Some(self.emit(position, attributes, children)));
                },
                Step::EntryClosed(attributes) => {
                    return Ok(Some(self.emit(position, attributes, Vec::new())));
                },
                Step::Opened | Step::Leaf if self.root_closed => {
                    return Err(self.fail(position, "content after root element"));
                },
                Step::Opened => {
                    self.saw_root = true;
                    self.depth += 1;
                },
                Step::Leaf => {
                    self.saw_root = true;
                    if self.depth == 0 {
                        self.root_closed = true;
                    }
                },
                Step::Closed => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.root_closed = true;
                    }
                },
                Step::Text if self.depth == 0 => {
                    return Err(self.fail(position, "text outside of the root element"));
                },
                Step::Eof => {
                    self.finished = true;
                    if self.depth > 0 {
                        return Err(IngestError::malformed(
                            position,
                            format!("document ended with {} unclosed element(s)", self.depth),
                        ));
                    }
                    if !self.saw_root {
                        return Err(IngestError::malformed(position, "document has no root element"));
                    }
                    return Ok(None);
                },
                Step::Text | Step::Other => {},
            }
        }
    }

    /// Adapt the decoder into a `Stream` of entries
    pub fn into_stream(self) -> impl Stream<Item = Result<RawEntry, IngestError>> {
        futures::stream::try_unfold(self, |mut decoder| async move {
            Ok(decoder.next_entry().await?.map(|entry| (entry, decoder)))
        })
    }

    /// Read up to the entry's end tag, keeping only direct children
    async fn read_children(&mut self, entry_position: u64) -> Result<Vec<RawChild>, IngestError> {
        let mut children = Vec::new();
        let mut nested = 0usize;

        loop {
            self.buf.clear();
            let position = self.position();
            let event = match self.reader.read_event_into_async(&mut self.buf).await {
                Ok(event) => event,
                Err(e) => return Err(IngestError::malformed(position, e.to_string())),
            };

            match event {
                Event::Start(child) => {
                    if nested == 0 {
                        children.push(read_child(&child, position)?);
                    }
                    nested += 1;
                },
                Event::Empty(child) => {
                    if nested == 0 {
                        children.push(read_child(&child, position)?);
                    }
                },
                Event::End(_) => {
                    if nested == 0 {
                        return Ok(children);
                    }
                    nested -= 1;
                },
                Event::Eof => {
                    self.finished = true;
                    return Err(IngestError::malformed(
                        position,
                        format!("document ended inside the Record starting at byte {entry_position}"),
                    ));
                },
                _ => {},
            }
        }
    }

    fn emit(
        &mut self,
        position: u64,
        attributes: HashMap<String, String>,
        children: Vec<RawChild>,
    ) -> RawEntry {
        self.entries_read += 1;
        trace!(position, children = children.len(), "decoded entry");
        RawEntry {
            position,
            attributes,
            children,
        }
    }

    fn position(&self) -> u64 {
        self.reader.buffer_position()
    }

    fn fail(&mut self, position: u64, detail: &str) -> IngestError {
        self.finished = true;
        IngestError::malformed(position, detail)
    }
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn read_child(start: &BytesStart<'_>, position: u64) -> Result<RawChild, IngestError> {
    Ok(RawChild {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes: read_attributes(start, position)?,
    })
}

fn read_attributes(
    start: &BytesStart<'_>,
    position: u64,
) -> Result<HashMap<String, String>, IngestError> {
    let mut attributes = HashMap::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| IngestError::malformed(position, e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| IngestError::malformed(position, e.to_string()))?
            .into_owned();
        attributes.insert(key, value);
    }

    Ok(attributes)
}
