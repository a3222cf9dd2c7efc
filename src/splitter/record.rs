use crate::constants::{COUNTRY_CODE_ATTR, ENTITY_TAG, SENTINEL_COUNTRY};
use crate::errors::{AppError, AppResult};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::writer::Writer;
use std::io::Cursor;

/// One directory record, ready to be handed to the partition writer.
///
/// `inner` holds the record's descendant events serialized back
/// byte-for-byte; it is never re-parsed after capture. The record is
/// written out immediately and dropped.
#[derive(Debug)]
pub struct Record {
    /// Derived 2-letter code, uppercased, or the `"XX"` sentinel.
    pub country_code: String,
    /// Element name as it appeared in the source document.
    pub name: String,
    /// Attributes of the record element, values unescaped.
    pub attributes: Vec<(String, String)>,
    /// Raw serialized inner content of the record element.
    pub inner: Vec<u8>,
}

impl Record {
    /// Builds a record from a self-closing record element.
    ///
    /// Such a record has no descendants, so no country code can be
    /// derived and it is routed to the sentinel partition.
    pub fn from_empty(event: &BytesStart) -> AppResult<Self> {
        Ok(Self {
            country_code: SENTINEL_COUNTRY.to_string(),
            name: decode_utf8(event.name().as_ref())?.to_string(),
            attributes: collect_attributes(event)?,
            inner: Vec::new(),
        })
    }
}

/// Normalizes a raw country code: trimmed and uppercased, with missing
/// or empty values mapped to the sentinel.
pub fn normalize_country_code(raw: Option<&str>) -> String {
    match raw {
        Some(code) => {
            let trimmed = code.trim();
            if trimmed.is_empty() {
                SENTINEL_COUNTRY.to_string()
            } else {
                trimmed.to_uppercase()
            }
        }
        None => SENTINEL_COUNTRY.to_string(),
    }
}

/// Decodes a byte slice that the system will re-serialize. The export
/// is UTF-8 only; anything else aborts the run.
pub(crate) fn decode_utf8(bytes: &[u8]) -> AppResult<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| AppError::MalformedInput(format!("Invalid UTF-8 in input: {e}")))
}

/// Decodes the attributes of a start tag, unescaping each value.
pub(crate) fn collect_attributes(event: &BytesStart) -> AppResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in event.attributes() {
        let attr =
            attr.map_err(|e| AppError::MalformedInput(format!("Invalid attribute: {e}")))?;
        let key = decode_utf8(attr.key.as_ref())?.to_string();
        let raw = decode_utf8(&attr.value)?;
        let value = unescape(raw)
            .map_err(|e| AppError::MalformedInput(format!("Invalid attribute value: {e}")))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

/// State for one record element currently being captured.
struct CaptureState {
    name: String,
    attributes: Vec<(String, String)>,
    depth: u32,
    writer: Writer<Cursor<Vec<u8>>>,
    entity_seen: bool,
    country: Option<String>,
}

/// Captures one record element at a time from the event stream.
///
/// On a start tag matching the record tag, every subsequent event is
/// written into an in-memory buffer until the matching end tag, which
/// preserves the original serialization of the subtree. While
/// capturing, the first element whose local name is `entity` supplies
/// the `countrycode` attribute; events arrive in document order, so
/// this is the depth-first first match over the subtree.
pub struct RecordCapture {
    record_tag: Vec<u8>,
    state: Option<CaptureState>,
}

impl RecordCapture {
    pub fn new(record_tag: &str) -> Self {
        Self {
            record_tag: record_tag.as_bytes().to_vec(),
            state: None,
        }
    }

    /// Returns true if currently inside a record element.
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Returns true if the given tag name is the configured record tag.
    pub fn matches(&self, name: &[u8]) -> bool {
        name == self.record_tag.as_slice()
    }

    /// Begins capturing at the record's own start tag.
    ///
    /// The start tag itself is not buffered; only descendant events
    /// are, so the buffer ends up holding exactly the inner content.
    pub fn start(&mut self, event: &BytesStart) -> AppResult<()> {
        if self.state.is_some() {
            return Err(AppError::MalformedInput(format!(
                "Nested record element <{}> inside a record",
                String::from_utf8_lossy(&self.record_tag)
            )));
        }

        self.state = Some(CaptureState {
            name: decode_utf8(event.name().as_ref())?.to_string(),
            attributes: collect_attributes(event)?,
            depth: 1,
            writer: Writer::new(Cursor::new(Vec::with_capacity(4 * 1024))),
            entity_seen: false,
            country: None,
        });
        Ok(())
    }

    /// Handles a nested start tag while capturing.
    pub fn handle_start(&mut self, event: BytesStart<'_>) -> AppResult<()> {
        if let Some(ref mut state) = self.state {
            inspect_entity(state, &event)?;
            state.depth += 1;
            write_buffered(state, Event::Start(event))?;
        }
        Ok(())
    }

    /// Handles a self-closing tag while capturing.
    pub fn handle_empty(&mut self, event: BytesStart<'_>) -> AppResult<()> {
        if let Some(ref mut state) = self.state {
            inspect_entity(state, &event)?;
            write_buffered(state, Event::Empty(event))?;
        }
        Ok(())
    }

    /// Handles any other event (text, CDATA, comments, references).
    pub fn handle_event(&mut self, event: Event<'_>) -> AppResult<()> {
        if let Some(ref mut state) = self.state {
            write_buffered(state, event)?;
        }
        Ok(())
    }

    /// Handles an end tag while capturing.
    ///
    /// Returns `Some(Record)` when the record element is complete; the
    /// record's own end tag is not buffered.
    pub fn handle_end(&mut self, event: BytesEnd<'_>) -> AppResult<Option<Record>> {
        match self.state.take() {
            None => Ok(None),
            Some(mut state) => {
                if state.depth > 1 {
                    state.depth -= 1;
                    write_buffered(&mut state, Event::End(event))?;
                    self.state = Some(state);
                    return Ok(None);
                }

                let inner = state.writer.into_inner().into_inner();
                Ok(Some(Record {
                    country_code: normalize_country_code(state.country.as_deref()),
                    name: state.name,
                    attributes: state.attributes,
                    inner,
                }))
            }
        }
    }
}

fn write_buffered(state: &mut CaptureState, event: Event<'_>) -> AppResult<()> {
    state
        .writer
        .write_event(event)
        .map_err(|e| AppError::IoError(format!("Failed to buffer record event: {e}")))
}

/// Reads the country code off the first `entity` element encountered.
/// Later `entity` elements in the same record are ignored.
fn inspect_entity(state: &mut CaptureState, event: &BytesStart) -> AppResult<()> {
    if state.entity_seen || event.name().local_name().as_ref() != ENTITY_TAG.as_bytes() {
        return Ok(());
    }
    state.entity_seen = true;

    for attr in event.attributes() {
        let attr =
            attr.map_err(|e| AppError::MalformedInput(format!("Invalid attribute: {e}")))?;
        if attr.key.as_ref() == COUNTRY_CODE_ATTR.as_bytes() {
            let raw = decode_utf8(&attr.value)?;
            let value = unescape(raw)
                .map_err(|e| AppError::MalformedInput(format!("Invalid attribute value: {e}")))?
                .into_owned();
            state.country = Some(value);
            break;
        }
    }
    Ok(())
}
