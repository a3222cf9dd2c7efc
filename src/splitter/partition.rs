use crate::constants::{SHARD_FILE_PREFIX, XML_DECLARATION};
use crate::errors::{AppError, AppResult};
use crate::splitter::record::{collect_attributes, decode_utf8, Record};
use quick_xml::escape::escape;
use quick_xml::events::BytesStart;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The source document's outermost element, captured once before record
/// processing begins and reproduced in every shard's header and footer.
#[derive(Debug, Clone)]
pub struct RootDescriptor {
    name: String,
    attributes: Vec<(String, String)>,
}

impl RootDescriptor {
    pub fn new(name: &str, attributes: Vec<(String, String)>) -> Self {
        Self {
            name: name.to_string(),
            attributes,
        }
    }

    pub fn from_start(event: &BytesStart) -> AppResult<Self> {
        Ok(Self {
            name: decode_utf8(event.name().as_ref())?.to_string(),
            attributes: collect_attributes(event)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the root open tag, attribute values re-escaped.
    pub fn render_open_tag(&self) -> String {
        format!("<{}{}>", self.name, render_attributes(&self.attributes))
    }

    pub fn render_close_tag(&self) -> String {
        format!("</{}>", self.name)
    }
}

/// Serializes an attribute list with values escaped for the five
/// predefined XML entities.
fn render_attributes(attributes: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    out
}

/// Serializes one record exactly as it is appended to a shard:
/// `<name attrs>inner</name>\n`.
fn render_record(record: &Record) -> Vec<u8> {
    let open = format!("<{}{}>", record.name, render_attributes(&record.attributes));
    let close = format!("</{}>\n", record.name);

    let mut out = Vec::with_capacity(open.len() + record.inner.len() + close.len());
    out.extend_from_slice(open.as_bytes());
    out.extend_from_slice(&record.inner);
    out.extend_from_slice(close.as_bytes());
    out
}

/// Output state for one country: the shard currently open for appends.
/// Sequence numbers start at 1 and are never reused within a run.
struct PartitionState {
    sequence: u32,
    bytes_written: u64,
    file: BufWriter<File>,
}

/// Maps country codes to open shard files and rotates them when they
/// grow past the size threshold.
///
/// All partition state lives in the map owned here; the writer is the
/// only component that touches the output tree during a run. Every
/// shard a partition closes is a complete XML document: declaration,
/// root open tag, zero or more whole records, root close tag. The
/// threshold is checked once per record against the size before the
/// write, so a record is never split across two shards.
pub struct PartitionWriter {
    extracts_dir: PathBuf,
    max_shard_bytes: u64,
    root: RootDescriptor,
    partitions: BTreeMap<String, PartitionState>,
    files_created: u64,
}

impl PartitionWriter {
    pub fn new(extracts_dir: &Path, root: RootDescriptor, max_shard_bytes: u64) -> Self {
        Self {
            extracts_dir: extracts_dir.to_path_buf(),
            max_shard_bytes,
            root,
            partitions: BTreeMap::new(),
            files_created: 0,
        }
    }

    /// Appends one record to its country's current shard, opening or
    /// rotating the shard first when needed.
    pub fn write(&mut self, record: &Record) -> AppResult<()> {
        let country = record.country_code.as_str();

        if let Some(state) = self.partitions.get_mut(country) {
            if state.bytes_written > self.max_shard_bytes {
                write_close_tag(&mut state.file, &self.root)?;
                state.sequence += 1;
                let (file, header_bytes) =
                    open_shard(&self.extracts_dir, &self.root, country, state.sequence)?;
                state.file = file;
                state.bytes_written = header_bytes;
                self.files_created += 1;
            }
        } else {
            let (file, header_bytes) = open_shard(&self.extracts_dir, &self.root, country, 1)?;
            self.partitions.insert(
                country.to_string(),
                PartitionState {
                    sequence: 1,
                    bytes_written: header_bytes,
                    file,
                },
            );
            self.files_created += 1;
        }

        let payload = render_record(record);
        let state = self
            .partitions
            .get_mut(country)
            .ok_or_else(|| AppError::IoError(format!("No open partition for {country}")))?;
        state.file.write_all(&payload).map_err(|e| {
            AppError::IoError(format!("Failed to write record for {country}: {e}"))
        })?;
        state.bytes_written += payload.len() as u64;

        Ok(())
    }

    /// Number of shard files opened so far.
    pub fn files_created(&self) -> u64 {
        self.files_created
    }

    /// Closes every open shard with its root close tag.
    ///
    /// Must be called at stream end; a run interrupted before this
    /// point leaves footerless shards and its output is suspect.
    pub fn finish(self) -> AppResult<()> {
        for (country, mut state) in self.partitions {
            write_close_tag(&mut state.file, &self.root).map_err(|e| {
                AppError::IoError(format!("Failed to finalize partition {country}: {e}"))
            })?;
        }
        Ok(())
    }
}

fn shard_path(extracts_dir: &Path, country: &str, sequence: u32) -> PathBuf {
    extracts_dir
        .join(country)
        .join(format!("{SHARD_FILE_PREFIX}.{sequence:06}.xml"))
}

/// Creates the next shard for a partition and writes its header.
/// Returns the open handle and the number of header bytes written.
fn open_shard(
    extracts_dir: &Path,
    root: &RootDescriptor,
    country: &str,
    sequence: u32,
) -> AppResult<(BufWriter<File>, u64)> {
    let dir = extracts_dir.join(country);
    fs::create_dir_all(&dir).map_err(|e| {
        AppError::IoError(format!("Failed to create directory {}: {}", dir.display(), e))
    })?;

    let path = shard_path(extracts_dir, country, sequence);
    let file = File::create(&path).map_err(|e| {
        AppError::IoError(format!("Failed to create shard {}: {}", path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);

    let mut header = String::with_capacity(128);
    header.push_str(XML_DECLARATION);
    header.push('\n');
    header.push_str(&root.render_open_tag());
    header.push('\n');
    writer.write_all(header.as_bytes())?;

    debug!(shard = %path.display(), "Opened shard");
    Ok((writer, header.len() as u64))
}

fn write_close_tag(file: &mut BufWriter<File>, root: &RootDescriptor) -> AppResult<()> {
    file.write_all(root.render_close_tag().as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}
