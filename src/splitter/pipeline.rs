use crate::errors::{AppError, AppResult};
use crate::splitter::partition::{PartitionWriter, RootDescriptor};
use crate::splitter::record::{Record, RecordCapture};
use crate::splitter::stats::RunStats;
use crate::utils;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Records between progress log lines.
const PROGRESS_INTERVAL: u64 = 100_000;

/// Outcome of one split run, consumed by the report generator.
#[derive(Debug)]
pub struct SplitSummary {
    pub records: u64,
    pub files_created: u64,
    pub stats: RunStats,
}

/// Streams the export once and splits its records into per-country
/// shards under `extracts_dir`.
///
/// The reader is a forward-only event stream over a buffered file
/// handle, so memory use is bounded by the largest single record, not
/// the document size. The first start tag is captured as the root
/// descriptor; every start tag matching `record_tag` begins a record
/// capture, and each completed record is counted and written
/// immediately. Any parse error aborts the run; partitions already
/// written are left without footers and the output must be treated as
/// suspect.
pub fn split_export(
    input: &Path,
    extracts_dir: &Path,
    record_tag: &str,
    max_shard_bytes: u64,
) -> AppResult<SplitSummary> {
    let file = File::open(input).map_err(|e| {
        AppError::IoError(format!("Failed to open export {}: {}", input.display(), e))
    })?;
    let mut reader = Reader::from_reader(BufReader::new(file));

    let mut buf = Vec::with_capacity(8192);
    let mut capture = RecordCapture::new(record_tag);
    let mut writer: Option<PartitionWriter> = None;
    let mut stats = RunStats::new();
    let started = Instant::now();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if capture.is_active() {
                    capture.handle_start(e)?;
                } else if capture.matches(e.name().as_ref()) {
                    capture.start(&e)?;
                } else if writer.is_none() {
                    let root = RootDescriptor::from_start(&e)?;
                    debug!(root = root.name(), "Captured root descriptor");
                    writer = Some(PartitionWriter::new(extracts_dir, root, max_shard_bytes));
                }
                // Non-record children of the root carry no records.
            }
            Event::Empty(e) => {
                if capture.is_active() {
                    capture.handle_empty(e)?;
                } else if capture.matches(e.name().as_ref()) {
                    let record = Record::from_empty(&e)?;
                    dispatch(record, writer.as_mut(), &mut stats)?;
                    log_progress(&stats, started);
                } else if writer.is_none() {
                    // A self-closing root is a well-formed document
                    // with zero records.
                    let root = RootDescriptor::from_start(&e)?;
                    debug!(root = root.name(), "Captured root descriptor");
                    writer = Some(PartitionWriter::new(extracts_dir, root, max_shard_bytes));
                }
            }
            Event::End(e) => {
                if let Some(record) = capture.handle_end(e)? {
                    dispatch(record, writer.as_mut(), &mut stats)?;
                    log_progress(&stats, started);
                }
            }
            Event::Eof => break,
            other => {
                if capture.is_active() {
                    capture.handle_event(other)?;
                }
            }
        }
        buf.clear();
    }

    if capture.is_active() {
        return Err(AppError::MalformedInput(
            "Document ended inside a record element".to_string(),
        ));
    }

    let writer = writer.ok_or_else(|| {
        AppError::MalformedInput("No root element found in export".to_string())
    })?;
    let files_created = writer.files_created();
    writer.finish()?;

    let elapsed = started.elapsed();
    info!(
        records = stats.total(),
        countries = stats.country_count(),
        files = files_created,
        duration = %utils::format_duration(elapsed),
        records_per_sec = utils::rate_per_second(stats.total(), elapsed).round(),
        "Split completed"
    );

    Ok(SplitSummary {
        records: stats.total(),
        files_created,
        stats,
    })
}

fn dispatch(
    record: Record,
    writer: Option<&mut PartitionWriter>,
    stats: &mut RunStats,
) -> AppResult<()> {
    let Some(writer) = writer else {
        return Err(AppError::MalformedInput(
            "Record element found before the document root".to_string(),
        ));
    };
    stats.record(&record.country_code);
    writer.write(&record)
}

fn log_progress(stats: &RunStats, started: Instant) {
    if stats.total() % PROGRESS_INTERVAL == 0 {
        let elapsed = started.elapsed();
        info!(
            records = stats.total(),
            elapsed = %utils::format_duration(elapsed),
            records_per_sec = utils::rate_per_second(stats.total(), elapsed).round(),
            "Processing records"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_export(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("export.xml");
        fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        path
    }

    const TWO_COUNTRY_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root generation-date="2024-01-01">
<businesscard><entity countrycode="no" name="Nordic AS"/></businesscard>
<businesscard><entity countrycode="be" name="Belgia BV"/></businesscard>
</root>"#;

    #[test]
    fn splits_records_by_country() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(tmp.path(), TWO_COUNTRY_EXPORT);
        let extracts = tmp.path().join("extracts");

        let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.files_created, 2);
        assert_eq!(summary.stats.count_for("NO"), 1);
        assert_eq!(summary.stats.count_for("BE"), 1);

        let no_shard =
            fs::read_to_string(extracts.join("NO/business-cards.000001.xml")).unwrap();
        assert!(no_shard.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(no_shard.contains("<root generation-date=\"2024-01-01\">"));
        assert!(no_shard.contains(r#"<entity countrycode="no" name="Nordic AS"/>"#));
        assert!(no_shard.ends_with("</root>\n"));
        assert!(!no_shard.contains("be"));
    }

    #[test]
    fn record_without_country_goes_to_sentinel() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(
            tmp.path(),
            r#"<root><businesscard><name>No entity here</name></businesscard></root>"#,
        );
        let extracts = tmp.path().join("extracts");

        let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();

        assert_eq!(summary.stats.count_for("XX"), 1);
        assert!(extracts.join("XX/business-cards.000001.xml").exists());
    }

    #[test]
    fn entity_without_countrycode_goes_to_sentinel() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(
            tmp.path(),
            r#"<root><businesscard><entity name="Anon"/></businesscard></root>"#,
        );
        let extracts = tmp.path().join("extracts");

        let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();
        assert_eq!(summary.stats.count_for("XX"), 1);
    }

    #[test]
    fn stats_total_matches_record_count() {
        let tmp = TempDir::new().unwrap();
        let mut content = String::from("<root>");
        for i in 0..25 {
            let cc = if i % 2 == 0 { "no" } else { "se" };
            content.push_str(&format!(
                "<businesscard><entity countrycode=\"{cc}\"/><n>{i}</n></businesscard>"
            ));
        }
        content.push_str("</root>");
        let input = write_export(tmp.path(), &content);
        let extracts = tmp.path().join("extracts");

        let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();
        assert_eq!(summary.records, 25);
        assert_eq!(
            summary.stats.count_for("NO") + summary.stats.count_for("SE"),
            25
        );
    }

    #[test]
    fn inner_content_is_preserved_byte_for_byte() {
        let tmp = TempDir::new().unwrap();
        let inner = "<entity countrycode=\"no\"><name>A &amp; B</name>\
                     <!-- keep --><extra><deep attr=\"1\">t</deep></extra></entity>";
        let input = write_export(
            tmp.path(),
            &format!("<root><businesscard>{inner}</businesscard></root>"),
        );
        let extracts = tmp.path().join("extracts");

        split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();

        let shard =
            fs::read_to_string(extracts.join("NO/business-cards.000001.xml")).unwrap();
        assert!(shard.contains(&format!("<businesscard>{inner}</businesscard>")));
    }

    #[test]
    fn malformed_export_aborts() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(
            tmp.path(),
            "<root><businesscard><entity countrycode=\"no\"></businesscard></root>",
        );
        let extracts = tmp.path().join("extracts");

        let result = split_export(&input, &extracts, "businesscard", 1_000_000);
        assert!(result.is_err());
    }

    #[test]
    fn truncated_export_aborts() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(tmp.path(), "<root><businesscard><entity");
        let extracts = tmp.path().join("extracts");

        assert!(split_export(&input, &extracts, "businesscard", 1_000_000).is_err());
    }

    #[test]
    fn empty_document_has_no_root() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(tmp.path(), "");
        let extracts = tmp.path().join("extracts");

        let result = split_export(&input, &extracts, "businesscard", 1_000_000);
        assert!(result.is_err());
    }

    #[test]
    fn self_closing_root_yields_zero_records() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(tmp.path(), "<root generation-date=\"2024-01-01\"/>");
        let extracts = tmp.path().join("extracts");

        let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(summary.files_created, 0);
    }

    #[test]
    fn invalid_utf8_in_attribute_aborts() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("export.xml");
        let mut content = Vec::new();
        content.extend_from_slice(b"<root><businesscard><entity countrycode=\"n");
        content.push(0xFF);
        content.extend_from_slice(b"o\"/></businesscard></root>");
        fs::write(&input, &content).unwrap();
        let extracts = tmp.path().join("extracts");

        let result = split_export(&input, &extracts, "businesscard", 1_000_000);
        assert!(matches!(result, Err(AppError::MalformedInput(_))));
        assert!(!extracts.exists());
    }

    #[test]
    fn root_with_no_records_creates_no_shards() {
        let tmp = TempDir::new().unwrap();
        let input = write_export(tmp.path(), "<root generation-date=\"2024-01-01\"></root>");
        let extracts = tmp.path().join("extracts");

        let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(summary.files_created, 0);
    }

    #[test]
    fn per_record_threshold_yields_one_record_per_shard() {
        let tmp = TempDir::new().unwrap();
        let mut content = String::from("<root>");
        for i in 0..3 {
            content.push_str(&format!(
                "<businesscard><entity countrycode=\"no\"/><pad>{}</pad></businesscard>",
                "x".repeat(200 + i)
            ));
        }
        content.push_str("</root>");
        let input = write_export(tmp.path(), &content);
        let extracts = tmp.path().join("extracts");

        // Threshold below a single record size: every following record
        // starts a new shard.
        let summary = split_export(&input, &extracts, "businesscard", 100).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.files_created, 3);
        for seq in 1..=3 {
            let shard = fs::read_to_string(
                extracts.join(format!("NO/business-cards.{seq:06}.xml")),
            )
            .unwrap();
            assert_eq!(shard.matches("<businesscard>").count(), 1);
        }
    }

    #[test]
    fn concatenated_shards_reproduce_records_in_order() {
        let tmp = TempDir::new().unwrap();
        let mut content = String::from("<root>");
        let mut expected = String::new();
        for i in 0..10 {
            let record = format!(
                "<businesscard><entity countrycode=\"no\"/><seq>{i}</seq></businesscard>"
            );
            expected.push_str(&record);
            expected.push('\n');
            content.push_str(&record);
        }
        content.push_str("</root>");
        let input = write_export(tmp.path(), &content);
        let extracts = tmp.path().join("extracts");

        split_export(&input, &extracts, "businesscard", 120).unwrap();

        // Strip per-shard headers and footers, concatenate in sequence
        // order, and compare against the source records.
        let dir = extracts.join("NO");
        let mut shards: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        shards.sort();
        assert!(shards.len() > 1, "expected rotation to produce shards");

        let mut combined = String::new();
        for shard in shards {
            let text = fs::read_to_string(shard).unwrap();
            for line in text.lines() {
                if line.starts_with("<businesscard") {
                    combined.push_str(line);
                    combined.push('\n');
                }
            }
        }
        assert_eq!(combined, expected);
    }
}
