use crate::constants::REPORT_FILE_NAME;
use crate::errors::{AppError, AppResult};
use crate::splitter::RunStats;
use crate::utils::{mb_from_bytes, round_two_decimals};
use chrono::Local;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes `report.md` into the extracts directory: one row per
/// country with file count, record count and total size, plus totals.
///
/// Rows are the union of countries in the statistics and country
/// directories on disk. A country present only in the statistics
/// reports zero files and size; a directory with no counted records
/// (for example left over from an earlier run) reports zero records.
/// Neither case fails the report.
pub fn generate_report(stats: &RunStats, extracts_dir: &Path) -> AppResult<PathBuf> {
    let mut countries: BTreeSet<String> = stats.counts().keys().cloned().collect();
    for name in country_dirs(extracts_dir)? {
        countries.insert(name);
    }

    let mut out = String::with_capacity(1024);
    out.push_str("# PEPPOL Sync Report\n\n");
    let _ = writeln!(
        out,
        "Generated on: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    out.push_str("| Country | Files | Records | Size (MB) |\n");
    out.push_str("|---|---:|---:|---:|\n");

    let mut total_files = 0u64;
    let mut total_records = 0u64;
    let mut total_size = 0u64;

    for country in &countries {
        let (files, size) = shard_totals(&extracts_dir.join(country));
        let records = stats.count_for(country);
        let _ = writeln!(
            out,
            "| {country} | {files} | {records} | {:.2} |",
            round_two_decimals(mb_from_bytes(size))
        );
        total_files += files;
        total_records += records;
        total_size += size;
    }

    let _ = writeln!(
        out,
        "| **Total** | **{total_files}** | **{total_records}** | **{:.2}** |",
        round_two_decimals(mb_from_bytes(total_size))
    );

    fs::create_dir_all(extracts_dir)?;
    let report_path = extracts_dir.join(REPORT_FILE_NAME);
    fs::write(&report_path, &out).map_err(|e| {
        AppError::IoError(format!(
            "Failed to write report {}: {}",
            report_path.display(),
            e
        ))
    })?;

    info!(
        report = %report_path.display(),
        countries = countries.len(),
        files = total_files,
        records = total_records,
        "Report generated"
    );
    Ok(report_path)
}

/// Rebuilds run statistics from the shards on disk by streaming each
/// shard and counting its record elements. Used by the standalone
/// `report` command where no in-memory statistics exist.
pub fn rebuild_stats(extracts_dir: &Path, record_tag: &str) -> AppResult<RunStats> {
    let mut stats = RunStats::new();
    for country in country_dirs(extracts_dir)? {
        let dir = extracts_dir.join(&country);
        for shard in shard_files(&dir) {
            let records = count_records(&shard, record_tag)?;
            stats.add(&country, records);
        }
    }
    Ok(stats)
}

/// Counts record elements that are direct children of a shard's root.
fn count_records(path: &Path, record_tag: &str) -> AppResult<u64> {
    let file = fs::File::open(path).map_err(|e| {
        AppError::IoError(format!("Failed to open shard {}: {}", path.display(), e))
    })?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    let mut buf = Vec::with_capacity(8192);

    let mut depth = 0u32;
    let mut count = 0u64;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if depth == 1 && e.name().as_ref() == record_tag.as_bytes() {
                    count += 1;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 1 && e.name().as_ref() == record_tag.as_bytes() {
                    count += 1;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}

/// Lists the country subdirectories of the extracts directory. A
/// missing extracts directory is an empty listing, not an error.
fn country_dirs(extracts_dir: &Path) -> AppResult<Vec<String>> {
    let mut out = Vec::new();
    if !extracts_dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(extracts_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                out.push(name.to_string());
            }
        }
    }
    Ok(out)
}

/// XML shard files directly under a country directory.
fn shard_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(dir).into_iter().flatten() {
        if entry.file_type().is_file() {
            if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
                if ext.eq_ignore_ascii_case("xml") {
                    out.push(entry.path().to_path_buf());
                }
            }
        }
    }
    out.sort();
    out
}

/// File count and summed byte size of a country's shards. A missing
/// directory counts as zero of each.
fn shard_totals(dir: &Path) -> (u64, u64) {
    let mut files = 0u64;
    let mut size = 0u64;
    for path in shard_files(dir) {
        if let Ok(meta) = fs::metadata(&path) {
            files += 1;
            size += meta.len();
        }
    }
    (files, size)
}
