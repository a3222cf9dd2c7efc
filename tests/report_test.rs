//! Integration tests for report generation

#[path = "common/mod.rs"]
mod common;

use common::*;
use peppol_cli::report::{generate_report, rebuild_stats};
use peppol_cli::splitter::split_export;
use std::fs;
use tempfile::TempDir;

#[test]
fn report_after_split_matches_pipeline_output() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("export.xml");
    create_test_xml_file(&input, TWO_COUNTRY_EXPORT);
    let extracts = tmp.path().join("extracts");

    let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();
    let report_path = generate_report(&summary.stats, &extracts).unwrap();

    assert_eq!(report_path, extracts.join("report.md"));
    let report = fs::read_to_string(&report_path).unwrap();

    assert!(report.starts_with("# PEPPOL Sync Report"));
    assert!(report.contains("| Country | Files | Records | Size (MB) |"));
    assert!(report.contains("| BE | 1 | 1 |"));
    assert!(report.contains("| NO | 1 | 1 |"));
    assert!(report.contains("| **Total** | **2** | **2** |"));
}

#[test]
fn rebuilt_stats_agree_with_split_stats() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("export.xml");
    create_test_xml_file(&input, &build_export("no", 25, 100));
    let extracts = tmp.path().join("extracts");

    let summary = split_export(&input, &extracts, "businesscard", 800).unwrap();
    let rebuilt = rebuild_stats(&extracts, "businesscard").unwrap();

    assert_eq!(rebuilt.total(), summary.records);
    assert_eq!(rebuilt.count_for("NO"), summary.stats.count_for("NO"));
}

#[test]
fn report_includes_directories_from_prior_runs() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("export.xml");
    create_test_xml_file(&input, TWO_COUNTRY_EXPORT);
    let extracts = tmp.path().join("extracts");

    // A leftover partition from an earlier run, unknown to the stats.
    let stale = extracts.join("SE");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("business-cards.000001.xml"), "<root></root>\n").unwrap();

    let summary = split_export(&input, &extracts, "businesscard", 1_000_000).unwrap();
    let report_path = generate_report(&summary.stats, &extracts).unwrap();
    let report = fs::read_to_string(report_path).unwrap();

    assert!(report.contains("| SE | 1 | 0 |"));
}
