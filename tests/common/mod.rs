//! Common test utilities for integration tests

use std::fs;
use std::io::Write;
use std::path::Path;

/// Helper function to create a test XML file in a directory
#[allow(dead_code)]
pub fn create_test_xml_file(path: &Path, content: &str) {
    let parent = path.parent().unwrap();
    fs::create_dir_all(parent).unwrap();
    fs::File::create(path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
}

/// Sample export with two records in different countries
#[allow(dead_code)]
pub const TWO_COUNTRY_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root version="1" generation-date="2024-01-01">
<businesscard><entity countrycode="no" name="Nordic AS"><regdate>2020-01-15</regdate></entity></businesscard>
<businesscard><entity countrycode="be" name="Belgia BV"><regdate>2021-06-02</regdate></entity></businesscard>
</root>"#;

/// Sample export where one record lacks a country code entirely
#[allow(dead_code)]
pub const MISSING_COUNTRY_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root generation-date="2024-01-01">
<businesscard><entity countrycode="no"/></businesscard>
<businesscard><name>Anonymous</name></businesscard>
</root>"#;

/// Export with a root element but no records
#[allow(dead_code)]
pub const EMPTY_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root generation-date="2024-01-01">
</root>"#;

/// Builds an export with `n` records for the given country code,
/// each padded to roughly `record_size` bytes.
#[allow(dead_code)]
pub fn build_export(country: &str, n: usize, record_size: usize) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root>");
    for i in 0..n {
        out.push_str(&format!(
            "<businesscard><entity countrycode=\"{country}\"/><seq>{i}</seq><pad>{}</pad></businesscard>",
            "x".repeat(record_size)
        ));
    }
    out.push_str("</root>");
    out
}
