// Data source URL
pub const EXPORT_URL: &str = "https://directory.peppol.eu/export/businesscards";

// Download cache file name inside the tmp directory
pub const EXPORT_FILE_NAME: &str = "directory-export-business-cards.xml";

// Output layout
pub const SHARD_FILE_PREFIX: &str = "business-cards";
pub const REPORT_FILE_NAME: &str = "report.md";

// Record structure
pub const DEFAULT_RECORD_TAG: &str = "businesscard";
pub const ENTITY_TAG: &str = "entity";
pub const COUNTRY_CODE_ATTR: &str = "countrycode";

// Partition used when no country code can be derived from a record
pub const SENTINEL_COUNTRY: &str = "XX";

// Every shard starts with this declaration line
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// Rotation threshold checked once per record, before the write
pub const DEFAULT_MAX_SHARD_BYTES: u64 = 1_000_000;
