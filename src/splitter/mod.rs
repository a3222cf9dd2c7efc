//! Streaming split of the export into per-country XML shards.
//!
//! The pipeline reads the export once as a forward-only event stream,
//! captures one record element at a time, derives its country code,
//! and appends it to the country's current shard, rotating shards at
//! the configured size threshold.

mod partition;
mod pipeline;
mod record;
mod stats;

// Re-export public API
pub use partition::{PartitionWriter, RootDescriptor};
pub use pipeline::{split_export, SplitSummary};
pub use record::{normalize_country_code, Record, RecordCapture};
pub use stats::RunStats;
