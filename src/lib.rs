//! peppol-cli library
//!
//! This crate provides the core functionality for the `peppol-cli` binary.
//! Keep the crate root minimal — implementation and tests live in their modules.
//!
//! ## Overview
//!
//! The library is organized into modules that handle different aspects of the sync pipeline:
//!
//! - [`downloader`] - Streams the directory export from the PEPPOL endpoint into a local file
//! - [`splitter`] - Single-pass split of the export into bounded-size per-country XML shards
//! - [`report`] - Generates the per-country summary table after processing
//! - [`cleanup`] - Pre-run extracts cleanup and post-run removal of temporary files
//! - [`cli`] - Command-line interface orchestrating download, split, report and cleanup
//! - [`config`] - Pipeline defaults and the TOML configuration loader
//! - [`errors`] - Error types used throughout the application
//!
//! ## Example Usage
//!
//! The typical workflow downloads the export (reusing a cached copy when present),
//! streams it once to produce the shards, and writes the report:
//!
//! ```no_run
//! use peppol_cli::{config::ResolvedConfig, downloader, report, splitter, errors::AppResult};
//!
//! # async fn example() -> AppResult<()> {
//! let config = ResolvedConfig::default();
//! let client = reqwest::Client::new();
//!
//! let export = downloader::download_export(&client, &config, false).await?;
//! let summary = splitter::split_export(
//!     &export,
//!     &config.extracts_dir,
//!     &config.record_tag,
//!     config.max_shard_bytes,
//! )?;
//! report::generate_report(&summary.stats, &config.extracts_dir)?;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod cli;
pub mod config;
pub mod constants;
pub mod downloader;
pub mod errors;
pub mod report;
pub mod splitter;
pub mod ui;
pub mod utils;
