use crate::errors::{AppError, AppResult};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber.
///
/// `--quiet` raises the default level to warn and `--verbose` lowers
/// it to debug; an explicit `RUST_LOG` overrides both. Safe to call
/// more than once (later calls are no-ops).
pub fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Creates a byte-denominated progress bar for the download phase.
///
/// Falls back to a spinner when the server does not report a content
/// length.
pub fn create_download_bar(total_bytes: Option<u64>) -> AppResult<ProgressBar> {
    let pb = match total_bytes {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
                    )
                    .map_err(|e| {
                        AppError::IoError(format!("Failed to create progress bar template: {e}"))
                    })?
                    .progress_chars("#>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")
                    .map_err(|e| {
                        AppError::IoError(format!("Failed to create progress bar template: {e}"))
                    })?,
            );
            pb
        }
    };
    Ok(pb)
}
