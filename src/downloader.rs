use crate::config::ResolvedConfig;
use crate::constants::EXPORT_FILE_NAME;
use crate::errors::{AppError, AppResult};
use crate::ui;
use crate::utils::{mb_from_bytes, rate_per_second, round_two_decimals};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Extracts HTTP status code from error message if present.
///
/// Looks for the pattern "HTTP {status_code}:" in the error message.
/// Returns `Some(status_code)` if found, `None` otherwise.
fn extract_status_code(msg: &str) -> Option<u16> {
    let prefix = "HTTP ";
    if let Some(start) = msg.find(prefix) {
        let start = start + prefix.len();
        let end = msg[start..].find(':').unwrap_or(msg[start..].len());
        msg[start..start + end].trim().parse().ok()
    } else {
        None
    }
}

/// Determines if an error should trigger a retry attempt.
///
/// Returns `true` for retryable errors (network errors, timeouts, 5xx
/// HTTP status codes). Client errors, I/O errors and parse errors are
/// not retried.
fn should_retry(error: &AppError) -> bool {
    match error {
        AppError::NetworkError(msg) => {
            if let Some(status_code) = extract_status_code(msg) {
                // 4xx = client error, don't retry; 5xx = server error, retry
                status_code >= 500
            } else {
                // No status code means network/timeout error - retry by default
                true
            }
        }
        AppError::IoError(_)
        | AppError::MalformedInput(_)
        | AppError::UrlError(_)
        | AppError::InvalidInput(_) => false,
    }
}

/// Configuration for retry behavior.
pub(crate) struct RetryConfig {
    max_retries: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryConfig {
    fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay_ms: config.retry_initial_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

/// Calculates exponential backoff delay in milliseconds.
///
/// Formula: `min(initial_delay * 2^attempt, max_delay)`
fn calculate_backoff(attempt: u32, config: &RetryConfig) -> u64 {
    let delay = config.initial_delay_ms * 2_u64.pow(attempt);
    delay.min(config.max_delay_ms)
}

/// Downloads the directory export to the tmp directory.
///
/// An existing export file is reused unless `force` is set; the spec
/// export is large, so skipping the fetch is the common fast path for
/// repeated runs. Downloads stream to a `.part` file and are renamed
/// atomically on completion, with retry and exponential backoff on
/// transient network failures.
pub async fn download_export(
    client: &reqwest::Client,
    config: &ResolvedConfig,
    force: bool,
) -> AppResult<PathBuf> {
    let export_path = config.tmp_dir.join(EXPORT_FILE_NAME);

    if export_path.exists() && !force {
        let size = std::fs::metadata(&export_path)?.len();
        info!(
            file = %export_path.display(),
            size_mb = round_two_decimals(mb_from_bytes(size)),
            "Using existing export file"
        );
        return Ok(export_path);
    }

    // Fail fast on a bad configured URL before touching the filesystem
    url::Url::parse(&config.export_url)?;

    if !config.tmp_dir.exists() {
        fs::create_dir_all(&config.tmp_dir)
            .await
            .map_err(|e| AppError::IoError(format!("Failed to create tmp directory: {e}")))?;
    }

    let tmp_path = config.tmp_dir.join(format!("{EXPORT_FILE_NAME}.part"));
    let retry_config = RetryConfig::from_config(config);

    info!(url = config.export_url.as_str(), "Downloading export");
    let started = Instant::now();

    let mut last_error: Option<AppError> = None;
    for attempt in 0..=retry_config.max_retries {
        match download_once(client, &config.export_url, &tmp_path, &export_path).await {
            Ok(()) => {
                let size = std::fs::metadata(&export_path)?.len();
                let elapsed = started.elapsed();
                info!(
                    file = %export_path.display(),
                    size_mb = round_two_decimals(mb_from_bytes(size)),
                    seconds = elapsed.as_secs(),
                    mb_per_sec =
                        round_two_decimals(rate_per_second(size, elapsed) / 1_048_576.0),
                    "Download completed"
                );
                return Ok(export_path);
            }
            Err(e) => {
                if attempt < retry_config.max_retries && should_retry(&e) {
                    let delay_ms = calculate_backoff(attempt, &retry_config);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = retry_config.max_retries + 1,
                        delay_ms = delay_ms,
                        error = %e,
                        "Retrying download after error"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        AppError::NetworkError(format!(
            "Download failed after {} retries (no error recorded)",
            retry_config.max_retries + 1
        ))
    }))
}

/// Performs one download attempt: stream to a temp file, then rename.
async fn download_once(
    client: &reqwest::Client,
    url: &str,
    tmp_path: &Path,
    export_path: &Path,
) -> AppResult<()> {
    // Remove stale tmp file if present (best-effort)
    if tmp_path.exists() {
        if let Err(e) = fs::remove_file(tmp_path).await {
            warn!(
                file = %tmp_path.display(),
                error = %e,
                "Failed to remove stale temp file"
            );
        }
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::NetworkError(format!("Failed to download export: {e}")))?;

    let status = response.status();
    let mut response = response.error_for_status().map_err(|e| {
        AppError::NetworkError(format!("HTTP {}: Failed to download export: {e}", status.as_u16()))
    })?;

    let pb = ui::create_download_bar(response.content_length())?;
    pb.set_message("Downloading export...");

    let mut file = File::create(tmp_path).await.map_err(|e| {
        AppError::IoError(format!(
            "Failed to create temp file {}: {}",
            tmp_path.display(),
            e
        ))
    })?;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(|e| {
            AppError::IoError(format!(
                "Failed to write to temp file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        pb.inc(chunk.len() as u64);
    }

    // Ensure the file is closed before renaming
    drop(file);
    pb.finish_and_clear();

    // Atomically move the temp file to the final destination
    fs::rename(tmp_path, export_path).await.map_err(|e| {
        AppError::IoError(format!(
            "Failed to rename temp file {} to {}: {}",
            tmp_path.display(),
            export_path.display(),
            e
        ))
    })?;

    Ok(())
}
