use crate::constants::EXPORT_FILE_NAME;
use crate::errors::AppResult;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Deletes all XML shards under the extracts directory before a run.
///
/// Individual deletion failures are logged as warnings and do not fail
/// the operation; the run proceeds with whatever could be removed.
pub async fn cleanup_extracts(extracts_dir: &Path) -> AppResult<u64> {
    if !extracts_dir.exists() {
        info!("Extracts directory does not exist, skipping cleanup");
        return Ok(0);
    }

    let shards = collect_xml_files(extracts_dir);
    let mut deleted = 0u64;
    let mut errors = 0u64;

    for path in shards {
        match tokio::fs::remove_file(&path).await {
            Ok(_) => deleted += 1,
            Err(e) => {
                errors += 1;
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Failed to delete extract file"
                );
            }
        }
    }

    info!(deleted = deleted, errors = errors, "Extracts cleanup completed");
    Ok(deleted)
}

/// Removes the downloaded export (and any stale partial download) from
/// the tmp directory after a successful run.
pub async fn cleanup_tmp(tmp_dir: &Path, keep_tmp: bool) -> AppResult<()> {
    if keep_tmp {
        info!("Keeping temporary files (--keep-tmp)");
        return Ok(());
    }

    let targets = [
        tmp_dir.join(EXPORT_FILE_NAME),
        tmp_dir.join(format!("{EXPORT_FILE_NAME}.part")),
    ];

    let mut deleted = 0u64;
    for path in targets {
        if !path.exists() {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(_) => deleted += 1,
            Err(e) => {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Failed to delete temporary file"
                );
            }
        }
    }

    if deleted > 0 {
        info!(deleted = deleted, "Temporary files cleaned up");
    }
    Ok(())
}

/// Recursively collects `.xml` files in a directory.
fn collect_xml_files(dir: &Path) -> Vec<PathBuf> {
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
    out
}
