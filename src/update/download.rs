//! Streaming downloads into per-attempt temporary directories

use crate::update::{StatusFn, UpdateError};
use futures::StreamExt;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

const TEMP_PREFIX: &str = "webshell-update-";

/// Create a fresh, process-unique temporary directory for one attempt
pub fn attempt_dir() -> Result<TempDir, UpdateError> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir()
        .map_err(|e| {
            UpdateError::DownloadError(format!("Failed to create temporary directory: {}", e))
        })
}

/// Remove an attempt directory, recording a warning if that fails
pub fn cleanup(dir: TempDir, on_status: &StatusFn<'_>, warnings: &mut Vec<String>) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        super::warn(
            on_status,
            warnings,
            format!("Could not remove temporary directory {}: {}", path.display(), e),
        );
    }
}

/// Stream `url` into `dest` without buffering the whole body.
///
/// Returns the number of bytes written.
pub async fn download_to_file(
    http: &reqwest::Client,
    url: &str,
    token: Option<&str>,
    dest: &Path,
) -> Result<u64, UpdateError> {
    tracing::debug!("Downloading {} to {:?}", url, dest);

    let mut request = http.get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| UpdateError::DownloadError(format!("Failed to download {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpdateError::DownloadError(format!(
            "Download of {} failed with status {}",
            url, status
        )));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| {
            UpdateError::DownloadError(format!("Failed to create {}: {}", dest.display(), e))
        })?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            UpdateError::DownloadError(format!("Download of {} interrupted: {}", url, e))
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| {
                UpdateError::DownloadError(format!("Failed to write {}: {}", dest.display(), e))
            })?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| {
            UpdateError::DownloadError(format!("Failed to write {}: {}", dest.display(), e))
        })?;

    tracing::info!("Downloaded {} bytes from {}", written, url);
    Ok(written)
}
