//! Source snapshot updates for unpacked installs
//!
//! The release's zip snapshot is downloaded, extracted and copied over the
//! install root. Nothing is ever deleted from the install root, so local
//! files the snapshot does not know about (session data, local config)
//! survive every update and a half-applied overlay is safe to re-run.

use crate::update::download::{self, download_to_file};
use crate::update::release::ReleaseClient;
use crate::update::{emit, StatusFn, UpdateError, UpdateOutcome};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Entry names never copied into the install root, at any depth
pub const EXCLUDED_NAMES: [&str; 6] = [
    "node_modules",
    ".git",
    "dist",
    "out",
    ".DS_Store",
    "Thumbs.db",
];

/// Counters reported after an overlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    pub files_copied: usize,
    pub entries_skipped: usize,
}

/// Applies source snapshot archives to an unpacked install
pub struct SourceUpdateApplier {
    client: ReleaseClient,
}

impl SourceUpdateApplier {
    pub fn new(client: ReleaseClient) -> Self {
        Self { client }
    }

    /// Download `archive_url` and overlay it onto `install_root`
    pub async fn apply(
        &self,
        archive_url: &str,
        install_root: &Path,
        new_version: &str,
        token: Option<&str>,
        on_status: &StatusFn<'_>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let mut warnings = Vec::new();
        let temp = download::attempt_dir()?;
        let archive_path = temp.path().join("snapshot.zip");

        emit(on_status, &format!("Downloading source archive for {}...", new_version));
        download_to_file(self.client.http(), archive_url, token, &archive_path).await?;

        emit(on_status, "Extracting archive...");
        let extract_dir = temp.path().join("extracted");
        extract_archive(archive_path, extract_dir.clone()).await?;
        let tree_root = snapshot_root(&extract_dir).await?;

        emit(on_status, &format!("Applying update to {}...", install_root.display()));
        let stats = overlay(&tree_root, install_root).await?;

        download::cleanup(temp, on_status, &mut warnings);
        emit(
            on_status,
            &format!(
                "Update to {} applied ({} files copied, {} entries skipped)",
                new_version, stats.files_copied, stats.entries_skipped
            ),
        );

        Ok(UpdateOutcome::Updated {
            new_version: new_version.to_string(),
            backup_path: None,
            warnings,
        })
    }
}

/// Extract a zip archive into `dest` on the blocking pool
async fn extract_archive(archive: PathBuf, dest: PathBuf) -> Result<(), UpdateError> {
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
        .await
        .map_err(|e| UpdateError::ExtractError(format!("Extraction task failed: {}", e)))?
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = std::fs::File::open(archive)
        .map_err(|e| {
            UpdateError::ExtractError(format!("Failed to open {}: {}", archive.display(), e))
        })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| {
            UpdateError::ExtractError(format!("Invalid archive {}: {}", archive.display(), e))
        })?;

    std::fs::create_dir_all(dest)
        .map_err(|e| {
            UpdateError::ExtractError(format!("Failed to create {}: {}", dest.display(), e))
        })?;
    zip.extract(dest)
        .map_err(|e| {
            UpdateError::ExtractError(format!("Failed to extract {}: {}", archive.display(), e))
        })?;

    tracing::debug!("Extracted {} entries into {:?}", zip.len(), dest);
    Ok(())
}

/// Tree root inside an extraction directory.
///
/// GitHub snapshots wrap the repository in a single `owner-project-sha/`
/// directory; descend into it when that is the only entry.
pub async fn snapshot_root(extract_dir: &Path) -> Result<PathBuf, UpdateError> {
    let read_error = |e: std::io::Error| {
        UpdateError::ExtractError(format!("Failed to read {}: {}", extract_dir.display(), e))
    };

    let mut entries = fs::read_dir(extract_dir).await.map_err(read_error)?;
    let mut only_dir = None;
    let mut count = 0usize;

    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        count += 1;
        if count > 1 {
            return Ok(extract_dir.to_path_buf());
        }
        if entry.file_type().await.map_err(read_error)?.is_dir() {
            only_dir = Some(entry.path());
        }
    }

    Ok(only_dir.unwrap_or_else(|| extract_dir.to_path_buf()))
}

pub fn is_excluded(name: &OsStr) -> bool {
    EXCLUDED_NAMES.iter().any(|excluded| name == *excluded)
}

/// Copy `source` over `target` without deleting anything in `target`
pub async fn overlay(source: &Path, target: &Path) -> Result<OverlayStats, UpdateError> {
    let mut stats = OverlayStats::default();
    let mut pending = vec![(source.to_path_buf(), target.to_path_buf())];

    while let Some((from_dir, to_dir)) = pending.pop() {
        fs::create_dir_all(&to_dir)
            .await
            .map_err(|e| copy_error("create", &to_dir, e))?;

        let mut entries = fs::read_dir(&from_dir)
            .await
            .map_err(|e| copy_error("read", &from_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| copy_error("read", &from_dir, e))?
        {
            let name = entry.file_name();
            let from = entry.path();
            if is_excluded(&name) {
                tracing::debug!("Skipping excluded entry {:?}", from);
                stats.entries_skipped += 1;
                continue;
            }

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| copy_error("inspect", &from, e))?;
            let to = to_dir.join(&name);

            if file_type.is_dir() {
                pending.push((from, to));
            } else if file_type.is_file() {
                fs::copy(&from, &to)
                    .await
                    .map_err(|e| copy_error("write", &to, e))?;
                stats.files_copied += 1;
            } else {
                tracing::debug!("Skipping special entry {:?}", from);
                stats.entries_skipped += 1;
            }
        }
    }

    Ok(stats)
}

fn copy_error(action: &str, path: &Path, e: std::io::Error) -> UpdateError {
    UpdateError::CopyError(format!("Failed to {} {}: {}", action, path.display(), e))
}
