//! Self-update subsystem
//!
//! Resolves the GitHub repository the application is published from, checks
//! the latest release and applies it either as a source overlay (unpacked
//! installs) or as an in-place AppImage swap (packaged installs).

pub mod download;
pub mod environment;
pub mod metadata;
pub mod orchestrator;
pub mod packaged;
pub mod release;
pub mod repo;
pub mod source;
pub mod version;

pub use environment::InstallEnvironment;
pub use orchestrator::UpdateOrchestrator;
pub use release::{Asset, ReleaseClient, ReleaseInfo};
pub use repo::RepoCoordinate;

use std::path::PathBuf;
use thiserror::Error;

/// Progress callback receiving human-readable status lines
pub type StatusFn<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Update-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Extraction failed: {0}")]
    ExtractError(String),

    #[error("Copy failed: {0}")]
    CopyError(String),

    #[error("Install failed: {0}")]
    InstallError(String),
}

/// Result of a single update check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Installed version is the latest one
    UpToDate,

    /// No repository coordinate could be derived
    NoRepoConfigured,

    /// The latest release carries no usable version
    NoLatestFound,

    /// No release asset matches the install type
    AssetNotFound { release_page_url: String },

    /// The install type cannot be updated in place
    UnsupportedInstallType { release_page_url: String },

    /// Update applied
    Updated {
        new_version: String,

        /// Backup of the replaced binary, packaged installs only
        backup_path: Option<PathBuf>,

        /// Best-effort steps that did not succeed
        warnings: Vec<String>,
    },

    /// The attempt was aborted
    Failed { cause: UpdateError },
}

impl UpdateOutcome {
    /// Whether files were changed by this check
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

impl std::fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "Already up to date"),
            Self::NoRepoConfigured => write!(f, "No update repository configured"),
            Self::NoLatestFound => write!(f, "No published release found"),
            Self::AssetNotFound { release_page_url } => write!(
                f,
                "No AppImage asset in the latest release, download it manually from {}",
                release_page_url
            ),
            Self::UnsupportedInstallType { release_page_url } => write!(
                f,
                "This install type cannot update itself, download the new version from {}",
                release_page_url
            ),
            Self::Updated {
                new_version,
                backup_path,
                ..
            } => match backup_path {
                Some(backup) => write!(
                    f,
                    "Updated to {} (previous binary saved at {})",
                    new_version,
                    backup.display()
                ),
                None => write!(f, "Updated to {}", new_version),
            },
            Self::Failed { cause } => write!(f, "Update failed: {}", cause),
        }
    }
}

/// Log a status line and forward it to the caller
pub(crate) fn emit(on_status: &StatusFn<'_>, message: &str) {
    tracing::info!("{}", message);
    on_status(message);
}

/// Log a degraded step, forward it and keep it for the outcome
pub(crate) fn warn(on_status: &StatusFn<'_>, warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{}", message);
    on_status(&message);
    warnings.push(message);
}
