//! Update check entry point

use crate::config::UpdateConfig;
use crate::update::environment::InstallEnvironment;
use crate::update::metadata::ProjectMetadata;
use crate::update::packaged::PackagedUpdateApplier;
use crate::update::release::ReleaseClient;
use crate::update::source::SourceUpdateApplier;
use crate::update::{emit, repo, version, StatusFn, UpdateError, UpdateOutcome};
use std::path::Path;

/// Sequences repository resolution, the release lookup and the matching
/// applier for one update check at a time.
pub struct UpdateOrchestrator {
    config: UpdateConfig,
    client: ReleaseClient,
}

impl UpdateOrchestrator {
    /// Create an orchestrator with its own HTTP client
    pub fn new(config: UpdateConfig) -> Result<Self, UpdateError> {
        let client = ReleaseClient::new(&config)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Check for and apply an update.
    ///
    /// Never fails: every error is reported as [`UpdateOutcome::Failed`].
    /// Callers must not run two checks concurrently.
    pub async fn check_for_updates(
        &self,
        install_root: &Path,
        is_packaged: bool,
        on_status: &StatusFn<'_>,
    ) -> UpdateOutcome {
        match self.run(install_root, is_packaged, on_status).await {
            Ok(outcome) => outcome,
            Err(cause) => {
                tracing::error!("Update check failed: {}", cause);
                on_status(&format!("Update failed: {}", cause));
                UpdateOutcome::Failed { cause }
            }
        }
    }

    async fn run(
        &self,
        install_root: &Path,
        is_packaged: bool,
        on_status: &StatusFn<'_>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let metadata =
            ProjectMetadata::load(install_root, &self.config.settings.metadata_file).await;

        let Some(coordinate) = repo::resolve(self.config.repo_override.as_deref(), &metadata) else {
            emit(on_status, "No update repository configured");
            return Ok(UpdateOutcome::NoRepoConfigured);
        };

        let current = metadata.current_version();
        emit(on_status, &format!("Current version: {}", current));
        emit(on_status, &format!("Checking {} for updates...", coordinate));

        let token = self.config.token.as_deref();
        let release = self.client.fetch_latest(&coordinate, token).await?;

        if release.version.is_empty() {
            emit(on_status, "Latest release has no version");
            return Ok(UpdateOutcome::NoLatestFound);
        }
        emit(on_status, &format!("Latest version: {}", release.version));

        if !version::is_newer(&release.version, current) {
            emit(on_status, &format!("Already up to date ({})", current));
            return Ok(UpdateOutcome::UpToDate);
        }

        if is_packaged {
            let environment = InstallEnvironment::detect(&self.config);
            tracing::info!("Packaged install detected as {:?}", environment);
            PackagedUpdateApplier::new(self.client.clone())
                .apply(&release, &environment, token, on_status)
                .await
        } else {
            SourceUpdateApplier::new(self.client.clone())
                .apply(
                    &release.source_archive_url,
                    install_root,
                    &release.version,
                    token,
                    on_status,
                )
                .await
        }
    }
}
