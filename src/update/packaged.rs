//! Packaged (AppImage) updates
//!
//! The new image is downloaded to a temporary directory, the running image is
//! copied to a timestamped backup, and the new image is written to a staging
//! file next to the live one and renamed over it. Backups are never removed
//! here; cleaning them up is left to the user.

use crate::update::download::{self, download_to_file};
use crate::update::environment::InstallEnvironment;
use crate::update::release::{Asset, ReleaseClient, ReleaseInfo};
use crate::update::{emit, warn, StatusFn, UpdateError, UpdateOutcome};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const APPIMAGE_EXTENSION: &str = ".appimage";

/// Architecture spellings found in release asset names
const ARCH_ALIASES: [(&str, &[&str]); 3] = [
    ("x86_64", &["x86_64", "amd64", "x64"]),
    ("aarch64", &["aarch64", "arm64"]),
    ("arm", &["armv7l", "armhf"]),
];

/// Applies binary release assets to packaged installs
pub struct PackagedUpdateApplier {
    client: ReleaseClient,
    arch: &'static str,
}

impl PackagedUpdateApplier {
    pub fn new(client: ReleaseClient) -> Self {
        Self {
            client,
            arch: std::env::consts::ARCH,
        }
    }

    /// Replace the installed binary with the matching asset of `release`
    pub async fn apply(
        &self,
        release: &ReleaseInfo,
        environment: &InstallEnvironment,
        token: Option<&str>,
        on_status: &StatusFn<'_>,
    ) -> Result<UpdateOutcome, UpdateError> {
        match environment {
            InstallEnvironment::AppImageBinary { path } => {
                self.apply_appimage(release, path, token, on_status).await
            }
            InstallEnvironment::SystemInstalled { exec_path }
            | InstallEnvironment::Unknown { exec_path } => {
                tracing::info!("Not updating {} at {:?}", environment.label(), exec_path);
                emit(
                    on_status,
                    &format!(
                        "Automatic updates are not supported for this {}. Download {} from {}",
                        environment.label(),
                        release.version,
                        release.release_page_url
                    ),
                );
                Ok(UpdateOutcome::UnsupportedInstallType {
                    release_page_url: release.release_page_url.clone(),
                })
            }
        }
    }

    async fn apply_appimage(
        &self,
        release: &ReleaseInfo,
        live_path: &Path,
        token: Option<&str>,
        on_status: &StatusFn<'_>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let Some(asset) = select_asset(&release.binary_assets, self.arch) else {
            emit(
                on_status,
                &format!(
                    "Release {} has no AppImage asset. Download it manually from {}",
                    release.version, release.release_page_url
                ),
            );
            return Ok(UpdateOutcome::AssetNotFound {
                release_page_url: release.release_page_url.clone(),
            });
        };

        let mut warnings = Vec::new();
        let temp = download::attempt_dir()?;
        let downloaded = temp.path().join("update.AppImage");

        emit(on_status, &format!("Downloading {}...", asset.name));
        download_to_file(self.client.http(), &asset.download_url, token, &downloaded).await?;
        set_executable(&downloaded).await?;

        let timestamp = chrono::Utc::now().timestamp_millis();
        let backup_path = backup_current(live_path, timestamp, on_status, &mut warnings).await;

        emit(on_status, &format!("Installing {}...", live_path.display()));
        install_binary(&downloaded, live_path, timestamp, on_status, &mut warnings).await?;

        download::cleanup(temp, on_status, &mut warnings);
        emit(
            on_status,
            &format!("Updated to {}. Restart the application to use it.", release.version),
        );

        Ok(UpdateOutcome::Updated {
            new_version: release.version.clone(),
            backup_path,
            warnings,
        })
    }
}

/// Pick the AppImage asset for `arch`.
///
/// Prefers an asset naming `arch`, then one naming no architecture at all,
/// then any AppImage.
pub fn select_asset<'a>(assets: &'a [Asset], arch: &str) -> Option<&'a Asset> {
    let candidates: Vec<(&Asset, String)> = assets
        .iter()
        .map(|asset| (asset, asset.name.to_lowercase()))
        .filter(|(_, name)| name.ends_with(APPIMAGE_EXTENSION))
        .collect();

    let own_aliases = ARCH_ALIASES
        .iter()
        .find(|(name, _)| *name == arch)
        .map(|(_, aliases)| *aliases)
        .unwrap_or_default();
    let mentions_any_arch = |name: &str| {
        ARCH_ALIASES
            .iter()
            .flat_map(|(_, aliases)| aliases.iter())
            .any(|alias| name.contains(alias))
    };

    candidates
        .iter()
        .find(|(_, name)| own_aliases.iter().any(|alias| name.contains(alias)))
        .or_else(|| candidates.iter().find(|(_, name)| !mentions_any_arch(name.as_str())))
        .or_else(|| candidates.first())
        .map(|(asset, _)| *asset)
}

/// `<path>.<tag>-<timestamp>` next to `path`
pub fn sibling_path(path: &Path, tag: &str, timestamp_ms: i64) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}-{}", tag, timestamp_ms));
    PathBuf::from(name)
}

/// Copy the live binary aside; failure is a warning, not an error
async fn backup_current(
    live_path: &Path,
    timestamp_ms: i64,
    on_status: &StatusFn<'_>,
    warnings: &mut Vec<String>,
) -> Option<PathBuf> {
    let backup = sibling_path(live_path, "bak", timestamp_ms);
    match fs::copy(live_path, &backup).await {
        Ok(_) => {
            emit(on_status, &format!("Saved current version to {}", backup.display()));
            Some(backup)
        }
        Err(e) => {
            warn(
                on_status,
                warnings,
                format!(
                    "Could not back up {} ({}), continuing without a backup",
                    live_path.display(),
                    e
                ),
            );
            None
        }
    }
}

/// Put `new_binary` at `live_path`.
///
/// Writes a staging file in the same directory and renames it over the live
/// path so no reader ever sees a half-written image. Falls back to copying
/// over the live path when the directory does not accept new files.
async fn install_binary(
    new_binary: &Path,
    live_path: &Path,
    timestamp_ms: i64,
    on_status: &StatusFn<'_>,
    warnings: &mut Vec<String>,
) -> Result<(), UpdateError> {
    let staging = sibling_path(live_path, "new", timestamp_ms);

    match fs::copy(new_binary, &staging).await {
        Ok(_) => {
            let installed = async {
                set_executable(&staging).await?;
                fs::rename(&staging, live_path).await.map_err(|e| {
                    UpdateError::InstallError(format!(
                        "Failed to move {} into place: {}",
                        staging.display(),
                        e
                    ))
                })
            }
            .await;

            if installed.is_err() {
                if let Err(e) = fs::remove_file(&staging).await {
                    tracing::debug!("Could not remove staging file {:?}: {}", staging, e);
                }
            }
            installed
        }
        Err(e) => {
            warn(
                on_status,
                warnings,
                format!(
                    "Could not stage new binary next to {} ({}), overwriting it in place",
                    live_path.display(),
                    e
                ),
            );
            fs::copy(new_binary, live_path).await.map_err(|e| {
                UpdateError::InstallError(format!("Failed to write {}: {}", live_path.display(), e))
            })?;
            set_executable(live_path).await
        }
    }
}

/// Mark a file executable (0o755) on Unix
async fn set_executable(path: &Path) -> Result<(), UpdateError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| {
                UpdateError::InstallError(format!(
                    "Failed to set executable permission on {}: {}",
                    path.display(),
                    e
                ))
            })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn asset(name: &str, url: &str) -> Asset {
        Asset {
            name: name.to_string(),
            download_url: url.to_string(),
        }
    }

    fn release(assets: Vec<Asset>) -> ReleaseInfo {
        ReleaseInfo {
            version: "1.3.0".to_string(),
            source_archive_url: "https://example.invalid/zipball".to_string(),
            binary_assets: assets,
            release_page_url: "https://github.com/acme/shell/releases/tag/v1.3.0".to_string(),
        }
    }

    fn applier() -> PackagedUpdateApplier {
        let client = ReleaseClient::with_base_url(
            "http://127.0.0.1:9",
            "webshell-test",
            Duration::from_secs(5),
        )
        .unwrap();
        PackagedUpdateApplier {
            client,
            arch: "x86_64",
        }
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn serve_binary(body: &'static [u8]) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/Shell-1.3.0.AppImage"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_select_asset_prefers_own_arch() {
        let assets = vec![
            asset("Shell-1.3.0.dmg", "d"),
            asset("Shell-1.3.0-arm64.AppImage", "a"),
            asset("Shell-1.3.0-x86_64.AppImage", "x"),
        ];
        assert_eq!(select_asset(&assets, "x86_64").unwrap().download_url, "x");
        assert_eq!(select_asset(&assets, "aarch64").unwrap().download_url, "a");
    }

    #[test]
    fn test_select_asset_fallbacks() {
        let assets = vec![
            asset("Shell-1.3.0-arm64.AppImage", "a"),
            asset("Shell-1.3.0.appimage", "plain"),
        ];
        assert_eq!(select_asset(&assets, "x86_64").unwrap().download_url, "plain");

        let assets = vec![asset("Shell-1.3.0-arm64.AppImage", "a")];
        assert_eq!(select_asset(&assets, "x86_64").unwrap().download_url, "a");

        let assets = vec![asset("Shell-1.3.0.deb", "deb"), asset("AppImage.txt", "txt")];
        assert!(select_asset(&assets, "x86_64").is_none());
        assert!(select_asset(&[], "x86_64").is_none());
    }

    #[test]
    fn test_sibling_path_appends_suffix() {
        assert_eq!(
            sibling_path(Path::new("/apps/Shell.AppImage"), "bak", 1700000000123),
            PathBuf::from("/apps/Shell.AppImage.bak-1700000000123")
        );
    }

    #[tokio::test]
    async fn test_apply_replaces_binary_and_keeps_backup() {
        let server = serve_binary(b"new-image").await;
        let dir = tempdir().unwrap();
        let live = dir.path().join("Shell.AppImage");
        std::fs::write(&live, "old-image").unwrap();

        let release = release(vec![asset(
            "Shell-1.3.0.AppImage",
            &format!("{}/download/Shell-1.3.0.AppImage", server.uri()),
        )]);
        let environment = InstallEnvironment::AppImageBinary { path: live.clone() };

        let outcome = applier()
            .apply(&release, &environment, None, &|_: &str| {})
            .await
            .unwrap();

        let (new_version, backup_path, warnings) = match outcome {
            UpdateOutcome::Updated {
                new_version,
                backup_path,
                warnings,
            } => (new_version, backup_path, warnings),
            other => panic!("expected Updated, got {:?}", other),
        };
        assert_eq!(new_version, "1.3.0");
        assert!(warnings.is_empty());

        let backup = backup_path.unwrap();
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("Shell.AppImage.bak-"));
        assert_eq!(std::fs::read(&backup).unwrap(), b"old-image");
        assert_eq!(std::fs::read(&live).unwrap(), b"new-image");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&live).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        // Only the live image and its backup remain; no staging leftovers.
        assert_eq!(dir_names(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_apply_continues_when_backup_fails() {
        let server = serve_binary(b"new-image").await;
        let dir = tempdir().unwrap();
        // Nothing at the live path, so the backup copy cannot succeed.
        let live = dir.path().join("Shell.AppImage");

        let release = release(vec![asset(
            "Shell-1.3.0.AppImage",
            &format!("{}/download/Shell-1.3.0.AppImage", server.uri()),
        )]);
        let environment = InstallEnvironment::AppImageBinary { path: live.clone() };

        let lines = Mutex::new(Vec::new());
        let on_status = |line: &str| lines.lock().unwrap().push(line.to_string());
        let outcome = applier()
            .apply(&release, &environment, None, &on_status)
            .await
            .unwrap();

        match outcome {
            UpdateOutcome::Updated {
                backup_path,
                warnings,
                ..
            } => {
                assert!(backup_path.is_none());
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].starts_with("Could not back up"));
            }
            other => panic!("expected Updated, got {:?}", other),
        }
        assert_eq!(std::fs::read(&live).unwrap(), b"new-image");
        assert!(lines
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.starts_with("Could not back up")));
    }

    #[tokio::test]
    async fn test_install_overwrites_in_place_when_staging_fails() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("Shell.AppImage");
        let downloaded = dir.path().join("update.AppImage");
        std::fs::write(&live, "old").unwrap();
        std::fs::write(&downloaded, "new").unwrap();

        let timestamp_ms = 1700000000123;
        let staging = sibling_path(&live, "new", timestamp_ms);
        std::fs::create_dir(&staging).unwrap();

        let mut warnings = Vec::new();
        install_binary(&downloaded, &live, timestamp_ms, &|_: &str| {}, &mut warnings)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&live).unwrap(), b"new");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Could not stage"));
        assert!(staging.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&live).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_blocked_backup_of_existing_binary() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("Shell.AppImage");
        let downloaded = dir.path().join("update.AppImage");
        std::fs::write(&live, "old").unwrap();
        std::fs::write(&downloaded, "new").unwrap();

        // A directory squatting on the backup name makes the copy fail.
        let timestamp_ms = 1700000000456;
        let blocked = sibling_path(&live, "bak", timestamp_ms);
        std::fs::create_dir(&blocked).unwrap();

        let lines = Mutex::new(Vec::new());
        let on_status = |line: &str| lines.lock().unwrap().push(line.to_string());
        let mut warnings = Vec::new();

        let backup = backup_current(&live, timestamp_ms, &on_status, &mut warnings).await;
        assert!(backup.is_none());
        assert_eq!(std::fs::read(&live).unwrap(), b"old");

        install_binary(&downloaded, &live, timestamp_ms, &on_status, &mut warnings)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&live).unwrap(), b"new");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Could not back up"));
        assert!(lines
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.starts_with("Could not back up")));
    }

    #[tokio::test]
    async fn test_apply_without_appimage_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let live = dir.path().join("Shell.AppImage");
        std::fs::write(&live, "old-image").unwrap();

        let release = release(vec![asset("Shell-1.3.0.dmg", &server.uri())]);
        let environment = InstallEnvironment::AppImageBinary { path: live.clone() };

        let outcome = applier()
            .apply(&release, &environment, None, &|_: &str| {})
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::AssetNotFound {
                release_page_url: "https://github.com/acme/shell/releases/tag/v1.3.0".to_string()
            }
        );
        assert_eq!(dir_names(dir.path()), vec!["Shell.AppImage"]);
        assert_eq!(std::fs::read(&live).unwrap(), b"old-image");
    }

    #[tokio::test]
    async fn test_apply_unsupported_install_types() {
        let release = release(vec![asset("Shell-1.3.0.AppImage", "http://127.0.0.1:9/x")]);
        for environment in [
            InstallEnvironment::SystemInstalled {
                exec_path: PathBuf::from("/usr/bin/shell"),
            },
            InstallEnvironment::Unknown {
                exec_path: PathBuf::from("/home/me/shell"),
            },
        ] {
            let outcome = applier()
                .apply(&release, &environment, None, &|_: &str| {})
                .await
                .unwrap();
            assert_eq!(
                outcome,
                UpdateOutcome::UnsupportedInstallType {
                    release_page_url: release.release_page_url.clone()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_apply_download_failure_leaves_binary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let live = dir.path().join("Shell.AppImage");
        std::fs::write(&live, "old-image").unwrap();

        let release = release(vec![asset("Shell-1.3.0.AppImage", &server.uri())]);
        let environment = InstallEnvironment::AppImageBinary { path: live.clone() };

        let result = applier()
            .apply(&release, &environment, None, &|_: &str| {})
            .await;

        assert!(matches!(result, Err(UpdateError::DownloadError(_))));
        assert_eq!(dir_names(dir.path()), vec!["Shell.AppImage"]);
        assert_eq!(std::fs::read(&live).unwrap(), b"old-image");
    }
}
