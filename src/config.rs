//! Update configuration
//!
//! Everything the update subsystem would otherwise read from ambient process
//! state is captured here once and passed in explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the repository coordinate
pub const REPO_OVERRIDE_ENV: &str = "WEBSHELL_UPDATE_REPO";

/// Environment variables holding an API token, in priority order
pub const TOKEN_ENVS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Set by the AppImage runtime to the path of the running image
pub const APPIMAGE_ENV: &str = "APPIMAGE";

/// Persistent update settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Base URL of the release API
    pub api_base_url: String,

    /// User agent sent with every request
    pub user_agent: String,

    /// Name of the project metadata file in the install root
    pub metadata_file: String,

    /// Timeout for release metadata requests (seconds)
    pub request_timeout_secs: u64,

    /// Repository coordinate override, superseded by `WEBSHELL_UPDATE_REPO`
    pub repo: Option<String>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            user_agent: format!("webshell-updater/{}", env!("CARGO_PKG_VERSION")),
            metadata_file: "package.json".to_string(),
            request_timeout_secs: 30,
            repo: None,
        }
    }
}

impl UpdateSettings {
    /// Load settings from a JSON file, falling back to defaults
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            std::fs::read_to_string(path)
                .ok()
                .and_then(|content| match serde_json::from_str(&content) {
                    Ok(settings) => Some(settings),
                    Err(e) => {
                        tracing::warn!("Ignoring malformed settings {:?}: {}", path, e);
                        None
                    }
                })
                .unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Runtime configuration for one update check
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Persistent settings
    pub settings: UpdateSettings,

    /// Explicit `owner/project` override
    pub repo_override: Option<String>,

    /// API token for authenticated requests
    pub token: Option<String>,

    /// Path of the running AppImage, if any
    pub appimage_path: Option<PathBuf>,

    /// Path of the running executable
    pub exec_path: PathBuf,

    /// Whether system-install detection applies
    pub is_linux: bool,
}

impl UpdateConfig {
    /// Configuration with no environment input
    pub fn new(settings: UpdateSettings) -> Self {
        Self {
            repo_override: settings.repo.clone(),
            settings,
            token: None,
            appimage_path: None,
            exec_path: PathBuf::new(),
            is_linux: cfg!(target_os = "linux"),
        }
    }

    /// Snapshot the process environment on top of `settings`
    pub fn from_env(settings: UpdateSettings) -> Self {
        let mut config = Self::new(settings);

        if let Some(repo) = non_empty_env(REPO_OVERRIDE_ENV) {
            config.repo_override = Some(repo);
        }
        config.token = TOKEN_ENVS.iter().find_map(|name| non_empty_env(name));
        config.appimage_path = non_empty_env(APPIMAGE_ENV).map(PathBuf::from);
        config.exec_path = std::env::current_exe().unwrap_or_else(|e| {
            tracing::warn!("Could not determine executable path: {}", e);
            PathBuf::new()
        });

        config
    }

    pub fn with_repo_override(mut self, repo: impl Into<String>) -> Self {
        self.repo_override = Some(repo.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_appimage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.appimage_path = Some(path.into());
        self
    }

    pub fn with_exec_path(mut self, path: impl Into<PathBuf>, is_linux: bool) -> Self {
        self.exec_path = path.into();
        self.is_linux = is_linux;
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.api_base_url = url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self::new(UpdateSettings::default())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
