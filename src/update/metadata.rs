//! Project metadata read from the install root

use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_VERSION: &str = "0.0.0";

/// Subset of the project metadata file relevant to updates
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectMetadata {
    /// Installed version
    pub version: Option<String>,

    /// Top-level publish configuration
    pub publish: Option<PublishTargets>,

    /// Packaging configuration, which may carry its own publish list
    pub build: Option<BuildSection>,

    /// Source repository
    pub repository: Option<RepositoryField>,

    /// Project homepage
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub publish: Option<PublishTargets>,
}

/// A single publish target or a list of them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PublishTargets {
    Many(Vec<PublishTarget>),
    One(PublishTarget),
    Other(serde_json::Value),
}

impl PublishTargets {
    fn iter(&self) -> impl Iterator<Item = &PublishTarget> {
        let targets: &[PublishTarget] = match self {
            Self::Many(targets) => targets,
            Self::One(target) => std::slice::from_ref(target),
            Self::Other(_) => &[],
        };
        targets.iter()
    }
}

/// Publish target entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublishTarget {
    pub provider: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub url: Option<String>,
}

impl PublishTarget {
    pub fn is_github(&self) -> bool {
        self.provider
            .as_deref()
            .is_some_and(|provider| provider.eq_ignore_ascii_case("github"))
    }
}

/// `repository` is either a bare string or an object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RepositoryField {
    Plain(String),
    Detailed {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        directory: Option<String>,
        #[serde(default)]
        repo: Option<String>,
    },
    Other(serde_json::Value),
}

impl ProjectMetadata {
    /// Load metadata from `file_name` under `install_root`.
    ///
    /// A missing file yields empty metadata. An unreadable or malformed file
    /// is logged and also treated as empty.
    pub async fn load(install_root: &Path, file_name: &str) -> Self {
        let path = install_root.join(file_name);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No project metadata at {:?}", path);
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read project metadata {:?}: {}", path, e);
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed project metadata {:?}: {}", path, e);
            Self::default()
        })
    }

    /// Installed version, `0.0.0` when absent or blank
    pub fn current_version(&self) -> &str {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .unwrap_or(DEFAULT_VERSION)
    }

    /// Publish targets from `build.publish` followed by top-level `publish`
    pub fn publish_targets(&self) -> impl Iterator<Item = &PublishTarget> {
        self.build
            .as_ref()
            .and_then(|build| build.publish.as_ref())
            .into_iter()
            .chain(self.publish.as_ref())
            .flat_map(PublishTargets::iter)
    }
}
