//! GitHub release lookups

use crate::config::UpdateConfig;
use crate::update::repo::RepoCoordinate;
use crate::update::UpdateError;
use serde::Deserialize;
use std::time::Duration;

/// Downloadable release asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
}

/// Latest release as seen by the updater
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Tag without a leading `v`, possibly empty
    pub version: String,

    /// Source snapshot archive (zip)
    pub source_archive_url: String,

    /// Binary assets in API order
    pub binary_assets: Vec<Asset>,

    /// Human-facing release page
    pub release_page_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    zipball_url: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

/// Client for the release API and release downloads
#[derive(Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    api_base_url: String,
    timeout: Duration,
}

impl ReleaseClient {
    /// Create a client from the update configuration
    pub fn new(config: &UpdateConfig) -> Result<Self, UpdateError> {
        Self::with_base_url(
            &config.settings.api_base_url,
            &config.settings.user_agent,
            config.request_timeout(),
        )
    }

    /// Create a client against a specific API base URL
    pub fn with_base_url(
        api_base_url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, UpdateError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| UpdateError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch the latest published release of `repo`
    pub async fn fetch_latest(
        &self,
        repo: &RepoCoordinate,
        token: Option<&str>,
    ) -> Result<ReleaseInfo, UpdateError> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base_url, repo.owner, repo.project
        );
        tracing::debug!("Fetching latest release from {}", url);

        let mut request = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                UpdateError::NetworkError(format!("Failed to fetch latest release: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::NetworkError(format!(
                "Latest release request for {} failed with status {}",
                repo, status
            )));
        }

        let release: GithubRelease = response
            .json()
            .await
            .map_err(|e| {
                UpdateError::NetworkError(format!("Failed to parse release response: {}", e))
            })?;

        Ok(self.to_release_info(repo, release))
    }

    fn to_release_info(&self, repo: &RepoCoordinate, release: GithubRelease) -> ReleaseInfo {
        let tag = [release.tag_name.as_deref(), release.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|tag| !tag.is_empty())
            .unwrap_or_default()
            .to_string();

        let source_archive_url = release
            .zipball_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "{}/repos/{}/{}/zipball/{}",
                    self.api_base_url, repo.owner, repo.project, tag
                )
            });

        let release_page_url = release
            .html_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("https://github.com/{}/releases/latest", repo));

        ReleaseInfo {
            version: normalize_tag(&tag).to_string(),
            source_archive_url,
            binary_assets: release
                .assets
                .into_iter()
                .map(|asset| Asset {
                    name: asset.name,
                    download_url: asset.browser_download_url,
                })
                .collect(),
            release_page_url,
        }
    }
}

/// Strip a single leading `v` from a tag
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}
