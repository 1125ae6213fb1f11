//! Repository coordinate parsing and resolution

use crate::update::metadata::{ProjectMetadata, PublishTarget, RepositoryField};
use std::fmt;
use url::Url;

const GITHUB_HOSTS: [&str; 2] = ["github.com", "www.github.com"];

/// `owner/project` pair identifying a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoCoordinate {
    pub owner: String,
    pub project: String,
}

impl RepoCoordinate {
    pub fn new(owner: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            project: project.into(),
        }
    }

    /// Build a coordinate from separate owner and project values
    fn from_parts(owner: &str, project: &str) -> Option<Self> {
        let project = project.trim().trim_end_matches(".git");
        let owner = owner.trim();
        (is_valid_segment(owner) && is_valid_segment(project))
            .then(|| Self::new(owner, project))
    }
}

impl fmt::Display for RepoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.project)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Parse any supported repository string shape into a coordinate.
///
/// Accepts `owner/project`, `github:owner/project`, HTTPS/git/ssh URLs on
/// github.com (with or without the scheme) and scp-style
/// `git@github.com:owner/project`. A trailing `.git`, trailing slashes and URL
/// fragments are ignored.
pub fn parse_github_repo_string(input: &str) -> Option<RepoCoordinate> {
    let trimmed = input.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    let cleaned = without_fragment.trim_end_matches('/');
    if cleaned.is_empty() {
        return None;
    }

    if let Some(rest) = cleaned.strip_prefix("github:") {
        return parse_plain(rest);
    }

    if let Some((user_host, path)) = scp_like(cleaned) {
        let host = user_host.rsplit('@').next().unwrap_or_default();
        if !is_github_host(host) {
            return None;
        }
        return parse_plain(path.trim_start_matches('/'));
    }

    if cleaned.contains("://") {
        let url = Url::parse(cleaned).ok()?;
        if !url.host_str().is_some_and(is_github_host) {
            return None;
        }
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let project = segments.next()?;
        return RepoCoordinate::from_parts(owner, project);
    }

    if let Some(path) = strip_github_host(cleaned) {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let project = segments.next()?;
        return RepoCoordinate::from_parts(owner, project);
    }

    parse_plain(cleaned)
}

/// Path after a scheme-less `github.com/` or `www.github.com/` prefix
fn strip_github_host(input: &str) -> Option<&str> {
    let (host, path) = input.split_once('/')?;
    is_github_host(host).then_some(path)
}

/// `owner/project` with exactly two segments
fn parse_plain(input: &str) -> Option<RepoCoordinate> {
    let mut segments = input.split('/');
    let owner = segments.next()?;
    let project = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    RepoCoordinate::from_parts(owner, project)
}

/// Split `user@host:path`, the scp syntax git uses for SSH remotes
fn scp_like(input: &str) -> Option<(&str, &str)> {
    if input.contains("://") {
        return None;
    }
    let (user_host, path) = input.split_once(':')?;
    user_host.contains('@').then_some((user_host, path))
}

fn is_github_host(host: &str) -> bool {
    GITHUB_HOSTS
        .iter()
        .any(|candidate| host.eq_ignore_ascii_case(candidate))
}

/// Resolve the repository coordinate for an install.
///
/// The first source that yields a coordinate wins: explicit override, a
/// GitHub publish target, the `repository` field, then `homepage`.
pub fn resolve(override_repo: Option<&str>, metadata: &ProjectMetadata) -> Option<RepoCoordinate> {
    if let Some(coordinate) = override_repo.and_then(parse_plain_override) {
        tracing::debug!("Using repository override {}", coordinate);
        return Some(coordinate);
    }

    if let Some(coordinate) = metadata.publish_targets().find_map(from_publish_target) {
        tracing::debug!("Using publish target repository {}", coordinate);
        return Some(coordinate);
    }

    if let Some(coordinate) = metadata.repository.as_ref().and_then(from_repository_field) {
        tracing::debug!("Using repository field {}", coordinate);
        return Some(coordinate);
    }

    let coordinate = metadata
        .homepage
        .as_deref()
        .and_then(parse_github_repo_string);
    if let Some(coordinate) = &coordinate {
        tracing::debug!("Using homepage repository {}", coordinate);
    }
    coordinate
}

fn parse_plain_override(value: &str) -> Option<RepoCoordinate> {
    let coordinate = parse_plain(value.trim());
    if coordinate.is_none() && !value.trim().is_empty() {
        tracing::warn!("Ignoring malformed repository override {:?}", value);
    }
    coordinate
}

fn from_publish_target(target: &PublishTarget) -> Option<RepoCoordinate> {
    if !target.is_github() {
        return None;
    }
    if let (Some(owner), Some(repo)) = (target.owner.as_deref(), target.repo.as_deref()) {
        if let Some(coordinate) = RepoCoordinate::from_parts(owner, repo) {
            return Some(coordinate);
        }
    }
    target.url.as_deref().and_then(parse_github_repo_string)
}

fn from_repository_field(field: &RepositoryField) -> Option<RepoCoordinate> {
    match field {
        RepositoryField::Plain(value) => parse_github_repo_string(value),
        RepositoryField::Detailed {
            url,
            directory,
            repo,
        } => [url, directory, repo]
            .into_iter()
            .flatten()
            .find_map(|value| parse_github_repo_string(value)),
        RepositoryField::Other(_) => None,
    }
}
