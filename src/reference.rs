//! Repository reference resolution
//!
//! Turns whatever the caller typed (a clone URL, an SSH reference, `host/owner/repo`,
//! GitHub `owner/repo` shorthand or a GitHub browser link) into a
//! [`RepositoryIdentity`] with a canonical clone URL and a comparison key.
//!
//! Input forms are tried in a fixed order, see [`ReferenceForm`]. The first form
//! that recognizes the input decides the outcome, including failure.

use serde::Serialize;
use std::fmt;
use url::Url;

use crate::error::{Result, SyncError};

/// Host assumed for `owner/repo` shorthand
pub const DEFAULT_HOST: &str = "github.com";

/// Third path segments that mark a GitHub web-UI deep link rather than a repository
const GITHUB_WEB_MARKERS: [&str; 8] = [
    "tree", "blob", "commit", "pull", "issues", "actions", "releases", "wiki",
];

/// How the canonical clone URL reaches the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Https,
    Ssh,
}

/// Canonical identity of a remote repository
///
/// Recomputed from the raw reference on every call; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryIdentity {
    /// Lowercased host, including a non-default port when one was given
    pub host: String,
    /// Validated path components (owner, repo, ...), case preserved
    pub path_segments: Vec<String>,
    /// `https://host/path.git` or `git@host:path.git`
    pub canonical_url: String,
    /// Lowercased `host/path`; equal keys mean the same repository
    pub comparison_key: String,
    pub transport: Transport,
}

impl RepositoryIdentity {
    /// Parse a raw repository reference
    ///
    /// SSH forms are only accepted when `allow_ssh` is set.
    pub fn parse(raw: &str, allow_ssh: bool) -> Result<Self> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(SyncError::InvalidReference(
                "repository reference is empty".to_string(),
            ));
        }

        for form in ReferenceForm::ORDER {
            if let Some(outcome) = form.recognize(input, allow_ssh) {
                return outcome;
            }
        }

        Err(SyncError::InvalidReference(format!(
            "unrecognized repository reference: {}",
            input
        )))
    }

    fn new(host: String, path_segments: Vec<String>, transport: Transport) -> Self {
        let path = path_segments.join("/");
        let canonical_url = match transport {
            Transport::Https => format!("https://{}/{}.git", host, path),
            Transport::Ssh => format!("git@{}:{}.git", host, path),
        };
        let comparison_key = format!("{}/{}", host, path).to_lowercase();

        Self {
            host,
            path_segments,
            canonical_url,
            comparison_key,
            transport,
        }
    }

    /// First path segment (user or organization)
    pub fn owner(&self) -> &str {
        &self.path_segments[0]
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        &self.path_segments[self.path_segments.len() - 1]
    }

    /// Whether both identities denote the same remote repository
    pub fn same_repository(&self, other: &RepositoryIdentity) -> bool {
        self.comparison_key == other.comparison_key
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_url)
    }
}

/// Recognized reference forms, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceForm {
    /// `https://host/path...`; any other `scheme://` except `ssh://` is refused here
    HttpsUrl,
    /// `host/path...` where the first segment looks like a hostname
    HostPath,
    /// `owner/repo` on [`DEFAULT_HOST`]
    Shorthand,
    /// `git@host:path` or `ssh://git@host/path`
    Ssh,
}

impl ReferenceForm {
    const ORDER: [ReferenceForm; 4] = [
        ReferenceForm::HttpsUrl,
        ReferenceForm::HostPath,
        ReferenceForm::Shorthand,
        ReferenceForm::Ssh,
    ];

    /// `None` means "not this form"; `Some` ends the search with a verdict
    fn recognize(self, input: &str, allow_ssh: bool) -> Option<Result<RepositoryIdentity>> {
        match self {
            ReferenceForm::HttpsUrl => {
                (has_scheme(input) && !is_ssh_style(input)).then(|| parse_https(input))
            }
            ReferenceForm::HostPath => (!has_scheme(input)
                && !is_ssh_style(input)
                && first_segment(input).contains(['.', ':']))
            .then(|| parse_host_path(input)),
            ReferenceForm::Shorthand => (!has_scheme(input)
                && !is_ssh_style(input)
                && !first_segment(input).contains(['.', ':']))
            .then(|| parse_shorthand(input)),
            ReferenceForm::Ssh => is_ssh_style(input).then(|| {
                if allow_ssh {
                    parse_ssh(input)
                } else {
                    Err(SyncError::InvalidReference(format!(
                        "SSH references are disabled (set allow_ssh to use {})",
                        input
                    )))
                }
            }),
        }
    }
}

fn has_scheme(input: &str) -> bool {
    input.contains("://")
}

fn is_ssh_style(input: &str) -> bool {
    if has_scheme(input) {
        return input.to_ascii_lowercase().starts_with("ssh://");
    }
    // scp-like syntax: user@host:path
    first_segment(input).contains('@')
}

fn first_segment(input: &str) -> &str {
    input
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
}

fn parse_https(input: &str) -> Result<RepositoryIdentity> {
    let url = Url::parse(input)
        .map_err(|e| SyncError::InvalidReference(format!("{}: {}", input, e)))?;

    if url.scheme() != "https" {
        return Err(SyncError::InvalidReference(format!(
            "scheme '{}' is not allowed, use https: {}",
            url.scheme(),
            input
        )));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(SyncError::InvalidReference(format!(
            "credentials embedded in the URL are not supported: {}",
            url.host_str().unwrap_or(input)
        )));
    }

    let host = host_of(&url, input)?;
    let segments = normalize_segments(&host, url.path())?;
    Ok(RepositoryIdentity::new(host, segments, Transport::Https))
}

fn parse_host_path(input: &str) -> Result<RepositoryIdentity> {
    let trimmed = input.trim_start_matches('/');
    let (authority, path) = trimmed.split_once('/').unwrap_or((trimmed, ""));

    // Let the URL parser validate the authority (IDNA, port range) and lowercase it
    let url = Url::parse(&format!("https://{}/", authority))
        .map_err(|e| SyncError::InvalidReference(format!("invalid host '{}': {}", authority, e)))?;
    let host = host_of(&url, input)?;

    let segments = normalize_segments(&host, path)?;
    Ok(RepositoryIdentity::new(host, segments, Transport::Https))
}

fn parse_shorthand(input: &str) -> Result<RepositoryIdentity> {
    let path = input.trim_matches('/');
    if path.split('/').count() != 2 {
        return Err(SyncError::InvalidReference(format!(
            "expected owner/repo shorthand, got: {}",
            input
        )));
    }

    let segments = normalize_segments(DEFAULT_HOST, path)?;
    Ok(RepositoryIdentity::new(
        DEFAULT_HOST.to_string(),
        segments,
        Transport::Https,
    ))
}

fn parse_ssh(input: &str) -> Result<RepositoryIdentity> {
    if has_scheme(input) {
        let url = Url::parse(input)
            .map_err(|e| SyncError::InvalidReference(format!("{}: {}", input, e)))?;

        if matches!(url.port(), Some(port) if port != 22) {
            return Err(SyncError::InvalidReference(format!(
                "SSH references on non-standard ports are not supported: {}",
                input
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SyncError::InvalidReference(format!("missing host: {}", input)))?
            .to_lowercase();
        validate_host(&host, input)?;
        let segments = normalize_segments(&host, url.path())?;
        return Ok(RepositoryIdentity::new(host, segments, Transport::Ssh));
    }

    let (user, rest) = input
        .split_once('@')
        .ok_or_else(|| SyncError::InvalidReference(format!("malformed SSH reference: {}", input)))?;
    let (host, path) = rest
        .split_once(':')
        .ok_or_else(|| SyncError::InvalidReference(format!("malformed SSH reference: {}", input)))?;

    if user.is_empty() || host.is_empty() || host.contains('/') {
        return Err(SyncError::InvalidReference(format!(
            "malformed SSH reference: {}",
            input
        )));
    }

    let host = host.to_lowercase();
    validate_host(&host, input)?;
    let segments = normalize_segments(&host, path)?;
    Ok(RepositoryIdentity::new(host, segments, Transport::Ssh))
}

fn host_of(url: &Url, input: &str) -> Result<String> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SyncError::InvalidReference(format!("missing host: {}", input)))?
        .to_lowercase();
    validate_host(&host, input)?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Every dot-separated label must be non-empty; rules out `.`, `..` and `a..b`
fn validate_host(host: &str, input: &str) -> Result<()> {
    // Bracketed IPv6 literals carry no labels
    if host.starts_with('[') {
        return Ok(());
    }
    if host.is_empty() || host.split('.').any(str::is_empty) {
        return Err(SyncError::InvalidReference(format!(
            "invalid host '{}': {}",
            host, input
        )));
    }
    Ok(())
}

/// Split, trim and validate a repository path
fn normalize_segments(host: &str, path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(SyncError::InvalidReference(format!(
            "expected at least owner/repo after {}",
            host
        )));
    }

    let mut segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();

    if let Some(last) = segments.last_mut() {
        if let Some(stripped) = last.strip_suffix(".git") {
            *last = stripped.to_string();
        }
    }

    // github.com/owner/repo/tree/main/... points at the repository root
    if host == DEFAULT_HOST
        && segments.len() >= 3
        && GITHUB_WEB_MARKERS.contains(&segments[2].as_str())
    {
        segments.truncate(2);
    }

    for segment in &segments {
        validate_segment(segment)?;
    }

    if segments.len() < 2 {
        return Err(SyncError::InvalidReference(format!(
            "expected at least owner/repo, got '{}'",
            trimmed
        )));
    }

    Ok(segments)
}

fn validate_segment(segment: &str) -> Result<()> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('\\')
        || segment.chars().any(|c| c.is_control() || c.is_whitespace());

    if invalid {
        return Err(SyncError::InvalidReference(format!(
            "invalid path segment '{}'",
            segment
        )));
    }
    Ok(())
}
