use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Value reported by [`VcsAdapter::current_ref`] when HEAD is detached
pub const DETACHED_HEAD: &str = "HEAD";

/// Remote every clone is created with and synchronized against
pub const ORIGIN: &str = "origin";

/// stderr fragments that indicate a network-class (retryable) failure
const TRANSIENT_MARKERS: [&str; 8] = [
    "Could not resolve host",
    "Connection timed out",
    "Connection refused",
    "Connection reset",
    "Operation timed out",
    "The remote end hung up unexpectedly",
    "early EOF",
    "Temporary failure in name resolution",
];

/// Operations the synchronization engine needs from a version-control backend
///
/// Every query is scoped to a working copy path. Implementations must not keep
/// state between calls beyond what lives on disk.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VcsAdapter: Send + Sync {
    async fn path_exists(&self, path: &Path) -> Result<bool>;

    /// Whether `path` is the top of a working copy
    async fn is_repository(&self, path: &Path) -> Result<bool>;

    /// Clone `url` into `dest`, creating parent directories; `depth` makes it shallow
    async fn clone_repo(&self, url: &str, dest: &Path, depth: Option<u32>) -> Result<()>;

    async fn fetch(&self, path: &Path) -> Result<()>;

    async fn checkout(&self, path: &Path, git_ref: &str) -> Result<()>;

    /// Fast-forward the current branch to the already fetched `upstream`,
    /// refusing anything else
    async fn fast_forward(&self, path: &Path, upstream: &str) -> Result<()>;

    /// Discard local changes and move the current branch to `target`
    async fn reset_hard(&self, path: &Path, target: &str) -> Result<()>;

    /// Current branch name, or [`DETACHED_HEAD`]
    async fn current_ref(&self, path: &Path) -> Result<String>;

    async fn head_sha(&self, path: &Path) -> Result<String>;

    /// Stored URL of the `origin` remote, before any `insteadOf` rewriting
    async fn origin_url(&self, path: &Path) -> Result<Option<String>>;

    /// Remote default branch name without the remote prefix
    async fn default_branch(&self, path: &Path) -> Result<Option<String>>;

    /// Remote tracking ref for `branch` (e.g. `origin/main`)
    async fn upstream_ref(&self, path: &Path, branch: &str) -> Result<Option<String>>;

    async fn resolve_commit(&self, path: &Path, git_ref: &str) -> Result<Option<String>>;

    async fn is_dirty(&self, path: &Path) -> Result<bool>;

    /// `(ahead, behind)` commit counts of HEAD relative to `comparison`
    async fn ahead_behind(&self, path: &Path, comparison: &str) -> Result<(u32, u32)>;
}

/// [`VcsAdapter`] backed by the `git` command-line client
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    timeout: Duration,
    config_overrides: BTreeMap<String, String>,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "git".to_string(),
            timeout,
            config_overrides: BTreeMap::new(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Add a `-c key=value` override passed to every invocation
    pub fn with_config_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_config_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        self.config_overrides
            .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Run git and return its raw output, whatever the exit status
    async fn run(&self, cwd: Option<&Path>, args: &[&str]) -> Result<Output> {
        let mut command = AsyncCommand::new(&self.binary);
        for (key, value) in &self.config_overrides {
            command.arg("-c").arg(format!("{}={}", key, value));
        }
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        debug!("git {}", args.join(" "));

        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SyncError::VcsOperationFailed(format!(
                "failed to execute {} {}: {}",
                self.binary,
                args.first().copied().unwrap_or_default(),
                e
            ))),
            Err(_) => Err(SyncError::Transient(format!(
                "git {} timed out after {}s",
                args.first().copied().unwrap_or_default(),
                self.timeout.as_secs()
            ))),
        }
    }

    /// Run git and require a zero exit status; returns trimmed stdout
    async fn run_checked(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String> {
        let output = self.run(cwd, args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(args, &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a query where a non-zero exit means "no answer" rather than failure
    async fn run_optional(&self, cwd: &Path, args: &[&str]) -> Result<Option<String>> {
        let output = self.run(Some(cwd), args).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!stdout.is_empty()).then_some(stdout))
    }

    async fn remote_ref_exists(&self, path: &Path, remote_ref: &str) -> Result<bool> {
        let full = format!("refs/remotes/{}", remote_ref);
        Ok(self
            .run_optional(path, &["rev-parse", "--verify", "--quiet", &full])
            .await?
            .is_some())
    }
}

#[async_trait]
impl VcsAdapter for GitCli {
    async fn path_exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await.unwrap_or(false))
    }

    async fn is_repository(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false))
    }

    async fn clone_repo(&self, url: &str, dest: &Path, depth: Option<u32>) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::VcsOperationFailed(format!(
                    "failed to create parent directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        info!("Cloning repository: {} -> {}", url, dest.display());

        let depth_arg = depth.map(|d| d.to_string());
        let dest_arg = dest.to_string_lossy();
        let mut args = vec!["clone", "--origin", ORIGIN];
        if let Some(depth) = depth_arg.as_deref() {
            args.extend(["--depth", depth, "--no-single-branch"]);
        }
        args.extend(["--", url, &*dest_arg]);

        self.run_checked(None, &args).await?;
        Ok(())
    }

    async fn fetch(&self, path: &Path) -> Result<()> {
        self.run_checked(Some(path), &["fetch", "--prune", ORIGIN])
            .await?;
        Ok(())
    }

    async fn checkout(&self, path: &Path, git_ref: &str) -> Result<()> {
        self.run_checked(Some(path), &["checkout", git_ref]).await?;
        Ok(())
    }

    async fn fast_forward(&self, path: &Path, upstream: &str) -> Result<()> {
        self.run_checked(Some(path), &["merge", "--ff-only", upstream])
            .await?;
        Ok(())
    }

    async fn reset_hard(&self, path: &Path, target: &str) -> Result<()> {
        self.run_checked(Some(path), &["reset", "--hard", target])
            .await?;
        self.run_checked(Some(path), &["clean", "-fd"]).await?;
        Ok(())
    }

    async fn current_ref(&self, path: &Path) -> Result<String> {
        self.run_checked(Some(path), &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
    }

    async fn head_sha(&self, path: &Path) -> Result<String> {
        self.run_checked(Some(path), &["rev-parse", "HEAD"]).await
    }

    async fn origin_url(&self, path: &Path) -> Result<Option<String>> {
        // `remote get-url` applies insteadOf rewriting; the stored value is what was cloned
        let key = format!("remote.{}.url", ORIGIN);
        self.run_optional(path, &["config", "--get", &key]).await
    }

    async fn default_branch(&self, path: &Path) -> Result<Option<String>> {
        let symbolic = format!("refs/remotes/{}/HEAD", ORIGIN);
        if let Some(head) = self
            .run_optional(path, &["symbolic-ref", "--quiet", "--short", &symbolic])
            .await?
        {
            let prefix = format!("{}/", ORIGIN);
            return Ok(Some(head.strip_prefix(&prefix).unwrap_or(&head).to_string()));
        }

        for candidate in ["main", "master"] {
            if self
                .remote_ref_exists(path, &format!("{}/{}", ORIGIN, candidate))
                .await?
            {
                return Ok(Some(candidate.to_string()));
            }
        }
        Ok(None)
    }

    async fn upstream_ref(&self, path: &Path, branch: &str) -> Result<Option<String>> {
        let revspec = format!("{}@{{upstream}}", branch);
        if let Some(upstream) = self
            .run_optional(path, &["rev-parse", "--abbrev-ref", "--symbolic-full-name", &revspec])
            .await?
        {
            return Ok(Some(upstream));
        }

        let fallback = format!("{}/{}", ORIGIN, branch);
        if self.remote_ref_exists(path, &fallback).await? {
            return Ok(Some(fallback));
        }
        Ok(None)
    }

    async fn resolve_commit(&self, path: &Path, git_ref: &str) -> Result<Option<String>> {
        let revspec = format!("{}^{{commit}}", git_ref);
        self.run_optional(path, &["rev-parse", "--verify", "--quiet", &revspec])
            .await
    }

    async fn is_dirty(&self, path: &Path) -> Result<bool> {
        let status = self
            .run_checked(Some(path), &["status", "--porcelain"])
            .await?;
        Ok(!status.is_empty())
    }

    async fn ahead_behind(&self, path: &Path, comparison: &str) -> Result<(u32, u32)> {
        let range = format!("HEAD...{}", comparison);
        let counts = self
            .run_checked(Some(path), &["rev-list", "--left-right", "--count", &range])
            .await?;
        parse_left_right(&counts).ok_or_else(|| {
            SyncError::VcsOperationFailed(format!(
                "unexpected rev-list output for {}: '{}'",
                range, counts
            ))
        })
    }
}

/// Map a non-zero git exit to the error taxonomy
fn classify_failure(args: &[&str], stderr: &str) -> SyncError {
    let subcommand = args.first().copied().unwrap_or("git");
    let stderr = stderr.trim();

    if TRANSIENT_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        SyncError::Transient(format!("git {} failed: {}", subcommand, stderr))
    } else {
        SyncError::VcsOperationFailed(format!("git {} failed: {}", subcommand, stderr))
    }
}

/// Parse `rev-list --left-right --count` output: "<left>\t<right>"
fn parse_left_right(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((ahead, behind))
}
