//! Sync Engine - clone-or-update state machine for a single repository
//!
//! Given a resolved [`RepositoryIdentity`], the engine makes sure a working copy
//! exists under the clone root, applies the selected [`UpdateMode`] to an
//! existing copy, and reports how the result compares to the remote.
//!
//! Steps run strictly in order against the [`VcsAdapter`]; there is no locking,
//! so concurrent calls for the same path must be serialized by the caller.

use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::git::{VcsAdapter, DETACHED_HEAD, ORIGIN};
use crate::paths::build_path;
use crate::reference::RepositoryIdentity;

/// Policy applied to an existing clone after fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateMode {
    /// Fast-forward the current branch; refuse dirty trees and diverged history
    #[default]
    FfOnly,
    /// Fetch and nothing else
    FetchOnly,
    /// Hard-reset the current branch onto its remote tip, discarding local work
    ResetClean,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::FfOnly => "ff-only",
            UpdateMode::FetchOnly => "fetch-only",
            UpdateMode::ResetClean => "reset-clean",
        }
    }
}

impl FromStr for UpdateMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ff-only" => Ok(UpdateMode::FfOnly),
            "fetch-only" => Ok(UpdateMode::FetchOnly),
            "reset-clean" => Ok(UpdateMode::ResetClean),
            other => Err(SyncError::UnsupportedUpdateMode(format!(
                "'{}' (expected ff-only, fetch-only or reset-clean)",
                other
            ))),
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall outcome of an `ensure_local` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Cloned,
    Updated,
    AlreadyCurrent,
    Fetched,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Cloned => "cloned",
            SyncStatus::Updated => "updated",
            SyncStatus::AlreadyCurrent => "already-current",
            SyncStatus::Fetched => "fetched",
        }
    }
}

/// How the local head relates to the comparison ref
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Current,
    Stale,
    Ahead,
    Diverged,
    Unknown,
}

impl Freshness {
    /// Classify ahead/behind commit counts
    pub fn classify(ahead_by: u32, behind_by: u32) -> Self {
        match (ahead_by, behind_by) {
            (0, 0) => Freshness::Current,
            (0, _) => Freshness::Stale,
            (_, 0) => Freshness::Ahead,
            _ => Freshness::Diverged,
        }
    }
}

/// One operation actually performed against the working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Cloned { url: String },
    FetchedOrigin,
    CheckedOut { git_ref: String },
    FastForwarded { branch: String },
    ResetHard { target: String },
    /// Fast-forward skipped because HEAD is detached
    SkippedDetachedHead,
}

impl SyncAction {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            SyncAction::FastForwarded { .. } | SyncAction::ResetHard { .. }
        )
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Cloned { url } => write!(f, "cloned:{}", url),
            SyncAction::FetchedOrigin => f.write_str("fetched_origin"),
            SyncAction::CheckedOut { git_ref } => write!(f, "checked_out:{}", git_ref),
            SyncAction::FastForwarded { branch } => write!(f, "fast_forward:{}", branch),
            SyncAction::ResetHard { target } => write!(f, "reset_hard:{}", target),
            SyncAction::SkippedDetachedHead => f.write_str("noop:detached_head"),
        }
    }
}

impl Serialize for SyncAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Caller-controlled knobs for one `ensure_local` call
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub clone_root: PathBuf,
    pub git_ref: Option<String>,
    pub depth: Option<u32>,
    pub update_mode: UpdateMode,
}

impl SyncOptions {
    pub fn new(clone_root: impl Into<PathBuf>) -> Self {
        Self {
            clone_root: clone_root.into(),
            git_ref: None,
            depth: None,
            update_mode: UpdateMode::default(),
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_update_mode(mut self, update_mode: UpdateMode) -> Self {
        self.update_mode = update_mode;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.depth == Some(0) {
            return Err(SyncError::InvalidArgument(
                "depth must be a positive integer".to_string(),
            ));
        }

        if let Some(git_ref) = &self.git_ref {
            // A leading dash would be read as a git option
            if git_ref.trim().is_empty() || git_ref.starts_with('-') {
                return Err(SyncError::InvalidArgument(format!(
                    "invalid ref '{}'",
                    git_ref
                )));
            }
        }
        Ok(())
    }
}

/// Output record of a successful `ensure_local` call
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    pub repo_url: String,
    pub local_path: PathBuf,
    pub current_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    pub head_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_head_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ahead_by: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behind_by: Option<u32>,
    pub freshness: Freshness,
    pub actions: Vec<SyncAction>,
    pub instructions: String,
}

/// Comparison of the local head against a remote ref
#[derive(Debug, Clone, PartialEq, Eq)]
struct FreshnessReport {
    comparison_ref: Option<String>,
    remote_head_sha: Option<String>,
    ahead_by: Option<u32>,
    behind_by: Option<u32>,
    freshness: Freshness,
}

impl FreshnessReport {
    fn unknown() -> Self {
        Self {
            comparison_ref: None,
            remote_head_sha: None,
            ahead_by: None,
            behind_by: None,
            freshness: Freshness::Unknown,
        }
    }
}

/// The clone-or-update state machine
pub struct SyncEngine<V> {
    vcs: V,
}

impl<V: VcsAdapter> SyncEngine<V> {
    pub fn new(vcs: V) -> Self {
        Self { vcs }
    }

    /// Make sure `identity` is available under `options.clone_root`
    ///
    /// Returns a complete [`SyncResult`] or an error; never a partial record.
    pub async fn ensure_local(
        &self,
        identity: &RepositoryIdentity,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        options.validate()?;
        let local_path = build_path(&options.clone_root, identity)?;
        let mut actions = Vec::new();

        let status = if self.vcs.path_exists(&local_path).await? {
            self.update_existing(identity, &local_path, options, &mut actions)
                .await?
        } else {
            self.clone_fresh(identity, &local_path, options, &mut actions)
                .await?
        };

        let current_ref = self.vcs.current_ref(&local_path).await?;
        let head_sha = self.vcs.head_sha(&local_path).await?;
        let default_branch = self.vcs.default_branch(&local_path).await?;
        let report = self
            .compute_freshness(&local_path, &current_ref, default_branch.as_deref())
            .await?;

        info!(
            "{} {} at {} ({}, {:?})",
            status.as_str(),
            identity.canonical_url,
            local_path.display(),
            current_ref,
            report.freshness
        );

        Ok(SyncResult {
            status,
            repo_url: identity.canonical_url.clone(),
            instructions: usage_instructions(&local_path, status, report.freshness),
            local_path,
            current_ref,
            default_branch,
            head_sha,
            comparison_ref: report.comparison_ref,
            remote_head_sha: report.remote_head_sha,
            ahead_by: report.ahead_by,
            behind_by: report.behind_by,
            freshness: report.freshness,
            actions,
        })
    }

    /// Directory absent: clone, then optionally check out `ref`
    async fn clone_fresh(
        &self,
        identity: &RepositoryIdentity,
        local_path: &Path,
        options: &SyncOptions,
        actions: &mut Vec<SyncAction>,
    ) -> Result<SyncStatus> {
        self.vcs
            .clone_repo(&identity.canonical_url, local_path, options.depth)
            .await?;
        actions.push(SyncAction::Cloned {
            url: identity.canonical_url.clone(),
        });

        if let Some(git_ref) = &options.git_ref {
            self.vcs.checkout(local_path, git_ref).await?;
            actions.push(SyncAction::CheckedOut {
                git_ref: git_ref.clone(),
            });
        }

        Ok(SyncStatus::Cloned)
    }

    /// Directory present: verify, fetch, check out, apply the update policy
    async fn update_existing(
        &self,
        identity: &RepositoryIdentity,
        local_path: &Path,
        options: &SyncOptions,
        actions: &mut Vec<SyncAction>,
    ) -> Result<SyncStatus> {
        if !self.vcs.is_repository(local_path).await? {
            return Err(SyncError::NotAVcsRepo(format!(
                "{} exists but is not a git working copy",
                local_path.display()
            )));
        }

        self.verify_origin(identity, local_path).await?;

        let before_sha = self.vcs.head_sha(local_path).await?;
        debug!("{} at {} before update", local_path.display(), before_sha);

        self.vcs.fetch(local_path).await?;
        actions.push(SyncAction::FetchedOrigin);

        if let Some(git_ref) = &options.git_ref {
            self.vcs.checkout(local_path, git_ref).await?;
            actions.push(SyncAction::CheckedOut {
                git_ref: git_ref.clone(),
            });
        }

        match options.update_mode {
            UpdateMode::FetchOnly => return Ok(SyncStatus::Fetched),
            UpdateMode::FfOnly => self.fast_forward(local_path, actions).await?,
            UpdateMode::ResetClean => self.reset_clean(local_path, actions).await?,
        }

        let after_sha = self.vcs.head_sha(local_path).await?;
        Ok(if after_sha == before_sha {
            SyncStatus::AlreadyCurrent
        } else {
            SyncStatus::Updated
        })
    }

    /// The existing clone must point at the requested repository
    ///
    /// The origin is parsed with SSH always allowed: a clone made over SSH stays
    /// valid after the caller's SSH policy changes.
    async fn verify_origin(&self, identity: &RepositoryIdentity, local_path: &Path) -> Result<()> {
        let origin = self.vcs.origin_url(local_path).await?.ok_or_else(|| {
            SyncError::RepositoryMismatch(format!(
                "{} has no '{}' remote; expected {}",
                local_path.display(),
                ORIGIN,
                identity.canonical_url
            ))
        })?;

        let existing = RepositoryIdentity::parse(&origin, true).map_err(|e| {
            SyncError::RepositoryMismatch(format!(
                "{} has origin '{}' which cannot be matched to {}: {}",
                local_path.display(),
                origin,
                identity.canonical_url,
                e
            ))
        })?;

        if !existing.same_repository(identity) {
            return Err(SyncError::RepositoryMismatch(format!(
                "{} is a clone of {}, not {}",
                local_path.display(),
                existing.comparison_key,
                identity.comparison_key
            )));
        }
        Ok(())
    }

    async fn fast_forward(&self, local_path: &Path, actions: &mut Vec<SyncAction>) -> Result<()> {
        if self.vcs.is_dirty(local_path).await? {
            return Err(SyncError::DirtyWorktree(format!(
                "{} has uncommitted changes; fast-forward refused",
                local_path.display()
            )));
        }

        let current_ref = self.vcs.current_ref(local_path).await?;
        if current_ref == DETACHED_HEAD {
            debug!("Detached HEAD at {}, skipping fast-forward", local_path.display());
            actions.push(SyncAction::SkippedDetachedHead);
            return Ok(());
        }

        let upstream = self
            .vcs
            .upstream_ref(local_path, &current_ref)
            .await?
            .ok_or_else(|| {
                SyncError::VcsOperationFailed(format!(
                    "branch '{}' has no remote counterpart to fast-forward onto",
                    current_ref
                ))
            })?;

        self.vcs.fast_forward(local_path, &upstream).await?;
        actions.push(SyncAction::FastForwarded {
            branch: current_ref,
        });
        Ok(())
    }

    async fn reset_clean(&self, local_path: &Path, actions: &mut Vec<SyncAction>) -> Result<()> {
        let current_ref = self.vcs.current_ref(local_path).await?;
        if current_ref == DETACHED_HEAD {
            return Err(SyncError::DetachedHead(format!(
                "{} is not on a branch; nothing to reset onto",
                local_path.display()
            )));
        }

        let target = self
            .vcs
            .upstream_ref(local_path, &current_ref)
            .await?
            .ok_or_else(|| {
                SyncError::VcsOperationFailed(format!(
                    "branch '{}' has no remote counterpart to reset onto",
                    current_ref
                ))
            })?;

        warn!(
            "Discarding local changes in {} and resetting {} to {}",
            local_path.display(),
            current_ref,
            target
        );
        self.vcs.reset_hard(local_path, &target).await?;
        actions.push(SyncAction::ResetHard { target });
        Ok(())
    }

    /// Compare HEAD with the current branch's upstream, or the remote default
    /// branch when detached
    async fn compute_freshness(
        &self,
        local_path: &Path,
        current_ref: &str,
        default_branch: Option<&str>,
    ) -> Result<FreshnessReport> {
        let comparison_ref = if current_ref == DETACHED_HEAD {
            default_branch.map(|branch| format!("{}/{}", ORIGIN, branch))
        } else {
            self.vcs.upstream_ref(local_path, current_ref).await?
        };

        let Some(comparison_ref) = comparison_ref else {
            return Ok(FreshnessReport::unknown());
        };

        let Some(remote_head_sha) = self.vcs.resolve_commit(local_path, &comparison_ref).await?
        else {
            debug!("{} does not resolve in {}", comparison_ref, local_path.display());
            return Ok(FreshnessReport::unknown());
        };

        let (ahead_by, behind_by) = self.vcs.ahead_behind(local_path, &comparison_ref).await?;

        Ok(FreshnessReport {
            comparison_ref: Some(comparison_ref),
            remote_head_sha: Some(remote_head_sha),
            ahead_by: Some(ahead_by),
            behind_by: Some(behind_by),
            freshness: Freshness::classify(ahead_by, behind_by),
        })
    }
}

fn usage_instructions(local_path: &Path, status: SyncStatus, freshness: Freshness) -> String {
    let mut text = format!(
        "The repository is available at {}. Read and search files there directly; \
         use this path as the working directory for further git commands.",
        local_path.display()
    );

    match (status, freshness) {
        (SyncStatus::Fetched, Freshness::Stale) => text.push_str(
            " Only a fetch was performed and the working tree is behind its remote; \
             re-run with update_mode=ff-only to bring it up to date.",
        ),
        (_, Freshness::Diverged) => text.push_str(
            " Local history has diverged from the remote; \
             use update_mode=reset-clean only if local commits may be discarded.",
        ),
        (_, Freshness::Unknown) => text.push_str(
            " Freshness could not be determined because no remote branch could be compared.",
        ),
        _ => {}
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockVcsAdapter;
    use assert_matches::assert_matches;
    use mockall::predicate::*;
    use mockall::Sequence;

    fn acme() -> RepositoryIdentity {
        RepositoryIdentity::parse("acme/widgets", false).unwrap()
    }

    fn options(mode: UpdateMode) -> SyncOptions {
        SyncOptions::new("/srv/repos").with_update_mode(mode)
    }

    fn acme_path() -> PathBuf {
        PathBuf::from("/srv/repos/github.com/acme/widgets")
    }

    /// Existing, clean clone on `main` whose origin is acme/widgets
    fn existing_clone(mock: &mut MockVcsAdapter) {
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(true));
        mock.expect_origin_url()
            .returning(|_| Ok(Some("https://github.com/acme/widgets.git".to_string())));
        mock.expect_current_ref().returning(|_| Ok("main".to_string()));
        mock.expect_default_branch().returning(|_| Ok(Some("main".to_string())));
        mock.expect_upstream_ref()
            .returning(|_, branch| Ok(Some(format!("origin/{}", branch))));
        mock.expect_resolve_commit().returning(|_, _| Ok(Some("b".repeat(40))));
        mock.expect_ahead_behind().returning(|_, _| Ok((0, 0)));
    }

    #[test]
    fn test_update_mode_parsing() {
        assert_eq!("ff-only".parse::<UpdateMode>().unwrap(), UpdateMode::FfOnly);
        assert_eq!("fetch-only".parse::<UpdateMode>().unwrap(), UpdateMode::FetchOnly);
        assert_eq!("reset-clean".parse::<UpdateMode>().unwrap(), UpdateMode::ResetClean);
        assert_matches!(
            "merge".parse::<UpdateMode>(),
            Err(SyncError::UnsupportedUpdateMode(_))
        );
        assert_eq!(UpdateMode::default(), UpdateMode::FfOnly);
    }

    #[test]
    fn test_freshness_classification() {
        assert_eq!(Freshness::classify(0, 0), Freshness::Current);
        assert_eq!(Freshness::classify(0, 3), Freshness::Stale);
        assert_eq!(Freshness::classify(2, 0), Freshness::Ahead);
        assert_eq!(Freshness::classify(2, 3), Freshness::Diverged);
    }

    #[test]
    fn test_action_wire_format() {
        let actions = vec![
            SyncAction::FetchedOrigin,
            SyncAction::CheckedOut {
                git_ref: "v1.2.0".to_string(),
            },
            SyncAction::SkippedDetachedHead,
        ];
        let json = serde_json::to_value(&actions).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["fetched_origin", "checked_out:v1.2.0", "noop:detached_head"])
        );
    }

    #[tokio::test]
    async fn test_absent_directory_is_cloned_then_checked_out() {
        let mut mock = MockVcsAdapter::new();
        let mut seq = Sequence::new();

        mock.expect_path_exists()
            .with(eq(acme_path()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        mock.expect_clone_repo()
            .with(
                eq("https://github.com/acme/widgets.git"),
                eq(acme_path()),
                eq(Some(1)),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        mock.expect_checkout()
            .with(always(), eq("develop"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_fetch().never();
        mock.expect_current_ref().returning(|_| Ok("develop".to_string()));
        mock.expect_head_sha().returning(|_| Ok("a".repeat(40)));
        mock.expect_default_branch().returning(|_| Ok(Some("main".to_string())));
        mock.expect_upstream_ref()
            .returning(|_, _| Ok(Some("origin/develop".to_string())));
        mock.expect_resolve_commit().returning(|_, _| Ok(Some("a".repeat(40))));
        mock.expect_ahead_behind().returning(|_, _| Ok((0, 0)));

        let engine = SyncEngine::new(mock);
        let opts = options(UpdateMode::FfOnly).with_ref("develop").with_depth(1);
        let result = engine.ensure_local(&acme(), &opts).await.unwrap();

        assert_eq!(result.status, SyncStatus::Cloned);
        assert_eq!(result.local_path, acme_path());
        assert_eq!(result.current_ref, "develop");
        assert_eq!(result.comparison_ref.as_deref(), Some("origin/develop"));
        assert_eq!(result.freshness, Freshness::Current);
        assert_eq!(
            result.actions,
            vec![
                SyncAction::Cloned {
                    url: "https://github.com/acme/widgets.git".to_string()
                },
                SyncAction::CheckedOut {
                    git_ref: "develop".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_mismatch_stops_before_fetch() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(true));
        mock.expect_origin_url()
            .returning(|_| Ok(Some("git@github.com:other/widgets.git".to_string())));
        mock.expect_fetch().never();
        mock.expect_head_sha().never();

        let engine = SyncEngine::new(mock);
        let result = engine.ensure_local(&acme(), &options(UpdateMode::FfOnly)).await;

        assert_matches!(result, Err(SyncError::RepositoryMismatch(_)));
    }

    #[tokio::test]
    async fn test_ssh_origin_matches_even_when_caller_disallows_ssh() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(true));
        mock.expect_origin_url()
            .returning(|_| Ok(Some("git@github.com:Acme/Widgets.git".to_string())));
        mock.expect_head_sha().returning(|_| Ok("a".repeat(40)));
        mock.expect_fetch().times(1).returning(|_| Ok(()));
        mock.expect_current_ref().returning(|_| Ok("main".to_string()));
        mock.expect_default_branch().returning(|_| Ok(Some("main".to_string())));
        mock.expect_upstream_ref()
            .returning(|_, _| Ok(Some("origin/main".to_string())));
        mock.expect_resolve_commit().returning(|_, _| Ok(Some("a".repeat(40))));
        mock.expect_ahead_behind().returning(|_, _| Ok((0, 0)));

        let engine = SyncEngine::new(mock);
        let result = engine
            .ensure_local(&acme(), &options(UpdateMode::FetchOnly))
            .await
            .unwrap();

        assert_eq!(result.status, SyncStatus::Fetched);
    }

    #[tokio::test]
    async fn test_missing_origin_is_mismatch() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(true));
        mock.expect_origin_url().returning(|_| Ok(None));

        let engine = SyncEngine::new(mock);
        let result = engine.ensure_local(&acme(), &options(UpdateMode::FfOnly)).await;

        assert_matches!(result, Err(SyncError::RepositoryMismatch(_)));
    }

    #[tokio::test]
    async fn test_plain_directory_is_not_a_repo() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(false));
        mock.expect_origin_url().never();

        let engine = SyncEngine::new(mock);
        let result = engine.ensure_local(&acme(), &options(UpdateMode::FfOnly)).await;

        assert_matches!(result, Err(SyncError::NotAVcsRepo(_)));
    }

    #[tokio::test]
    async fn test_dirty_tree_refuses_fast_forward() {
        let mut mock = MockVcsAdapter::new();
        existing_clone(&mut mock);
        mock.expect_head_sha().returning(|_| Ok("a".repeat(40)));
        mock.expect_fetch().times(1).returning(|_| Ok(()));
        mock.expect_is_dirty().returning(|_| Ok(true));
        mock.expect_fast_forward().never();
        mock.expect_reset_hard().never();

        let engine = SyncEngine::new(mock);
        let result = engine.ensure_local(&acme(), &options(UpdateMode::FfOnly)).await;

        assert_matches!(result, Err(SyncError::DirtyWorktree(_)));
    }

    #[tokio::test]
    async fn test_fast_forward_moves_head_to_updated() {
        let mut mock = MockVcsAdapter::new();
        let mut seq = Sequence::new();
        existing_clone(&mut mock);
        mock.expect_head_sha()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("a".repeat(40)));
        mock.expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_is_dirty()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        mock.expect_fast_forward()
            .with(always(), eq("origin/main"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_head_sha().returning(|_| Ok("b".repeat(40)));

        let engine = SyncEngine::new(mock);
        let result = engine
            .ensure_local(&acme(), &options(UpdateMode::FfOnly))
            .await
            .unwrap();

        assert_eq!(result.status, SyncStatus::Updated);
        assert_eq!(result.head_sha, "b".repeat(40));
        assert_eq!(
            result.actions,
            vec![
                SyncAction::FetchedOrigin,
                SyncAction::FastForwarded {
                    branch: "main".to_string()
                }
            ]
        );
    }

    #[tokio::test]
    async fn test_fast_forward_targets_tracked_upstream() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(true));
        mock.expect_origin_url()
            .returning(|_| Ok(Some("https://github.com/acme/widgets.git".to_string())));
        mock.expect_head_sha().returning(|_| Ok("a".repeat(40)));
        mock.expect_fetch().returning(|_| Ok(()));
        mock.expect_is_dirty().returning(|_| Ok(false));
        mock.expect_current_ref().returning(|_| Ok("work".to_string()));
        mock.expect_default_branch().returning(|_| Ok(Some("main".to_string())));
        mock.expect_upstream_ref()
            .with(always(), eq("work"))
            .returning(|_, _| Ok(Some("origin/main".to_string())));
        mock.expect_fast_forward()
            .with(always(), eq("origin/main"))
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_resolve_commit().returning(|_, _| Ok(Some("a".repeat(40))));
        mock.expect_ahead_behind().returning(|_, _| Ok((0, 0)));

        let engine = SyncEngine::new(mock);
        let result = engine
            .ensure_local(&acme(), &options(UpdateMode::FfOnly))
            .await
            .unwrap();

        assert_eq!(result.comparison_ref.as_deref(), Some("origin/main"));
        assert_eq!(
            result.actions.last(),
            Some(&SyncAction::FastForwarded {
                branch: "work".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_fast_forward_without_upstream_fails() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(true));
        mock.expect_origin_url()
            .returning(|_| Ok(Some("https://github.com/acme/widgets.git".to_string())));
        mock.expect_head_sha().returning(|_| Ok("a".repeat(40)));
        mock.expect_fetch().returning(|_| Ok(()));
        mock.expect_is_dirty().returning(|_| Ok(false));
        mock.expect_current_ref().returning(|_| Ok("scratch".to_string()));
        mock.expect_upstream_ref().returning(|_, _| Ok(None));
        mock.expect_fast_forward().never();

        let engine = SyncEngine::new(mock);
        let result = engine.ensure_local(&acme(), &options(UpdateMode::FfOnly)).await;

        assert_matches!(result, Err(SyncError::VcsOperationFailed(_)));
    }

    #[tokio::test]
    async fn test_reset_clean_on_detached_head_fails() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().returning(|_| Ok(true));
        mock.expect_is_repository().returning(|_| Ok(true));
        mock.expect_origin_url()
            .returning(|_| Ok(Some("https://github.com/acme/widgets".to_string())));
        mock.expect_head_sha().returning(|_| Ok("a".repeat(40)));
        mock.expect_fetch().returning(|_| Ok(()));
        mock.expect_current_ref()
            .returning(|_| Ok(DETACHED_HEAD.to_string()));
        mock.expect_reset_hard().never();

        let engine = SyncEngine::new(mock);
        let result = engine
            .ensure_local(&acme(), &options(UpdateMode::ResetClean))
            .await;

        assert_matches!(result, Err(SyncError::DetachedHead(_)));
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates_unchanged() {
        let mut mock = MockVcsAdapter::new();
        existing_clone(&mut mock);
        mock.expect_head_sha().returning(|_| Ok("a".repeat(40)));
        mock.expect_fetch()
            .returning(|_| Err(SyncError::Transient("git fetch timed out after 300s".into())));

        let engine = SyncEngine::new(mock);
        let result = engine.ensure_local(&acme(), &options(UpdateMode::FfOnly)).await;

        assert_matches!(result, Err(SyncError::Transient(_)));
    }

    #[tokio::test]
    async fn test_invalid_options_touch_nothing() {
        let mut mock = MockVcsAdapter::new();
        mock.expect_path_exists().never();

        let engine = SyncEngine::new(mock);
        for opts in [
            options(UpdateMode::FfOnly).with_depth(0),
            options(UpdateMode::FfOnly).with_ref("--upload-pack=evil"),
            options(UpdateMode::FfOnly).with_ref("  "),
        ] {
            assert_matches!(
                engine.ensure_local(&acme(), &opts).await,
                Err(SyncError::InvalidArgument(_))
            );
        }
    }

    #[test]
    fn test_instructions_mention_path() {
        let text = usage_instructions(
            Path::new("/srv/repos/github.com/acme/widgets"),
            SyncStatus::Fetched,
            Freshness::Stale,
        );
        assert!(text.contains("/srv/repos/github.com/acme/widgets"));
        assert!(text.contains("update_mode=ff-only"));
    }
}
