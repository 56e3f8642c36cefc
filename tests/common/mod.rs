//! Common test utilities and helpers for repodock tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use repodock::git::DETACHED_HEAD;
use repodock::{Result, SyncError, TelemetryEvent, TelemetrySink, VcsAdapter};

pub const INITIAL_SHA: &str = "1111111111111111111111111111111111111111";
pub const REMOTE_SHA: &str = "2222222222222222222222222222222222222222";

/// In-memory working copy
#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub is_repo: bool,
    pub origin: Option<String>,
    pub current_ref: String,
    pub head: String,
    pub dirty: bool,
    pub default_branch: Option<String>,
    pub has_upstream: bool,
    pub remote_tip: String,
    pub ahead: u32,
    pub behind: u32,
}

impl FakeRepo {
    /// Clean clone on `main`, level with its remote
    pub fn clean(origin: &str) -> Self {
        Self {
            is_repo: true,
            origin: Some(origin.to_string()),
            current_ref: "main".to_string(),
            head: INITIAL_SHA.to_string(),
            dirty: false,
            default_branch: Some("main".to_string()),
            has_upstream: true,
            remote_tip: INITIAL_SHA.to_string(),
            ahead: 0,
            behind: 0,
        }
    }

    /// Remote moved `behind` commits past the local head
    pub fn behind_remote(mut self, behind: u32) -> Self {
        self.behind = behind;
        self.remote_tip = REMOTE_SHA.to_string();
        self
    }

    pub fn with_counts(mut self, ahead: u32, behind: u32) -> Self {
        self.ahead = ahead;
        self.behind = behind;
        if ahead > 0 || behind > 0 {
            self.remote_tip = REMOTE_SHA.to_string();
        }
        self
    }

    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }

    /// A directory that exists but is not a working copy
    pub fn plain_directory() -> Self {
        Self {
            is_repo: false,
            origin: None,
            ..Self::clean("")
        }
    }
}

#[derive(Default)]
struct FakeState {
    repos: HashMap<PathBuf, FakeRepo>,
    calls: Vec<String>,
    fail_fetch: Option<SyncError>,
}

/// Stateful [`VcsAdapter`] that keeps working copies in memory
#[derive(Clone, Default)]
pub struct FakeVcs {
    state: Arc<Mutex<FakeState>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, repo: FakeRepo) {
        self.state.lock().unwrap().repos.insert(path.into(), repo);
    }

    pub fn repo(&self, path: &Path) -> Option<FakeRepo> {
        self.state.lock().unwrap().repos.get(path).cloned()
    }

    pub fn update(&self, path: &Path, f: impl FnOnce(&mut FakeRepo)) {
        let mut state = self.state.lock().unwrap();
        f(state.repos.get_mut(path).expect("no fake repo at path"));
    }

    pub fn fail_fetch_with(&self, error: SyncError) {
        self.state.lock().unwrap().fail_fetch = Some(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn with_repo<T>(&self, call: &str, path: &Path, f: impl FnOnce(&mut FakeRepo) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        match state.repos.get_mut(path) {
            Some(repo) => f(repo),
            None => Err(SyncError::VcsOperationFailed(format!(
                "{}: no repository at {}",
                call,
                path.display()
            ))),
        }
    }
}

fn is_full_sha(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl VcsAdapter for FakeVcs {
    async fn path_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.state.lock().unwrap().repos.contains_key(path))
    }

    async fn is_repository(&self, path: &Path) -> Result<bool> {
        self.with_repo("is_repository", path, |repo| Ok(repo.is_repo))
    }

    async fn clone_repo(&self, url: &str, dest: &Path, _depth: Option<u32>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("clone".to_string());
        state.repos.insert(dest.to_path_buf(), FakeRepo::clean(url));
        Ok(())
    }

    async fn fetch(&self, path: &Path) -> Result<()> {
        let failure = self.state.lock().unwrap().fail_fetch.take();
        if let Some(error) = failure {
            self.state.lock().unwrap().calls.push("fetch".to_string());
            return Err(error);
        }
        self.with_repo("fetch", path, |_| Ok(()))
    }

    async fn checkout(&self, path: &Path, git_ref: &str) -> Result<()> {
        self.with_repo("checkout", path, |repo| {
            if is_full_sha(git_ref) {
                repo.current_ref = DETACHED_HEAD.to_string();
                repo.head = git_ref.to_string();
            } else {
                repo.current_ref = git_ref.to_string();
            }
            Ok(())
        })
    }

    async fn fast_forward(&self, path: &Path, upstream: &str) -> Result<()> {
        self.with_repo("fast_forward", path, |repo| {
            if repo.ahead > 0 && repo.behind > 0 {
                return Err(SyncError::VcsOperationFailed(format!(
                    "Not possible to fast-forward onto {}",
                    upstream
                )));
            }
            if repo.behind > 0 {
                repo.head = repo.remote_tip.clone();
                repo.behind = 0;
            }
            Ok(())
        })
    }

    async fn reset_hard(&self, path: &Path, _target: &str) -> Result<()> {
        self.with_repo("reset_hard", path, |repo| {
            repo.head = repo.remote_tip.clone();
            repo.ahead = 0;
            repo.behind = 0;
            repo.dirty = false;
            Ok(())
        })
    }

    async fn current_ref(&self, path: &Path) -> Result<String> {
        self.with_repo("current_ref", path, |repo| Ok(repo.current_ref.clone()))
    }

    async fn head_sha(&self, path: &Path) -> Result<String> {
        self.with_repo("head_sha", path, |repo| Ok(repo.head.clone()))
    }

    async fn origin_url(&self, path: &Path) -> Result<Option<String>> {
        self.with_repo("origin_url", path, |repo| Ok(repo.origin.clone()))
    }

    async fn default_branch(&self, path: &Path) -> Result<Option<String>> {
        self.with_repo("default_branch", path, |repo| Ok(repo.default_branch.clone()))
    }

    async fn upstream_ref(&self, path: &Path, branch: &str) -> Result<Option<String>> {
        self.with_repo("upstream_ref", path, |repo| {
            Ok(repo.has_upstream.then(|| format!("origin/{}", branch)))
        })
    }

    async fn resolve_commit(&self, path: &Path, git_ref: &str) -> Result<Option<String>> {
        self.with_repo("resolve_commit", path, |repo| {
            Ok(git_ref
                .starts_with("origin/")
                .then(|| repo.remote_tip.clone()))
        })
    }

    async fn is_dirty(&self, path: &Path) -> Result<bool> {
        self.with_repo("is_dirty", path, |repo| Ok(repo.dirty))
    }

    async fn ahead_behind(&self, path: &Path, _comparison: &str) -> Result<(u32, u32)> {
        self.with_repo("ahead_behind", path, |repo| Ok((repo.ahead, repo.behind)))
    }
}

/// Telemetry sink that keeps every event for inspection
#[derive(Clone, Default)]
pub struct RecordingTelemetry {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: &TelemetryEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Telemetry sink that always fails
pub struct FailingTelemetry;

impl TelemetrySink for FailingTelemetry {
    fn record(&self, _event: &TelemetryEvent) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("telemetry disk is full"))
    }
}
