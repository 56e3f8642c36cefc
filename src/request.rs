//! Invocation surface - validates a caller's argument set and runs one ensure
//!
//! The argument set is closed: unknown fields are rejected. Every invocation,
//! successful or not, produces exactly one telemetry event.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::git::{GitCli, VcsAdapter};
use crate::paths::resolve_clone_root;
use crate::reference::RepositoryIdentity;
use crate::sync::{SyncEngine, SyncOptions, SyncResult, UpdateMode};
use crate::telemetry::{
    record_best_effort, JsonlTelemetry, NoopTelemetry, TelemetryEvent, TelemetrySink,
};

/// Telemetry label for an update mode that could not be read
const UNKNOWN: &str = "unknown";

/// Arguments accepted by the ensure operation
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnsureRequest {
    /// Repository reference in any recognized form
    pub repo: String,
    /// Branch, tag or commit to check out
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    /// Absolute clone root; defaults to the configured one
    #[serde(default)]
    pub clone_root: Option<String>,
    /// Shallow clone depth
    #[serde(default)]
    pub depth: Option<u32>,
    /// `ff-only` (default), `fetch-only` or `reset-clean`
    #[serde(default)]
    pub update_mode: Option<String>,
    /// Overrides the configured SSH allowance
    #[serde(default)]
    pub allow_ssh: Option<bool>,
}

impl EnsureRequest {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Default::default()
        }
    }

    /// Deserialize a JSON argument object
    pub fn from_json(args: serde_json::Value) -> Result<Self> {
        serde_json::from_value(args).map_err(|e| SyncError::InvalidArgument(e.to_string()))
    }

    pub fn update_mode(&self) -> Result<UpdateMode> {
        self.update_mode
            .as_deref()
            .map(str::parse::<UpdateMode>)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn update_mode_label(&self) -> String {
        self.update_mode
            .clone()
            .unwrap_or_else(|| UpdateMode::default().to_string())
    }
}

/// Caller-wide defaults applied when a request leaves a field unset
#[derive(Debug, Clone)]
pub struct Defaults {
    pub clone_root: PathBuf,
    pub allow_ssh: bool,
}

/// Entry point used by the CLI and by host runtimes
pub struct RepoDock<V> {
    engine: SyncEngine<V>,
    telemetry: Arc<dyn TelemetrySink>,
    defaults: Defaults,
}

impl RepoDock<GitCli> {
    /// Build a git-backed instance from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let git = GitCli::new(config.git_timeout())
            .with_binary(config.git.binary.clone())
            .with_config_overrides(&config.git.config_overrides);

        let telemetry: Box<dyn TelemetrySink> = match config.telemetry_path()? {
            Some(path) => Box::new(JsonlTelemetry::new(path)),
            None => Box::new(NoopTelemetry),
        };

        let defaults = Defaults {
            clone_root: config.clone_root_path()?,
            allow_ssh: config.allow_ssh,
        };

        Ok(Self::new(git, telemetry, defaults))
    }
}

impl<V: VcsAdapter> RepoDock<V> {
    pub fn new(vcs: V, telemetry: Box<dyn TelemetrySink>, defaults: Defaults) -> Self {
        Self {
            engine: SyncEngine::new(vcs),
            telemetry: Arc::from(telemetry),
            defaults,
        }
    }

    /// Validate, run and record one ensure invocation
    pub async fn handle(&self, request: &EnsureRequest) -> Result<SyncResult> {
        let outcome = self.run(request).await;

        let event = match &outcome {
            Ok((mode, result)) => {
                TelemetryEvent::success(&request.repo, *mode, request.git_ref.clone(), result)
            }
            Err(e) => TelemetryEvent::failure(
                &request.repo,
                request.update_mode_label(),
                request.git_ref.clone(),
                e,
            ),
        };
        record_best_effort(Arc::clone(&self.telemetry), event).await;

        outcome.map(|(_, result)| result)
    }

    /// Same as [`handle`](Self::handle) for a raw JSON argument object
    ///
    /// A rejected argument set is still recorded, with whatever `repo`, `ref`
    /// and `update_mode` could be read from it.
    pub async fn handle_json(&self, args: serde_json::Value) -> Result<SyncResult> {
        let field = |name: &str| args.get(name).and_then(Value::as_str).map(str::to_string);
        let repo = field("repo").unwrap_or_default();
        let git_ref = field("ref");
        let update_mode = field("update_mode").unwrap_or_else(|| UNKNOWN.to_string());

        match EnsureRequest::from_json(args) {
            Ok(request) => self.handle(&request).await,
            Err(e) => {
                let event = TelemetryEvent::failure(repo, update_mode, git_ref, &e);
                record_best_effort(Arc::clone(&self.telemetry), event).await;
                Err(e)
            }
        }
    }

    /// Same as [`handle_json`](Self::handle_json) for unparsed JSON text
    pub async fn handle_raw(&self, raw: &str) -> Result<SyncResult> {
        match serde_json::from_str::<Value>(raw) {
            Ok(args) => self.handle_json(args).await,
            Err(e) => {
                let error =
                    SyncError::InvalidArgument(format!("arguments are not valid JSON: {}", e));
                let event = TelemetryEvent::failure("", UNKNOWN, None, &error);
                record_best_effort(Arc::clone(&self.telemetry), event).await;
                Err(error)
            }
        }
    }

    async fn run(&self, request: &EnsureRequest) -> Result<(UpdateMode, SyncResult)> {
        let update_mode = request.update_mode()?;

        let clone_root = match &request.clone_root {
            Some(raw) => resolve_clone_root(raw)?,
            None => self.defaults.clone_root.clone(),
        };
        let allow_ssh = request.allow_ssh.unwrap_or(self.defaults.allow_ssh);

        let identity = RepositoryIdentity::parse(&request.repo, allow_ssh)?;
        debug!("Resolved {} to {}", request.repo, identity.comparison_key);

        let options = SyncOptions {
            clone_root,
            git_ref: request.git_ref.clone(),
            depth: request.depth,
            update_mode,
        };

        let result = self.engine.ensure_local(&identity, &options).await?;
        Ok((update_mode, result))
    }
}
