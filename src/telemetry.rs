//! Telemetry - append-only record of every ensure invocation
//!
//! One JSON object per line in a single file. Recording is best-effort: a
//! failing sink is logged and ignored, it never changes an operation's outcome.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::sync::{SyncResult, UpdateMode};

/// Event types written to the telemetry log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// One `ensure` invocation, successful or not
    RepoEnsure,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RepoEnsure => "repo_ensure",
        }
    }
}

/// A single telemetry record
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub event: EventType,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub update_mode: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TelemetryEvent {
    pub fn success(
        repo: impl Into<String>,
        update_mode: UpdateMode,
        git_ref: Option<String>,
        result: &SyncResult,
    ) -> Self {
        Self {
            event: EventType::RepoEnsure,
            timestamp: Utc::now(),
            success: true,
            repo: repo.into(),
            canonical_url: Some(result.repo_url.clone()),
            local_path: Some(result.local_path.clone()),
            status: Some(result.status.as_str().to_string()),
            update_mode: update_mode.to_string(),
            git_ref,
            error_kind: None,
            error_message: None,
        }
    }

    /// `update_mode` is the raw caller value, which may be the unsupported one
    pub fn failure(
        repo: impl Into<String>,
        update_mode: impl Into<String>,
        git_ref: Option<String>,
        error: &SyncError,
    ) -> Self {
        Self {
            event: EventType::RepoEnsure,
            timestamp: Utc::now(),
            success: false,
            repo: repo.into(),
            canonical_url: None,
            local_path: None,
            status: None,
            update_mode: update_mode.into(),
            git_ref,
            error_kind: Some(error.kind().to_string()),
            error_message: Some(error.to_string()),
        }
    }
}

/// Destination for telemetry events
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent) -> Result<()>;
}

/// Record an event, discarding any sink failure
///
/// Sinks do blocking I/O, so the write runs on the blocking thread pool.
pub async fn record_best_effort(sink: Arc<dyn TelemetrySink>, event: TelemetryEvent) {
    let kind = event.event.as_str();
    match tokio::task::spawn_blocking(move || sink.record(&event)).await {
        Ok(Ok(())) => debug!("Recorded {} event", kind),
        Ok(Err(e)) => warn!("Failed to record telemetry event: {:#}", e),
        Err(e) => warn!("Telemetry writer panicked: {}", e),
    }
}

/// Appends newline-delimited JSON records to a file
pub struct JsonlTelemetry {
    path: PathBuf,
    // Serializes writers within this process so lines never interleave
    lock: Mutex<()>,
}

impl JsonlTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default location: `XDG_DATA_HOME/repodock/events.jsonl`
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().context("Failed to get user data directory")?;
        Ok(data_dir.join("repodock").join("events.jsonl"))
    }
}

impl TelemetrySink for JsonlTelemetry {
    fn record(&self, event: &TelemetryEvent) -> Result<()> {
        let mut line = serde_json::to_string(event).context("Failed to serialize event")?;
        line.push('\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("telemetry lock poisoned"))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create telemetry directory: {:?}", parent))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open telemetry file: {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write telemetry file: {:?}", self.path))?;

        Ok(())
    }
}

/// Sink used when telemetry is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: &TelemetryEvent) -> Result<()> {
        Ok(())
    }
}
