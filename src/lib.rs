//! repodock - Materialize remote git repositories as local working copies
//!
//! repodock turns a loosely written repository reference into a canonical
//! identity, clones it under a deterministic path, and keeps existing clones
//! current according to an explicit update policy.
//!
//! ## Core Features
//!
//! - **Reference Parsing**: HTTPS URLs, `host/owner/repo`, `owner/repo` and SSH forms
//! - **Deterministic Layout**: `<clone_root>/<host>/<owner>/<repo>`, confined to the root
//! - **Safe Updates**: `ff-only`, `fetch-only` and `reset-clean` policies
//! - **Freshness Reporting**: ahead/behind counts against the remote branch
//! - **Telemetry**: one JSONL record per invocation
//!
//! ## Modules
//!
//! - [`reference`]: Repository reference parsing and identity
//! - [`paths`]: Clone root resolution and local path construction
//! - [`git`]: Version-control adapter trait and git CLI implementation
//! - [`sync`]: The clone-or-update engine
//! - [`request`]: Invocation surface with argument validation and telemetry
//! - [`config`]: Configuration management and parsing

pub mod config;
pub mod error;
pub mod git;
pub mod health;
pub mod paths;
pub mod reference;
pub mod request;
pub mod sync;
pub mod telemetry;

pub use config::Config;
pub use error::{ErrorKind, ErrorReport, Result, SyncError};
pub use git::{GitCli, VcsAdapter};
pub use health::HealthCheck;
pub use reference::{RepositoryIdentity, Transport};
pub use request::{Defaults, EnsureRequest, RepoDock};
pub use sync::{Freshness, SyncAction, SyncEngine, SyncOptions, SyncResult, SyncStatus, UpdateMode};
pub use telemetry::{JsonlTelemetry, NoopTelemetry, TelemetryEvent, TelemetrySink};
