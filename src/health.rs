//! System health checks for repodock
//!
//! This module provides preflight checks to verify the system is properly
//! configured before ensuring repositories.

use std::path::Path;

use crate::Config;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Clone root status
    pub clone_root: CheckResult,
    /// Telemetry log status (warning only, never blocks)
    pub telemetry: CheckResult,
    /// SSH configuration status (warning only, not required)
    pub ssh: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(message)
        }
    }

    /// Passes, but is surfaced to the user
    fn warn(message: impl Into<String>) -> Self {
        Self {
            is_warning: true,
            ..Self::pass(message)
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config) -> Self {
        Self {
            git: Self::check_git(&config.git.binary),
            clone_root: Self::check_clone_root(config),
            telemetry: Self::check_telemetry(config),
            ssh: Self::check_ssh(config.allow_ssh),
        }
    }

    /// Git and the clone root must pass; telemetry and SSH only ever warn
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.clone_root.passed
    }

    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|result| result.is_warning)
            .collect()
    }

    /// Named checks in display order
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Installation", &self.git),
            ("Clone Root", &self.clone_root),
            ("Telemetry", &self.telemetry),
            ("SSH Configuration", &self.ssh),
        ]
    }

    fn check_git(binary: &str) -> CheckResult {
        let output = match std::process::Command::new(binary).arg("--version").output() {
            Ok(output) => output,
            Err(e) => {
                return CheckResult::fail(format!("Cannot run '{}'", binary))
                    .with_details(format!("{}\nInstall git: https://git-scm.com/downloads", e))
            }
        };

        if output.status.success() {
            CheckResult::pass("Git available")
                .with_details(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            CheckResult::fail(format!("'{} --version' failed", binary))
                .with_details(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    /// The clone root must be absolute and either a directory or creatable
    fn check_clone_root(config: &Config) -> CheckResult {
        let root = match config.clone_root_path() {
            Ok(root) => root,
            Err(e) => return CheckResult::fail("Invalid clone root").with_details(format!("{:#}", e)),
        };
        let shown = root.display().to_string();

        if root.is_dir() {
            return CheckResult::pass("Clone root exists").with_details(shown);
        }
        if root.exists() {
            return CheckResult::fail("Clone root is not a directory").with_details(shown);
        }

        match root.ancestors().find(|p| p.exists()) {
            Some(ancestor) if is_writable_dir(ancestor) => {
                CheckResult::pass("Clone root will be created on first use").with_details(shown)
            }
            _ => CheckResult::fail("Clone root cannot be created")
                .with_details(format!("Run: mkdir -p {}", shown)),
        }
    }

    fn check_telemetry(config: &Config) -> CheckResult {
        match config.telemetry_path() {
            Ok(Some(path)) => {
                CheckResult::pass("Telemetry enabled").with_details(path.display().to_string())
            }
            Ok(None) => CheckResult::pass("Telemetry disabled"),
            Err(e) => CheckResult::warn("Telemetry path unavailable")
                .with_details(format!("{:#}\nEvents will not be recorded", e)),
        }
    }

    /// Only meaningful when SSH references are accepted by default
    fn check_ssh(allow_ssh: bool) -> CheckResult {
        if !allow_ssh {
            return CheckResult::pass("SSH references disabled");
        }

        if std::env::var_os("SSH_AUTH_SOCK").is_some() {
            return CheckResult::pass("SSH agent available");
        }

        let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");
        let keys = private_keys(&ssh_dir);
        if keys.is_empty() {
            CheckResult::warn("No SSH agent or private keys found").with_details(format!(
                "SSH clones will fail to authenticate. Run: ssh-keygen -t ed25519 (looked in {})",
                ssh_dir.display()
            ))
        } else {
            CheckResult::pass("SSH keys found").with_details(keys.join(", "))
        }
    }
}

/// `id_*` files in `dir` that are not public halves
fn private_keys(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut keys: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("id_") && !name.ends_with(".pub"))
        .collect();
    keys.sort();
    keys
}

fn is_writable_dir(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false)
}
