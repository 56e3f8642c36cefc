//! Deterministic local paths for repository clones
//!
//! A repository lands at `clone_root/host/owner/repo`. The builder refuses any
//! result that is not a strict descendant of the (lexically resolved) root.

use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::reference::RepositoryIdentity;

/// Application directory name under the user's home
pub const APP_DIR: &str = ".repodock";

/// Default clone root: `~/.repodock/repos`
pub fn default_clone_root() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        SyncError::InvalidArgument("could not determine the home directory".to_string())
    })?;
    Ok(home.join(APP_DIR).join("repos"))
}

/// Expand `~` and environment variables in a user-supplied clone root and
/// require the result to be absolute
pub fn resolve_clone_root(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).map_err(|e| {
        SyncError::InvalidArgument(format!("could not expand clone_root '{}': {}", raw, e))
    })?;
    let root = PathBuf::from(expanded.as_ref());

    if !root.is_absolute() {
        return Err(SyncError::InvalidArgument(format!(
            "clone_root must be an absolute path, got '{}'",
            raw
        )));
    }
    Ok(root.clean())
}

/// Build the local directory for `identity` under `root`
pub fn build_path(root: &Path, identity: &RepositoryIdentity) -> Result<PathBuf> {
    if !root.is_absolute() {
        return Err(SyncError::InvalidArgument(format!(
            "clone_root must be an absolute path, got '{}'",
            root.display()
        )));
    }

    let root = root.clean();
    let mut path = root.join(single_component(&identity.host)?);
    for segment in &identity.path_segments {
        path.push(single_component(segment)?);
    }

    let resolved = path.clean();
    if resolved == root || !resolved.starts_with(&root) {
        return Err(SyncError::PathEscape(format!(
            "{} is not inside {}",
            resolved.display(),
            root.display()
        )));
    }

    Ok(resolved)
}

/// Each identity part must map to exactly one normal path component
fn single_component(part: &str) -> Result<&Path> {
    let path = Path::new(part);
    let mut components = path.components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(path),
        _ => Err(SyncError::PathEscape(format!(
            "'{}' does not map to a single directory name",
            part
        ))),
    }
}
