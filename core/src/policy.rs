//! Path normalization and allow-list enforcement for the filesystem gateway
//! (C5).
//!
//! Grounded on the original server's `normalize_path`/`get_allowed_dirs`/
//! `is_path_allowed`/`validate_parent_dirs` functions, translated from
//! `os.path` string manipulation to `std::path::Path` component handling.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, ToolError};

/// Expands a leading `~`, resolves to an absolute path, removes `.`/`..`
/// components, and strips any trailing separator.
pub fn normalize_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        return Err(ToolError::InvalidArgument("path is empty".to_string()));
    }

    let expanded = if path == "~" || path.starts_with("~/") {
        let Some(home) = dirs::home_dir() else {
            return Err(ToolError::InvalidArgument(
                "cannot expand '~': no home directory".to_string(),
            ));
        };
        if path == "~" {
            home
        } else {
            home.join(&path[2..])
        }
    } else {
        PathBuf::from(path)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };

    Ok(collapse_dots(&absolute))
}

/// Resolves `.`/`..` components lexically, without touching the filesystem
/// (the path may not exist yet, e.g. a write target).
fn collapse_dots(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The configured allow-list, normalized, seeding the home directory (via
/// [`Config::allowed_directories`]) when empty.
pub fn get_allowed_dirs(config: &Config) -> Vec<PathBuf> {
    config
        .allowed_directories()
        .into_iter()
        .filter_map(|d| normalize_path(&d).ok())
        .collect()
}

/// True if the allow-list is empty or contains the root, or `path` is equal
/// to, or a proper descendant of, one of its entries.
pub fn is_path_allowed(path: &Path, config: &Config) -> bool {
    let allowed = get_allowed_dirs(config);
    if allowed.is_empty() || allowed.iter().any(|d| d.as_os_str() == "/") {
        return true;
    }
    allowed.iter().any(|dir| path == dir || path.starts_with(dir))
}

/// Walks up from `path`'s parent until an existing ancestor is found.
/// `false` if the walk reaches the filesystem root without finding one.
pub fn validate_parent_dirs(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    if parent == path {
        return false;
    }
    if parent.exists() {
        return true;
    }
    validate_parent_dirs(parent)
}

/// `validate_parent_dirs(path) AND is_path_allowed(path)`.
pub fn is_path_valid(path: &Path, config: &Config) -> bool {
    validate_parent_dirs(path) && is_path_allowed(path, config)
}
