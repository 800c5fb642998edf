//! Bounded filesystem operations: read/write/move/delete/list/mkdir (C6).
//!
//! Each operation normalizes and validates its path(s) against the policy
//! gate, then runs the actual blocking I/O through [`bounded_exec`] with the
//! per-operation deadline from the original server's `file_system.py`.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde::Serialize;

use crate::bounded_exec::execute_bounded;
use crate::config::Config;
use crate::error::{Result, ToolError};
use crate::mime::{guess_mime_type, is_image_mime};
use crate::policy::{is_path_valid, normalize_path};

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const MOVE_TIMEOUT: Duration = Duration::from_secs(30);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const MKDIR_TIMEOUT: Duration = Duration::from_secs(10);

/// The result of a `read_file` call: text sliced by line range, or
/// base64-encoded bytes for images and undecodable files.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub content: String,
    pub path: String,
    pub mime_type: String,
    pub is_image: bool,
}

/// One entry produced by `list_files`.
#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified_epoch: u64,
}

/// `write_file`'s mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Rewrite,
    Append,
}

impl WriteMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "rewrite" => Ok(Self::Rewrite),
            "append" => Ok(Self::Append),
            other => Err(ToolError::InvalidArgument(format!("unknown write mode: {other}"))),
        }
    }
}

fn require_non_empty(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ToolError::InvalidArgument("path is empty".to_string()));
    }
    Ok(())
}

fn require_valid(path: &Path, config: &Config) -> Result<()> {
    if !is_path_valid(path, config) {
        return Err(ToolError::PathNotAllowed(path.display().to_string()));
    }
    Ok(())
}

fn require_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ToolError::PathNotFound(path.display().to_string()));
    }
    Ok(())
}

/// Splits `content` into lines the way Python's `readlines()` does: each
/// element keeps its trailing `\n`, except possibly the last.
fn readlines_keepends(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for c in content.chars() {
        current.push(c);
        if c == '\n' {
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub async fn read_file(
    config: &Config,
    path: &str,
    offset: i64,
    length: Option<u64>,
    read_all: Option<bool>,
) -> Result<FileResult> {
    require_non_empty(path)?;
    let normalized = normalize_path(path)?;
    require_valid(&normalized, config)?;
    require_exists(&normalized)?;
    if offset < 0 {
        return Err(ToolError::InvalidArgument("offset must be >= 0".to_string()));
    }
    let offset = offset as usize;
    let length = length.unwrap_or_else(|| config.max_read_length());
    let read_all = read_all.unwrap_or(false);

    let mime_type = guess_mime_type(&normalized.to_string_lossy());
    let is_image = is_image_mime(&mime_type);
    let path_for_closure = normalized.clone();
    let path_str = normalized.to_string_lossy().to_string();

    let content = execute_bounded("read_file", READ_TIMEOUT, Some(String::new()), move || {
        read_bytes_as_content(&path_for_closure, is_image, offset, length, read_all)
    })
    .await?;

    Ok(FileResult { content, path: path_str, mime_type, is_image })
}

fn read_bytes_as_content(
    path: &Path,
    is_image: bool,
    offset: usize,
    length: u64,
    read_all: bool,
) -> Result<String> {
    if is_image {
        let bytes = std::fs::read(path)?;
        return Ok(base64::engine::general_purpose::STANDARD.encode(bytes));
    }

    match std::fs::read_to_string(path) {
        Ok(text) => {
            if read_all {
                return Ok(text);
            }
            let lines = readlines_keepends(&text);
            if offset >= lines.len() {
                return Ok(String::new());
            }
            let end = (offset + length as usize).min(lines.len());
            Ok(lines[offset..end].concat())
        }
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            let bytes = std::fs::read(path)?;
            Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        Err(e) => Err(ToolError::Io(e)),
    }
}

pub async fn write_file(config: &Config, path: &str, content: &str, mode: WriteMode) -> Result<()> {
    require_non_empty(path)?;
    let normalized = normalize_path(path)?;
    require_valid(&normalized, config)?;

    let content = content.to_string();
    execute_bounded("write_file", WRITE_TIMEOUT, None, move || {
        use std::fs::OpenOptions;
        use std::io::Write;
        let mut opts = OpenOptions::new();
        opts.write(true).create(true);
        match mode {
            WriteMode::Rewrite => opts.truncate(true),
            WriteMode::Append => opts.append(true),
        };
        let mut f = opts.open(&normalized)?;
        f.write_all(content.as_bytes())?;
        Ok(())
    })
    .await
}

pub async fn move_file(config: &Config, src: &str, dest: &str) -> Result<()> {
    require_non_empty(src)?;
    require_non_empty(dest)?;
    let src_norm = normalize_path(src)?;
    let dest_norm = normalize_path(dest)?;
    require_valid(&src_norm, config)?;
    require_valid(&dest_norm, config)?;
    require_exists(&src_norm)?;

    execute_bounded("move_file", MOVE_TIMEOUT, None, move || {
        if let Some(parent) = dest_norm.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::rename(&src_norm, &dest_norm)?;
        Ok(())
    })
    .await
}

pub async fn delete_file(config: &Config, path: &str) -> Result<()> {
    require_non_empty(path)?;
    let normalized = normalize_path(path)?;
    require_valid(&normalized, config)?;
    require_exists(&normalized)?;

    execute_bounded("delete_file", DELETE_TIMEOUT, None, move || {
        std::fs::remove_file(&normalized)?;
        Ok(())
    })
    .await
}

pub async fn list_files(config: &Config, path: &str) -> Result<Vec<DirEntry>> {
    require_non_empty(path)?;
    let normalized = normalize_path(path)?;
    require_valid(&normalized, config)?;
    require_exists(&normalized)?;
    if !normalized.is_dir() {
        return Err(ToolError::InvalidArgument(format!(
            "path is not a directory: {}",
            normalized.display()
        )));
    }

    execute_bounded("list_files", LIST_TIMEOUT, Some(Vec::new()), move || list_dir(&normalized)).await
}

fn list_dir(path: &Path) -> Result<Vec<DirEntry>> {
    let mut items = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let item_path = entry.path();
        let metadata = entry.metadata()?;
        let modified_epoch = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        items.push(DirEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            path: item_path.to_string_lossy().to_string(),
            is_directory: metadata.is_dir(),
            size: metadata.len(),
            modified_epoch,
        });
    }
    Ok(items)
}

pub async fn create_directory(config: &Config, path: &str) -> Result<()> {
    require_non_empty(path)?;
    let normalized = normalize_path(path)?;
    require_valid(&normalized, config)?;

    execute_bounded("create_directory", MKDIR_TIMEOUT, None, move || {
        std::fs::create_dir_all(&normalized)?;
        Ok(())
    })
    .await
}
