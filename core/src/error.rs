use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors surfaced by the filesystem gateway and command execution engine.
///
/// `ToolError` is the single error currency of this crate: every component
/// (C5-C8) propagates it with `?`, and only the dispatcher at the crate
/// boundary converts a terminal value into a wire envelope.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("operation '{op}' timed out after {secs}s")]
    Timeout { op: String, secs: u64 },

    #[error("command is blocked: {0}")]
    Denied(String),

    #[error("failed to spawn command: {0}")]
    SpawnFailed(String),

    #[error("no such session: {0}")]
    NoSuchSession(u32),

    #[error("invalid configuration: {0}")]
    ConfigParseError(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
