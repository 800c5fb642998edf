//! Maps a `(tool_name, json arguments)` pair to a typed core call and
//! serializes the result back to JSON (C9).
//!
//! Grounded on the teacher's `message_processor.rs` request-routing match
//! statement, generalized from JSON-RPC method names to this crate's flat
//! tool-name set.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolhost_core::command_gate;
use toolhost_core::config::Config;
use toolhost_core::fs_ops::{self, WriteMode};
use toolhost_core::terminal::TerminalManager;

/// The shared state every dispatched call reads or mutates.
pub struct ServerContext {
    pub config: Arc<Config>,
    pub terminal: Arc<TerminalManager>,
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    read_all: Option<bool>,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    file_path: String,
    content: String,
    #[serde(default = "default_write_mode")]
    mode: String,
}

fn default_write_mode() -> String {
    "rewrite".to_string()
}

#[derive(Deserialize)]
struct MoveFileArgs {
    source: String,
    destination: String,
}

#[derive(Deserialize)]
struct DeleteFileArgs {
    file_path: String,
}

#[derive(Deserialize)]
struct ListFilesArgs {
    directory: String,
}

#[derive(Deserialize)]
struct CreateDirectoryArgs {
    directory: String,
}

#[derive(Deserialize)]
struct SetConfigArgs {
    key: String,
    value: Value,
}

#[derive(Deserialize)]
struct ExecuteCommandArgs {
    command: String,
    timeout: f64,
    #[serde(default)]
    shell: Option<String>,
}

#[derive(Deserialize)]
struct ReadOutputArgs {
    pid: u32,
    #[serde(default)]
    is_full: bool,
}

#[derive(Deserialize)]
struct ForceTerminateArgs {
    pid: u32,
}

#[derive(Serialize)]
struct BoolResult {
    success: bool,
}

#[derive(Serialize)]
struct ErrorResult {
    error: String,
}

fn ok_bool() -> Value {
    #[allow(clippy::unwrap_used)]
    serde_json::to_value(BoolResult { success: true }).unwrap()
}

fn error_value(message: impl Into<String>) -> Value {
    #[allow(clippy::unwrap_used)]
    serde_json::to_value(ErrorResult { error: message.into() }).unwrap()
}

/// Deserializes `args`, routes to the matching core call, and serializes the
/// result. Deserialization failures and `ToolError`s both become an
/// `{"error": "..."}` shape rather than propagating.
pub async fn dispatch(tool_name: &str, args: Value, ctx: &ServerContext) -> Value {
    match tool_name {
        "read_file" => {
            let Ok(args) = serde_json::from_value::<ReadFileArgs>(args) else {
                return error_value("invalid arguments for read_file");
            };
            match fs_ops::read_file(&ctx.config, &args.path, args.offset, args.length, args.read_all).await {
                #[allow(clippy::unwrap_used)]
                Ok(result) => serde_json::to_value(result).unwrap(),
                Err(e) => error_value(e.to_string()),
            }
        }
        "write_file" => {
            let Ok(args) = serde_json::from_value::<WriteFileArgs>(args) else {
                return error_value("invalid arguments for write_file");
            };
            let Ok(mode) = WriteMode::parse(&args.mode) else {
                return error_value(format!("unknown write mode: {}", args.mode));
            };
            match fs_ops::write_file(&ctx.config, &args.file_path, &args.content, mode).await {
                Ok(()) => ok_bool(),
                Err(e) => error_value(e.to_string()),
            }
        }
        "move_file" => {
            let Ok(args) = serde_json::from_value::<MoveFileArgs>(args) else {
                return error_value("invalid arguments for move_file");
            };
            match fs_ops::move_file(&ctx.config, &args.source, &args.destination).await {
                Ok(()) => ok_bool(),
                Err(e) => error_value(e.to_string()),
            }
        }
        "delete_file" => {
            let Ok(args) = serde_json::from_value::<DeleteFileArgs>(args) else {
                return error_value("invalid arguments for delete_file");
            };
            match fs_ops::delete_file(&ctx.config, &args.file_path).await {
                Ok(()) => ok_bool(),
                Err(e) => error_value(e.to_string()),
            }
        }
        "list_files" => {
            let Ok(args) = serde_json::from_value::<ListFilesArgs>(args) else {
                return error_value("invalid arguments for list_files");
            };
            match fs_ops::list_files(&ctx.config, &args.directory).await {
                #[allow(clippy::unwrap_used)]
                Ok(entries) => serde_json::to_value(entries).unwrap(),
                Err(e) => error_value(e.to_string()),
            }
        }
        "create_directory" => {
            let Ok(args) = serde_json::from_value::<CreateDirectoryArgs>(args) else {
                return error_value("invalid arguments for create_directory");
            };
            match fs_ops::create_directory(&ctx.config, &args.directory).await {
                Ok(()) => ok_bool(),
                Err(e) => error_value(e.to_string()),
            }
        }
        "get_config" => ctx.config.get_config(),
        "set_config" => {
            let Ok(args) = serde_json::from_value::<SetConfigArgs>(args) else {
                return error_value("invalid arguments for set_config");
            };
            ctx.config.set_value(&args.key, args.value);
            ctx.config.get_config()
        }
        "execute_command" => {
            let Ok(args) = serde_json::from_value::<ExecuteCommandArgs>(args) else {
                return error_value("invalid arguments for execute_command");
            };
            let timeout = Duration::from_secs_f64(args.timeout.max(0.0));
            let envelope = command_gate::execute_command(
                &ctx.terminal,
                &ctx.config,
                &args.command,
                timeout,
                args.shell.as_deref(),
            )
            .await;
            #[allow(clippy::unwrap_used)]
            serde_json::to_value(envelope).unwrap()
        }
        "read_output" => {
            let Ok(args) = serde_json::from_value::<ReadOutputArgs>(args) else {
                return error_value("invalid arguments for read_output");
            };
            match command_gate::read_output(&ctx.terminal, args.pid, args.is_full) {
                #[allow(clippy::unwrap_used)]
                Ok(envelope) => serde_json::to_value(envelope).unwrap(),
                #[allow(clippy::unwrap_used)]
                Err(envelope) => serde_json::to_value(envelope).unwrap(),
            }
        }
        "get_active_sessions" => {
            let sessions = command_gate::get_active_sessions(&ctx.terminal);
            let mut by_pid = serde_json::Map::with_capacity(sessions.len());
            for session in sessions {
                #[allow(clippy::unwrap_used)]
                by_pid.insert(session.pid.to_string(), serde_json::to_value(&session).unwrap());
            }
            Value::Object(by_pid)
        }
        "force_terminate" => {
            let Ok(args) = serde_json::from_value::<ForceTerminateArgs>(args) else {
                return error_value("invalid arguments for force_terminate");
            };
            let envelope = command_gate::force_terminate(&ctx.terminal, args.pid).await;
            #[allow(clippy::unwrap_used)]
            serde_json::to_value(envelope).unwrap()
        }
        other => error_value(format!("unknown tool: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ServerContext {
        let config = Config::new(None).unwrap();
        config.set_value("allowed_directories", json!(["/"]));
        ServerContext { config: Arc::new(config), terminal: Arc::new(TerminalManager::new()) }
    }

    #[tokio::test]
    async fn write_then_read_file_round_trips() {
        let ctx = ctx();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt").to_string_lossy().to_string();

        let write_result =
            dispatch("write_file", json!({"file_path": path, "content": "hi"}), &ctx).await;
        assert_eq!(write_result, json!({"success": true}));

        let read_result =
            dispatch("read_file", json!({"path": path, "read_all": true}), &ctx).await;
        assert_eq!(read_result["content"], json!("hi"));
    }

    #[tokio::test]
    async fn get_and_set_config_round_trip() {
        let ctx = ctx();
        let updated = dispatch("set_config", json!({"key": "max_read_length", "value": 5}), &ctx).await;
        assert_eq!(updated["max_read_length"], json!(5));

        let snapshot = dispatch("get_config", Value::Null, &ctx).await;
        assert_eq!(snapshot["max_read_length"], json!(5));
    }

    #[tokio::test]
    async fn execute_command_denied_yields_error_envelope() {
        let ctx = ctx();
        let mut updates = std::collections::HashMap::new();
        updates.insert("blocked_commands".to_string(), json!(["sudo"]));
        ctx.config.update_config(updates);

        let result =
            dispatch("execute_command", json!({"command": "sudo rm -rf /", "timeout": 5.0}), &ctx).await;
        assert_eq!(result["isError"], json!(true));
    }

    #[tokio::test]
    async fn get_active_sessions_returns_a_map_keyed_by_pid() {
        let ctx = ctx();
        let exec_result =
            dispatch("execute_command", json!({"command": "sleep 5", "timeout": 0.1}), &ctx).await;
        let pid = exec_result["pid"].as_u64().unwrap();

        let sessions = dispatch("get_active_sessions", Value::Null, &ctx).await;
        assert_eq!(sessions[pid.to_string()]["pid"], json!(pid));
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_shape() {
        let ctx = ctx();
        let result = dispatch("not_a_real_tool", Value::Null, &ctx).await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn malformed_arguments_yield_error_shape() {
        let ctx = ctx();
        let result = dispatch("read_file", json!({"wrong_field": 1}), &ctx).await;
        assert!(result.get("error").is_some());
    }
}
