//! Orchestrates the deny-list check and the terminal manager behind the
//! tool-facing envelope shape (C8).
//!
//! Grounded on the original server's command dispatch wrapper (each tool
//! function catches exceptions and returns an `{isError, content}` shape)
//! translated into an explicit enum the dispatcher serializes.

use std::time::Duration;

use serde::Serialize;

use crate::command_parser::extract_commands;
use crate::config::Config;
use crate::terminal::{ActiveSessionSummary, CompletedSessionSummary, OutputEnvelope, TerminalManager};

/// The wire envelope every command tool returns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub is_error: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
}

impl CommandEnvelope {
    fn denied(command: &str) -> Self {
        Self {
            is_error: true,
            kind: "text",
            content: format!("command is blocked: {command}"),
            pid: None,
            is_blocked: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { is_error: true, kind: "text", content: message.into(), pid: None, is_blocked: None }
    }

    fn ok(pid: u32, output: String, is_blocked: bool) -> Self {
        Self { is_error: false, kind: "result", content: output, pid: Some(pid), is_blocked: Some(is_blocked) }
    }
}

/// True iff none of `cmd`'s base commands appear in the configured deny-list.
/// An empty deny-list allows everything.
pub fn validate_command(cmd: &str, config: &Config) -> bool {
    let deny_list = config.blocked_commands();
    if deny_list.is_empty() {
        return true;
    }
    let commands = extract_commands(cmd);
    !commands.iter().any(|c| deny_list.contains(c))
}

pub async fn execute_command(
    manager: &TerminalManager,
    config: &Config,
    cmd: &str,
    timeout: Duration,
    shell: Option<&str>,
) -> CommandEnvelope {
    if !validate_command(cmd, config) {
        return CommandEnvelope::denied(cmd);
    }
    match manager.execute_command(config, cmd, timeout, shell).await {
        Ok(outcome) => CommandEnvelope::ok(outcome.pid, outcome.output, outcome.is_blocked),
        Err(e) => CommandEnvelope::failed(e.to_string()),
    }
}

pub fn read_output(manager: &TerminalManager, pid: u32, is_full: bool) -> Result<OutputEnvelope, CommandEnvelope> {
    manager.read_output(pid, is_full).map_err(|e| CommandEnvelope::failed(e.to_string()))
}

pub fn get_active_sessions(manager: &TerminalManager) -> Vec<ActiveSessionSummary> {
    manager.get_active_sessions()
}

pub fn get_completed_sessions(manager: &TerminalManager) -> Vec<CompletedSessionSummary> {
    manager.get_completed_sessions()
}

pub async fn force_terminate(manager: &TerminalManager, pid: u32) -> CommandEnvelope {
    let terminated = manager.force_terminate(pid).await;
    CommandEnvelope {
        is_error: !terminated,
        kind: "text",
        content: if terminated {
            format!("terminated session {pid}")
        } else {
            format!("no such session: {pid}")
        },
        pid: Some(pid),
        is_blocked: None,
    }
}
