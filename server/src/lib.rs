//! Tool server: a stdin/stdout line loop over the dispatcher (C10).
#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::{self};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub mod dispatch;

use dispatch::ServerContext;
use toolhost_core::config::Config;
use toolhost_core::terminal::TerminalManager;

/// Size of the bounded channels between the stdin reader, the dispatcher,
/// and the stdout writer.
const CHANNEL_CAPACITY: usize = 128;

#[derive(serde::Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Builds the shared `Config`/`TerminalManager` state and runs the
/// stdin/stdout request loop until EOF.
pub async fn run_main(config_path: Option<PathBuf>) -> io::Result<()> {
    let config = Config::new(config_path).map_err(|e| io::Error::other(e.to_string()))?;
    let ctx = Arc::new(ServerContext { config: Arc::new(config), terminal: Arc::new(TerminalManager::new()) });

    let (incoming_tx, mut incoming_rx) = mpsc::channel::<ToolRequest>(CHANNEL_CAPACITY);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<serde_json::Value>(CHANNEL_CAPACITY);

    let stdin_reader_handle = tokio::spawn({
        let incoming_tx = incoming_tx.clone();
        async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.unwrap_or_default() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ToolRequest>(&line) {
                    Ok(request) => {
                        if incoming_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("failed to deserialize tool request: {e}"),
                }
            }

            debug!("stdin reader finished (EOF)");
        }
    });

    let dispatcher_handle = tokio::spawn({
        let ctx = ctx.clone();
        async move {
            while let Some(request) = incoming_rx.recv().await {
                let result = dispatch::dispatch(&request.tool, request.arguments, &ctx).await;
                if outgoing_tx.send(result).await.is_err() {
                    break;
                }
            }
            info!("dispatcher task exited (channel closed)");
        }
    });

    let stdout_writer_handle = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(result) = outgoing_rx.recv().await {
            match serde_json::to_string(&result) {
                Ok(json) => {
                    if let Err(e) = stdout.write_all(json.as_bytes()).await {
                        error!("failed to write to stdout: {e}");
                        break;
                    }
                    if let Err(e) = stdout.write_all(b"\n").await {
                        error!("failed to write newline to stdout: {e}");
                        break;
                    }
                    if let Err(e) = stdout.flush().await {
                        error!("failed to flush stdout: {e}");
                        break;
                    }
                }
                Err(e) => error!("failed to serialize tool result: {e}"),
            }
        }
        info!("stdout writer exited (channel closed)");
    });

    let _ = tokio::join!(stdin_reader_handle, dispatcher_handle, stdout_writer_handle);

    Ok(())
}
