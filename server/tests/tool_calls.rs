//! End-to-end tool-call scenarios driven over the binary's stdin/stdout NDJSON
//! loop, mirroring the teacher's `mcp-server/tests/*.rs` process-driving style
//! (simplified here since the wire framing is a flat tool/arguments shape
//! rather than full JSON-RPC).

use std::io::Write;
use std::process::Command;
use std::process::Stdio;

use serde_json::Value;
use serde_json::json;

struct ServerProcess {
    child: std::process::Child,
}

impl ServerProcess {
    fn spawn(config_path: Option<&std::path::Path>) -> Self {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_toolhost-server"));
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());
        if let Some(path) = config_path {
            cmd.arg("--config").arg(path);
        }
        let child = cmd.spawn().expect("server binary should start");
        Self { child }
    }

    /// Spawns against a config file that allow-lists every directory, so
    /// scenarios can use `tempfile::tempdir()` output regardless of where the
    /// OS places it relative to the default (home-only) allow-list.
    fn spawn_unrestricted() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"allowed_directories": ["/"]}"#).unwrap();
        (Self::spawn(Some(&config_path)), dir)
    }

    fn call(&mut self, tool: &str, arguments: Value) -> Value {
        let request = json!({"tool": tool, "arguments": arguments});
        let stdin = self.child.stdin.as_mut().expect("piped stdin");
        writeln!(stdin, "{request}").expect("write request line");
        stdin.flush().expect("flush request line");

        use std::io::BufRead;
        let stdout = self.child.stdout.as_mut().expect("piped stdout");
        let mut reader = std::io::BufReader::new(stdout);
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        serde_json::from_str(&line).expect("response should be valid JSON")
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn write_then_read_file_round_trips_over_the_wire() {
    let (mut server, _config_dir) = ServerProcess::spawn_unrestricted();
    let work_dir = tempfile::tempdir().unwrap();
    let path = work_dir.path().join("greeting.txt").to_string_lossy().to_string();

    let write_result = server.call("write_file", json!({"file_path": path, "content": "hello"}));
    assert_eq!(write_result["success"], json!(true));

    let read_result = server.call("read_file", json!({"path": path, "read_all": true}));
    assert_eq!(read_result["content"], json!("hello"));
    assert_eq!(read_result["is_image"], json!(false));
}

#[test]
fn denied_command_yields_error_envelope_over_the_wire() {
    let mut server = ServerProcess::spawn(None);
    let result = server.call("execute_command", json!({"command": "sudo rm -rf /", "timeout": 5.0}));
    assert_eq!(result["isError"], json!(true));
    assert!(result["content"].as_str().unwrap().contains("sudo"));
}

#[test]
fn execute_then_read_output_reports_completion() {
    let mut server = ServerProcess::spawn(None);
    let exec_result = server.call("execute_command", json!({"command": "echo hi", "timeout": 5.0}));
    assert_eq!(exec_result["isError"], json!(false));
    let pid = exec_result["pid"].as_u64().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(200));
    let output = server.call("read_output", json!({"pid": pid, "is_full": true}));
    assert_eq!(output["type"], json!("completed"));
    assert!(output["output"].as_str().unwrap().contains("hi"));
}

#[test]
fn missing_config_file_falls_back_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("does_not_exist.json");
    let mut server = ServerProcess::spawn(Some(&config_path));

    let snapshot = server.call("get_config", Value::Null);
    assert_eq!(snapshot["max_read_length"], json!(1000));
}

#[test]
fn set_config_updates_are_visible_to_later_calls() {
    let mut server = ServerProcess::spawn(None);
    let updated = server.call("set_config", json!({"key": "max_read_length", "value": 42}));
    assert_eq!(updated["max_read_length"], json!(42));

    let snapshot = server.call("get_config", Value::Null);
    assert_eq!(snapshot["max_read_length"], json!(42));
}
