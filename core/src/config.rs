//! Process-wide mutable configuration: allow-list, deny-list, default shell,
//! and read caps. One instance per process, read on every filesystem and
//! command operation and mutable live via tool calls.
//!
//! Grounded on the original server's `ConfigManager` (JSON load with
//! `add_default_config` merge-over-defaults semantics) and realized with the
//! teacher's `serde_json` + single-writer-mutex idiom rather than the
//! original's ad hoc singleton.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::{Result, ToolError};

pub const DEFAULT_MAX_READ_LENGTH: u64 = 1000;

const BLOCKED_COMMANDS: &[&str] = &[
    "mkfs", "format", "mount", "umount", "fdisk", "dd", "parted", "diskpart", "sudo", "su",
    "passwd", "adduser", "useradd", "usermod", "groupadd", "chsh", "visudo", "shutdown", "reboot",
    "halt", "poweroff", "init", "iptables", "firewall", "netsh", "sfc", "bcdedit", "reg", "net",
    "sc", "runas", "cipher", "takeown",
];

fn default_shell_name() -> &'static str {
    if cfg!(windows) { "powershell.exe" } else { "bash" }
}

fn default_config_map() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "blocked_commands".to_string(),
        Value::Array(BLOCKED_COMMANDS.iter().map(|s| Value::String(s.to_string())).collect()),
    );
    map.insert("default_shell".to_string(), Value::String(default_shell_name().to_string()));
    map.insert("allowed_directories".to_string(), Value::Array(Vec::new()));
    map.insert("max_read_length".to_string(), Value::from(DEFAULT_MAX_READ_LENGTH));
    map
}

/// The process-wide configuration store (C3).
pub struct Config {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl Config {
    /// Constructs the store, optionally loading and merging a JSON document
    /// from `path`. A missing file is not an error: the store falls back to
    /// defaults. Invalid JSON is fatal, matching the original server's
    /// `json.JSONDecodeError` handling.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let values = match &path {
            Some(p) => Self::load(p)?,
            None => default_config_map(),
        };
        Ok(Self { path, values: Mutex::new(values) })
    }

    fn load(path: &Path) -> Result<Map<String, Value>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(default_config_map());
            }
            Err(e) => return Err(ToolError::Io(e)),
        };

        let loaded: Value = serde_json::from_str(&text)
            .map_err(|e| ToolError::ConfigParseError(e.to_string()))?;
        let Value::Object(loaded) = loaded else {
            return Err(ToolError::ConfigParseError(
                "configuration file must contain a JSON object".to_string(),
            ));
        };

        let add_default = loaded.get("add_default_config").and_then(Value::as_bool).unwrap_or(false);
        tracing::info!(path = %path.display(), add_default_config = add_default, "configuration loaded");
        if add_default {
            let mut merged = default_config_map();
            for (k, v) in loaded {
                merged.insert(k, v);
            }
            Ok(merged)
        } else {
            Ok(loaded)
        }
    }

    /// A shallow-copy snapshot of the current configuration.
    pub fn get_config(&self) -> Value {
        #[allow(clippy::unwrap_used)]
        let guard = self.values.lock().unwrap();
        Value::Object(guard.clone())
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        #[allow(clippy::unwrap_used)]
        let guard = self.values.lock().unwrap();
        guard.get(key).cloned()
    }

    pub fn set_value(&self, key: &str, value: Value) {
        #[allow(clippy::unwrap_used)]
        let mut guard = self.values.lock().unwrap();
        guard.insert(key.to_string(), value);
    }

    pub fn update_config(&self, updates: HashMap<String, Value>) -> Value {
        #[allow(clippy::unwrap_used)]
        let mut guard = self.values.lock().unwrap();
        for (k, v) in updates {
            guard.insert(k, v);
        }
        Value::Object(guard.clone())
    }

    pub fn reset_config(&self) -> Value {
        #[allow(clippy::unwrap_used)]
        let mut guard = self.values.lock().unwrap();
        *guard = default_config_map();
        Value::Object(guard.clone())
    }

    /// Persists the in-memory configuration to `path`, or to the path it was
    /// constructed with. The in-memory-only allow-list seed (see
    /// [`Config::allowed_directories`]) is only written out here, never
    /// automatically.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let target = path.or(self.path.as_deref()).ok_or_else(|| {
            ToolError::InvalidArgument("no path provided to save the configuration".to_string())
        })?;
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        #[allow(clippy::unwrap_used)]
        let guard = self.values.lock().unwrap();
        let text = serde_json::to_string_pretty(&Value::Object(guard.clone()))?;
        fs::write(target, text)?;
        tracing::info!(path = %target.display(), "configuration saved");
        Ok(())
    }

    /// The deny-list of base command names forbidden from execution.
    pub fn blocked_commands(&self) -> Vec<String> {
        self.get_value("blocked_commands")
            .and_then(|v| v.as_array().cloned())
            .map(|arr| arr.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn default_shell(&self) -> String {
        self.get_value("default_shell")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default_shell_name().to_string())
    }

    pub fn max_read_length(&self) -> u64 {
        self.get_value("max_read_length").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_READ_LENGTH)
    }

    /// Raw `allowed_directories`, seeding (in-memory only) with the user's
    /// home directory if the list is currently empty.
    pub fn allowed_directories(&self) -> Vec<String> {
        let current = self
            .get_value("allowed_directories")
            .and_then(|v| v.as_array().cloned())
            .map(|arr| arr.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
            .unwrap_or_default();

        if !current.is_empty() {
            return current;
        }

        let Some(home) = dirs::home_dir() else {
            tracing::error!("could not determine home directory while seeding allow-list");
            return Vec::new();
        };
        let home = home.to_string_lossy().to_string();
        self.set_value("allowed_directories", Value::Array(vec![Value::String(home.clone())]));
        vec![home]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_seed_blocked_commands_and_shell() {
        let config = Config::new(None).unwrap();
        assert!(config.blocked_commands().contains(&"sudo".to_string()));
        assert_eq!(config.max_read_length(), DEFAULT_MAX_READ_LENGTH);
        if cfg!(windows) {
            assert_eq!(config.default_shell(), "powershell.exe");
        } else {
            assert_eq!(config.default_shell(), "bash");
        }
    }

    #[test]
    fn set_value_round_trips_through_get_value() {
        let config = Config::new(None).unwrap();
        config.set_value("max_read_length", Value::from(42));
        assert_eq!(config.get_value("max_read_length"), Some(Value::from(42)));
    }

    #[test]
    fn update_config_merges_and_reset_restores_defaults() {
        let config = Config::new(None).unwrap();
        let mut updates = HashMap::new();
        updates.insert("max_read_length".to_string(), Value::from(5));
        config.update_config(updates);
        assert_eq!(config.get_value("max_read_length"), Some(Value::from(5)));

        config.reset_config();
        assert_eq!(config.get_value("max_read_length"), Some(Value::from(DEFAULT_MAX_READ_LENGTH)));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.json");
        let config = Config::new(Some(missing)).unwrap();
        assert!(config.blocked_commands().contains(&"sudo".to_string()));
    }

    #[test]
    fn invalid_json_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "not json").unwrap();
        let result = Config::new(Some(path));
        assert!(matches!(result, Err(ToolError::ConfigParseError(_))));
    }

    #[test]
    fn add_default_config_true_merges_loaded_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"add_default_config": true, "max_read_length": 42}"#).unwrap();
        let config = Config::new(Some(path)).unwrap();
        assert_eq!(config.max_read_length(), 42);
        // blocked_commands came from the default map, not the loaded file.
        assert!(config.blocked_commands().contains(&"sudo".to_string()));
    }

    #[test]
    fn add_default_config_false_replaces_defaults_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_read_length": 42}"#).unwrap();
        let config = Config::new(Some(path)).unwrap();
        assert_eq!(config.max_read_length(), 42);
        // blocked_commands was not present in the loaded file and the file
        // fully replaced defaults, so it is absent now.
        assert!(config.blocked_commands().is_empty());
    }

    #[test]
    fn save_writes_current_values_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let config = Config::new(None).unwrap();
        config.set_value("max_read_length", Value::from(7));
        config.save(Some(&path)).unwrap();

        let reloaded = Config::new(Some(path)).unwrap();
        assert_eq!(reloaded.max_read_length(), 7);
    }

    #[test]
    fn allowed_directories_seeds_home_when_empty_without_persisting_to_disk() {
        let config = Config::new(None).unwrap();
        let seeded = config.allowed_directories();
        assert_eq!(seeded.len(), 1);
        // Re-reading returns the same in-memory seed, proving it stuck.
        assert_eq!(config.allowed_directories(), seeded);
    }
}
