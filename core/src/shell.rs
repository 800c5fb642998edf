//! Resolves which shell executable runs a command line (step 1 of C7's
//! `execute_command`).
//!
//! Grounded on the original server's `config.get("shell", "/bin/bash")`
//! fallback, extended per the design with an OS-default tier between the
//! config value and a final hardcoded fallback.

use crate::config::Config;

/// Argument override, if any, wins; otherwise the config's `default_shell`;
/// otherwise an OS-appropriate default derived from the environment.
pub fn resolve_shell(argument: Option<&str>, config: &Config) -> String {
    if let Some(shell) = argument {
        if !shell.is_empty() {
            return shell.to_string();
        }
    }

    let configured = config.default_shell();
    if !configured.is_empty() {
        return configured;
    }

    os_default_shell()
}

#[cfg(windows)]
fn os_default_shell() -> String {
    std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
}

#[cfg(not(windows))]
fn os_default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
