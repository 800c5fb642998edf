//! Splits a shell line into its distinct base commands, honoring quotes,
//! escapes, separators, and parenthesized subshells (C4).
//!
//! Grounded on the original server's `extract_commands`/`extract_base_command`
//! character-by-character state machine, kept as an explicit loop with flags
//! rather than a regex, per the design notes.

use std::collections::HashSet;

const SEPARATORS: &[&str] = &["&&", "||", ";", "|", "&"];

/// Returns the deduplicated set of base commands referenced by `line`.
pub fn extract_commands(line: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    collect_commands(line, &mut out);
    out
}

fn collect_commands(line: &str, out: &mut HashSet<String>) {
    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();
    let mut i = 0;
    let mut in_quotes = false;
    let mut quote_char = '\0';
    let mut escaped = false;
    let mut current = String::new();

    while i < len {
        let c = chars[i];

        if escaped {
            current.push(c);
            escaped = false;
            i += 1;
            continue;
        }

        if c == '\\' && !in_quotes {
            current.push(c);
            escaped = true;
            i += 1;
            continue;
        }

        if c == '"' || c == '\'' {
            if in_quotes && c == quote_char {
                in_quotes = false;
                quote_char = '\0';
            } else if !in_quotes {
                in_quotes = true;
                quote_char = c;
            }
            current.push(c);
            i += 1;
            continue;
        }

        if in_quotes {
            current.push(c);
            i += 1;
            continue;
        }

        if c == '(' {
            if let Some(close) = matching_paren(&chars, i) {
                let subshell: String = chars[i + 1..close].iter().collect();
                collect_commands(&subshell, out);
                i = close + 1;
                continue;
            }
        }

        if let Some(sep) = matching_separator(&chars, i) {
            flush_segment(&current, out);
            current.clear();
            i += sep.chars().count();
            continue;
        }

        current.push(c);
        i += 1;
    }

    flush_segment(&current, out);
}

/// Given `(` at `open`, returns the index of its matching `)`, honoring
/// nesting. `None` if unterminated.
fn matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 1;
    let mut j = open + 1;
    while j < chars.len() {
        match chars[j] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

fn matching_separator(chars: &[char], at: usize) -> Option<&'static str> {
    SEPARATORS.iter().copied().find(|sep| {
        let sep_chars: Vec<char> = sep.chars().collect();
        at + sep_chars.len() <= chars.len() && chars[at..at + sep_chars.len()] == sep_chars[..]
    })
}

fn flush_segment(segment: &str, out: &mut HashSet<String>) {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return;
    }
    let base = extract_base_command(trimmed);
    if !base.is_empty() {
        out.insert(base);
    }
}

/// The first non-assignment token of a shell segment, used for deny-list
/// matching. Returns `""` when the segment has no such token, or fails to
/// tokenize (e.g. an unterminated quote).
pub fn extract_base_command(segment: &str) -> String {
    let Some(tokens) = shlex::split(segment) else {
        return String::new();
    };
    for token in tokens {
        if token.contains('=') && !token.starts_with('-') {
            continue;
        }
        return token;
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_on_and_or_semicolon_and_skips_env_assignment() {
        let cmds = extract_commands(
            r#"JAVA_HOME=/usr/jdk sudo rm -rf; grep "pattern" f && echo done"#,
        );
        assert_eq!(cmds, set(&["sudo", "grep", "echo"]));
    }

    #[test]
    fn double_ampersand_wins_over_single() {
        let cmds = extract_commands("echo a && echo b");
        assert_eq!(cmds, set(&["echo"]));
    }

    #[test]
    fn pipe_and_background_are_separators() {
        let cmds = extract_commands("cat f | grep x & echo done");
        assert_eq!(cmds, set(&["cat", "grep", "echo"]));
    }

    #[test]
    fn quoted_separators_are_not_split() {
        let cmds = extract_commands(r#"echo "a && b""#);
        assert_eq!(cmds, set(&["echo"]));
    }

    #[test]
    fn parenthesized_subshell_is_recursed_into() {
        let cmds = extract_commands("echo a && (ls; pwd)");
        assert_eq!(cmds, set(&["echo", "ls", "pwd"]));
    }

    #[test]
    fn nested_parens_are_balanced() {
        let cmds = extract_commands("(echo a && (ls))");
        assert_eq!(cmds, set(&["echo", "ls"]));
    }

    #[test]
    fn escaped_separator_is_not_split() {
        let cmds = extract_commands(r"echo a\; echo b");
        assert_eq!(cmds, set(&["echo"]));
    }

    #[test]
    fn empty_line_yields_empty_set() {
        assert!(extract_commands("").is_empty());
        assert!(extract_commands("   ").is_empty());
    }

    #[test]
    fn result_is_a_deduplicated_set() {
        let cmds = extract_commands("echo a && echo b && echo c");
        assert_eq!(cmds.len(), 1);
        assert!(cmds.contains("echo"));
    }

    #[test]
    fn base_command_skips_leading_assignments_but_keeps_flags() {
        assert_eq!(extract_base_command("FOO=bar -x sudo rm"), "-x");
        assert_eq!(extract_base_command("FOO=bar BAZ=qux sudo rm"), "sudo");
    }

    #[test]
    fn base_command_of_empty_segment_is_empty() {
        assert_eq!(extract_base_command(""), "");
        assert_eq!(extract_base_command("FOO=bar"), "");
    }
}
