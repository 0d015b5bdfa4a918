//! The output parser: turns a subprocess's JSON transcript (`raw.json`) into
//! a human-visible result (`stdout.txt`) and a changelog of file-mutating
//! tool calls (`changelog.txt`), plus an optional `usage.json`.
//!
//! A malformed or absent transcript is never a job failure — the
//! subprocess's own exit code already decided the job's status. This module
//! only ever produces empty defaults and a logged warning on bad input.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::job::JobDir;

const NO_CHANGES: &str = "(no file changes)";

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub stdout: String,
    pub changelog: String,
    pub usage: Option<Usage>,
}

/// Parse the bytes of a subprocess transcript. Never errors; a decode
/// failure or absent expected field yields empty defaults.
pub fn parse(raw: &[u8]) -> ParsedOutput {
    if raw.is_empty() {
        return ParsedOutput {
            stdout: String::new(),
            changelog: NO_CHANGES.to_string(),
            usage: None,
        };
    }

    let value: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to decode subprocess transcript as JSON");
            return ParsedOutput {
                stdout: String::new(),
                changelog: NO_CHANGES.to_string(),
                usage: None,
            };
        }
    };

    let stdout = value
        .get("result")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let changelog_lines = extract_changelog_lines(&value);
    let changelog = if changelog_lines.is_empty() {
        NO_CHANGES.to_string()
    } else {
        let mut s = changelog_lines.join("\n");
        s.push('\n');
        s
    };

    let usage = value.get("usage").map(|u| Usage {
        input_tokens: field_u64(u, "input_tokens"),
        output_tokens: field_u64(u, "output_tokens"),
        cache_creation_input_tokens: field_u64(u, "cache_creation_input_tokens"),
        cache_read_input_tokens: field_u64(u, "cache_read_input_tokens"),
    });

    ParsedOutput {
        stdout,
        changelog,
        usage,
    }
}

fn field_u64(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn extract_changelog_lines(value: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let Some(messages) = value.get("messages").and_then(Value::as_array) else {
        return lines;
    };

    for message in messages {
        let Some(content) = message.get("content").and_then(Value::as_array) else {
            continue;
        };
        for item in content {
            if item.get("type").and_then(Value::as_str) != Some("tool_use") {
                continue;
            }
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            let input = item.get("input");
            if let Some(line) = changelog_line(name, input) {
                lines.push(line);
            }
        }
    }
    lines
}

fn changelog_line(name: &str, input: Option<&Value>) -> Option<String> {
    let get_str = |key: &str| input.and_then(|i| i.get(key)).and_then(Value::as_str);

    match name {
        "Edit" => {
            let file_path = get_str("file_path").unwrap_or_default();
            let chars = get_str("new_string").map(|s| s.len()).unwrap_or(0);
            Some(format!("EDIT {file_path}: {chars} chars"))
        }
        "Write" => Some(format!("WRITE {}", get_str("file_path").unwrap_or_default())),
        "NotebookEdit" => Some(format!(
            "NOTEBOOK {}",
            get_str("notebook_path").unwrap_or_default()
        )),
        "Bash" => {
            let command = get_str("command").unwrap_or_default();
            let truncated = truncate(command, 80);
            let first_word = command.split_whitespace().next().unwrap_or_default();
            if matches!(first_word, "rm" | "rmdir" | "unlink") {
                Some(format!("DELETE via bash: {truncated}"))
            } else if matches!(first_word, "mv" | "cp" | "mkdir") {
                Some(format!("FS: {truncated}"))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Read `raw.json` from `dir`, parse it, and write `stdout.txt`,
/// `changelog.txt`, and (if present) `usage.json`. Idempotent and
/// infallible with respect to the transcript's content; only propagates
/// filesystem errors writing the output files.
pub fn parse_and_write(dir: &JobDir) -> Result<()> {
    let raw = crate::atomic::read(&dir.raw_json_path())?.unwrap_or_default();
    let parsed = parse(&raw);

    crate::atomic::write_atomic(&dir.stdout_path(), parsed.stdout.as_bytes())?;
    crate::atomic::write_atomic(&dir.changelog_path(), parsed.changelog.as_bytes())?;
    if let Some(usage) = &parsed.usage {
        let bytes = serde_json::to_vec_pretty(usage)?;
        crate::atomic::write_atomic(&dir.usage_path(), &bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let parsed = parse(b"");
        assert_eq!(parsed.stdout, "");
        assert_eq!(parsed.changelog, NO_CHANGES);
        assert_eq!(parsed.usage, None);
    }

    #[test]
    fn invalid_json_yields_defaults() {
        let parsed = parse(b"{not valid");
        assert_eq!(parsed.stdout, "");
        assert_eq!(parsed.changelog, NO_CHANGES);
    }

    #[test]
    fn scenario_4_edit_tool_use() {
        let raw = br#"{"result":"ok","messages":[{"content":[{"type":"tool_use","name":"Edit","input":{"file_path":"/a/b.go","new_string":"hello"}}]}]}"#;
        let parsed = parse(raw);
        assert_eq!(parsed.stdout, "ok");
        assert_eq!(parsed.changelog, "EDIT /a/b.go: 5 chars\n");
    }

    #[test]
    fn write_and_notebook_and_bash_tools() {
        let raw = br#"{"result":"","messages":[{"content":[
            {"type":"tool_use","name":"Write","input":{"file_path":"/x.rs"}},
            {"type":"tool_use","name":"NotebookEdit","input":{"notebook_path":"/n.ipynb"}},
            {"type":"tool_use","name":"Bash","input":{"command":"rm -rf /tmp/x"}},
            {"type":"tool_use","name":"Bash","input":{"command":"mv a b"}},
            {"type":"tool_use","name":"Bash","input":{"command":"ls -la"}}
        ]}]}"#;
        let parsed = parse(raw);
        let lines: Vec<&str> = parsed.changelog.lines().collect();
        assert_eq!(
            lines,
            vec![
                "WRITE /x.rs",
                "NOTEBOOK /n.ipynb",
                "DELETE via bash: rm -rf /tmp/x",
                "FS: mv a b",
            ]
        );
    }

    #[test]
    fn no_tool_use_yields_no_file_changes() {
        let raw = br#"{"result":"done","messages":[]}"#;
        let parsed = parse(raw);
        assert_eq!(parsed.changelog, NO_CHANGES);
    }

    #[test]
    fn usage_fields_default_to_zero() {
        let raw = br#"{"result":"x","usage":{"input_tokens":10}}"#;
        let parsed = parse(raw);
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 0);
        assert_eq!(usage.cache_creation_input_tokens, 0);
        assert_eq!(usage.cache_read_input_tokens, 0);
    }

    #[test]
    fn missing_usage_is_none() {
        let raw = br#"{"result":"x"}"#;
        let parsed = parse(raw);
        assert_eq!(parsed.usage, None);
    }
}
