//! Human-readable summaries of what a sensitive call is about to do.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::path::Path;

use swe_core::ToolCall;

/// Longest delegation instructions shown before truncating.
const TASK_PREVIEW_CHARS: usize = 500;

/// What the operator sees before answering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPreview {
    pub title: String,
    /// Labelled facts, in display order.
    pub fields: Vec<(String, String)>,
    /// Unified diff for file changes.
    pub diff: Option<String>,
    /// Set when the action cannot succeed as requested.
    pub error: Option<String>,
}

impl ActionPreview {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    fn field(mut self, label: &str, value: impl Into<String>) -> Self {
        self.fields.push((label.to_string(), value.into()));
        self
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for ActionPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.title)?;
        for (label, value) in &self.fields {
            if value.contains('\n') {
                writeln!(f, "{label}:\n{value}")?;
            } else {
                writeln!(f, "{label}: {value}")?;
            }
        }
        if let Some(err) = &self.error {
            writeln!(f, "Error: {err}")?;
        }
        if let Some(diff) = &self.diff {
            write!(f, "\n{diff}")?;
        }
        Ok(())
    }
}

/// Build the preview for a call. Reads (never writes) target files so the
/// diff reflects what is on disk right now.
pub fn preview_call(call: &ToolCall) -> ActionPreview {
    let args = &call.arguments;
    match call.tool_name.as_str() {
        "write_file" => preview_write(args),
        "edit_file" => preview_edit(args),
        "shell" => ActionPreview::new("Execute shell command")
            .field("Shell Command", str_arg(args, "command"))
            .field(
                "Working Directory",
                args.get("working_dir")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(current_dir),
            ),
        "fetch_url" => ActionPreview::new("Fetch web content")
            .field("URL", str_arg(args, "url"))
            .field("Timeout", format!("{}s", timeout_arg(args))),
        "http_request" => ActionPreview::new("Send HTTP request")
            .field("URL", str_arg(args, "url"))
            .field(
                "Method",
                args.get("method")
                    .and_then(Value::as_str)
                    .unwrap_or("GET")
                    .to_uppercase(),
            )
            .field("Timeout", format!("{}s", timeout_arg(args))),
        "web_search" => ActionPreview::new("Search the web")
            .field("Query", str_arg(args, "query"))
            .field(
                "Max Results",
                args.get("max_results")
                    .and_then(Value::as_u64)
                    .unwrap_or(5)
                    .to_string(),
            )
            .field(
                "Topic",
                args.get("topic").and_then(Value::as_str).unwrap_or("general"),
            ),
        "task" => {
            let description = str_arg(args, "description");
            let shown = if description.chars().count() > TASK_PREVIEW_CHARS {
                let head: String = description.chars().take(TASK_PREVIEW_CHARS).collect();
                format!("{head}...")
            } else {
                description
            };
            ActionPreview::new("Delegate to sub-agent")
                .field(
                    "Subagent Type",
                    args.get("subagent_type")
                        .and_then(Value::as_str)
                        .unwrap_or("general-purpose"),
                )
                .field("Task Instructions", shown)
        }
        other => ActionPreview::new(format!("Run tool `{other}`")).field(
            "Arguments",
            serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string()),
        ),
    }
}

fn preview_write(args: &Value) -> ActionPreview {
    let path = str_arg(args, "file_path");
    let content = str_arg(args, "content");
    let existing = std::fs::read_to_string(&path).ok();

    let action = if existing.is_some() {
        "Create new file (overwrites existing content)"
    } else {
        "Create new file"
    };
    let mut preview = ActionPreview::new("Write file")
        .field("File", path.clone())
        .field("Action", action)
        .field("Lines to write", content.lines().count().to_string());
    preview.diff = Some(unified_diff(existing.as_deref().unwrap_or(""), &content, &path));
    preview
}

fn preview_edit(args: &Value) -> ActionPreview {
    let path = str_arg(args, "file_path");
    let old = str_arg(args, "old_string");
    let new = str_arg(args, "new_string");
    let replace_all = args.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

    let scope = if replace_all {
        "all occurrences"
    } else {
        "single occurrence"
    };
    let mut preview = ActionPreview::new("Edit file")
        .field("File", path.clone())
        .field("Action", format!("Replace text ({scope})"));

    let current = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            preview.error = Some(format!("cannot read {}: {e}", path));
            return preview;
        }
    };

    let matches = if old.is_empty() { 0 } else { current.matches(old.as_str()).count() };
    preview = preview.field("Occurrences matched", matches.to_string());
    if matches == 0 {
        preview.error = Some("old_string not found in file".into());
        return preview;
    }
    if matches > 1 && !replace_all {
        preview.error = Some(format!(
            "old_string occurs {matches} times; set replace_all or give more context"
        ));
        return preview;
    }

    let updated = if replace_all {
        current.replace(old.as_str(), &new)
    } else {
        current.replacen(old.as_str(), &new, 1)
    };
    let (added, removed) = line_changes(&current, &updated);
    preview = preview.field("Lines changed", format!("+{added} / -{removed}"));
    preview.diff = Some(unified_diff(&current, &updated, &path));
    preview
}

fn unified_diff(old: &str, new: &str, path: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

fn line_changes(old: &str, new: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .fold((0, 0), |(add, del), change| match change.tag() {
            ChangeTag::Insert => (add + 1, del),
            ChangeTag::Delete => (add, del + 1),
            ChangeTag::Equal => (add, del),
        })
}

fn str_arg(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn timeout_arg(args: &Value) -> u64 {
    args.get("timeout").and_then(Value::as_u64).unwrap_or(30)
}

fn current_dir() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| Path::new(".").display().to_string())
}
