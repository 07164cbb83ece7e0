//! Tool-call normalization.
//!
//! Every agent family reports side-effecting tool calls in its own shape.
//! This module maps those payloads onto the closed [`ToolCall`] set plus an
//! optional [`ToolOutcome`]. All functions here are pure: no I/O, no state,
//! identical input always yields identical output.
//!
//! Anything that does not match a known case comes back as
//! [`NormalizedToolCall::Unknown`] so the decoder can pass it through as a
//! plain message instead of dropping it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a single todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    /// Accepts both the plain form (`in_progress`) and cursor's
    /// `TODO_STATUS_IN_PROGRESS` form.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .strip_prefix("TODO_STATUS_")
            .unwrap_or(raw)
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Some(TodoStatus::Pending),
            "in_progress" => Some(TodoStatus::InProgress),
            "completed" => Some(TodoStatus::Completed),
            "cancelled" | "canceled" => Some(TodoStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

/// Normalized tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "toolKind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ToolCall {
    Shell {
        command: String,
    },
    Read {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },
    Write {
        path: String,
        content: String,
    },
    Edit {
        path: String,
    },
    Grep {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Glob {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_directory: Option<String>,
    },
    ListDirectory {
        path: String,
        #[serde(default)]
        ignore_patterns: Vec<String>,
    },
    Delete {
        path: String,
    },
    TodoUpdate {
        merge: bool,
        items: Vec<TodoItem>,
    },
}

/// Discriminant of [`ToolCall`], handy for logging and matching on kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Shell,
    Read,
    Write,
    Edit,
    Grep,
    Glob,
    ListDirectory,
    Delete,
    TodoUpdate,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ToolKind::Shell => "shell",
            ToolKind::Read => "read",
            ToolKind::Write => "write",
            ToolKind::Edit => "edit",
            ToolKind::Grep => "grep",
            ToolKind::Glob => "glob",
            ToolKind::ListDirectory => "listDirectory",
            ToolKind::Delete => "delete",
            ToolKind::TodoUpdate => "todoUpdate",
        };
        f.write_str(name)
    }
}

impl ToolCall {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::Shell { .. } => ToolKind::Shell,
            ToolCall::Read { .. } => ToolKind::Read,
            ToolCall::Write { .. } => ToolKind::Write,
            ToolCall::Edit { .. } => ToolKind::Edit,
            ToolCall::Grep { .. } => ToolKind::Grep,
            ToolCall::Glob { .. } => ToolKind::Glob,
            ToolCall::ListDirectory { .. } => ToolKind::ListDirectory,
            ToolCall::Delete { .. } => ToolKind::Delete,
            ToolCall::TodoUpdate { .. } => ToolKind::TodoUpdate,
        }
    }
}

/// Kind-specific payload of a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "toolKind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ToolOutput {
    Shell { exit_code: i32, output: String },
    Read { total_lines: u64, content: String },
    Write { lines_created: u64, file_size: u64 },
    Edit,
    Grep { matches: Value },
    Glob { total_files: u64 },
    ListDirectory { tree: Value },
    Delete,
    TodoUpdate { items: Vec<TodoItem> },
}

/// How a tool call ended. Only `Success` carries a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ToolOutcome {
    Success { output: ToolOutput },
    Rejected { reason: String },
    Failure { message: String },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }
}

/// Result of normalizing one family-specific tool payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedToolCall {
    Known {
        call: ToolCall,
        outcome: Option<ToolOutcome>,
    },
    Unknown {
        name: String,
        args: Value,
    },
}

impl NormalizedToolCall {
    /// Passthrough text for tools we do not recognize: `[name]` followed by the
    /// pretty-printed arguments.
    pub fn unknown_display(name: &str, args: &Value) -> String {
        let pretty = serde_json::to_string_pretty(args).unwrap_or_default();
        if args.is_null() || pretty.is_empty() {
            format!("[{name}]")
        } else {
            format!("[{name}]\n{pretty}")
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn todo_items(value: Option<&Value>) -> Option<Vec<TodoItem>> {
    let items = value?.as_array()?;
    items
        .iter()
        .map(|item| {
            Some(TodoItem {
                content: str_field(item, "content")?,
                status: TodoStatus::parse(item.get("status")?.as_str()?)?,
            })
        })
        .collect()
}

fn line_count(text: &str) -> u64 {
    text.lines().count() as u64
}

// ============================================================================
// CURSOR
// ============================================================================

/// Normalize cursor's `tool_call` object, e.g.
/// `{"readToolCall": {"args": {"path": "a.rs"}, "result": {"success": {...}}}}`.
pub fn normalize_cursor(tool_call: &Value) -> NormalizedToolCall {
    let entry = tool_call.as_object().and_then(|map| {
        map.iter()
            .find(|(key, _)| key.ends_with("ToolCall"))
            .or_else(|| map.iter().next())
    });
    let Some((name, body)) = entry else {
        return NormalizedToolCall::Unknown {
            name: "unknown".to_string(),
            args: tool_call.clone(),
        };
    };

    let args = body.get("args").cloned().unwrap_or(Value::Null);
    match cursor_call(name, &args) {
        Some(call) => {
            let outcome = body.get("result").map(|result| cursor_outcome(&call, result));
            NormalizedToolCall::Known { call, outcome }
        }
        None => NormalizedToolCall::Unknown {
            name: name.clone(),
            args,
        },
    }
}

fn cursor_call(name: &str, args: &Value) -> Option<ToolCall> {
    let call = match name {
        "shellToolCall" => ToolCall::Shell {
            command: str_field(args, "command")?,
        },
        "readToolCall" => ToolCall::Read {
            path: str_field(args, "path")?,
            offset: u64_field(args, "offset"),
            limit: u64_field(args, "limit"),
        },
        "writeToolCall" => ToolCall::Write {
            path: str_field(args, "path")?,
            content: str_field(args, "fileText")
                .or_else(|| str_field(args, "content"))
                .unwrap_or_default(),
        },
        "editToolCall" => ToolCall::Edit {
            path: str_field(args, "path")?,
        },
        "grepToolCall" => ToolCall::Grep {
            pattern: str_field(args, "pattern")?,
            path: str_field(args, "path"),
        },
        "globToolCall" => ToolCall::Glob {
            pattern: str_field(args, "globPattern").or_else(|| str_field(args, "pattern"))?,
            target_directory: str_field(args, "targetDirectory"),
        },
        "lsToolCall" => ToolCall::ListDirectory {
            path: str_field(args, "path")?,
            ignore_patterns: string_list(args.get("ignore")),
        },
        "deleteToolCall" => ToolCall::Delete {
            path: str_field(args, "path")?,
        },
        "updateTodosToolCall" => ToolCall::TodoUpdate {
            merge: args.get("merge").and_then(Value::as_bool).unwrap_or(false),
            items: todo_items(args.get("todos"))?,
        },
        _ => return None,
    };
    Some(call)
}

fn cursor_outcome(call: &ToolCall, result: &Value) -> ToolOutcome {
    if let Some(success) = result.get("success") {
        return ToolOutcome::Success {
            output: cursor_success(call, success),
        };
    }

    if let Some(rejected) = result.get("rejected") {
        return ToolOutcome::Rejected {
            reason: str_field(rejected, "reason").unwrap_or_else(|| "rejected".to_string()),
        };
    }

    // A shell command that ran but exited nonzero still has an exit code to report.
    if let (ToolCall::Shell { .. }, Some(failure)) = (call, result.get("failure")) {
        if let Some(code) = exit_code(failure) {
            return ToolOutcome::Success {
                output: ToolOutput::Shell {
                    exit_code: code,
                    output: shell_output(failure),
                },
            };
        }
    }

    let failure = result.get("failure").or_else(|| result.get("error"));
    let message = failure
        .and_then(|f| str_field(f, "errorMessage").or_else(|| str_field(f, "message")))
        .or_else(|| failure.map(|f| f.to_string()))
        .unwrap_or_else(|| "tool call produced no result".to_string());
    ToolOutcome::Failure { message }
}

fn shell_output(payload: &Value) -> String {
    let stdout = str_field(payload, "stdout").unwrap_or_default();
    let stderr = str_field(payload, "stderr").unwrap_or_default();
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout,
        (true, false) => stderr,
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}

/// `exitCode` saturated into `i32`.
fn exit_code(value: &Value) -> Option<i32> {
    let code = value.get("exitCode").and_then(Value::as_i64)?;
    Some(code.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

fn cursor_success(call: &ToolCall, success: &Value) -> ToolOutput {
    match call {
        ToolCall::Shell { .. } => ToolOutput::Shell {
            exit_code: exit_code(success).unwrap_or(0),
            output: shell_output(success),
        },
        ToolCall::Read { .. } => {
            let content = str_field(success, "content").unwrap_or_default();
            ToolOutput::Read {
                total_lines: u64_field(success, "totalLines").unwrap_or_else(|| line_count(&content)),
                content,
            }
        }
        ToolCall::Write { content, .. } => ToolOutput::Write {
            lines_created: u64_field(success, "linesCreated").unwrap_or_else(|| line_count(content)),
            file_size: u64_field(success, "fileSize").unwrap_or(content.len() as u64),
        },
        ToolCall::Edit { .. } => ToolOutput::Edit,
        ToolCall::Grep { .. } => ToolOutput::Grep {
            matches: success
                .get("workspaceResults")
                .cloned()
                .unwrap_or_else(|| success.clone()),
        },
        ToolCall::Glob { .. } => ToolOutput::Glob {
            total_files: u64_field(success, "totalFiles").unwrap_or(0),
        },
        ToolCall::ListDirectory { .. } => ToolOutput::ListDirectory {
            tree: success
                .get("directoryTreeRoot")
                .cloned()
                .unwrap_or_else(|| success.clone()),
        },
        ToolCall::Delete { .. } => ToolOutput::Delete,
        ToolCall::TodoUpdate { items, .. } => ToolOutput::TodoUpdate {
            items: todo_items(success.get("todos")).unwrap_or_else(|| items.clone()),
        },
    }
}

// ============================================================================
// CLAUDE
// ============================================================================

/// Normalize a Claude `tool_use` block by tool name and input.
pub fn normalize_claude(name: &str, input: &Value) -> NormalizedToolCall {
    match claude_call(name, input) {
        Some(call) => NormalizedToolCall::Known {
            call,
            outcome: None,
        },
        None => NormalizedToolCall::Unknown {
            name: name.to_string(),
            args: input.clone(),
        },
    }
}

fn claude_call(name: &str, input: &Value) -> Option<ToolCall> {
    let call = match name {
        "Bash" => ToolCall::Shell {
            command: str_field(input, "command")?,
        },
        "Read" => ToolCall::Read {
            path: str_field(input, "file_path")?,
            offset: u64_field(input, "offset"),
            limit: u64_field(input, "limit"),
        },
        "Write" => ToolCall::Write {
            path: str_field(input, "file_path")?,
            content: str_field(input, "content").unwrap_or_default(),
        },
        "Edit" | "MultiEdit" | "NotebookEdit" => ToolCall::Edit {
            path: str_field(input, "file_path").or_else(|| str_field(input, "notebook_path"))?,
        },
        "Grep" => ToolCall::Grep {
            pattern: str_field(input, "pattern")?,
            path: str_field(input, "path"),
        },
        "Glob" => ToolCall::Glob {
            pattern: str_field(input, "pattern")?,
            target_directory: str_field(input, "path"),
        },
        "LS" => ToolCall::ListDirectory {
            path: str_field(input, "path")?,
            ignore_patterns: string_list(input.get("ignore")),
        },
        "TodoWrite" => ToolCall::TodoUpdate {
            merge: false,
            items: todo_items(input.get("todos"))?,
        },
        _ => return None,
    };
    Some(call)
}

/// Build the outcome for a Claude `tool_result` block, given the call it answers.
///
/// Claude only reports text, so kind-specific fields are derived from it.
pub fn claude_outcome(call: &ToolCall, content: &str, is_error: bool) -> ToolOutcome {
    let output = match call {
        ToolCall::Shell { .. } => ToolOutput::Shell {
            exit_code: if is_error {
                parse_exit_code(content).unwrap_or(1)
            } else {
                0
            },
            output: content.to_string(),
        },
        _ if is_error => {
            return ToolOutcome::Failure {
                message: content.to_string(),
            }
        }
        ToolCall::Read { .. } => ToolOutput::Read {
            total_lines: line_count(content),
            content: content.to_string(),
        },
        ToolCall::Write { content: written, .. } => ToolOutput::Write {
            lines_created: line_count(written),
            file_size: written.len() as u64,
        },
        ToolCall::Edit { .. } => ToolOutput::Edit,
        ToolCall::Grep { .. } => ToolOutput::Grep {
            matches: Value::String(content.to_string()),
        },
        ToolCall::Glob { .. } => ToolOutput::Glob {
            total_files: content.lines().filter(|l| !l.trim().is_empty()).count() as u64,
        },
        ToolCall::ListDirectory { .. } => ToolOutput::ListDirectory {
            tree: Value::String(content.to_string()),
        },
        ToolCall::Delete { .. } => ToolOutput::Delete,
        ToolCall::TodoUpdate { items, .. } => ToolOutput::TodoUpdate {
            items: items.clone(),
        },
    };
    ToolOutcome::Success { output }
}

/// Claude prefixes failed Bash output with `Exit code N`.
fn parse_exit_code(content: &str) -> Option<i32> {
    content
        .trim_start()
        .strip_prefix("Exit code ")?
        .split(|c: char| !c.is_ascii_digit() && c != '-')
        .next()?
        .parse()
        .ok()
}
