//! Commit message generation from the staged diff.
//!
//! The diff goes to a temp file inside the working directory and the prompt
//! refers to it as `@<file>`. Agents resolve `@` references against real
//! files, and a large diff would not fit in an argument anyway.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;

use crate::agents::EventKind;
use crate::config::{AgentRequest, BridgeConfig};
use crate::session::{SessionError, SessionManager};

/// Leading `Title:` / `Description:` labels some models add.
static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*(?:\*\*)?(?:title|description)(?:\*\*)?[ \t]*:[ \t]*(?:\*\*)?[ \t]*").unwrap());

const HANDOFF_PREFIX: &str = ".conduit-staged-";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("No staged changes")]
    NothingStaged,

    #[error("git diff failed: {0}")]
    Git(String),

    #[error(transparent)]
    Spawn(#[from] SessionError),

    #[error("Commit message generation was aborted")]
    Aborted,

    #[error("Agent failed: {message}")]
    AgentFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Agent finished without a commit message")]
    NoOutput,

    #[error("Agent did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the content to describe.
#[async_trait]
pub trait StagedContent: Send + Sync {
    async fn staged_diff(&self, working_dir: &Path) -> Result<String, DriverError>;
}

/// `git diff --cached --no-color` in the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitStagedDiff;

#[async_trait]
impl StagedContent for GitStagedDiff {
    async fn staged_diff(&self, working_dir: &Path) -> Result<String, DriverError> {
        let output = Command::new("git")
            .args(["diff", "--cached", "--no-color"])
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(DriverError::Git(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn build_prompt(file_name: &str) -> String {
    format!(
        "Write a git commit message for the staged changes in @{file_name}.\n\
         Reply with the commit message only: a subject line under 72 characters, \
         then a blank line and a short body if the change needs one. \
         Do not add labels, quotes or code fences."
    )
}

/// Strip code fences and `Title:` / `Description:` labels, then trim.
pub fn clean_commit_message(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string line, e.g. ```text
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = text.trim_end().strip_suffix("```").unwrap_or(text);
    }

    let unlabeled = LABEL_RE.replace_all(text.trim(), "");
    unlabeled.trim().to_string()
}

/// Generates commit messages by running an agent over the staged diff.
pub struct CommitMessageDriver<S = GitStagedDiff> {
    manager: Arc<SessionManager>,
    config: Arc<BridgeConfig>,
    staged: S,
}

impl CommitMessageDriver<GitStagedDiff> {
    pub fn new(manager: Arc<SessionManager>, config: Arc<BridgeConfig>) -> Self {
        Self::with_staged(manager, config, GitStagedDiff)
    }
}

impl<S: StagedContent> CommitMessageDriver<S> {
    pub fn with_staged(manager: Arc<SessionManager>, config: Arc<BridgeConfig>, staged: S) -> Self {
        Self {
            manager,
            config,
            staged,
        }
    }

    /// Run the agent over the staged diff in `working_dir` and return the
    /// cleaned message.
    pub async fn generate(&self, working_dir: &Path) -> Result<String, DriverError> {
        let diff = self.staged.staged_diff(working_dir).await?;
        if diff.trim().is_empty() {
            return Err(DriverError::NothingStaged);
        }

        // Lives until the run ends; dropping it deletes the file.
        let mut handoff = tempfile::Builder::new()
            .prefix(HANDOFF_PREFIX)
            .suffix(".diff")
            .tempfile_in(working_dir)?;
        handoff.write_all(diff.as_bytes())?;
        handoff.flush()?;
        let file_name = handoff
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let settings = &self.config.commit_message;
        let invocation = self.config.invocation(AgentRequest {
            family: Some(settings.family),
            prompt: build_prompt(&file_name),
            working_dir: working_dir.to_string_lossy().into_owned(),
            model: settings.model.clone(),
            ..AgentRequest::default()
        });
        let session = self.manager.create_session(invocation)?;
        log::info!(
            "[{}] generating commit message in {}",
            session.id,
            working_dir.display()
        );

        let terminal = match settings.timeout() {
            Some(limit) => match tokio::time::timeout(limit, session.wait_terminal()).await {
                Ok(event) => event,
                Err(_) => {
                    session.abort();
                    return Err(DriverError::TimedOut(limit));
                }
            },
            None => session.wait_terminal().await,
        };

        let text = match terminal.kind {
            EventKind::Done { output, .. } if !output.trim().is_empty() => output,
            EventKind::Done { .. } => session.last_assistant_text().unwrap_or_default(),
            EventKind::Aborted { .. } => return Err(DriverError::Aborted),
            EventKind::Error { message, exit_code } => {
                return Err(DriverError::AgentFailed { message, exit_code })
            }
            _ => return Err(DriverError::NoOutput),
        };

        let message = clean_commit_message(&text);
        if message.is_empty() {
            return Err(DriverError::NoOutput);
        }
        Ok(message)
    }
}
