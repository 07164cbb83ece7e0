//! Bridge configuration.
//!
//! Read from a camelCase JSON file (by default `~/.config/conduit/config.json`).
//! Every field has a default and a missing file is not an error, so an empty
//! `{}` and no file at all behave the same.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::claude::ClaudeConfig;
use crate::agents::cursor::CursorConfig;
use crate::agents::synthetic::SyntheticConfig;
use crate::agents::AgentFamily;
use crate::paths;
use crate::session::{Admission, Invocation, SessionPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings for the commit-message driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitMessageSettings {
    pub family: AgentFamily,
    /// Abort the run after this many seconds. `null` waits forever.
    pub timeout_secs: Option<u64>,
    pub model: Option<String>,
}

impl Default for CommitMessageSettings {
    fn default() -> Self {
        Self {
            family: AgentFamily::Cursor,
            timeout_secs: Some(120),
            model: None,
        }
    }
}

impl CommitMessageSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub cursor_path: String,
    pub claude_path: String,
    /// Program emitting synthetic records. Empty means the daemon's own
    /// `synthetic-agent` subcommand.
    pub synthetic_path: String,
    pub synthetic_args: Vec<String>,
    /// Let HTTP callers pick the synthetic binary and its arguments. Anyone
    /// who can reach the server can then run any program.
    pub allow_binary_override: bool,
    pub default_model: Option<String>,
    /// Run agents through this shell (e.g. "/bin/zsh -l -c").
    pub shell_prefix: Option<String>,
    /// Let cursor-agent write files and run commands without approval.
    pub cursor_force: bool,
    pub claude_permission_mode: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub kill_grace_ms: u64,
    pub abort_on_disconnect: bool,
    pub admission: Admission,
    pub retention_secs: u64,
    pub max_sessions: usize,
    pub commit_message: CommitMessageSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cursor_path: "cursor-agent".to_string(),
            claude_path: "claude".to_string(),
            synthetic_path: String::new(),
            synthetic_args: Vec::new(),
            allow_binary_override: false,
            default_model: None,
            shell_prefix: None,
            cursor_force: false,
            claude_permission_mode: None,
            log_dir: None,
            kill_grace_ms: 3_000,
            abort_on_disconnect: false,
            admission: Admission::Concurrent,
            retention_secs: 60 * 60,
            max_sessions: 100,
            commit_message: CommitMessageSettings::default(),
        }
    }
}

/// A request to run one agent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentRequest {
    pub family: Option<AgentFamily>,
    pub prompt: String,
    pub working_dir: String,
    pub model: Option<String>,
    /// Overrides the configured binary (synthetic runs in tests and demos).
    pub binary_path: Option<String>,
    /// Replaces the configured synthetic arguments.
    pub args: Option<Vec<String>>,
}

impl BridgeConfig {
    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match paths::default_config_path() {
                Some(path) => path,
                None => {
                    log::debug!("No home directory; using default config");
                    return Ok(Self::default());
                }
            },
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            admission: self.admission,
            retention: Duration::from_secs(self.retention_secs),
            max_sessions: self.max_sessions,
            log_dir: self.log_dir.clone(),
        }
    }

    /// Build the command line for one run. The family defaults to the
    /// commit-message family when the request leaves it out.
    pub fn invocation(&self, request: AgentRequest) -> Invocation {
        let family = request.family.unwrap_or(self.commit_message.family);
        let model = request
            .model
            .filter(|m| !m.is_empty())
            .or_else(|| self.default_model.clone());

        let spawn = match family {
            AgentFamily::Cursor => CursorConfig {
                binary_path: request.binary_path.unwrap_or_else(|| self.cursor_path.clone()),
                working_dir: request.working_dir,
                prompt: request.prompt,
                model,
                force: self.cursor_force,
                shell_prefix: self.shell_prefix.clone(),
            }
            .build(),
            AgentFamily::Claude => ClaudeConfig {
                binary_path: request.binary_path.unwrap_or_else(|| self.claude_path.clone()),
                working_dir: request.working_dir,
                prompt: request.prompt,
                model,
                permission_mode: self.claude_permission_mode.clone(),
                shell_prefix: self.shell_prefix.clone(),
            }
            .build(),
            AgentFamily::Synthetic => SyntheticConfig {
                binary_path: request
                    .binary_path
                    .unwrap_or_else(|| self.synthetic_path.clone()),
                args: request.args.unwrap_or_else(|| self.synthetic_args.clone()),
                working_dir: request.working_dir,
                prompt: request.prompt,
            }
            .build(),
        };

        Invocation::new(family, spawn.kill_grace(self.kill_grace()))
    }
}
