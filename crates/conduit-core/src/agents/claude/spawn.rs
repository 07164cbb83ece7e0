//! Claude agent spawn configuration.

use crate::spawn::{push_option, SpawnConfig};

/// Configuration options for spawning Claude in non-interactive print mode.
#[derive(Debug, Clone, Default)]
pub struct ClaudeConfig {
    pub binary_path: String,
    pub working_dir: String,
    pub prompt: String,
    pub model: Option<String>,
    pub permission_mode: Option<String>,
    pub shell_prefix: Option<String>,
}

impl ClaudeConfig {
    /// Print mode with streamed JSON; `--verbose` is required for
    /// stream-json output in print mode.
    pub fn build(self) -> SpawnConfig {
        let mut args: Vec<String> = ["--print", "--output-format", "stream-json", "--verbose"]
            .map(String::from)
            .into();
        push_option(&mut args, "--model", self.model.as_deref());
        push_option(&mut args, "--permission-mode", self.permission_mode.as_deref());

        // Everything after `--` is the prompt, even if it starts with a dash.
        args.push("--".to_string());
        args.push(self.prompt);

        let config = SpawnConfig::new(self.binary_path, args).working_dir(self.working_dir);
        match self.shell_prefix {
            Some(shell) => config.shell_prefix(shell),
            None => config,
        }
    }
}
