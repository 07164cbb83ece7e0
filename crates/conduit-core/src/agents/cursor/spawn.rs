//! cursor-agent spawn configuration.

use crate::spawn::{push_option, SpawnConfig};

/// Configuration options for spawning cursor-agent in print mode.
#[derive(Debug, Clone, Default)]
pub struct CursorConfig {
    pub binary_path: String,
    pub working_dir: String,
    pub prompt: String,
    pub model: Option<String>,
    /// Allow file writes and shell commands without interactive approval.
    pub force: bool,
    pub shell_prefix: Option<String>,
}

impl CursorConfig {
    pub fn build(self) -> SpawnConfig {
        let mut args: Vec<String> = ["--print", "--output-format", "stream-json"]
            .map(String::from)
            .into();
        push_option(&mut args, "--model", self.model.as_deref());
        if self.force {
            args.push("--force".to_string());
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_config_builds_correct_args() {
        let config = CursorConfig {
            binary_path: "/usr/local/bin/cursor-agent".to_string(),
            working_dir: "/tmp".to_string(),
            prompt: "Summarize @diff.txt".to_string(),
            model: Some("gpt-5".to_string()),
            force: true,
            shell_prefix: None,
        };

        let spawn = config.build();
        assert_eq!(spawn.binary_path, "/usr/local/bin/cursor-agent");
        assert_eq!(
            spawn.args,
            vec![
                "--print",
                "--output-format",
                "stream-json",
                "--model",
                "gpt-5",
                "--force",
                "--",
                "Summarize @diff.txt"
            ]
        );
        assert_eq!(spawn.working_dir.as_deref(), Some("/tmp"));
        assert!(spawn.shell_prefix.is_none());
    }

    #[test]
    fn empty_model_is_omitted() {
        let config = CursorConfig {
            binary_path: "cursor-agent".to_string(),
            model: Some(String::new()),
            prompt: "hi".to_string(),
            ..Default::default()
        };
        let spawn = config.build();
        assert!(!spawn.args.contains(&"--model".to_string()));
        assert_eq!(spawn.args.last().map(String::as_str), Some("hi"));
    }

    #[test]
    fn dash_prompt_follows_separator() {
        let config = CursorConfig {
            binary_path: "cursor-agent".to_string(),
            prompt: "--help me".to_string(),
            ..Default::default()
        };
        let spawn = config.build();
        assert_eq!(&spawn.args[spawn.args.len() - 2..], ["--", "--help me"]);
    }
}
