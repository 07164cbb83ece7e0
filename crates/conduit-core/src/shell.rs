//! Command construction for agent processes.
//!
//! Agents are normally exec'd directly. When a shell prefix is configured
//! (for example `/bin/zsh -l -c`), the command is quoted into a single string
//! and run through that shell so the user's login PATH applies.

use std::process::Command;

use serde::Serialize;

use crate::spawn::SpawnError;

/// Exit status observed when an agent process terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl AgentExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => "unknown exit status".to_string(),
        }
    }
}

impl From<std::process::ExitStatus> for AgentExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Quote a binary and its arguments into one shell-safe string.
///
/// Used both for debug logging and for the login-shell wrapper.
pub fn quote_command(binary_path: &str, args: &[String]) -> Result<String, SpawnError> {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(
        shlex::try_quote(binary_path)
            .map_err(|_| SpawnError::InvalidCommand(format!("invalid path: {binary_path}")))?
            .into_owned(),
    );
    for arg in args {
        parts.push(
            shlex::try_quote(arg)
                .map_err(|_| SpawnError::InvalidCommand(format!("invalid argument: {arg}")))?
                .into_owned(),
        );
    }
    Ok(parts.join(" "))
}

/// Prepend the binary's parent directory to PATH so node and friends are found.
pub fn prepare_path_env(cmd: &mut Command, binary_path: &str) {
    if !binary_path.contains('/') {
        return;
    }
    if let Some(dir) = std::path::Path::new(binary_path).parent().and_then(|d| d.to_str()) {
        let existing = std::env::var("PATH").unwrap_or_default();
        let combined = if existing.is_empty() {
            dir.to_string()
        } else {
            format!("{dir}:{existing}")
        };
        cmd.env("PATH", combined);
    }
}

/// Build a command that execs the binary directly.
pub fn build_direct_command(binary_path: &str, args: &[String], working_dir: Option<&str>) -> Command {
    let mut cmd = Command::new(binary_path);
    cmd.args(args);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    prepare_path_env(&mut cmd, binary_path);
    cmd
}

/// Build a command that runs the binary inside a shell.
///
/// The final form is `<prefix> '<quoted command>'`. An empty prefix falls
/// back to `$SHELL -l -c`.
#[cfg(unix)]
pub fn build_login_shell_command(
    binary_path: &str,
    args: &[String],
    working_dir: Option<&str>,
    shell_prefix: Option<&str>,
) -> Result<Command, SpawnError> {
    let prefix = get_shell_prefix(shell_prefix);
    let mut prefix_parts = prefix.split_whitespace();
    let shell_program = prefix_parts
        .next()
        .ok_or_else(|| SpawnError::InvalidCommand("empty shell prefix".to_string()))?;

    let mut cmd = Command::new(shell_program);
    cmd.args(prefix_parts).arg(quote_command(binary_path, args)?);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    prepare_path_env(&mut cmd, binary_path);
    Ok(cmd)
}

/// Login shells have no meaning on Windows; exec directly.
#[cfg(windows)]
pub fn build_login_shell_command(
    binary_path: &str,
    args: &[String],
    working_dir: Option<&str>,
    _shell_prefix: Option<&str>,
) -> Result<Command, SpawnError> {
    Ok(build_direct_command(binary_path, args, working_dir))
}

#[cfg(unix)]
fn get_shell_prefix(custom_prefix: Option<&str>) -> String {
    if let Some(prefix) = custom_prefix {
        if !prefix.trim().is_empty() {
            return prefix.to_string();
        }
    }

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let shell_name = std::path::Path::new(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    // These do not accept `-l -c` the POSIX way.
    let non_posix = ["fish", "nu", "nushell", "elvish", "xonsh", "ion"];
    let effective_shell = if non_posix.contains(&shell_name) {
        if std::path::Path::new("/bin/bash").exists() {
            "/bin/bash"
        } else {
            "/bin/sh"
        }
    } else {
        &shell
    };

    format!("{effective_shell} -l -c")
}
