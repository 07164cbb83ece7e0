//! Agent process spawning and lifecycle.
//!
//! [`AgentProcess`] owns the OS child handle exclusively. Spawning hands back
//! the stdout and stderr pipes separately as a [`ProcessOutput`]; the caller
//! must drain both concurrently, since the runner itself never buffers.
//!
//! Stopping follows the graceful-then-forceful pattern: interrupt, wait up to
//! the grace period, then kill. On Unix the child leads its own process
//! group and signals go to the whole group, so helpers the agent started
//! (a wrapper shell, `node`, a tool subprocess) die with it and the pipes
//! close.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::shell::{build_direct_command, build_login_shell_command, quote_command, AgentExit};

/// Default wait between interrupt and kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("agent executable not found: {0}")]
    NotFound(String),

    #[error("permission denied running {0}")]
    PermissionDenied(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("failed to spawn {binary}: {source}")]
    Io {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to capture {0} of agent process")]
    Pipe(&'static str),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to wait for agent process: {0}")]
    Wait(#[from] std::io::Error),
}

/// Signals the runner can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Interrupt,
    Kill,
}

impl ProcessSignal {
    #[cfg(unix)]
    fn as_raw(self) -> libc::c_int {
        match self {
            ProcessSignal::Interrupt => libc::SIGINT,
            ProcessSignal::Kill => libc::SIGKILL,
        }
    }
}

/// Configuration for spawning an agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Path to the agent binary
    pub binary_path: String,
    /// Arguments to pass to the binary
    pub args: Vec<String>,
    /// Working directory for the process
    pub working_dir: Option<String>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Run through this shell (e.g., "/bin/zsh -l -c") instead of exec'ing directly
    pub shell_prefix: Option<String>,
    /// How long `terminate` waits after the interrupt before killing
    pub kill_grace: Duration,
}

impl SpawnConfig {
    /// Create a new spawn config with required fields.
    pub fn new(binary_path: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            args,
            working_dir: None,
            env: HashMap::new(),
            shell_prefix: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Set the working directory. An empty string leaves it unset.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        self.working_dir = (!dir.is_empty()).then_some(dir);
        self
    }

    /// Set a custom shell prefix.
    pub fn shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Shell-quoted command line, for logs.
    pub fn display(&self) -> String {
        quote_command(&self.binary_path, &self.args)
            .unwrap_or_else(|_| format!("{} {:?}", self.binary_path, self.args))
    }
}

/// Append `flag value` when `value` is set and non-empty.
pub(crate) fn push_option(args: &mut Vec<String>, flag: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

/// The two output pipes of a freshly spawned process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// A running agent process.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    binary: String,
    kill_grace: Duration,
}

impl AgentProcess {
    /// Spawn the process described by `config`.
    ///
    /// Stdin is closed; agents receive their prompt as an argument.
    pub fn spawn(config: SpawnConfig) -> Result<(Self, ProcessOutput), SpawnError> {
        let std_cmd = match config.shell_prefix.as_deref() {
            Some(prefix) => build_login_shell_command(
                &config.binary_path,
                &config.args,
                config.working_dir.as_deref(),
                Some(prefix),
            )?,
            None => build_direct_command(
                &config.binary_path,
                &config.args,
                config.working_dir.as_deref(),
            ),
        };

        let mut cmd = Command::from(std_cmd);
        cmd.envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        log::debug!("Spawning agent: {}", config.display());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => SpawnError::NotFound(config.binary_path.clone()),
            ErrorKind::PermissionDenied => SpawnError::PermissionDenied(config.binary_path.clone()),
            _ => SpawnError::Io {
                binary: config.binary_path.clone(),
                source: e,
            },
        })?;

        let stdout = child.stdout.take().ok_or(SpawnError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SpawnError::Pipe("stderr"))?;

        log::info!(
            "Agent process started (pid {:?}): {}",
            child.id(),
            config.binary_path
        );

        Ok((
            Self {
                child,
                binary: config.binary_path,
                kill_grace: config.kill_grace,
            },
            ProcessOutput { stdout, stderr },
        ))
    }

    /// OS process id, until the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<AgentExit, ProcessError> {
        let status = self.child.wait().await?;
        Ok(AgentExit::from(status))
    }

    /// Deliver a signal to the process (and its group on Unix).
    ///
    /// Returns false when the process was already reaped or the signal could
    /// not be sent.
    pub fn signal(&mut self, signal: ProcessSignal) -> bool {
        let Some(pid) = self.child.id() else {
            return false;
        };

        #[cfg(unix)]
        {
            // Negative pid: the whole group led by the child.
            let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal.as_raw()) };
            if rc != 0 {
                log::debug!("Failed to signal process group {pid}: {}", std::io::Error::last_os_error());
                return false;
            }
            true
        }

        #[cfg(not(unix))]
        {
            // No signals here; every kind is a kill.
            let _ = (pid, signal);
            self.child.start_kill().is_ok()
        }
    }

    /// Stop the process: interrupt, wait up to `grace`, then kill.
    pub async fn terminate(&mut self, grace: Duration) -> Result<AgentExit, ProcessError> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(AgentExit::from(status));
        }

        self.signal(ProcessSignal::Interrupt);
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(AgentExit::from(status?)),
            Err(_) => {
                log::warn!(
                    "{} did not exit within {:?} of interrupt, killing",
                    self.binary,
                    grace
                );
                self.signal(ProcessSignal::Kill);
                // Covers the case where the group signal failed.
                let _ = self.child.start_kill();
                let status = self.child.wait().await?;
                Ok(AgentExit::from(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn sh(script: &str) -> SpawnConfig {
        SpawnConfig::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
    }

    mod config {
        use super::*;

        #[test]
        fn builder_sets_fields() {
            let config = SpawnConfig::new("/usr/bin/echo", vec!["hello".to_string()])
                .working_dir("/tmp")
                .shell_prefix("/bin/bash -c")
                .env("FOO", "bar")
                .kill_grace(Duration::from_millis(200));

            assert_eq!(config.binary_path, "/usr/bin/echo");
            assert_eq!(config.args, vec!["hello"]);
            assert_eq!(config.working_dir.as_deref(), Some("/tmp"));
            assert_eq!(config.shell_prefix.as_deref(), Some("/bin/bash -c"));
            assert_eq!(config.env.get("FOO").map(String::as_str), Some("bar"));
            assert_eq!(config.kill_grace, Duration::from_millis(200));
        }

        #[test]
        fn empty_working_dir_is_ignored() {
            let config = SpawnConfig::new("agent", vec![]).working_dir("");
            assert!(config.working_dir.is_none());
        }

        #[test]
        fn display_quotes_arguments() {
            let config = sh("echo hi");
            assert_eq!(config.display(), "/bin/sh -c 'echo hi'");
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        #[tokio::test]
        async fn missing_executable_is_not_found() {
            let result = AgentProcess::spawn(SpawnConfig::new(
                "/definitely/not/a/real/agent",
                vec![],
            ));
            match result {
                Err(SpawnError::NotFound(path)) => assert_eq!(path, "/definitely/not/a/real/agent"),
                other => panic!("Expected NotFound, got {:?}", other.map(|_| ())),
            }
        }

        #[tokio::test]
        async fn captures_stdout_and_exit_code() {
            let (mut process, mut output) =
                AgentProcess::spawn(sh("echo hello; echo oops >&2; exit 3")).unwrap();

            let mut stdout = String::new();
            let mut stderr = String::new();
            let (a, b) = tokio::join!(
                output.stdout.read_to_string(&mut stdout),
                output.stderr.read_to_string(&mut stderr)
            );
            a.unwrap();
            b.unwrap();

            let exit = process.wait().await.unwrap();
            assert_eq!(stdout, "hello\n");
            assert_eq!(stderr, "oops\n");
            assert_eq!(exit.code, Some(3));
        }

        #[tokio::test]
        async fn env_and_working_dir_apply() {
            let dir = tempfile::tempdir().unwrap();
            let config = sh("printf '%s %s' \"$CONDUIT_TEST\" \"$(pwd)\"")
                .env("CONDUIT_TEST", "yes")
                .working_dir(dir.path().to_string_lossy());
            let (mut process, mut output) = AgentProcess::spawn(config).unwrap();

            let mut stdout = String::new();
            output.stdout.read_to_string(&mut stdout).await.unwrap();
            process.wait().await.unwrap();

            let canonical = dir.path().canonicalize().unwrap();
            assert!(stdout.starts_with("yes "));
            assert!(stdout.ends_with(canonical.to_string_lossy().as_ref()));
        }

        #[tokio::test]
        async fn terminate_interrupts_process_group() {
            let (mut process, mut output) = AgentProcess::spawn(sh("sleep 30; echo late")).unwrap();

            let exit = process
                .terminate(Duration::from_secs(2))
                .await
                .unwrap();
            assert!(!exit.success());

            // The sleeping grandchild died with the group, so the pipe closes.
            let mut stdout = String::new();
            tokio::time::timeout(
                Duration::from_secs(5),
                output.stdout.read_to_string(&mut stdout),
            )
            .await
            .expect("stdout should close once the group is gone")
            .unwrap();
            assert!(stdout.is_empty());
        }

        #[tokio::test]
        async fn terminate_escalates_to_kill() {
            let (mut process, _output) =
                AgentProcess::spawn(sh("trap '' INT; sleep 30")).unwrap();
            // Let the shell install its trap.
            tokio::time::sleep(Duration::from_millis(200)).await;

            let exit = process
                .terminate(Duration::from_millis(300))
                .await
                .unwrap();
            assert_eq!(exit.signal, Some(libc::SIGKILL));
        }

        #[tokio::test]
        async fn signal_after_exit_is_noop() {
            let (mut process, _output) = AgentProcess::spawn(sh("exit 0")).unwrap();
            process.wait().await.unwrap();
            assert!(!process.signal(ProcessSignal::Interrupt));

            let exit = process.terminate(Duration::from_millis(100)).await.unwrap();
            assert!(exit.success());
        }
    }
}
