//! Conduit daemon: serves the bridge over HTTP or runs one agent from the
//! command line.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use conduit_core::session::Admission;
use conduit_core::{AgentFamily, BridgeConfig};

#[derive(Parser)]
#[command(name = "conduit-daemon")]
#[command(about = "Bridge between coding-agent CLIs and streaming clients")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/conduit/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write per-session transcripts into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST + SSE API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value_t = 7433)]
        port: u16,

        /// Abort a session when its stream client disconnects
        #[arg(long)]
        abort_on_disconnect: bool,

        /// Abort live sessions whenever a new one starts
        #[arg(long)]
        single_flight: bool,
    },

    /// Run one agent and print its events as SSE frames on stdout
    Run {
        /// cursor, claude or synthetic
        family: AgentFamily,

        prompt: String,

        /// Working directory for the agent
        #[arg(short = 'C', long)]
        dir: Option<PathBuf>,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate a commit message for the staged changes
    CommitMessage {
        /// Repository directory (defaults to the current directory)
        dir: Option<PathBuf>,
    },

    /// Emit a scripted run of synthetic records
    #[command(hide = true)]
    SyntheticAgent {
        /// Pause between records
        #[arg(long, default_value_t = 150)]
        delay_ms: u64,

        prompt: Option<String>,
    },
}

/// Load the config file and lay command-line flags over it.
fn load_config(cli: &Cli) -> Result<BridgeConfig, conduit_core::config::ConfigError> {
    let mut config = BridgeConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    if let Command::Serve {
        abort_on_disconnect,
        single_flight,
        ..
    } = &cli.command
    {
        config.abort_on_disconnect |= *abort_on_disconnect;
        if *single_flight {
            config.admission = Admission::SingleFlight;
        }
    }
    use_builtin_synthetic_agent(&mut config);
    Ok(config)
}

/// With no synthetic program configured, run this binary's own
/// `synthetic-agent` subcommand.
fn use_builtin_synthetic_agent(config: &mut BridgeConfig) {
    if !config.synthetic_path.is_empty() {
        return;
    }
    match std::env::current_exe() {
        Ok(exe) => {
            config.synthetic_path = exe.to_string_lossy().into_owned();
            config.synthetic_args = vec!["synthetic-agent".to_string()];
        }
        Err(e) => log::warn!("Cannot locate own executable for synthetic runs: {}", e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // The scripted agent needs no config.
    if let Command::SyntheticAgent { delay_ms, prompt } = &cli.command {
        return commands::synthetic_agent(*delay_ms, prompt.as_deref().unwrap_or_default()).await;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Serve { host, port, .. } => commands::serve(config, &host, port).await,
        Command::Run {
            family,
            prompt,
            dir,
            model,
        } => commands::run(config, family, prompt, dir, model).await,
        Command::CommitMessage { dir } => commands::commit_message(config, dir).await,
        Command::SyntheticAgent { .. } => Ok(ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
