use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use conduit_core::agents::synthetic::{render_run, StepPlan};
use conduit_core::drivers::CommitMessageDriver;
use conduit_core::stream::WriterTransport;
use conduit_core::{
    AgentFamily, AgentRequest, BridgeConfig, EmitOutcome, EventKind, SessionManager, StreamEmitter,
};
use conduit_http::SharedState;
use tokio::io::AsyncWriteExt;

type CommandResult = Result<ExitCode, Box<dyn Error>>;

/// Extra time on top of the kill grace for processes to be reaped.
const REAP_SLACK: Duration = Duration::from_secs(2);

pub async fn serve(config: BridgeConfig, host: &str, port: u16) -> CommandResult {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| format!("Invalid address {}:{}: {}", host, port, e))?;

    let grace = config.kill_grace() + REAP_SLACK;
    let manager = Arc::new(SessionManager::new(config.session_policy()));
    let state = Arc::new(SharedState::with_manager(Arc::clone(&manager), config));

    conduit_http::serve(state, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    let aborted = manager.shutdown(grace).await;
    if aborted > 0 {
        log::info!("Aborted {} running session(s)", aborted);
    }
    Ok(ExitCode::SUCCESS)
}

/// Run one agent in the foreground, writing SSE frames to stdout.
pub async fn run(
    config: BridgeConfig,
    family: AgentFamily,
    prompt: String,
    dir: Option<PathBuf>,
    model: Option<String>,
) -> CommandResult {
    let succeeded = run_agent(config, family, prompt, dir, model).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// True when every frame was written and the agent finished with Done.
async fn run_agent(
    config: BridgeConfig,
    family: AgentFamily,
    prompt: String,
    dir: Option<PathBuf>,
    model: Option<String>,
) -> Result<bool, Box<dyn Error>> {
    let working_dir = dir
        .map(|d| d.to_string_lossy().into_owned())
        .unwrap_or_default();
    let grace = config.kill_grace() + REAP_SLACK;
    let emitter = StreamEmitter::new(config.abort_on_disconnect);
    let manager = SessionManager::new(config.session_policy());

    let session = manager.create_session(config.invocation(AgentRequest {
        family: Some(family),
        prompt,
        working_dir,
        model,
        ..AgentRequest::default()
    }))?;

    // The agent leads its own process group and never sees the terminal's
    // interrupt, so forward it.
    let interrupt = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                session.abort();
            }
        })
    };

    let mut transport = WriterTransport::new(tokio::io::stdout());
    let outcome = emitter.pump(session.subscribe(0), &mut transport).await;
    interrupt.abort();
    manager.shutdown(grace).await;

    let succeeded = matches!(
        session.terminal_event().map(|event| event.kind),
        Some(EventKind::Done { .. })
    );
    Ok(outcome == EmitOutcome::Completed && succeeded)
}

pub async fn commit_message(config: BridgeConfig, dir: Option<PathBuf>) -> CommandResult {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let manager = Arc::new(SessionManager::new(config.session_policy()));
    let driver = CommitMessageDriver::new(manager, Arc::new(config));

    let message = driver.generate(&dir).await?;
    println!("{}", message);
    Ok(ExitCode::SUCCESS)
}

/// Print the standard synthetic run, one record per `delay_ms`.
pub async fn synthetic_agent(delay_ms: u64, prompt: &str) -> ExitCode {
    let output = if prompt.trim().is_empty() {
        "Synthetic run complete".to_string()
    } else {
        format!("Synthetic run complete: {}", prompt.trim())
    };
    let script = render_run(&StepPlan::standard(), &output);

    let mut stdout = tokio::io::stdout();
    for (i, line) in script.lines().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        };
        if written.await.is_err() {
            // Reader went away; the bridge aborted us.
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
