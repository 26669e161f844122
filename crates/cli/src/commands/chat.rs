//! `toolchat chat`: Interactive or single-message chat mode.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tokio::sync::broadcast;
use toolchat_agent::{AgentLoop, AgentReply, CancellationToken, ChatSession, StopHandle};
use toolchat_core::event::{DomainEvent, EventBus};
use toolchat_core::frontend::Frontend;

use crate::ChatArgs;
use crate::terminal::{Command, TerminalFrontend, parse_command};

pub async fn run(config_path: Option<&Path>, args: ChatArgs) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(max) = args.max_iterations {
        config.agent.max_tool_iterations = max;
        config.validate()?;
    }

    // Check for API key early to give a clear error
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TOGETHER_API_KEY=...   (default provider)");
        eprintln!("    OPENAI_API_KEY=...     (for OpenAI direct)");
        eprintln!("    TOOLCHAT_API_KEY=...   (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", super::config_file(config_path).display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let router = toolchat_providers::build_from_config(&config);
    let provider = router
        .default_provider()
        .context("No default provider configured")?;
    let tools = Arc::new(toolchat_tools::default_registry()?);
    let event_bus = Arc::new(EventBus::default());
    tokio::spawn(log_events(event_bus.subscribe()));

    let agent = AgentLoop::from_config(&config, provider, tools.clone(), event_bus);
    let mut session = ChatSession::new(Arc::new(agent));
    let mut frontend = TerminalFrontend::new();
    let quit = CancellationToken::new();
    watch_ctrl_c(session.stop_handle(), quit.clone());

    if let Some(path) = &args.import {
        frontend.queue_snapshot(read_snapshot(path)?);
    }

    let mut outcome = Ok(());
    if let Some(message) = args.message {
        // Single message mode
        frontend.queue_text(message);
        outcome = answer_once(&mut session, &mut frontend).await.map(|_| ());
    } else {
        // Interactive mode
        println!();
        println!("  {}", "toolchat interactive mode".bold());
        println!();
        println!("  Provider:  {}", config.default_provider);
        println!("  Model:     {}", config.default_model);
        println!("  Tools:     {}", tools.names().join(", "));
        println!();
        println!("  Type your message and press Enter. Ctrl+C stops a response.");
        println!("  Commands: /import <file>, /export [file], /history, /exit");
        println!();

        if args.import.is_some() {
            session.run_turn(&mut frontend).await;
        }
        interactive(&mut session, &mut frontend, &quit).await?;

        println!();
        println!("  Goodbye!");
        println!();
    }

    if let Some(path) = &args.export {
        write_export(&session, path)?;
    }

    if quit.is_cancelled() {
        // The blocking stdin reader would keep the runtime alive until Enter.
        std::process::exit(0);
    }

    outcome
}

/// Run one turn and fail when it produced no answer.
///
/// The frontend has already shown the reason; the error sets the exit status.
async fn answer_once<F>(session: &mut ChatSession, frontend: &mut F) -> anyhow::Result<AgentReply>
where
    F: Frontend + ?Sized,
{
    session
        .run_turn(frontend)
        .await
        .context("The assistant did not answer")
}

async fn interactive(
    session: &mut ChatSession,
    frontend: &mut TerminalFrontend,
    quit: &CancellationToken,
) -> anyhow::Result<()> {
    while let Some(line) = until_quit(quit, frontend.read_line()).await {
        let Some(line) = line? else { break };
        match parse_command(&line) {
            Command::Empty => {}
            Command::Exit => break,
            Command::Say(text) => {
                frontend.queue_text(text);
                session.run_turn(frontend).await;
            }
            Command::History => {
                frontend.set_show_human(true);
                for turn in session.display_turns() {
                    frontend.render(turn).await;
                }
            }
            Command::Import(path) => match read_snapshot(&path) {
                Ok(snapshot) => {
                    frontend.queue_snapshot(snapshot);
                    session.run_turn(frontend).await;
                    frontend.notice(&format!("{} turns in conversation", session.log().len()));
                }
                Err(e) => frontend.report_error(&format!("{e:#}")).await,
            },
            Command::Export(path) => {
                let path = path.unwrap_or_else(|| {
                    PathBuf::from(ChatSession::export_file_name(chrono::Utc::now()))
                });
                match write_export(session, &path) {
                    Ok(()) => frontend.notice(&format!("Saved to {}", path.display())),
                    Err(e) => frontend.report_error(&format!("{e:#}")).await,
                }
            }
            Command::Unknown(cmd) => {
                frontend.report_error(&format!("Unknown command: {cmd}")).await;
            }
        }
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_export(session: &ChatSession, path: &Path) -> anyhow::Result<()> {
    let json = session.export_json()?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Ctrl-C stops the response in flight; with nothing in flight it quits.
fn watch_ctrl_c(handle: StopHandle, quit: CancellationToken) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt(&handle, &quit);
        }
    });
}

fn on_interrupt(handle: &StopHandle, quit: &CancellationToken) {
    if !handle.stop() {
        println!();
        quit.cancel();
    }
}

/// Await `fut` unless `quit` fires first.
async fn until_quit<T>(quit: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = quit.cancelled() => None,
        value = fut => Some(value),
    }
}

async fn log_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::debug!(event = ?event, "Domain event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
