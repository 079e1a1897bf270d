//! Interactive terminal chat with a local Ollama model.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! deltastrik
//!
//! # Talk to another model on another host
//! deltastrik --model llama3 --endpoint http://10.0.0.5:11434
//!
//! # Keep the conversation across runs
//! deltastrik --session ~/.deltastrik/session.json
//!
//! # Disable colors (useful for piping output)
//! deltastrik --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/init` - Reset the conversation and reload the persona
//! - `/clear` - Clear conversation history
//! - `/compact [notes]` - Summarize the history into one message
//! - `/save <file>`, `/load <file>` - Snapshot the session
//! - `/stats` - Show session statistics
//! - `/exit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use deltastrik::chat::{
    ChatArgs, ChatConfig, CommandContext, PlainTextRenderer, Renderer, Session, SessionEvent,
    ShutdownFlag, dispatch,
};
use deltastrik::{
    ChatLogger, FileLogger, LogLevel, NullLogger, OllamaClient, PromptBuilder, is_error_marker,
};

/// How often the progress line is redrawn while waiting for a reply.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(120);

/// Main entry point for the deltastrik application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("deltastrik [OPTIONS]");
    let config = Arc::new(ChatConfig::resolve(args)?);

    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let logger = open_logger(&config, &mut renderer);
    logger.log_event(LogLevel::Info, "main", "DeltaStrik session started.");

    let client = Arc::new(OllamaClient::with_logger(&config, logger.clone())?);
    let prompts = PromptBuilder::with_logger(&config, logger.clone());
    let mut system_prompt = prompts.build(None);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(config.clone()).with_events(events_tx);
    if let Some(path) = config.session_file.as_deref() {
        if path.exists() {
            match session.load_from(path) {
                Ok(()) => renderer.print_info(&format!(
                    "Restored {} messages from {}",
                    session.len(),
                    path.display()
                )),
                Err(err) => renderer.print_error(&format!("Failed to restore session: {err}")),
            }
        }
    }

    let shutdown = ShutdownFlag::new();
    let mut rl = DefaultEditor::new()?;

    // Flag raised by Ctrl+C while waiting on the backend
    let interrupted = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("DeltaStrik (model: {} at {})", config.model, config.endpoint);
    println!("Type /help for commands, /exit to quit\n");

    while !shutdown.is_requested() {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let line = match rl.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nExiting DeltaStrik...");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        // Commands are awaited like chat turns since `/compact` calls the backend.
        let status = with_progress(
            dispatch(CommandContext {
                input: line,
                session: &mut session,
                backend: client.as_ref(),
                prompts: &prompts,
                system_prompt: &mut system_prompt,
                shutdown: &shutdown,
                logger: logger.as_ref(),
            }),
            &mut renderer,
            &interrupted,
            config.timeout_secs,
        )
        .await;
        if let Some(status) = status {
            renderer.print_status(&status);
            drain_events(&mut events_rx, logger.as_ref());
            continue;
        }

        // Regular message - send to the backend
        let start = Instant::now();
        let reply = with_progress(
            session.exchange(client.clone(), &system_prompt, line),
            &mut renderer,
            &interrupted,
            config.timeout_secs,
        )
        .await;
        renderer.print_reply(&reply);
        if !is_error_marker(&reply) {
            renderer.print_latency(start.elapsed());
        }
        drain_events(&mut events_rx, logger.as_ref());
    }

    if let Some(path) = config.session_file.as_deref() {
        match session.save_to(path) {
            Ok(()) => logger.log_event(
                LogLevel::Info,
                "main",
                &format!("session saved to {}", path.display()),
            ),
            Err(err) => renderer.print_error(&format!("Failed to save session: {err}")),
        }
    }
    logger.log_event(LogLevel::Info, "main", "DeltaStrik session ended.");
    Ok(())
}

/// Drive `work` to completion while redrawing a progress line.
///
/// Backend requests run until they complete or time out; Ctrl+C only prints a
/// notice. Work that finishes before the first interval shows nothing.
async fn with_progress<F: Future>(
    work: F,
    renderer: &mut dyn Renderer,
    interrupted: &AtomicBool,
    timeout_secs: u64,
) -> F::Output {
    tokio::pin!(work);
    let start = Instant::now();
    let first = tokio::time::Instant::now() + PROGRESS_INTERVAL;
    let mut ticker = tokio::time::interval_at(first, PROGRESS_INTERVAL);
    let mut tick = 0;
    let output = loop {
        tokio::select! {
            output = &mut work => break output,
            _ = ticker.tick() => {
                if interrupted.swap(false, Ordering::Relaxed) {
                    renderer.print_info(&format!(
                        "Waiting for the backend (gives up after {timeout_secs}s)..."
                    ));
                }
                renderer.print_progress(tick, start.elapsed());
                tick += 1;
            }
        }
    };
    renderer.clear_progress();
    output
}

/// Open the daily log file, or fall back to discarding logs.
fn open_logger(config: &ChatConfig, renderer: &mut dyn Renderer) -> Arc<dyn ChatLogger> {
    let Some(dir) = config.log_dir.as_deref() else {
        return Arc::new(NullLogger);
    };
    let level = if config.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    match FileLogger::open(dir, level) {
        Ok(logger) => Arc::new(logger),
        Err(err) => {
            renderer.print_error(&format!("Logging disabled: {err}"));
            Arc::new(NullLogger)
        }
    }
}

fn drain_events(events: &mut mpsc::UnboundedReceiver<SessionEvent>, logger: &dyn ChatLogger) {
    while let Ok(event) = events.try_recv() {
        logger.log_event(LogLevel::Debug, "session", &format!("{event:?}"));
    }
}
