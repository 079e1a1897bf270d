//! Slash command parsing and dispatch for the chat application.
//!
//! Commands start with `/` and control the session without being sent to
//! the backend. The bare words `exit` and `quit` are accepted as well.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::chat::session::Session;
use crate::client::Backend;
use crate::logger::{ChatLogger, LogLevel};
use crate::observability::{COMMANDS_DISPATCHED, COMMANDS_UNKNOWN};
use crate::prompt::PromptBuilder;
use crate::utils::time::format_rfc3339;

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Clear the history and rebuild the system prompt.
    Init,

    /// Clear the conversation history.
    Clear,

    /// Exit the chat application.
    Exit,

    /// Summarize the history into a single message, with optional extra
    /// instructions for the summarizer.
    Compact(Option<String>),

    /// Save the session snapshot to a file.
    Save(String),

    /// Replace the session from a snapshot file.
    Load(String),

    /// Display session statistics.
    Stats,

    /// A known command used incorrectly; carries the message to show.
    Invalid(String),

    /// An unrecognized command; carries the offending token.
    Unknown(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use deltastrik::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Exit));
/// assert_eq!(parse_command("/compact keep code"), Some(ChatCommand::Compact(Some("keep code".to_string()))));
/// assert!(parse_command("Hello there").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
        return Some(ChatCommand::Exit);
    }
    if !input.starts_with('/') {
        return None;
    }

    let mut tokens = input.split_whitespace();
    let command = tokens.next()?.to_lowercase();
    let args: Vec<&str> = tokens.collect();

    let result = match command.as_str() {
        "/help" | "/?" => ChatCommand::Help,
        "/init" => ChatCommand::Init,
        "/clear" => ChatCommand::Clear,
        "/exit" | "/quit" => ChatCommand::Exit,
        "/compact" => {
            if args.is_empty() {
                ChatCommand::Compact(None)
            } else {
                ChatCommand::Compact(Some(args.join(" ")))
            }
        }
        "/save" | "/load" if args.is_empty() => {
            ChatCommand::Invalid(format!("{command} requires a file path"))
        }
        "/save" => ChatCommand::Save(path_argument(input, &command)),
        "/load" => ChatCommand::Load(path_argument(input, &command)),
        "/stats" | "/status" => ChatCommand::Stats,
        _ => ChatCommand::Unknown(command),
    };

    Some(result)
}

/// Everything after the command token, so paths may contain spaces.
fn path_argument(input: &str, command: &str) -> String {
    input
        .get(command.len()..)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /help                  Show this help message
  /init                  Reset conversation and reload system prompt
  /clear                 Clear chat history in this session
  /compact [notes]       Summarize the history into a single message
  /save <file>           Save the session to a file
  /load <file>           Load a session from a file
  /stats                 Show session statistics
  /exit                  Exit the current session"#
}

/// Sink for application shutdown requests.
pub trait Shutdown: Send + Sync {
    /// Ask the host application to exit.
    fn request_shutdown(&self);
}

/// A [`Shutdown`] backed by a shared flag the host loop polls.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Creates a flag that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }
}

impl Shutdown for ShutdownFlag {
    fn request_shutdown(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }
}

/// Everything a command may act on, assembled for a single dispatch.
pub struct CommandContext<'a> {
    /// The raw user input.
    pub input: &'a str,
    /// The conversation.
    pub session: &'a mut Session,
    /// The backend, used by `/compact`.
    pub backend: &'a dyn Backend,
    /// Builds the system prompt for `/init`.
    pub prompts: &'a PromptBuilder,
    /// The system prompt currently sent with each turn.
    pub system_prompt: &'a mut String,
    /// Where `/exit` sends its request.
    pub shutdown: &'a dyn Shutdown,
    /// Where command activity is recorded.
    pub logger: &'a dyn ChatLogger,
}

/// Runs the command in `ctx.input`, if there is one.
///
/// Returns `None` when the input is not a command, so the caller can send it
/// to the backend; otherwise returns the status text to show. Only `/compact`
/// talks to the backend.
pub async fn dispatch(ctx: CommandContext<'_>) -> Option<String> {
    let command = parse_command(ctx.input)?;
    COMMANDS_DISPATCHED.click();

    let CommandContext {
        session,
        backend,
        prompts,
        system_prompt,
        shutdown,
        logger,
        ..
    } = ctx;

    let status = match command {
        ChatCommand::Help => help_text().to_string(),
        ChatCommand::Init => {
            session.clear_history();
            *system_prompt = prompts.build(None);
            logger.log_event(
                LogLevel::Debug,
                "commands",
                &format!("Session reinitialized with new system prompt. {system_prompt}"),
            );
            "Session reset. System prompt reloaded.".to_string()
        }
        ChatCommand::Clear => {
            session.clear_history();
            logger.log_event(LogLevel::Debug, "commands", "Chat history cleared.");
            "Chat cleared.".to_string()
        }
        ChatCommand::Exit => {
            logger.log_event(LogLevel::Info, "commands", "User exited the application.");
            shutdown.request_shutdown();
            "Exiting DeltaStrik...".to_string()
        }
        ChatCommand::Compact(extra) => {
            match session
                .compact(backend, system_prompt.as_str(), extra.as_deref())
                .await
            {
                Ok(status) => {
                    logger.log_event(LogLevel::Info, "commands", &status);
                    status
                }
                Err(err) => {
                    logger.log_error(&err);
                    format!("Compaction failed, history unchanged: {err}")
                }
            }
        }
        ChatCommand::Save(path) => match session.save_to(&path) {
            Ok(()) => format!("Session saved to {path}"),
            Err(err) => {
                logger.log_event(LogLevel::Warn, "commands", &err.to_string());
                format!("Failed to save session: {err}")
            }
        },
        ChatCommand::Load(path) => match session.load_from(&path) {
            Ok(()) => format!("Session loaded from {path} ({} messages)", session.len()),
            Err(err) => {
                logger.log_event(LogLevel::Warn, "commands", &err.to_string());
                format!("Failed to load session: {err}")
            }
        },
        ChatCommand::Stats => stats_text(session),
        ChatCommand::Invalid(message) => message,
        ChatCommand::Unknown(token) => {
            COMMANDS_UNKNOWN.click();
            logger.log_event(
                LogLevel::Info,
                "commands",
                &format!("unknown command {token}"),
            );
            format!("[Unknown command: {token}] Try /help for available commands.")
        }
    };

    Some(status)
}

fn stats_text(session: &Session) -> String {
    let config = session.config();
    format!(
        "Session Statistics:\n  Model: {}\n  Endpoint: {}\n  Messages: {}\n  Context limit: {}\n  Created: {}",
        config.model,
        config.endpoint,
        session.len(),
        config.context_limit,
        format_rfc3339(session.created_at()),
    )
}
