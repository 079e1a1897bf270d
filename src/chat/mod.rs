//! Chat application module for interactive conversations with an Ollama model.
//!
//! This module provides the REPL-facing pieces of DeltaStrik:
//!
//! - Conversation history with snapshots and compaction
//! - Slash commands for session control
//! - Configurable endpoint, model, persona and generation parameters
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Conversation history management
//! - [`commands`]: Slash command parsing and dispatch

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{
    ChatCommand, CommandContext, Shutdown, ShutdownFlag, dispatch, help_text, parse_command,
};
pub use config::{
    ChatArgs, ChatConfig, DEFAULT_CONTEXT_LIMIT, DEFAULT_ENDPOINT, DEFAULT_MODEL,
};
pub use session::{NOTHING_TO_COMPACT, Session, SessionEvent, SessionSnapshot};
