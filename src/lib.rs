// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod logger;
pub mod observability;
pub mod prompt;
pub mod render;
pub mod types;
pub mod utils;

// Re-exports
pub use client::{Backend, NO_RESPONSE_MARKER, OllamaClient, is_error_marker, render_reply};
pub use error::{Error, Result};
pub use logger::{ChatLogger, FileLogger, LogLevel, NullLogger};
pub use observability::register_biometrics;
pub use prompt::{DEFAULT_PERSONA, PromptBuilder, PromptOverrides};
pub use types::*;
