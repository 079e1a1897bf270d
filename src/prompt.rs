//! System prompt construction.
//!
//! The system prompt is a persona preamble followed by a runtime context line.
//! The persona comes from an optional YAML document with a `prompt` field:
//!
//! ```yaml
//! prompt: |
//!   You are a terse assistant for embedded C developers.
//! ```
//!
//! A missing document, or one without a `prompt`, selects [`DEFAULT_PERSONA`].
//! A document that is empty or cannot be read or parsed also selects it, with a
//! note describing the failure appended, so building a prompt never fails.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;

use crate::chat::ChatConfig;
use crate::logger::{ChatLogger, LogLevel, NullLogger};
use crate::utils::time::{format_minute_utc, now_utc};

/// The persona used when no override document is available.
pub const DEFAULT_PERSONA: &str = "\
You are DeltaStrik, an advanced terminal-based AI assistant designed for developers.
Your responses should be:
- Clear, concise, and technically accurate
- Markdown-formatted when showing code or lists
- Calm and confident, never apologetic
Avoid unnecessary filler phrases. Always stay focused on the user's question.";

/// Per-call overrides for [`PromptBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptOverrides {
    /// Persona document to read instead of the configured one.
    pub persona_file: Option<PathBuf>,

    /// Model identifier to report instead of the configured one.
    pub model: Option<String>,
}

impl PromptOverrides {
    /// Overrides the persona document.
    pub fn with_persona_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.persona_file = Some(path.into());
        self
    }

    /// Overrides the reported model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct PersonaFile {
    prompt: Option<String>,
}

/// Builds the system prompt injected into every request.
#[derive(Clone)]
pub struct PromptBuilder {
    model: String,
    persona_file: PathBuf,
    logger: Arc<dyn ChatLogger>,
}

impl PromptBuilder {
    /// Create a builder for the configured model and persona document.
    pub fn new(config: &ChatConfig) -> Self {
        Self::with_logger(config, Arc::new(NullLogger))
    }

    /// Create a builder that reports persona fallbacks to `logger`.
    pub fn with_logger(config: &ChatConfig, logger: Arc<dyn ChatLogger>) -> Self {
        Self {
            model: config.model.clone(),
            persona_file: config.persona_file.clone(),
            logger,
        }
    }

    /// Returns the configured persona document path.
    pub fn persona_file(&self) -> &Path {
        &self.persona_file
    }

    /// Build the system prompt for the current time.
    pub fn build(&self, overrides: Option<&PromptOverrides>) -> String {
        self.build_at(overrides, now_utc())
    }

    /// Build the system prompt as of `now`.
    pub fn build_at(&self, overrides: Option<&PromptOverrides>, now: OffsetDateTime) -> String {
        let persona_file = overrides
            .and_then(|o| o.persona_file.as_deref())
            .unwrap_or(self.persona_file.as_path());
        let model = overrides
            .and_then(|o| o.model.as_deref())
            .unwrap_or(self.model.as_str());
        let persona = self.load_persona(persona_file);
        format!(
            "{}\n\n[Context: Running on model '{}' at {}]\n",
            persona.trim(),
            model,
            format_minute_utc(now)
        )
    }

    fn load_persona(&self, path: &Path) -> String {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return DEFAULT_PERSONA.to_string();
            }
            Err(err) => return self.fallback(path, &err.to_string()),
        };
        if content.trim().is_empty() {
            return self.fallback(path, "the document is empty");
        }
        let document = match serde_yaml::from_str::<serde_yaml::Value>(&content) {
            Ok(serde_yaml::Value::Null) => {
                return self.fallback(path, "the document is empty");
            }
            Ok(document) => document,
            Err(err) => return self.fallback(path, &err.to_string()),
        };
        match serde_yaml::from_value::<PersonaFile>(document) {
            Ok(PersonaFile {
                prompt: Some(prompt),
            }) if !prompt.trim().is_empty() => prompt,
            Ok(_) => DEFAULT_PERSONA.to_string(),
            Err(err) => self.fallback(path, &err.to_string()),
        }
    }

    fn fallback(&self, path: &Path, reason: &str) -> String {
        self.logger.log_event(
            LogLevel::Warn,
            "prompt",
            &format!("failed to load persona {}: {reason}", path.display()),
        );
        format!(
            "{DEFAULT_PERSONA}\n(Note: Failed to load persona file {}: {reason})",
            path.display()
        )
    }
}
