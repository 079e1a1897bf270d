//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, the optional YAML
//! settings file, and the resolved, read-only [`ChatConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::GenerationOptions;

/// Default Ollama endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-oss:latest";

/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default maximum tokens per response.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default request timeout, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of history messages sent with each turn.
pub const DEFAULT_CONTEXT_LIMIT: usize = 10;

/// Command-line arguments for the deltastrik tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Path to a YAML settings file.
    #[arrrg(optional, "YAML settings file", "FILE")]
    pub config: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-oss:latest)", "MODEL")]
    pub model: Option<String>,

    /// Base URL of the Ollama server.
    #[arrrg(optional, "Ollama base URL (default: http://127.0.0.1:11434)", "URL")]
    pub endpoint: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 1024)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 10)", "SECONDS")]
    pub timeout: Option<u32>,

    /// Persona override file.
    #[arrrg(optional, "Persona YAML file with a `prompt` field", "FILE")]
    pub persona: Option<String>,

    /// Session snapshot to restore at startup and save on exit.
    #[arrrg(optional, "Session snapshot file to restore and save", "FILE")]
    pub session: Option<String>,

    /// Directory for log files.
    #[arrrg(optional, "Directory for log files (default: logs)", "DIR")]
    pub log_dir: Option<String>,

    /// Log request and response payloads.
    #[arrrg(flag, "Log request and response payloads")]
    pub verbose: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// Every field has a documented default so a settings file only needs to name
/// what it changes. The configuration is read-only once the session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the Ollama server.
    pub endpoint: String,

    /// The model to use for generating responses.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Whether to ask the backend for a streamed answer. Not used downstream.
    pub stream: bool,

    /// Location of the persona override document.
    pub persona_file: PathBuf,

    /// Number of recent history messages sent with each turn.
    pub context_limit: usize,

    /// Directory for log files. `None` disables file logging.
    pub log_dir: Option<PathBuf>,

    /// Whether payloads are logged at debug level.
    pub verbose: bool,

    /// Session snapshot restored at startup and written on exit.
    pub session_file: Option<PathBuf>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Endpoint: http://127.0.0.1:11434
    /// - Model: gpt-oss:latest
    /// - Temperature: 0.7
    /// - Max tokens: 1024
    /// - Timeout: 10 seconds
    /// - Persona: ~/.deltastrik/system_prompt.yaml
    /// - Context limit: 10 messages
    /// - Logs: ./logs
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            stream: false,
            persona_file: default_persona_file(),
            context_limit: DEFAULT_CONTEXT_LIMIT,
            log_dir: Some(PathBuf::from("logs")),
            verbose: false,
            session_file: None,
            use_color: true,
        }
    }

    /// Loads a configuration from a YAML settings file.
    ///
    /// Keys missing from the file take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the configuration from command-line arguments.
    ///
    /// The settings file named by `--config` is loaded first; flags override it.
    pub fn resolve(args: ChatArgs) -> Result<Self> {
        let mut config = match args.config.as_deref() {
            Some(path) => Self::from_file(path)?,
            None => Self::new(),
        };
        if let Some(model) = args.model {
            config.model = model;
        }
        if let Some(endpoint) = args.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(max_tokens) = args.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(timeout) = args.timeout {
            config.timeout_secs = u64::from(timeout);
        }
        if let Some(persona) = args.persona {
            config.persona_file = PathBuf::from(persona);
        }
        if let Some(session) = args.session {
            config.session_file = Some(PathBuf::from(session));
        }
        if let Some(log_dir) = args.log_dir {
            config.log_dir = Some(PathBuf::from(log_dir));
        }
        config.verbose |= args.verbose;
        if args.no_color {
            config.use_color = false;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values can be used to talk to a backend.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::validation(
                "model must not be empty",
                Some("model".to_string()),
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(Error::validation(
                format!("temperature {} is not a non-negative number", self.temperature),
                Some("temperature".to_string()),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::validation(
                "timeout must be at least one second",
                Some("timeout_secs".to_string()),
            ));
        }
        url::Url::parse(&self.endpoint).map_err(|err| {
            Error::validation(
                format!("endpoint {:?} is not a URL: {err}", self.endpoint),
                Some("endpoint".to_string()),
            )
        })?;
        Ok(())
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the generation options sent with every request.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::new(self.temperature, self.max_tokens)
    }

    /// Sets the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the request timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the persona override document.
    pub fn with_persona_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.persona_file = path.into();
        self
    }

    /// Sets how many history messages accompany each turn.
    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_limit = limit;
        self
    }

    /// Sets the log directory.
    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_persona_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".deltastrik")
        .join("system_prompt.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.model, "gpt-oss:latest");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(!config.stream);
        assert!(config.persona_file.ends_with(".deltastrik/system_prompt.yaml"));
        assert_eq!(config.context_limit, 10);
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
        assert!(config.session_file.is_none());
        assert!(config.use_color);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::resolve(ChatArgs::default()).unwrap();
        assert_eq!(config, ChatConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            model: Some("llama3:8b".to_string()),
            endpoint: Some("http://gpu-box:11434".to_string()),
            max_tokens: Some(2048),
            timeout: Some(30),
            persona: Some("persona.yaml".to_string()),
            session: Some("session.json".to_string()),
            no_color: true,
            ..ChatArgs::default()
        };
        let config = ChatConfig::resolve(args).unwrap();
        assert_eq!(config.model, "llama3:8b");
        assert_eq!(config.endpoint, "http://gpu-box:11434");
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.persona_file, PathBuf::from("persona.yaml"));
        assert_eq!(config.session_file, Some(PathBuf::from("session.json")));
        assert!(!config.use_color);
    }

    #[test]
    fn partial_yaml_takes_defaults() {
        let config: ChatConfig =
            serde_yaml::from_str("model: mistral\ntemperature: 0.2\n").unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn settings_file_then_flags() {
        let path = std::env::temp_dir().join(format!(
            "deltastrik-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "model: mistral\nmax_tokens: 64\n").unwrap();
        let args = ChatArgs {
            config: Some(path.display().to_string()),
            max_tokens: Some(128),
            ..ChatArgs::default()
        };
        let config = ChatConfig::resolve(args).unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.max_tokens, 128);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ChatConfig::new().with_temperature(f32::NAN).validate();
        assert!(err.unwrap_err().is_validation());
        assert!(ChatConfig::new().with_timeout_secs(0).validate().is_err());
        assert!(ChatConfig::new().with_endpoint("not a url").validate().is_err());
        assert!(ChatConfig::new().with_model("  ").validate().is_err());
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_endpoint("http://localhost:9999")
            .with_model("phi3")
            .with_temperature(0.1)
            .with_max_tokens(32)
            .with_timeout_secs(3)
            .with_persona_file("p.yaml")
            .with_context_limit(4)
            .with_log_dir(None)
            .without_color();
        assert_eq!(config.endpoint, "http://localhost:9999");
        assert_eq!(config.model, "phi3");
        assert_eq!(config.generation_options(), GenerationOptions::new(0.1, 32));
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.persona_file, PathBuf::from("p.yaml"));
        assert_eq!(config.context_limit, 4);
        assert!(config.log_dir.is_none());
        assert!(!config.use_color);
    }
}
