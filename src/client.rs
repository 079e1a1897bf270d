//! Backend client for the Ollama chat endpoint.
//!
//! The [`Backend`] trait is the seam between the chat core and the model
//! server. Its `try_*` methods return a tagged [`Result`]; the provided `send`
//! and `summarize` methods render failures into marked strings so the UI layer
//! can treat every answer uniformly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use url::Url;

use crate::chat::ChatConfig;
use crate::error::{Error, Result};
use crate::logger::{ChatLogger, LogLevel, NullLogger};
use crate::observability::{
    BACKEND_EMPTY_RESPONSES, BACKEND_ERRORS, BACKEND_REQUEST_DURATION, BACKEND_REQUESTS,
    BACKEND_TIMEOUTS,
};
use crate::types::{ChatRequest, ChatResponse, GenerationOptions, Message};

const CHAT_PATH: &str = "api/chat";

/// Marker returned when the envelope carries neither a reply nor an error.
pub const NO_RESPONSE_MARKER: &str = "[No response received from Ollama]";

/// Render a tagged reply into the string shown to the user.
///
/// - envelope errors become `[Ollama Error: <message>]`
/// - empty envelopes become [`NO_RESPONSE_MARKER`]
/// - everything else becomes `[Error contacting Ollama backend: <cause>]`
pub fn render_reply(reply: Result<String>) -> String {
    match reply {
        Ok(text) => text,
        Err(Error::Backend { message }) => format!("[Ollama Error: {message}]"),
        Err(Error::EmptyResponse) => NO_RESPONSE_MARKER.to_string(),
        Err(err) => format!("[Error contacting Ollama backend: {err}]"),
    }
}

/// Returns true if `text` has the shape produced by [`render_reply`] for a failure.
pub fn is_error_marker(text: &str) -> bool {
    text == NO_RESPONSE_MARKER
        || text.starts_with("[Ollama Error: ")
        || text.starts_with("[Error contacting Ollama backend: ")
}

/// A model server that can answer chat turns.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Send one chat turn and return the reply text.
    async fn try_send(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &[Message],
    ) -> Result<String>;

    /// Ask for a summary; no history is attached, `instruction` is the user turn.
    async fn try_summarize(&self, system_prompt: &str, instruction: &str) -> Result<String> {
        self.try_send(system_prompt, instruction, &[]).await
    }

    /// Like [`Backend::try_send`], with failures rendered as marked strings.
    async fn send(&self, system_prompt: &str, user_message: &str, history: &[Message]) -> String {
        render_reply(self.try_send(system_prompt, user_message, history).await)
    }

    /// Like [`Backend::try_summarize`], with failures rendered as marked strings.
    async fn summarize(&self, system_prompt: &str, instruction: &str) -> String {
        render_reply(self.try_summarize(system_prompt, instruction).await)
    }
}

/// Client for an Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: ReqwestClient,
    chat_url: Url,
    model: String,
    options: GenerationOptions,
    stream: bool,
    timeout: Duration,
    logger: Arc<dyn ChatLogger>,
}

impl OllamaClient {
    /// Create a new client from a configuration, discarding logs.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Self::with_logger(config, Arc::new(NullLogger))
    }

    /// Create a new client that records its traffic to `logger`.
    pub fn with_logger(config: &ChatConfig, logger: Arc<dyn ChatLogger>) -> Result<Self> {
        let timeout = config.timeout();
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            chat_url: chat_url(&config.endpoint)?,
            model: config.model.clone(),
            options: config.generation_options(),
            stream: config.stream,
            timeout,
            logger,
        })
    }

    /// Returns the URL requests are posted to.
    pub fn chat_url(&self) -> &Url {
        &self.chat_url
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the request body for one turn.
    pub fn build_request(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &[Message],
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: ChatRequest::build_messages(system_prompt, user_message, history),
            options: self.options,
            stream: self.stream,
        }
    }

    async fn post(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(self.chat_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        let status = response.status();
        self.logger.log_event(
            LogLevel::Info,
            "client",
            &format!("Ollama response status: {}", status.as_u16()),
        );
        if !status.is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ChatResponse>().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(
                    format!("Response timed out: {}", e),
                    Some(self.timeout.as_secs_f64()),
                )
            } else {
                Error::serialization(
                    format!("Failed to parse response: {}", e),
                    Some(Box::new(e)),
                )
            }
        })
    }

    /// Convert a non-success response into an error, keeping Ollama's own
    /// `{"error": "..."}` text when the body has one.
    async fn process_error_response(response: reqwest::Response) -> Error {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: Option<String>,
        }

        let status_code = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or(body);
        Error::api(status_code, message)
    }
}

#[async_trait::async_trait]
impl Backend for OllamaClient {
    async fn try_send(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &[Message],
    ) -> Result<String> {
        let request = self.build_request(system_prompt, user_message, history);
        self.logger.log_event(
            LogLevel::Debug,
            "client",
            &format!("Hitting Ollama at: {}", self.chat_url),
        );
        self.logger.log_request(&request);

        BACKEND_REQUESTS.click();
        let start = Instant::now();
        let outcome = self.post(&request).await;
        BACKEND_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let reply = match outcome {
            Ok(response) => {
                self.logger.log_response(&response);
                response.into_reply()
            }
            Err(err) => Err(err),
        };
        if let Err(err) = &reply {
            match err {
                Error::EmptyResponse => BACKEND_EMPTY_RESPONSES.click(),
                Error::Timeout { .. } => BACKEND_TIMEOUTS.click(),
                _ => BACKEND_ERRORS.click(),
            }
            self.logger.log_error(err);
        }
        reply
    }
}

/// Resolve the chat endpoint against the configured base URL.
///
/// A base without a trailing slash is treated as a directory, so
/// `http://host:11434/ollama` resolves to `http://host:11434/ollama/api/chat`.
fn chat_url(endpoint: &str) -> Result<Url> {
    let mut base = Url::parse(endpoint)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(CHAT_PATH)?)
}
