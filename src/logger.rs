//! Logging sinks for DeltaStrik components.
//!
//! There is no process-wide logger. A [`ChatLogger`] is constructed once by the
//! host and handed to each component that wants to record what it does, usually
//! as an `Arc<dyn ChatLogger>`.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::error::{Error, Result};
use crate::types::{ChatRequest, ChatResponse};
use crate::utils::time::{format_date_utc, now_utc};

/// Severity of a log record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Payloads and other detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that was recovered from.
    Warn,
    /// A failure surfaced to the user.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A trait for recording DeltaStrik activity.
///
/// Implement this trait to capture backend traffic and component events.
///
/// # Example
///
/// ```rust,ignore
/// use deltastrik::{ChatLogger, ChatRequest, ChatResponse, Error, LogLevel};
/// use std::sync::Mutex;
///
/// struct MemoryLogger {
///     lines: Mutex<Vec<String>>,
/// }
///
/// impl ChatLogger for MemoryLogger {
///     fn log_request(&self, request: &ChatRequest) {
///         self.lines.lock().unwrap().push(format!("request to {}", request.model));
///     }
///
///     fn log_response(&self, response: &ChatResponse) {
///         self.lines.lock().unwrap().push(format!("response: {response:?}"));
///     }
///
///     fn log_error(&self, error: &Error) {
///         self.lines.lock().unwrap().push(format!("error: {error}"));
///     }
///
///     fn log_event(&self, level: LogLevel, component: &str, message: &str) {
///         self.lines.lock().unwrap().push(format!("{level} {component}: {message}"));
///     }
/// }
/// ```
pub trait ChatLogger: Send + Sync {
    /// Log a request just before it is sent to the backend.
    fn log_request(&self, request: &ChatRequest);

    /// Log a parsed response envelope.
    fn log_response(&self, response: &ChatResponse);

    /// Log a failure on the way to or from the backend.
    fn log_error(&self, error: &Error);

    /// Log a free-form event emitted by `component`.
    fn log_event(&self, level: LogLevel, component: &str, message: &str);
}

/// A logger that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl ChatLogger for NullLogger {
    fn log_request(&self, _: &ChatRequest) {}

    fn log_response(&self, _: &ChatResponse) {}

    fn log_error(&self, _: &Error) {}

    fn log_event(&self, _: LogLevel, _: &str, _: &str) {}
}

#[derive(Serialize)]
struct LogRecord<'a> {
    #[serde(serialize_with = "crate::utils::time::serialize_rfc3339")]
    ts: OffsetDateTime,
    level: LogLevel,
    component: &'a str,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// A logger that appends JSON lines to a dated file, `<dir>/<YYYY-MM-DD>.log`.
///
/// The file rolls over at UTC midnight. Records below the minimum level are
/// dropped. Write failures are swallowed: logging must never take the chat loop
/// down.
pub struct FileLogger {
    dir: PathBuf,
    min_level: LogLevel,
    appender: Mutex<RollingFileAppender>,
}

impl FileLogger {
    /// Opens (creating if needed) the daily log under `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, min_level: LogLevel) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|err| Error::io(format!("failed to create log dir {}", dir.display()), err))?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_suffix("log")
            .build(dir)
            .map_err(|err| {
                Error::io(
                    format!("failed to open log in {}", dir.display()),
                    io::Error::other(err),
                )
            })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            min_level,
            appender: Mutex::new(appender),
        })
    }

    /// Returns the directory holding the daily files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file records are written to right now.
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", format_date_utc(now_utc())))
    }

    fn write(&self, level: LogLevel, component: &str, event: &str, data: Option<Value>) {
        if level < self.min_level {
            return;
        }
        let record = LogRecord {
            ts: now_utc(),
            level,
            component,
            event,
            data,
        };
        let Ok(mut line) = serde_json::to_vec(&record) else {
            return;
        };
        line.push(b'\n');
        if let Ok(mut appender) = self.appender.lock() {
            let _ = appender.write_all(&line);
            let _ = appender.flush();
        }
    }
}

impl ChatLogger for FileLogger {
    fn log_request(&self, request: &ChatRequest) {
        self.write(
            LogLevel::Debug,
            "client",
            "request",
            serde_json::to_value(request).ok(),
        );
    }

    fn log_response(&self, response: &ChatResponse) {
        self.write(
            LogLevel::Debug,
            "client",
            "response",
            serde_json::to_value(response).ok(),
        );
    }

    fn log_error(&self, error: &Error) {
        self.write(
            LogLevel::Error,
            "client",
            "error",
            Some(Value::String(error.to_string())),
        );
    }

    fn log_event(&self, level: LogLevel, component: &str, message: &str) {
        self.write(level, component, message, None);
    }
}
