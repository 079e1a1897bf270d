//! Core chat session management.
//!
//! This module provides the [`Session`] struct which owns the conversation
//! history, its snapshot format, and the compaction procedure that folds the
//! whole history into a single summary message.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_reader, to_writer_pretty};
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;

use crate::chat::config::ChatConfig;
use crate::client::{Backend, render_reply};
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_COMPACTED_MESSAGES, SESSION_COMPACTION_FAILURES, SESSION_COMPACTIONS,
};
use crate::types::{Message, Role};
use crate::utils::time::{format_rfc3339, now_utc, parse_iso8601};

/// Status returned by [`Session::compact`] when there is no history.
pub const NOTHING_TO_COMPACT: &str = "Nothing to compact: the conversation is empty.";

/// Instruction appended to the transcript when asking for a summary.
const COMPACTION_INSTRUCTION: &str = "\
Summarize the conversation above so it can replace the full history. \
Keep facts, decisions, code identifiers, open questions, and the user's \
stated preferences. Write it as context for continuing the conversation, \
not as a reply to the user.";

/// A change to the session, published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message was appended; `length` is the new history length.
    Appended {
        /// Role of the new message.
        role: Role,
        /// History length after the append.
        length: usize,
    },
    /// The history was emptied.
    Cleared,
    /// The history was replaced by a summary of `summarized` messages.
    Compacted {
        /// Number of messages folded into the summary.
        summarized: usize,
    },
    /// The history was replaced from a snapshot.
    Restored {
        /// History length after the import.
        length: usize,
    },
}

/// Serializable state of a [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    /// Creation time as ISO-8601 text.
    pub created_at: Option<String>,

    /// The conversation, in order.
    pub history: Vec<Message>,
}

impl SessionSnapshot {
    /// Read a snapshot out of arbitrary JSON without failing.
    ///
    /// A non-string `created_at` is dropped, a missing or non-array `history`
    /// becomes empty, and history entries that are not `{role, content}`
    /// objects are skipped.
    pub fn from_value(value: &Value) -> Self {
        let created_at = value
            .get("created_at")
            .and_then(Value::as_str)
            .map(str::to_string);
        let history = value
            .get("history")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| Message::deserialize(entry).ok())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            created_at,
            history,
        }
    }

    /// Write the snapshot as pretty-printed JSON.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create session file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, self).map_err(|err| {
            Error::serialization("failed to serialize session", Some(Box::new(err)))
        })
    }

    /// Read a snapshot from a JSON file.
    ///
    /// The file must exist and contain JSON; its contents are then read
    /// leniently as in [`SessionSnapshot::from_value`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|err| Error::io("failed to open session file", err))?;
        let reader = BufReader::new(file);
        let value: Value = from_reader(reader)
            .map_err(|err| Error::serialization("failed to parse session", Some(Box::new(err))))?;
        Ok(Self::from_value(&value))
    }
}

/// The conversation with the backend.
///
/// A session owns its history exclusively; every mutation goes through the
/// methods below. `/init`, `/clear` and compaction mutate it in place.
pub struct Session {
    history: Vec<Message>,
    created_at: OffsetDateTime,
    config: Arc<ChatConfig>,
    events: Option<UnboundedSender<SessionEvent>>,
}

impl Session {
    /// Creates an empty session stamped with the current time.
    pub fn new(config: Arc<ChatConfig>) -> Self {
        Self {
            history: Vec::new(),
            created_at: now_utc(),
            config,
            events: None,
        }
    }

    /// Publishes every change on `events`.
    pub fn with_events(mut self, events: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns the configuration this session was created with.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Returns when the session was created (or restored).
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Appends a user message.
    pub fn append_user(&mut self, text: impl Into<String>) {
        self.push(Message::user(text));
    }

    /// Appends an assistant message.
    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.push(Message::assistant(text));
    }

    fn push(&mut self, message: Message) {
        let role = message.role;
        self.history.push(message);
        self.notify(SessionEvent::Appended {
            role,
            length: self.history.len(),
        });
    }

    /// Returns the full history.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Returns the last `limit` messages, or the whole history if it is shorter.
    pub fn recent_context(&self, limit: usize) -> &[Message] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    /// Returns the number of messages in the conversation.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if the conversation is empty.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Clears the conversation history.
    pub fn reset(&mut self) {
        self.history.clear();
        self.notify(SessionEvent::Cleared);
    }

    /// Clears the conversation history. Same as [`Session::reset`].
    pub fn clear_history(&mut self) {
        self.reset();
    }

    /// Returns the serializable state of the session.
    pub fn export_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            created_at: Some(format_rfc3339(self.created_at)),
            history: self.history.clone(),
        }
    }

    /// Replaces the session state from a snapshot.
    ///
    /// `created_at` is taken from the snapshot only when it parses as ISO-8601;
    /// otherwise the session is stamped with the current time.
    pub fn import_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.history = snapshot.history;
        self.created_at = snapshot
            .created_at
            .as_deref()
            .and_then(parse_iso8601)
            .unwrap_or_else(now_utc);
        self.notify(SessionEvent::Restored {
            length: self.history.len(),
        });
    }

    /// Saves the session snapshot to the specified path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.export_snapshot().to_file(path)
    }

    /// Loads a session snapshot from disk, replacing the current state.
    pub fn load_from<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let snapshot = SessionSnapshot::from_file(path)?;
        self.import_snapshot(snapshot);
        Ok(())
    }

    /// Renders the history as a role-prefixed transcript.
    pub fn transcript(&self) -> String {
        let mut transcript = String::new();
        for message in &self.history {
            transcript.push_str(message.role.as_str());
            transcript.push_str(": ");
            transcript.push_str(&message.content);
            transcript.push('\n');
        }
        transcript
    }

    /// Runs one chat turn and records it.
    ///
    /// The most recent `context_limit` messages accompany `text`. The backend
    /// call runs on its own task. The user message and the reply are appended
    /// afterwards, including a reply that is a marked error string, and the
    /// reply is returned.
    pub async fn exchange(
        &mut self,
        backend: Arc<dyn Backend>,
        system_prompt: &str,
        text: &str,
    ) -> String {
        let context = self.recent_context(self.config.context_limit).to_vec();
        let prompt = system_prompt.to_string();
        let message = text.to_string();
        let task = tokio::spawn(async move { backend.send(&prompt, &message, &context).await });
        let reply = match task.await {
            Ok(reply) => reply,
            Err(err) => render_reply(Err(Error::http_client(
                format!("backend task failed: {err}"),
                Some(Box::new(err)),
            ))),
        };
        self.append_user(text);
        self.append_assistant(reply.as_str());
        reply
    }

    fn compaction_request(&self, extra_instructions: Option<&str>) -> String {
        let mut request = format!("{}\n{COMPACTION_INSTRUCTION}", self.transcript());
        if let Some(extra) = extra_instructions.map(str::trim).filter(|s| !s.is_empty()) {
            request.push_str("\n\nAdditional instructions: ");
            request.push_str(extra);
        }
        request
    }

    /// Replaces the whole history with one system message summarizing it.
    ///
    /// An empty history is left alone without contacting the backend. If the
    /// backend fails, or answers with nothing but whitespace, the history is
    /// unchanged and the error is returned.
    pub async fn compact(
        &mut self,
        backend: &dyn Backend,
        system_prompt: &str,
        extra_instructions: Option<&str>,
    ) -> Result<String> {
        if self.history.is_empty() {
            return Ok(NOTHING_TO_COMPACT.to_string());
        }

        let request = self.compaction_request(extra_instructions);
        let summary = match backend.try_summarize(system_prompt, &request).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                SESSION_COMPACTION_FAILURES.click();
                return Err(Error::EmptyResponse);
            }
            Err(err) => {
                SESSION_COMPACTION_FAILURES.click();
                return Err(err);
            }
        };

        let summarized = self.history.len();
        self.history = vec![Message::system(summary.trim())];
        SESSION_COMPACTIONS.click();
        SESSION_COMPACTED_MESSAGES.add(summarized as f64);
        self.notify(SessionEvent::Compacted { summarized });
        Ok(format!(
            "Conversation compacted: {summarized} messages summarized."
        ))
    }

    fn notify(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is watching any more.
            let _ = events.send(event);
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(ChatConfig::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use time::macros::datetime;

    struct RecordingBackend {
        reply: Result<String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl RecordingBackend {
        fn new(reply: Result<String>) -> Self {
            Self {
                reply,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Backend for RecordingBackend {
        async fn try_send(
            &self,
            system_prompt: &str,
            user_message: &str,
            history: &[Message],
        ) -> Result<String> {
            assert!(history.is_empty(), "summaries carry no history");
            self.calls
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_message.to_string()));
            self.reply.clone()
        }
    }

    fn session_with(n: usize) -> Session {
        let mut session = Session::default();
        for i in 0..n {
            if i % 2 == 0 {
                session.append_user(format!("question {i}"));
            } else {
                session.append_assistant(format!("answer {i}"));
            }
        }
        session
    }

    #[test]
    fn new_session_empty() {
        let session = Session::default();
        assert_eq!(session.len(), 0);
        assert!(session.is_empty());
        assert!(session.recent_context(10).is_empty());
    }

    #[test]
    fn appends_preserve_order() {
        let session = session_with(5);
        assert_eq!(session.len(), 5);
        assert_eq!(session.history()[0], Message::user("question 0"));
        assert_eq!(session.history()[1], Message::assistant("answer 1"));
        assert_eq!(session.history()[4], Message::user("question 4"));
    }

    #[test]
    fn recent_context_returns_tail() {
        let session = session_with(5);
        for limit in 0..8 {
            let recent = session.recent_context(limit);
            let expected = limit.min(5);
            assert_eq!(recent.len(), expected);
            assert_eq!(recent, &session.history()[5 - expected..]);
        }
        assert!(session.recent_context(0).is_empty());
    }

    #[test]
    fn reset_and_clear_empty_history() {
        let mut session = session_with(3);
        session.reset();
        assert_eq!(session.len(), 0);

        let mut session = session_with(3);
        session.clear_history();
        assert!(session.is_empty());
    }

    #[test]
    fn snapshot_round_trip() {
        let original = session_with(4);
        let snapshot = original.export_snapshot();

        let mut restored = Session::default();
        restored.import_snapshot(snapshot.clone());
        assert_eq!(restored.history(), original.history());
        assert_eq!(restored.created_at(), original.created_at());
        assert_eq!(restored.export_snapshot(), snapshot);
    }

    #[test]
    fn snapshot_wire_shape() {
        let mut session = Session::default();
        session.import_snapshot(SessionSnapshot {
            created_at: Some("2024-05-01T12:30:00Z".to_string()),
            history: vec![Message::user("hi")],
        });
        let value = serde_json::to_value(session.export_snapshot()).unwrap();
        assert_eq!(
            value,
            json!({
                "created_at": "2024-05-01T12:30:00Z",
                "history": [{"role": "user", "content": "hi"}]
            })
        );
        assert_eq!(session.created_at(), datetime!(2024-05-01 12:30 UTC));
    }

    #[test]
    fn malformed_timestamp_uses_now() {
        let before = now_utc();
        let mut session = Session::default();
        session.import_snapshot(SessionSnapshot {
            created_at: Some("last tuesday".to_string()),
            history: vec![Message::assistant("kept")],
        });
        assert!(session.created_at() >= before);
        assert_eq!(session.history(), &[Message::assistant("kept")]);

        session.import_snapshot(SessionSnapshot::default());
        assert!(session.created_at() >= before);
        assert!(session.is_empty());
    }

    #[test]
    fn lenient_snapshot_from_value() {
        let snapshot = SessionSnapshot::from_value(&json!({
            "created_at": 12345,
            "history": [
                {"role": "user", "content": "ok"},
                {"role": "narrator", "content": "skipped"},
                "not even an object",
                {"role": "assistant", "content": "also ok"}
            ]
        }));
        assert!(snapshot.created_at.is_none());
        assert_eq!(
            snapshot.history,
            vec![Message::user("ok"), Message::assistant("also ok")]
        );

        let empty = SessionSnapshot::from_value(&json!({"history": "nope"}));
        assert!(empty.history.is_empty());
        assert_eq!(SessionSnapshot::from_value(&json!(null)), SessionSnapshot::default());
    }

    #[test]
    fn snapshot_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "deltastrik-session-{}.json",
            std::process::id()
        ));
        let original = session_with(3);
        original.save_to(&path).unwrap();

        let mut restored = Session::default();
        restored.load_from(&path).unwrap();
        assert_eq!(restored.history(), original.history());
        let _ = std::fs::remove_file(&path);

        assert!(restored.load_from(&path).is_err());
        assert_eq!(restored.history(), original.history());
    }

    #[test]
    fn transcript_is_role_prefixed() {
        let session = session_with(2);
        assert_eq!(session.transcript(), "user: question 0\nassistant: answer 1\n");
    }

    #[tokio::test]
    async fn compact_empty_session_skips_backend() {
        let backend = RecordingBackend::new(Ok("unused".to_string()));
        let mut session = Session::default();
        let status = session.compact(&backend, "sys", None).await.unwrap();
        assert_eq!(status, NOTHING_TO_COMPACT);
        assert!(session.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn compact_replaces_history_with_summary() {
        for n in [1, 2, 7, 30] {
            let backend = RecordingBackend::new(Ok("  the summary \n".to_string()));
            let mut session = session_with(n);
            let status = session.compact(&backend, "sys", None).await.unwrap();
            assert!(status.contains(&n.to_string()));
            assert_eq!(session.history(), &[Message::system("the summary")]);
        }
    }

    #[tokio::test]
    async fn compact_sends_transcript_and_instructions() {
        let backend = RecordingBackend::new(Ok("summary".to_string()));
        let mut session = session_with(2);
        session
            .compact(&backend, "persona", Some("keep the code"))
            .await
            .unwrap();
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        let (system_prompt, request) = &calls[0];
        assert_eq!(system_prompt, "persona");
        assert!(request.starts_with("user: question 0\nassistant: answer 1\n"));
        assert!(request.contains(COMPACTION_INSTRUCTION));
        assert!(request.ends_with("Additional instructions: keep the code"));
    }

    #[tokio::test]
    async fn failed_compaction_leaves_history() {
        let backend = RecordingBackend::new(Err(Error::timeout("Request timed out", None)));
        let mut session = session_with(4);
        let before = session.history().to_vec();
        let err = session.compact(&backend, "sys", None).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(session.history(), before.as_slice());

        let blank = RecordingBackend::new(Ok("   ".to_string()));
        let err = session.compact(&blank, "sys", None).await.unwrap_err();
        assert!(err.is_empty_response());
        assert_eq!(session.history(), before.as_slice());
    }

    #[tokio::test]
    async fn events_are_published() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut session = Session::default().with_events(tx);
        session.append_user("hi");
        session.append_assistant("hello");
        let backend = RecordingBackend::new(Ok("sum".to_string()));
        session.compact(&backend, "", None).await.unwrap();
        session.clear_history();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SessionEvent::Appended {
                    role: Role::User,
                    length: 1
                },
                SessionEvent::Appended {
                    role: Role::Assistant,
                    length: 2
                },
                SessionEvent::Compacted { summarized: 2 },
                SessionEvent::Cleared,
            ]
        );
    }

    struct TurnBackend {
        reply: Result<String>,
        seen: Mutex<Vec<(String, Vec<Message>)>>,
    }

    impl TurnBackend {
        fn new(reply: Result<String>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Backend for TurnBackend {
        async fn try_send(
            &self,
            _: &str,
            user_message: &str,
            history: &[Message],
        ) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((user_message.to_string(), history.to_vec()));
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn exchange_records_successful_turn() {
        let config = ChatConfig::new().with_context_limit(2);
        let mut session = Session::new(Arc::new(config));
        let backend = TurnBackend::new(Ok("hi".to_string()));

        assert_eq!(session.exchange(backend.clone(), "sys", "first").await, "hi");
        assert_eq!(
            session.history(),
            &[Message::user("first"), Message::assistant("hi")]
        );

        session.exchange(backend.clone(), "sys", "second").await;
        session.exchange(backend.clone(), "sys", "third").await;
        assert_eq!(session.len(), 6);

        let seen = backend.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], ("first".to_string(), vec![]));
        assert_eq!(
            seen[2],
            (
                "third".to_string(),
                vec![Message::user("second"), Message::assistant("hi")]
            )
        );
    }

    #[tokio::test]
    async fn exchange_records_failed_turn() {
        let mut session = Session::default();
        let backend = TurnBackend::new(Err(Error::backend("boom")));

        let reply = session.exchange(backend, "", "are you there?").await;
        assert_eq!(reply, "[Ollama Error: boom]");
        assert_eq!(
            session.history(),
            &[
                Message::user("are you there?"),
                Message::assistant("[Ollama Error: boom]")
            ]
        );
    }

    #[tokio::test]
    async fn exchange_records_transport_failure() {
        let mut session = Session::default();
        let backend = TurnBackend::new(Err(Error::timeout("Request timed out", Some(1.0))));

        let reply = session.exchange(backend, "", "hello").await;
        assert!(reply.starts_with("[Error contacting Ollama backend: "));
        assert_eq!(session.len(), 2);
        assert_eq!(session.history()[1].content, reply);
    }
}
