//! Output rendering for the chat REPL.
//!
//! This module provides the renderer trait and a plain-text implementation
//! with optional ANSI styling.

use std::io::{self, Write};
use std::time::Duration;

use crate::client::is_error_marker;

/// ANSI escape code for dim text (used for the progress line and latency).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for command status).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code that erases the current line.
const ANSI_CLEAR_LINE: &str = "\x1b[2K";

/// Frames cycled by the progress indicator.
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Print an assistant reply. Error markers are shown as errors.
    fn print_reply(&mut self, text: &str);

    /// Print the status text returned by a slash command.
    fn print_status(&mut self, status: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Redraw the "waiting for the backend" line; `tick` advances the spinner.
    fn print_progress(&mut self, tick: usize, elapsed: Duration) {
        _ = tick;
        _ = elapsed;
    }

    /// Remove the progress line, if one is shown.
    fn clear_progress(&mut self) {}

    /// Print how long the backend took to answer.
    fn print_latency(&mut self, elapsed: Duration) {
        _ = elapsed;
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// This renderer writes to stdout unless another writer is supplied.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    use_color: bool,
    progress_shown: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(Box::new(io::stdout()), use_color)
    }

    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: Box<dyn Write + Send>, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            progress_shown: false,
        }
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn line(&mut self, text: &str) {
        self.clear_progress();
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_reply(&mut self, text: &str) {
        if is_error_marker(text) {
            self.print_error(text);
            return;
        }
        let label = self.styled(ANSI_CYAN, "DeltaStrik:");
        self.line(&format!("{label} {text}\n"));
    }

    fn print_status(&mut self, status: &str) {
        let status = self.styled(ANSI_YELLOW, status);
        self.line(&status);
    }

    fn print_info(&mut self, info: &str) {
        self.line(info);
    }

    fn print_error(&mut self, error: &str) {
        let error = self.styled(ANSI_RED, error);
        self.line(&error);
    }

    fn print_progress(&mut self, tick: usize, elapsed: Duration) {
        let frame = SPINNER[tick % SPINNER.len()];
        let text = format!("{frame} thinking... {:.1}s", elapsed.as_secs_f64());
        let text = self.styled(ANSI_DIM, &text);
        if self.use_color {
            let _ = write!(self.out, "\r{ANSI_CLEAR_LINE}{text}");
        } else {
            let _ = write!(self.out, "\r{text}");
        }
        let _ = self.out.flush();
        self.progress_shown = true;
    }

    fn clear_progress(&mut self) {
        if !self.progress_shown {
            return;
        }
        if self.use_color {
            let _ = write!(self.out, "\r{ANSI_CLEAR_LINE}");
        } else {
            let _ = writeln!(self.out);
        }
        let _ = self.out.flush();
        self.progress_shown = false;
    }

    fn print_latency(&mut self, elapsed: Duration) {
        let text = format!("({:.2}s)", elapsed.as_secs_f64());
        let text = self.styled(ANSI_DIM, &text);
        self.line(&text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn renderer(use_color: bool) -> (PlainTextRenderer, Capture) {
        let capture = Capture::default();
        (
            PlainTextRenderer::with_writer(Box::new(capture.clone()), use_color),
            capture,
        )
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn plain_reply_has_label() {
        let (mut renderer, capture) = renderer(false);
        renderer.print_reply("hello");
        assert_eq!(capture.text(), "DeltaStrik: hello\n\n");
    }

    #[test]
    fn error_markers_render_as_errors() {
        let (mut renderer, capture) = renderer(true);
        renderer.print_reply("[Ollama Error: boom]");
        let text = capture.text();
        assert!(text.starts_with(ANSI_RED));
        assert!(!text.contains("DeltaStrik:"));
    }

    #[test]
    fn progress_is_cleared_before_output() {
        let (mut renderer, capture) = renderer(false);
        renderer.print_progress(1, Duration::from_millis(1500));
        renderer.print_status("Chat cleared.");
        assert_eq!(capture.text(), "\r/ thinking... 1.5s\nChat cleared.\n");
    }
}
