//! Render sink contract and the terminal implementation
//!
//! The core only notifies; how (and whether) something is drawn is up to
//! the sink.

use crate::references::{FetchStatus, ReferenceEntry};
use crate::state_machine::{BackendError, Phase};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Write;

/// Default character cap for opaque tool output
pub const DEFAULT_TOOL_OUTPUT_LIMIT: usize = 1000;

const ELLIPSIS: &str = "...";

/// Normalized content of a `tool_result` event
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    /// Search-shaped results, also merged into the reference store
    References(Vec<ReferenceEntry>),
    /// Any other tool: a labeled block, never merged as references
    Opaque(OpaqueBlock),
}

/// Labeled tool output shown as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueBlock {
    pub label: String,
    pub body: String,
}

impl OpaqueBlock {
    /// Strings are kept verbatim; anything else is pretty-printed JSON.
    #[must_use]
    pub fn from_value(label: impl Into<String>, value: &Value) -> Self {
        let body = match value {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        Self {
            label: label.into(),
            body,
        }
    }

    #[must_use]
    pub fn truncated(&self, max_chars: usize) -> Cow<'_, str> {
        truncate_chars(&self.body, max_chars)
    }
}

/// Cut `text` to `max_chars` characters, marking the cut with an ellipsis.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + ELLIPSIS.len());
            out.push_str(text.get(..cut).unwrap_or(text));
            out.push_str(ELLIPSIS);
            Cow::Owned(out)
        }
    }
}

/// Consumer of session state changes. Receives one call per mutation and
/// never mutates the session.
pub trait RenderSink {
    /// A new session began; anything shown for the previous one is stale.
    fn on_session_reset(&mut self) {}

    fn on_status_changed(&mut self, phase: &Phase, message: Option<&str>, progress: Option<f64>);

    fn on_references_replaced(&mut self, entries: &[ReferenceEntry]);

    /// `ordinal` is the entry's stable insertion position
    fn on_reference_upserted(&mut self, entry: &ReferenceEntry, ordinal: usize, is_new: bool);

    /// First fragment of the answer arrived. Called once per session.
    fn on_answer_started(&mut self) {}

    fn on_answer_appended(&mut self, full_text: &str);

    fn on_tool_result_rendered(&mut self, tool_name: &str, content: &ToolContent);

    fn on_failed(&mut self, error: &BackendError);

    /// Stream dropped after part of the answer arrived; the partial answer
    /// stands as the result.
    fn on_interrupted(&mut self, _partial_answer: &str) {}

    fn on_completed(&mut self);
}

impl<T: RenderSink + ?Sized> RenderSink for Box<T> {
    fn on_session_reset(&mut self) {
        (**self).on_session_reset();
    }

    fn on_status_changed(&mut self, phase: &Phase, message: Option<&str>, progress: Option<f64>) {
        (**self).on_status_changed(phase, message, progress);
    }

    fn on_references_replaced(&mut self, entries: &[ReferenceEntry]) {
        (**self).on_references_replaced(entries);
    }

    fn on_reference_upserted(&mut self, entry: &ReferenceEntry, ordinal: usize, is_new: bool) {
        (**self).on_reference_upserted(entry, ordinal, is_new);
    }

    fn on_answer_started(&mut self) {
        (**self).on_answer_started();
    }

    fn on_answer_appended(&mut self, full_text: &str) {
        (**self).on_answer_appended(full_text);
    }

    fn on_tool_result_rendered(&mut self, tool_name: &str, content: &ToolContent) {
        (**self).on_tool_result_rendered(tool_name, content);
    }

    fn on_failed(&mut self, error: &BackendError) {
        (**self).on_failed(error);
    }

    fn on_interrupted(&mut self, partial_answer: &str) {
        (**self).on_interrupted(partial_answer);
    }

    fn on_completed(&mut self) {
        (**self).on_completed();
    }
}

// ============================================================================
// Terminal sink
// ============================================================================

/// Streams the answer to `out` and everything else to `diag`.
pub struct TerminalSink<O: Write, D: Write> {
    out: O,
    diag: D,
    /// Bytes of the answer already written to `out`
    printed: usize,
    /// Ordinals already listed, in reveal order
    revealed: HashSet<usize>,
    tool_output_limit: usize,
}

impl TerminalSink<std::io::Stdout, std::io::Stderr> {
    #[must_use]
    pub fn stdio(tool_output_limit: usize) -> Self {
        Self::new(std::io::stdout(), std::io::stderr(), tool_output_limit)
    }
}

impl<O: Write, D: Write> TerminalSink<O, D> {
    #[must_use]
    pub fn new(out: O, diag: D, tool_output_limit: usize) -> Self {
        Self {
            out,
            diag,
            printed: 0,
            revealed: HashSet::new(),
            tool_output_limit,
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (O, D) {
        (self.out, self.diag)
    }

    fn diag_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.diag, "{line}").and_then(|()| self.diag.flush()) {
            tracing::debug!(error = %e, "Failed to write diagnostic line");
        }
    }

    fn reveal(&mut self, entry: &ReferenceEntry, ordinal: usize) {
        if !self.revealed.insert(ordinal) {
            return;
        }
        let mut line = format!("  [{}] {}", ordinal + 1, entry.title);
        if let Some(link) = &entry.link {
            line.push_str(" <");
            line.push_str(link);
            line.push('>');
        }
        if !entry.authors.is_empty() {
            line.push_str(" - ");
            line.push_str(&entry.authors.join(", "));
        }
        if let Some(published) = &entry.published {
            line.push_str(" (");
            line.push_str(published);
            line.push(')');
        }
        self.diag_line(&line);
    }
}

impl<O: Write, D: Write> RenderSink for TerminalSink<O, D> {
    fn on_session_reset(&mut self) {
        self.printed = 0;
        self.revealed.clear();
    }

    fn on_status_changed(&mut self, phase: &Phase, message: Option<&str>, progress: Option<f64>) {
        let label = message.unwrap_or_else(|| phase.as_str());
        let line = match progress {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some(ratio) => format!("~ {label} ({}%)", (ratio * 100.0).round() as u32),
            None => format!("~ {label}"),
        };
        self.diag_line(&line);
    }

    fn on_references_replaced(&mut self, entries: &[ReferenceEntry]) {
        self.revealed.clear();
        if entries.is_empty() {
            self.diag_line("~ no references");
            return;
        }
        self.diag_line(&format!("~ {} references", entries.len()));
        for (ordinal, entry) in entries.iter().enumerate() {
            self.reveal(entry, ordinal);
        }
    }

    fn on_reference_upserted(&mut self, entry: &ReferenceEntry, ordinal: usize, is_new: bool) {
        if is_new {
            self.reveal(entry, ordinal);
            return;
        }
        match entry.fetch_status {
            Some(FetchStatus::Completed) => {
                self.diag_line(&format!("  [{}] read", ordinal + 1));
            }
            Some(FetchStatus::Error) => {
                let reason = entry.fetch_error.as_deref().unwrap_or("fetch failed");
                self.diag_line(&format!("  [{}] unreadable: {reason}", ordinal + 1));
            }
            _ => {}
        }
    }

    fn on_answer_started(&mut self) {
        self.printed = 0;
        self.diag_line("");
    }

    fn on_answer_appended(&mut self, full_text: &str) {
        let Some(delta) = full_text.get(self.printed..) else {
            return;
        };
        if let Err(e) = self
            .out
            .write_all(delta.as_bytes())
            .and_then(|()| self.out.flush())
        {
            tracing::debug!(error = %e, "Failed to write answer text");
        }
        self.printed = full_text.len();
    }

    fn on_tool_result_rendered(&mut self, tool_name: &str, content: &ToolContent) {
        match content {
            ToolContent::References(entries) => {
                self.diag_line(&format!("~ {tool_name}: {} results", entries.len()));
            }
            ToolContent::Opaque(block) => {
                let body = block.truncated(self.tool_output_limit).into_owned();
                self.diag_line(&format!("~ {}:\n{body}", block.label));
            }
        }
    }

    fn on_failed(&mut self, error: &BackendError) {
        match &error.details {
            Some(details) => self.diag_line(&format!("error: {} ({details})", error.error)),
            None => self.diag_line(&format!("error: {}", error.error)),
        }
    }

    fn on_interrupted(&mut self, _partial_answer: &str) {
        self.diag_line("\n~ connection lost; answer may be incomplete");
    }

    fn on_completed(&mut self) {
        if let Err(e) = writeln!(self.out).and_then(|()| self.out.flush()) {
            tracing::debug!(error = %e, "Failed to finish answer line");
        }
    }
}
