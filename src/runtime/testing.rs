//! Mock implementations for testing
//!
//! A scripted transport that replays queued frame streams, and a sink
//! that records every notification it receives.

use crate::catalog::{ChatRequest, ToolCatalog, ToolDescriptor};
use crate::dispatcher::Frame;
use crate::references::ReferenceEntry;
use crate::render::{RenderSink, ToolContent};
use crate::state_machine::{BackendError, Phase};
use crate::transport::{ChatTransport, FrameStream, TransportError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// Recording sink
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SessionReset,
    Status {
        phase: Phase,
        message: Option<String>,
        progress: Option<f64>,
    },
    ReferencesReplaced(Vec<ReferenceEntry>),
    ReferenceUpserted {
        entry: ReferenceEntry,
        ordinal: usize,
        is_new: bool,
    },
    AnswerStarted,
    AnswerAppended(String),
    ToolResult {
        tool_name: String,
        content: ToolContent,
    },
    Failed(BackendError),
    Interrupted {
        partial: String,
    },
    Completed,
}

/// Sink that keeps every notification in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub notifications: Vec<Notification>,
}

impl RecordingSink {
    /// Full answer text after each append
    #[must_use]
    pub fn answer_snapshots(&self) -> Vec<String> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                Notification::AnswerAppended(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.notifications.iter().filter(|n| pred(n)).count()
    }
}

impl RenderSink for RecordingSink {
    fn on_session_reset(&mut self) {
        self.notifications.push(Notification::SessionReset);
    }

    fn on_status_changed(&mut self, phase: &Phase, message: Option<&str>, progress: Option<f64>) {
        self.notifications.push(Notification::Status {
            phase: phase.clone(),
            message: message.map(String::from),
            progress,
        });
    }

    fn on_references_replaced(&mut self, entries: &[ReferenceEntry]) {
        self.notifications
            .push(Notification::ReferencesReplaced(entries.to_vec()));
    }

    fn on_reference_upserted(&mut self, entry: &ReferenceEntry, ordinal: usize, is_new: bool) {
        self.notifications.push(Notification::ReferenceUpserted {
            entry: entry.clone(),
            ordinal,
            is_new,
        });
    }

    fn on_answer_started(&mut self) {
        self.notifications.push(Notification::AnswerStarted);
    }

    fn on_answer_appended(&mut self, full_text: &str) {
        self.notifications
            .push(Notification::AnswerAppended(full_text.to_string()));
    }

    fn on_tool_result_rendered(&mut self, tool_name: &str, content: &ToolContent) {
        self.notifications.push(Notification::ToolResult {
            tool_name: tool_name.to_string(),
            content: content.clone(),
        });
    }

    fn on_failed(&mut self, error: &BackendError) {
        self.notifications.push(Notification::Failed(error.clone()));
    }

    fn on_interrupted(&mut self, partial_answer: &str) {
        self.notifications.push(Notification::Interrupted {
            partial: partial_answer.to_string(),
        });
    }

    fn on_completed(&mut self) {
        self.notifications.push(Notification::Completed);
    }
}

// ============================================================================
// Scripted transport
// ============================================================================

enum Script {
    Stream {
        items: Vec<Result<Frame, TransportError>>,
        /// Stay open after the last item instead of ending
        hang: bool,
    },
    OpenError(TransportError),
}

/// Transport that replays queued scripts, one per `open`
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    catalog: Vec<ToolDescriptor>,
    opened: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::with_catalog(Vec::new())
    }

    #[must_use]
    pub fn with_catalog(catalog: Vec<ToolDescriptor>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            catalog,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Queue a stream that ends after its items
    pub fn queue_stream(&self, items: Vec<Result<Frame, TransportError>>) {
        self.push(Script::Stream { items, hang: false });
    }

    /// Queue a stream that stays open after its items
    pub fn queue_hanging_stream(&self, items: Vec<Result<Frame, TransportError>>) {
        self.push(Script::Stream { items, hang: true });
    }

    pub fn queue_open_error(&self, error: TransportError) {
        self.push(Script::OpenError(error));
    }

    /// Requests passed to `open`, in order
    #[must_use]
    pub fn opened_requests(&self) -> Vec<ChatRequest> {
        self.opened.lock().unwrap().clone()
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn fetch_tools(&self) -> Result<ToolCatalog, TransportError> {
        Ok(ToolCatalog::new(self.catalog.clone()))
    }

    async fn open(&self, request: &ChatRequest) -> Result<FrameStream, TransportError> {
        self.opened.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();

        match script {
            Some(Script::Stream { items, hang: false }) => Ok(Box::pin(stream::iter(items))),
            Some(Script::Stream { items, hang: true }) => {
                Ok(Box::pin(stream::iter(items).chain(stream::pending())))
            }
            Some(Script::OpenError(error)) => Err(error),
            None => Err(TransportError::Stream("no scripted stream".to_string())),
        }
    }
}
