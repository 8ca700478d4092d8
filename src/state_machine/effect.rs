//! Effects produced by state transitions

use super::event::Phase;
use super::state::BackendError;
use crate::references::ReferenceEntry;
use crate::render::ToolContent;

/// Effects to be executed by the session after a transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Empty the answer buffer and the reference store
    ResetSession,

    /// Swap the reference store for a new batch
    ReplaceReferences { entries: Vec<ReferenceEntry> },

    /// Insert or update one reference
    UpsertReference { entry: ReferenceEntry },

    /// Append a fragment to the answer buffer
    AppendAnswer { fragment: String },

    NotifyStatus {
        phase: Phase,
        message: Option<String>,
        progress: Option<f64>,
    },

    /// First fragment arrived; clear transient answer-area indicators
    NotifyAnswerStarted,

    NotifyToolResult {
        tool_name: String,
        content: ToolContent,
    },

    NotifyFailed { error: BackendError },

    /// Stream dropped after part of the answer arrived
    NotifyInterrupted,

    NotifyCompleted,

    /// Tell the transport layer to stop reading
    CloseTransport,
}

impl Effect {
    #[must_use]
    pub fn status(phase: Phase, message: Option<String>, progress: Option<f64>) -> Self {
        Effect::NotifyStatus {
            phase,
            message,
            progress,
        }
    }

    #[must_use]
    pub fn failed(error: BackendError) -> Self {
        Effect::NotifyFailed { error }
    }

    #[must_use]
    pub fn append(fragment: impl Into<String>) -> Self {
        Effect::AppendAnswer {
            fragment: fragment.into(),
        }
    }
}
