//! Session state types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of one turn
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Created, user message not yet submitted
    #[default]
    Idle,

    /// Message submitted, backend deciding on / running searches
    Searching,

    /// Retrieved pages are being fetched and read
    Parsing {
        /// Fetch progress ratio in `[0, 1]`, if the backend reported one
        progress: Option<f64>,
    },

    /// Answer is being produced
    Generating {
        /// Set by the first answer fragment
        answer_started: bool,
    },

    /// Terminal: backend signalled completion
    Completed,

    /// Terminal: backend or transport failure
    Failed { error: BackendError },
}

impl SessionState {
    /// No further events are accepted
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed { .. })
    }

    #[must_use]
    pub fn answer_started(&self) -> bool {
        matches!(
            self,
            SessionState::Generating {
                answer_started: true
            }
        )
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Searching => "searching",
            SessionState::Parsing { .. } => "parsing",
            SessionState::Generating { .. } => "generating",
            SessionState::Completed => "completed",
            SessionState::Failed { .. } => "failed",
        }
    }
}

/// Failure classification for errors that reach the render sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Search batch or status explicitly reported an error
    Search,
    /// A tool result explicitly reported an error
    Tool,
    /// `error` event or failed answer fragment
    Generation,
    /// Transport closed without a terminal event
    ConnectionLost,
}

/// Error payload recorded on a failed session
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub error: String,
    pub details: Option<String>,
}

impl BackendError {
    #[must_use]
    pub fn new(kind: BackendErrorKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn search(error: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Search, error)
    }

    #[must_use]
    pub fn tool(error: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Tool, error)
    }

    #[must_use]
    pub fn generation(error: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Generation, error)
    }

    #[must_use]
    pub fn connection_lost() -> Self {
        Self::new(BackendErrorKind::ConnectionLost, "connection lost")
    }
}
