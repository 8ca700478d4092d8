//! Typed events folded into a session

use super::state::BackendError;
use crate::references::ReferenceEntry;
use crate::render::ToolContent;

/// Backend phase carried by a `status` frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Searching,
    FetchStart,
    Parsing,
    FetchProgress,
    FetchCompleted,
    ParsingCompleted,
    /// A non-search tool finished
    FunctionCompleted,
    Generating,
    Completed,
    Error,
    /// Unrecognised phase, forwarded as a plain status message
    Other(String),
}

impl Phase {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "searching" => Phase::Searching,
            "fetch_start" => Phase::FetchStart,
            "parsing" => Phase::Parsing,
            "fetch_progress" | "fetching_progress" => Phase::FetchProgress,
            "fetch_completed" => Phase::FetchCompleted,
            "parsing_completed" => Phase::ParsingCompleted,
            "function_completed" => Phase::FunctionCompleted,
            "generating" => Phase::Generating,
            "completed" => Phase::Completed,
            "error" => Phase::Error,
            other => Phase::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Searching => "searching",
            Phase::FetchStart => "fetch_start",
            Phase::Parsing => "parsing",
            Phase::FetchProgress => "fetch_progress",
            Phase::FetchCompleted => "fetch_completed",
            Phase::ParsingCompleted => "parsing_completed",
            Phase::FunctionCompleted => "function_completed",
            Phase::Generating => "generating",
            Phase::Completed => "completed",
            Phase::Error => "error",
            Phase::Other(name) => name.as_str(),
        }
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// User submitted the message that opens this session
    UserSubmit,

    Status {
        phase: Phase,
        message: Option<String>,
        /// Already clamped to `[0, 1]`
        progress: Option<f64>,
    },

    /// A fresh batch superseding any earlier one
    SearchResults(Result<Vec<ReferenceEntry>, BackendError>),

    SearchResultUpdate { entry: ReferenceEntry },

    ToolResult {
        tool_name: String,
        outcome: Result<ToolContent, BackendError>,
        message: Option<String>,
    },

    Answer(Result<String, BackendError>),

    Error(BackendError),

    Complete,

    /// Transport ended; terminal sessions ignore it
    ConnectionClosed,
}

impl Event {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserSubmit => "user_submit",
            Event::Status { .. } => "status",
            Event::SearchResults(_) => "search_results",
            Event::SearchResultUpdate { .. } => "search_result_update",
            Event::ToolResult { .. } => "tool_result",
            Event::Answer(_) => "answer",
            Event::Error(_) => "error",
            Event::Complete => "complete",
            Event::ConnectionClosed => "connection_closed",
        }
    }
}
