//! Frame decoding and routing for the active session
//!
//! Frames are processed strictly in arrival order, one at a time, with no
//! buffering. Malformed and superseded frames are absorbed here and never
//! reach the session.

mod normalize;
pub mod wire;

pub use normalize::{SEARCH_ARXIV, SEARCH_WEB};

use crate::catalog::{ChatRequest, RequestId};
use crate::render::RenderSink;
use crate::session::Session;
use crate::state_machine::transition::clamp_progress;
use crate::state_machine::{BackendError, Event, Phase, TransitionError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use wire::{
    AnswerPayload, ErrorPayload, SearchResultUpdatePayload, SearchResultsPayload, StatusPayload,
    ToolResultPayload,
};

/// One named event + payload unit from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Recognized event tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag {
    Status,
    SearchResults,
    SearchResultUpdate,
    ToolResult,
    Answer,
    Error,
    Complete,
}

impl FromStr for EventTag {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(EventTag::Status),
            "search_results" => Ok(EventTag::SearchResults),
            "search_result_update" => Ok(EventTag::SearchResultUpdate),
            "tool_result" => Ok(EventTag::ToolResult),
            "answer" => Ok(EventTag::Answer),
            "error" => Ok(EventTag::Error),
            "complete" => Ok(EventTag::Complete),
            other => Err(DispatchError::UnknownEventType(other.to_string())),
        }
    }
}

/// Why a frame could not be turned into an event
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown event type: {0:?}")]
    UnknownEventType(String),
    #[error("empty payload")]
    EmptyPayload,
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("{tag:?} payload has an unexpected shape: {source}")]
    InvalidShape {
        tag: EventTag,
        source: serde_json::Error,
    },
    #[error("search result update has no link")]
    UnkeyedUpdate,
}

/// Decode and validate one frame.
///
/// # Errors
///
/// Returns a [`DispatchError`] for unknown tags, payloads that are empty,
/// not JSON objects or of the wrong shape, and updates without a link.
pub fn decode_frame(frame: &Frame) -> Result<Event, DispatchError> {
    let tag: EventTag = frame.event.trim().parse()?;

    let data = frame.data.trim();
    if data.is_empty() {
        return Err(DispatchError::EmptyPayload);
    }
    let value: Value = serde_json::from_str(data)?;
    if !value.is_object() {
        return Err(DispatchError::NotAnObject);
    }

    match tag {
        EventTag::Status => {
            let payload: StatusPayload = shaped(tag, value)?;
            Ok(Event::Status {
                phase: Phase::parse(&payload.status),
                message: payload.message,
                progress: payload
                    .progress
                    .as_ref()
                    .and_then(wire::progress_ratio)
                    .and_then(clamp_progress),
            })
        }
        EventTag::SearchResults => {
            let payload: SearchResultsPayload = shaped(tag, value)?;
            if payload.status.as_deref() == Some("error") {
                let error = payload
                    .message
                    .or(payload.error)
                    .unwrap_or_else(|| "search failed".to_string());
                return Ok(Event::SearchResults(Err(BackendError::search(error))));
            }
            let items = payload.results.unwrap_or_default();
            Ok(Event::SearchResults(Ok(normalize::web_entries(&items))))
        }
        EventTag::SearchResultUpdate => {
            let payload: SearchResultUpdatePayload = shaped(tag, value)?;
            match normalize::web_entry(&payload.result) {
                Some(entry) if entry.link.is_some() => Ok(Event::SearchResultUpdate { entry }),
                _ => Err(DispatchError::UnkeyedUpdate),
            }
        }
        EventTag::ToolResult => {
            let payload: ToolResultPayload = shaped(tag, value)?;
            let outcome =
                normalize::tool_content(&payload.tool_name, &payload.result, payload.message.as_deref());
            Ok(Event::ToolResult {
                tool_name: payload.tool_name,
                outcome,
                message: payload.message,
            })
        }
        EventTag::Answer => {
            let payload: AnswerPayload = shaped(tag, value)?;
            if payload.status.as_deref() == Some("error") {
                let error = payload
                    .error
                    .or(payload.content)
                    .unwrap_or_else(|| "generation failed".to_string());
                return Ok(Event::Answer(Err(BackendError::generation(error))));
            }
            Ok(Event::Answer(Ok(payload.content.unwrap_or_default())))
        }
        EventTag::Error => {
            let payload: ErrorPayload = shaped(tag, value)?;
            let text = payload
                .error
                .as_ref()
                .map(wire::value_text)
                .or(payload.message)
                .unwrap_or_else(|| "unknown error".to_string());
            let mut error = BackendError::generation(text);
            if let Some(details) = payload.details.as_ref().filter(|d| !d.is_null()) {
                error = error.with_details(wire::value_text(details));
            }
            Ok(Event::Error(error))
        }
        EventTag::Complete => Ok(Event::Complete),
    }
}

fn shaped<T: DeserializeOwned>(tag: EventTag, value: Value) -> Result<T, DispatchError> {
    serde_json::from_value(value).map_err(|source| DispatchError::InvalidShape { tag, source })
}

/// What happened to a frame
#[derive(Debug)]
pub enum Disposition {
    Applied { close_transport: bool },
    Dropped(DropReason),
}

impl Disposition {
    #[must_use]
    pub fn closes_transport(&self) -> bool {
        matches!(
            self,
            Disposition::Applied {
                close_transport: true
            }
        )
    }

    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Disposition::Applied { .. })
    }
}

#[derive(Debug)]
pub enum DropReason {
    /// Frame belongs to a session that is no longer active
    Superseded,
    Malformed(DispatchError),
    /// The session refused the event (terminal, or not started)
    Rejected(TransitionError),
}

/// Routes frames into the single active session
pub struct EventDispatcher<S: RenderSink> {
    sink: S,
    active: Option<Session>,
}

impl<S: RenderSink> EventDispatcher<S> {
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self { sink, active: None }
    }

    /// Start a session for `request`, invalidating the current one.
    ///
    /// Returns the id of the previous session when it was still live, so
    /// the caller can close its transport.
    pub fn begin(&mut self, request: &ChatRequest) -> Option<RequestId> {
        let superseded = self
            .active
            .take()
            .filter(|old| !old.is_terminal())
            .map(|old| old.id().clone());
        if let Some(old) = &superseded {
            tracing::info!(superseded = %old, request_id = %request.request_id, "Superseding live session");
        }
        self.active = Some(Session::start(request, &mut self.sink));
        superseded
    }

    /// Process one frame received on `request_id`'s stream.
    pub fn dispatch(&mut self, request_id: &RequestId, frame: &Frame) -> Disposition {
        let Some(session) = live_session(&mut self.active, request_id) else {
            tracing::trace!(request_id = %request_id, event = %frame.event, "Dropping superseded frame");
            return Disposition::Dropped(DropReason::Superseded);
        };

        let event = match decode_frame(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    request_id = %request_id,
                    event = %frame.event,
                    reason = %e,
                    "Dropping malformed frame"
                );
                return Disposition::Dropped(DropReason::Malformed(e));
            }
        };

        Self::apply(session, event, &mut self.sink)
    }

    /// The transport for `request_id` ended. Terminal sessions ignore this.
    pub fn connection_closed(&mut self, request_id: &RequestId) -> Disposition {
        let Some(session) = live_session(&mut self.active, request_id) else {
            return Disposition::Dropped(DropReason::Superseded);
        };
        Self::apply(session, Event::ConnectionClosed, &mut self.sink)
    }

    fn apply(session: &mut Session, event: Event, sink: &mut S) -> Disposition {
        let event_name = event.name();
        match session.apply(event, sink) {
            Ok(applied) => Disposition::Applied {
                close_transport: applied.close_transport,
            },
            Err(e) => {
                tracing::debug!(
                    request_id = %session.id(),
                    event = event_name,
                    reason = %e,
                    "Session ignored event"
                );
                Disposition::Dropped(DropReason::Rejected(e))
            }
        }
    }

    #[must_use]
    pub fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn live_session<'a>(active: &'a mut Option<Session>, request_id: &RequestId) -> Option<&'a mut Session> {
    active.as_mut().filter(|s| s.id() == request_id)
}
