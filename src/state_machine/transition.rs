//! Pure state transition function
//!
//! Given the same state and event this always produces the same new state
//! and effects; executing the effects is the session's job.

use super::{BackendError, Effect, Event, Phase, SessionState};
use crate::render::ToolContent;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    #[must_use]
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Whether the transport should stop reading after this transition
    #[must_use]
    pub fn closes_transport(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, Effect::CloseTransport))
    }
}

/// Events the machine refuses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("session has not been submitted yet")]
    NotStarted,
    #[error("session was already submitted")]
    AlreadyStarted,
    #[error("session is {state}; no further events are accepted")]
    SessionClosed { state: &'static str },
}

/// Pure transition function
///
/// # Errors
///
/// Returns a [`TransitionError`] for events the current state refuses:
/// anything before submit, a second submit, and every event once terminal.
pub fn transition(state: &SessionState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Lifecycle boundaries
        // ============================================================
        (SessionState::Idle, Event::UserSubmit) => Ok(TransitionResult::new(SessionState::Searching)
            .with_effect(Effect::ResetSession)
            .with_effect(Effect::status(Phase::Searching, None, None))),

        (state, _) if state.is_terminal() => Err(TransitionError::SessionClosed {
            state: state.name(),
        }),

        (SessionState::Idle, _) => Err(TransitionError::NotStarted),

        (_, Event::UserSubmit) => Err(TransitionError::AlreadyStarted),

        // ============================================================
        // Terminal signals, accepted in every non-terminal state
        // ============================================================
        (
            _,
            Event::Complete
            | Event::Status {
                phase: Phase::Completed,
                ..
            },
        ) => Ok(completed()),

        (
            _,
            Event::Error(error)
            | Event::Answer(Err(error))
            | Event::SearchResults(Err(error))
            | Event::ToolResult {
                outcome: Err(error),
                ..
            },
        ) => Ok(failed(error)),

        (
            _,
            Event::Status {
                phase: Phase::Error,
                message,
                ..
            },
        ) => Ok(failed(BackendError::search(
            message.unwrap_or_else(|| "search failed".to_string()),
        ))),

        (state, Event::ConnectionClosed) => {
            let error = BackendError::connection_lost();
            if state.answer_started() {
                // Keep the partial answer as the result instead of an error
                Ok(TransitionResult::new(SessionState::Failed { error })
                    .with_effect(Effect::NotifyInterrupted)
                    .with_effect(Effect::CloseTransport))
            } else {
                Ok(failed(error))
            }
        }

        // ============================================================
        // Answer streaming
        // ============================================================
        (state, Event::Answer(Ok(fragment))) => {
            if fragment.is_empty() {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut result = TransitionResult::new(SessionState::Generating {
                answer_started: true,
            });
            if !state.answer_started() {
                result = result.with_effect(Effect::NotifyAnswerStarted);
            }
            Ok(result.with_effect(Effect::append(fragment)))
        }

        // ============================================================
        // Reference folding, state unchanged
        // ============================================================
        (state, Event::SearchResults(Ok(entries))) => Ok(TransitionResult::new(state.clone())
            .with_effect(Effect::ReplaceReferences { entries })),

        (state, Event::SearchResultUpdate { entry }) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::UpsertReference { entry }))
        }

        (
            state,
            Event::ToolResult {
                tool_name,
                outcome: Ok(content),
                ..
            },
        ) => {
            let upserts = match &content {
                ToolContent::References(entries) => entries
                    .iter()
                    .cloned()
                    .map(|entry| Effect::UpsertReference { entry })
                    .collect(),
                ToolContent::Opaque(_) => Vec::new(),
            };
            Ok(TransitionResult::new(state.clone())
                .with_effects(upserts)
                .with_effect(Effect::NotifyToolResult { tool_name, content }))
        }

        // ============================================================
        // Status phases
        // ============================================================
        (
            state,
            Event::Status {
                phase,
                message,
                progress,
            },
        ) => Ok(status_transition(state, phase, message, progress)),
    }
}

fn status_transition(
    state: &SessionState,
    phase: Phase,
    message: Option<String>,
    progress: Option<f64>,
) -> TransitionResult {
    match (state, phase) {
        // Once text is flowing, status messages would cover the answer area
        (
            SessionState::Generating {
                answer_started: true,
            },
            _,
        ) => TransitionResult::new(state.clone()),

        // The backend announces generating before its tool calls run, so
        // search phases are still shown but never move the state back
        (SessionState::Generating { .. }, phase) => TransitionResult::new(state.clone())
            .with_effect(Effect::status(phase, message, progress)),

        (_, phase @ Phase::Generating) => TransitionResult::new(SessionState::Generating {
            answer_started: false,
        })
        .with_effect(Effect::status(phase, message, None)),

        (SessionState::Searching, phase @ Phase::Searching) => {
            TransitionResult::new(SessionState::Searching)
                .with_effect(Effect::status(phase, message, None))
        }

        (_, phase @ (Phase::FetchStart | Phase::Parsing)) => {
            let kept = current_progress(state);
            TransitionResult::new(SessionState::Parsing { progress: kept })
                .with_effect(Effect::status(phase, message, kept))
        }

        (_, phase @ Phase::FetchProgress) => {
            let progress = progress.or_else(|| current_progress(state));
            TransitionResult::new(SessionState::Parsing { progress })
                .with_effect(Effect::status(phase, message, progress))
        }

        (
            _,
            phase @ (Phase::FetchCompleted | Phase::ParsingCompleted | Phase::FunctionCompleted),
        ) => TransitionResult::new(SessionState::Parsing { progress: None })
            .with_effect(Effect::status(phase, message, None)),

        // Searching again while parsing, or an unknown phase: message only
        (_, phase) => TransitionResult::new(state.clone())
            .with_effect(Effect::status(phase, message, current_progress(state))),
    }
}

fn current_progress(state: &SessionState) -> Option<f64> {
    match state {
        SessionState::Parsing { progress } => *progress,
        _ => None,
    }
}

fn completed() -> TransitionResult {
    TransitionResult::new(SessionState::Completed)
        .with_effect(Effect::NotifyCompleted)
        .with_effect(Effect::CloseTransport)
}

fn failed(error: BackendError) -> TransitionResult {
    TransitionResult::new(SessionState::Failed {
        error: error.clone(),
    })
    .with_effect(Effect::failed(error))
    .with_effect(Effect::CloseTransport)
}

/// Clamp a reported progress ratio into `[0, 1]`, dropping NaN
#[must_use]
pub fn clamp_progress(ratio: f64) -> Option<f64> {
    if ratio.is_nan() {
        None
    } else {
        Some(ratio.clamp(0.0, 1.0))
    }
}
