//! One question/answer turn: owns its state, answer buffer and references
//!
//! `Session` is the executor half of the state machine. Transitions are
//! computed by `state_machine::transition`; the session applies the
//! resulting effects to the stores it owns and notifies the render sink.

use crate::answer::AnswerAccumulator;
use crate::catalog::{ChatRequest, RequestId, ToolSelection};
use crate::references::ReferenceStore;
use crate::render::RenderSink;
use crate::state_machine::{transition, BackendError, Effect, Event, SessionState, TransitionError};

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// The transport for this session should be closed
    pub close_transport: bool,
}

#[derive(Debug)]
pub struct Session {
    id: RequestId,
    state: SessionState,
    selected_tools: ToolSelection,
    answer: AnswerAccumulator,
    references: ReferenceStore,
}

impl Session {
    /// Create the session for `request` and submit it.
    pub fn start<S: RenderSink + ?Sized>(request: &ChatRequest, sink: &mut S) -> Self {
        let mut session = Self {
            id: request.request_id.clone(),
            state: SessionState::Idle,
            selected_tools: request.selected_tools.clone(),
            answer: AnswerAccumulator::new(),
            references: ReferenceStore::new(),
        };
        if let Err(e) = session.apply(Event::UserSubmit, sink) {
            // Unreachable from Idle; keep the session usable regardless
            tracing::error!(request_id = %session.id, error = %e, "Submit rejected");
        }
        session
    }

    /// Fold one event into the session.
    ///
    /// # Errors
    ///
    /// Returns the [`TransitionError`] when the current state rejects the
    /// event; the session is left untouched.
    pub fn apply<S: RenderSink + ?Sized>(
        &mut self,
        event: Event,
        sink: &mut S,
    ) -> Result<Applied, TransitionError> {
        let event_name = event.name();
        let result = transition(&self.state, event)?;

        if result.new_state.name() != self.state.name() {
            tracing::debug!(
                request_id = %self.id,
                event = event_name,
                from = self.state.name(),
                to = result.new_state.name(),
                "Session transition"
            );
        }
        self.state = result.new_state;

        let mut close_transport = false;
        for effect in result.effects {
            close_transport |= self.execute(effect, sink);
        }
        Ok(Applied { close_transport })
    }

    /// Execute one effect; returns true when the transport should close.
    fn execute<S: RenderSink + ?Sized>(&mut self, effect: Effect, sink: &mut S) -> bool {
        match effect {
            Effect::ResetSession => {
                self.answer = AnswerAccumulator::new();
                self.references.clear();
                sink.on_session_reset();
            }
            Effect::ReplaceReferences { entries } => {
                self.references.replace_all(entries);
                sink.on_references_replaced(self.references.entries());
            }
            Effect::UpsertReference { entry } => match self.references.upsert(entry) {
                Ok(outcome) => {
                    if let Some(stored) = self.references.get(outcome.ordinal()) {
                        sink.on_reference_upserted(stored, outcome.ordinal(), outcome.is_new());
                    }
                }
                Err(e) => {
                    tracing::debug!(request_id = %self.id, error = %e, "Dropping reference");
                }
            },
            Effect::AppendAnswer { fragment } => {
                let full = self.answer.append(&fragment);
                sink.on_answer_appended(full);
            }
            Effect::NotifyStatus {
                phase,
                message,
                progress,
            } => sink.on_status_changed(&phase, message.as_deref(), progress),
            Effect::NotifyAnswerStarted => sink.on_answer_started(),
            Effect::NotifyToolResult { tool_name, content } => {
                sink.on_tool_result_rendered(&tool_name, &content);
            }
            Effect::NotifyFailed { error } => {
                tracing::warn!(
                    request_id = %self.id,
                    kind = ?error.kind,
                    error = %error.error,
                    details = error.details.as_deref().unwrap_or(""),
                    "Session failed"
                );
                sink.on_failed(&error);
            }
            Effect::NotifyInterrupted => {
                tracing::warn!(
                    request_id = %self.id,
                    partial_len = self.answer.text().len(),
                    "Connection lost mid-answer"
                );
                sink.on_interrupted(self.answer.text());
            }
            Effect::NotifyCompleted => sink.on_completed(),
            Effect::CloseTransport => return true,
        }
        false
    }

    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn selected_tools(&self) -> &ToolSelection {
        &self.selected_tools
    }

    #[must_use]
    pub fn answer(&self) -> &AnswerAccumulator {
        &self.answer
    }

    #[must_use]
    pub fn references(&self) -> &ReferenceStore {
        &self.references
    }

    /// Set only while the session is Failed
    #[must_use]
    pub fn last_error(&self) -> Option<&BackendError> {
        match &self.state {
            SessionState::Failed { error } => Some(error),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
