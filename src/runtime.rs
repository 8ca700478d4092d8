//! Async driver for one turn
//!
//! Opens the event stream for a request and feeds its frames, in order,
//! through the dispatcher until the session closes the transport, the
//! stream ends, or the turn is cancelled by a newer submission.

#[cfg(test)]
pub mod testing;

use crate::catalog::{ChatRequest, RequestId};
use crate::dispatcher::EventDispatcher;
use crate::render::RenderSink;
use crate::state_machine::SessionState;
use crate::transport::ChatTransport;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The session closed the stream or the backend ended it
    Finished,
    /// Cancelled before the stream ended; the session is left to be superseded
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub request_id: RequestId,
    pub outcome: TurnOutcome,
    /// Frames received, including dropped ones
    pub frames: usize,
    pub dropped: usize,
    /// Session state when the turn returned
    pub state: Option<SessionState>,
}

impl TurnReport {
    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self.state, Some(SessionState::Failed { .. }))
    }
}

/// Run one turn to completion or cancellation.
pub async fn run_turn<T, S>(
    transport: &T,
    dispatcher: &mut EventDispatcher<S>,
    request: ChatRequest,
    cancel: CancellationToken,
) -> TurnReport
where
    T: ChatTransport + ?Sized,
    S: RenderSink,
{
    let request_id = request.request_id.clone();
    dispatcher.begin(&request);

    let mut report = TurnReport {
        request_id: request_id.clone(),
        outcome: TurnOutcome::Finished,
        frames: 0,
        dropped: 0,
        state: None,
    };

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        opened = transport.open(&request) => Some(opened),
    };

    match opened {
        None => {
            tracing::info!(request_id = %request_id, "Turn cancelled while connecting");
            report.outcome = TurnOutcome::Cancelled;
        }
        Some(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to open chat stream");
            dispatcher.connection_closed(&request_id);
        }
        Some(Ok(mut frames)) => loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(request_id = %request_id, "Turn cancelled");
                    report.outcome = TurnOutcome::Cancelled;
                    break;
                }
                next = frames.next() => next,
            };

            match next {
                Some(Ok(frame)) => {
                    report.frames += 1;
                    let disposition = dispatcher.dispatch(&request_id, &frame);
                    if !disposition.is_applied() {
                        report.dropped += 1;
                    }
                    if disposition.closes_transport() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(request_id = %request_id, error = %e, "Chat stream failed");
                    dispatcher.connection_closed(&request_id);
                    break;
                }
                None => {
                    tracing::debug!(request_id = %request_id, "Chat stream ended");
                    dispatcher.connection_closed(&request_id);
                    break;
                }
            }
        },
    }

    report.state = dispatcher
        .active()
        .filter(|s| s.id() == &request_id)
        .map(|s| s.state().clone());
    report
}

#[cfg(test)]
mod tests {
    use super::testing::{Notification, RecordingSink, ScriptedTransport};
    use super::*;
    use crate::catalog::ToolSelection;
    use crate::dispatcher::Frame;
    use crate::state_machine::BackendErrorKind;
    use crate::transport::TransportError;

    fn request(id: &str) -> ChatRequest {
        ChatRequest::with_id("question", RequestId::new(id), ToolSelection::none()).unwrap()
    }

    fn frame(event: &str, data: &str) -> Result<Frame, TransportError> {
        Ok(Frame::new(event, data))
    }

    #[tokio::test]
    async fn test_turn_completes_and_stops_reading() {
        let transport = ScriptedTransport::new();
        transport.queue_stream(vec![
            frame("status", r#"{"status":"searching"}"#),
            frame("search_results", r#"{"results":[{"link":"a","title":"T1"}]}"#),
            frame("answer", r#"{"content":"Hello"}"#),
            frame("complete", r#"{"status":"completed"}"#),
            frame("answer", r#"{"content":" never read"}"#),
        ]);
        let mut dispatcher = EventDispatcher::new(RecordingSink::default());

        let report = run_turn(&transport, &mut dispatcher, request("r1"), CancellationToken::new()).await;

        assert_eq!(report.outcome, TurnOutcome::Finished);
        assert_eq!(report.frames, 4);
        assert_eq!(report.state, Some(SessionState::Completed));
        assert_eq!(dispatcher.active().unwrap().answer().text(), "Hello");
        assert_eq!(
            transport.opened_requests()[0].request_id,
            RequestId::new("r1")
        );
    }

    #[tokio::test]
    async fn test_stream_end_before_answer_is_connection_lost() {
        let transport = ScriptedTransport::new();
        transport.queue_stream(vec![frame("status", r#"{"status":"searching"}"#)]);
        let mut dispatcher = EventDispatcher::new(RecordingSink::default());

        let report = run_turn(&transport, &mut dispatcher, request("r1"), CancellationToken::new()).await;

        assert!(report.failed());
        let error = dispatcher.active().unwrap().last_error().unwrap();
        assert_eq!(error.kind, BackendErrorKind::ConnectionLost);
        assert_eq!(dispatcher.sink().count(|n| matches!(n, Notification::Failed(_))), 1);
    }

    #[tokio::test]
    async fn test_stream_error_mid_answer_is_interrupted() {
        let transport = ScriptedTransport::new();
        transport.queue_stream(vec![
            frame("answer", r#"{"content":"partial"}"#),
            Err(TransportError::Stream("connection reset".into())),
        ]);
        let mut dispatcher = EventDispatcher::new(RecordingSink::default());

        run_turn(&transport, &mut dispatcher, request("r1"), CancellationToken::new()).await;

        let sink = dispatcher.sink();
        assert_eq!(sink.count(|n| matches!(n, Notification::Interrupted { .. })), 1);
        assert_eq!(sink.count(|n| matches!(n, Notification::Failed(_))), 0);
        assert_eq!(dispatcher.active().unwrap().answer().text(), "partial");
    }

    #[tokio::test]
    async fn test_open_failure_fails_session() {
        let transport = ScriptedTransport::new();
        transport.queue_open_error(TransportError::Status {
            status: 503,
            body: "unavailable".into(),
        });
        let mut dispatcher = EventDispatcher::new(RecordingSink::default());

        let report = run_turn(&transport, &mut dispatcher, request("r1"), CancellationToken::new()).await;

        assert!(report.failed());
        assert_eq!(report.frames, 0);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_counted_and_skipped() {
        let transport = ScriptedTransport::new();
        transport.queue_stream(vec![
            frame("answer", "{"),
            frame("bogus", "{}"),
            frame("answer", r#"{"content":"ok"}"#),
            frame("complete", "{}"),
        ]);
        let mut dispatcher = EventDispatcher::new(RecordingSink::default());

        let report = run_turn(&transport, &mut dispatcher, request("r1"), CancellationToken::new()).await;

        assert_eq!(report.dropped, 2);
        assert_eq!(report.state, Some(SessionState::Completed));
        assert_eq!(dispatcher.active().unwrap().answer().text(), "ok");
    }

    #[tokio::test]
    async fn test_cancelled_turn_is_superseded_by_next() {
        let transport = ScriptedTransport::new();
        transport.queue_hanging_stream(vec![frame("answer", r#"{"content":"stale"}"#)]);
        transport.queue_stream(vec![
            frame("answer", r#"{"content":"fresh"}"#),
            frame("complete", "{}"),
        ]);
        let mut dispatcher = EventDispatcher::new(RecordingSink::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let (first, ()) = tokio::join!(
            run_turn(&transport, &mut dispatcher, request("old"), cancel),
            async move {
                tokio::task::yield_now().await;
                trigger.cancel();
            }
        );
        assert_eq!(first.outcome, TurnOutcome::Cancelled);
        assert!(!first.state.unwrap().is_terminal());

        let second = run_turn(&transport, &mut dispatcher, request("new"), CancellationToken::new()).await;

        assert_eq!(second.state, Some(SessionState::Completed));
        let session = dispatcher.active().unwrap();
        assert_eq!(session.id().as_str(), "new");
        assert_eq!(session.answer().text(), "fresh");
    }
}
