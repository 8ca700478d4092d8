//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::transition::clamp_progress;
use super::*;
use crate::answer::AnswerAccumulator;
use crate::catalog::{ChatRequest, RequestId, ToolSelection};
use crate::dispatcher::{EventDispatcher, Frame};
use crate::references::{ReferenceEntry, ReferenceStore, SourceKind};
use crate::render::{OpaqueBlock, ToolContent};
use crate::runtime::testing::RecordingSink;
use crate::session::Session;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Searching),
        Just(Phase::FetchStart),
        Just(Phase::Parsing),
        Just(Phase::FetchProgress),
        Just(Phase::FetchCompleted),
        Just(Phase::ParsingCompleted),
        Just(Phase::FunctionCompleted),
        Just(Phase::Generating),
        Just(Phase::Completed),
        Just(Phase::Error),
        "[a-z]{3,8}".prop_map(|raw| Phase::parse(&raw)),
    ]
}

fn arb_entry() -> impl Strategy<Value = ReferenceEntry> {
    ("[a-c]", "[A-Z][a-z]{0,6}", "[a-z ]{0,12}").prop_map(|(link, title, snippet)| {
        ReferenceEntry::new(SourceKind::Web, link, title).with_snippet(snippet)
    })
}

fn arb_backend_error() -> impl Strategy<Value = BackendError> {
    prop_oneof![
        "[a-z ]{1,12}".prop_map(BackendError::search),
        "[a-z ]{1,12}".prop_map(BackendError::tool),
        "[a-z ]{1,12}".prop_map(BackendError::generation),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::UserSubmit),
        (arb_phase(), proptest::option::of(-1.0f64..2.0)).prop_map(|(phase, progress)| {
            Event::Status {
                phase,
                message: None,
                progress: progress.and_then(clamp_progress),
            }
        }),
        proptest::collection::vec(arb_entry(), 0..4).prop_map(|e| Event::SearchResults(Ok(e))),
        arb_entry().prop_map(|entry| Event::SearchResultUpdate { entry }),
        proptest::collection::vec(arb_entry(), 0..3).prop_map(|entries| Event::ToolResult {
            tool_name: "search_web".to_string(),
            outcome: Ok(ToolContent::References(entries)),
            message: None,
        }),
        "[a-z]{1,6}".prop_map(|body| Event::ToolResult {
            tool_name: "calculator".to_string(),
            outcome: Ok(ToolContent::Opaque(OpaqueBlock {
                label: "calculator".to_string(),
                body,
            })),
            message: None,
        }),
        "[a-zA-Z ]{0,8}".prop_map(|text| Event::Answer(Ok(text))),
        arb_backend_error().prop_map(Event::Error),
        Just(Event::Complete),
        Just(Event::ConnectionClosed),
    ]
}

fn arb_terminal_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Completed),
        arb_backend_error().prop_map(|error| SessionState::Failed { error }),
        Just(SessionState::Failed {
            error: BackendError::connection_lost()
        }),
    ]
}

fn request(id: &str) -> ChatRequest {
    ChatRequest::with_id("question", RequestId::new(id), ToolSelection::none()).unwrap()
}

fn is_valid_state(state: &SessionState) -> bool {
    match state {
        SessionState::Parsing {
            progress: Some(p),
        } => (0.0..=1.0).contains(p),
        _ => true,
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Terminal states accept nothing
    #[test]
    fn prop_terminal_states_absorb_every_event(state in arb_terminal_state(), event in arb_event()) {
        let result = transition(&state, event);
        let is_closed = matches!(result, Err(TransitionError::SessionClosed { .. }));
        prop_assert!(is_closed);
    }

    // Random sequences never leave a terminal state, never regress from a
    // started answer, and only close the transport on entering a terminal state
    #[test]
    fn prop_transitions_preserve_validity(events in proptest::collection::vec(arb_event(), 0..25)) {
        let mut state = SessionState::Searching;

        for event in events {
            let was_terminal = state.is_terminal();
            let was_answering = state.answer_started();
            match transition(&state, event) {
                Ok(result) => {
                    prop_assert!(!was_terminal, "terminal state accepted an event");
                    prop_assert!(is_valid_state(&result.new_state), "invalid state {:?}", result.new_state);
                    if was_answering && !result.new_state.is_terminal() {
                        prop_assert!(result.new_state.answer_started());
                    }
                    prop_assert_eq!(result.closes_transport(), result.new_state.is_terminal());
                    state = result.new_state;
                }
                Err(_) => { /* Rejected events leave the state untouched */ }
            }
        }
    }

    // The answer is always the in-order concatenation of accepted fragments
    #[test]
    fn prop_answer_is_concatenation(fragments in proptest::collection::vec("[a-zA-Z .]{0,10}", 0..20)) {
        let mut sink = RecordingSink::default();
        let mut session = Session::start(&request("r1"), &mut sink);

        for fragment in &fragments {
            session.apply(Event::Answer(Ok(fragment.clone())), &mut sink).unwrap();
        }

        prop_assert_eq!(session.answer().text(), fragments.concat());
        let mut direct = AnswerAccumulator::new();
        for fragment in &fragments {
            direct.append(fragment);
        }
        prop_assert_eq!(direct.text(), session.answer().text());
    }

    // Upserting an entry twice is the same as upserting it once
    #[test]
    fn prop_upsert_is_idempotent(
        seed in proptest::collection::vec(arb_entry(), 0..5),
        entry in arb_entry(),
    ) {
        let mut once = ReferenceStore::new();
        once.replace_all(seed.clone());
        let first = once.upsert(entry.clone()).unwrap();

        let mut twice = ReferenceStore::new();
        twice.replace_all(seed);
        twice.upsert(entry.clone()).unwrap();
        let second = twice.upsert(entry).unwrap();

        prop_assert_eq!(once.entries(), twice.entries());
        prop_assert_eq!(first.ordinal(), second.ordinal());
        prop_assert!(!second.is_new());
    }

    // Nothing sent on a superseded id reaches the active session
    #[test]
    fn prop_superseded_frames_are_isolated(
        frames in proptest::collection::vec(
            (
                prop_oneof![Just("answer"), Just("complete"), Just("error"), Just("status")],
                prop_oneof![
                    Just(r#"{"content":"x"}"#),
                    Just(r#"{"error":"boom"}"#),
                    Just(r#"{"status":"parsing"}"#),
                    Just("{}"),
                ],
            ),
            0..10,
        )
    ) {
        let mut dispatcher = EventDispatcher::new(RecordingSink::default());
        let old = request("old");
        dispatcher.begin(&old);
        dispatcher.begin(&request("new"));
        let before = dispatcher.sink().notifications.len();

        for (event, data) in frames {
            dispatcher.dispatch(&old.request_id, &Frame::new(event, data));
        }
        dispatcher.connection_closed(&old.request_id);

        let session = dispatcher.active().unwrap();
        prop_assert_eq!(session.state(), &SessionState::Searching);
        prop_assert!(session.answer().is_empty());
        prop_assert_eq!(dispatcher.sink().notifications.len(), before);
    }

    #[test]
    fn prop_progress_is_clamped(ratio in proptest::num::f64::ANY) {
        match clamp_progress(ratio) {
            Some(p) => prop_assert!((0.0..=1.0).contains(&p)),
            None => prop_assert!(ratio.is_nan()),
        }
    }
}
