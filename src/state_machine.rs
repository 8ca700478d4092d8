//! Session state machine for one streamed question/answer turn
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `transition` decides, `Session` executes the resulting effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{Event, Phase};
pub use state::{BackendError, BackendErrorKind, SessionState};
pub use transition::{transition, TransitionError, TransitionResult};
