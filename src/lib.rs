//! Research chat client
//!
//! Reconciles the server-sent event stream of a search-and-answer backend
//! into one coherent session per question: a phase, an ordered set of
//! references, and an answer that grows fragment by fragment.

pub mod answer;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod references;
pub mod render;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod transport;

pub use catalog::{ChatRequest, RequestId, ToolCatalog, ToolSelection};
pub use config::ClientConfig;
pub use dispatcher::{EventDispatcher, Frame};
pub use error::{Error, Result};
pub use render::{RenderSink, TerminalSink};
pub use session::Session;
