//! Connection to the search/answer backend
//!
//! The runtime only sees `ChatTransport`; `HttpTransport` is the real
//! implementation and tests use the scripted mock in `runtime::testing`.

pub mod http;
pub mod sse;

pub use http::HttpTransport;

use crate::catalog::{ChatRequest, ToolCatalog};
use crate::dispatcher::Frame;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Frames of one session's event stream, in arrival order
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid UTF-8 in event stream: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("invalid backend url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Opens event streams and fetches the tool catalog
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn fetch_tools(&self) -> Result<ToolCatalog, TransportError>;

    /// Open the event stream for one request. The stream ends when the
    /// backend closes the connection.
    async fn open(&self, request: &ChatRequest) -> Result<FrameStream, TransportError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn fetch_tools(&self) -> Result<ToolCatalog, TransportError> {
        (**self).fetch_tools().await
    }

    async fn open(&self, request: &ChatRequest) -> Result<FrameStream, TransportError> {
        (**self).open(request).await
    }
}
