//! reqwest-backed transport

use super::{sse, ChatTransport, FrameStream, TransportError};
use crate::catalog::{ChatRequest, ToolCatalog, ToolCatalogResponse};
use crate::config::ClientConfig;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, Url};

pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] for a bad backend url and
    /// [`TransportError::Http`] when the client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let base_url = parse_base_url(&config.backend_url)?;
        // No overall timeout: a stream stays open for the whole answer
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }
}

/// Parse the base url, making sure relative joins keep its path.
fn parse_base_url(raw: &str) -> Result<Url, TransportError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| TransportError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(TransportError::InvalidUrl {
            url: raw.to_string(),
            reason: "not a base url".to_string(),
        });
    }
    Ok(url)
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn fetch_tools(&self) -> Result<ToolCatalog, TransportError> {
        let url = self.endpoint("api/tools")?;
        tracing::debug!(url = %url, "Fetching tool catalog");

        let response = check_status(self.client.get(url).send().await?).await?;
        let body: ToolCatalogResponse = response.json().await?;
        Ok(ToolCatalog::new(body.tools))
    }

    async fn open(&self, request: &ChatRequest) -> Result<FrameStream, TransportError> {
        let url = self.endpoint("api/chat")?;
        tracing::info!(
            request_id = %request.request_id,
            tools = %request.selected_tools.to_query_value(),
            "Opening chat stream"
        );

        let response = self
            .client
            .get(url)
            .query(&request.query_pairs())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        let bytes = response.bytes_stream().map_err(TransportError::from);
        Ok(Box::pin(sse::frames(bytes)))
    }
}
