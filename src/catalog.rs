//! Tool catalog and the outgoing chat request

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A backend capability advertised by `/api/tools`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Response body of the catalog endpoint
#[derive(Debug, Deserialize)]
pub struct ToolCatalogResponse {
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("message must not be empty")]
    EmptyMessage,
}

/// Tools the backend offers, fetched once before any session
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    #[must_use]
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Every advertised tool
    #[must_use]
    pub fn select_all(&self) -> ToolSelection {
        ToolSelection::from_names(self.tools.iter().map(|t| t.name.clone()))
    }

    /// Select by name; every name must be in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTool`] for the first name the catalog
    /// does not offer.
    pub fn select<I, S>(&self, names: I) -> Result<ToolSelection, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut picked = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if !self.contains(name) {
                return Err(CatalogError::UnknownTool(name.to_string()));
            }
            picked.push(name.to_string());
        }
        Ok(ToolSelection::from_names(picked))
    }
}

/// Tool names attached to one request, de-duplicated, in selection order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSelection(Vec<String>);

impl ToolSelection {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Self(out)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire form of `selected_tools`
    #[must_use]
    pub fn to_query_value(&self) -> String {
        self.0.join(",")
    }
}

/// Caller-supplied identifier, unique per turn
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request that opens one session's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub request_id: RequestId,
    pub selected_tools: ToolSelection,
}

impl ChatRequest {
    /// Build a request with a fresh id
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyMessage`] for a blank message.
    pub fn new(message: impl Into<String>, selected_tools: ToolSelection) -> Result<Self, CatalogError> {
        Self::with_id(message, RequestId::generate(), selected_tools)
    }

    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyMessage`] for a blank message.
    pub fn with_id(
        message: impl Into<String>,
        request_id: RequestId,
        selected_tools: ToolSelection,
    ) -> Result<Self, CatalogError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(CatalogError::EmptyMessage);
        }
        Ok(Self {
            message,
            request_id,
            selected_tools,
        })
    }

    /// Query parameters; `selected_tools` is omitted when nothing is selected
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("message", self.message.clone()),
            ("request_id", self.request_id.to_string()),
        ];
        if !self.selected_tools.is_empty() {
            pairs.push(("selected_tools", self.selected_tools.to_query_value()));
        }
        pairs
    }
}
