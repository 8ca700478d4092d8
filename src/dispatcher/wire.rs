//! Payload shapes of the event stream, as the backend sends them
//!
//! Everything is lenient: optional fields default, `null` reads as absent,
//! and field-name variants between backend revisions are folded together.

use serde::Deserialize;
use serde_json::Value;

/// `status` frame
#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    #[serde(alias = "phase")]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Bare ratio or `{total, completed, percentage}`
    #[serde(default)]
    pub progress: Option<Value>,
}

/// `search_results` frame
#[derive(Debug, Deserialize)]
pub struct SearchResultsPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<Value>>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `search_result_update` frame
#[derive(Debug, Deserialize)]
pub struct SearchResultUpdatePayload {
    pub result: Value,
}

/// `tool_result` frame
#[derive(Debug, Deserialize)]
pub struct ToolResultPayload {
    #[serde(alias = "toolName")]
    pub tool_name: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub message: Option<String>,
}

/// `answer` frame
#[derive(Debug, Deserialize)]
pub struct AnswerPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `error` frame
#[derive(Debug, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// A web search hit, before or after its page was fetched
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebResult {
    pub title: Option<String>,
    pub content: Option<String>,
    pub snippet: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub date: Option<String>,
    pub source: Option<String>,
    pub is_answer_box: bool,
    pub fetch_status: Option<String>,
    pub error: Option<String>,
}

/// An arXiv paper
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaperResult {
    pub paper_id: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    /// Array of names or one comma-separated string
    pub authors: Option<Value>,
    pub submitted: Option<String>,
    pub published: Option<String>,
    pub link: Option<String>,
    pub pdf_url: Option<String>,
}

/// Progress ratio from either progress shape, before clamping
#[must_use]
pub fn progress_ratio(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => {
            let field = |name: &str| map.get(name).and_then(Value::as_f64);
            match (field("completed"), field("total")) {
                (Some(completed), Some(total)) if total > 0.0 => Some(completed / total),
                _ => field("percentage").map(|p| p / 100.0),
            }
        }
        _ => None,
    }
}

/// Render an arbitrary JSON value as a message string
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
