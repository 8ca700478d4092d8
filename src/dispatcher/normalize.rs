//! Normalization of search and tool results into reference entries

use super::wire::{value_text, PaperResult, WebResult};
use crate::references::{FetchStatus, ReferenceEntry, SourceKind};
use crate::render::{OpaqueBlock, ToolContent};
use crate::state_machine::BackendError;
use serde_json::Value;

pub const SEARCH_WEB: &str = "search_web";
pub const SEARCH_ARXIV: &str = "search_arxiv";

/// Normalize a batch of raw web hits. Non-object items are skipped;
/// linkless items are left for the store to assign a slot.
pub fn web_entries(items: &[Value]) -> Vec<ReferenceEntry> {
    items.iter().filter_map(web_entry).collect()
}

pub fn paper_entries(items: &[Value]) -> Vec<ReferenceEntry> {
    items.iter().filter_map(paper_entry).collect()
}

pub fn web_entry(item: &Value) -> Option<ReferenceEntry> {
    if !item.is_object() {
        tracing::debug!(item = %item, "Skipping non-object web result");
        return None;
    }
    let hit: WebResult = match serde_json::from_value(item.clone()) {
        Ok(hit) => hit,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed web result");
            return None;
        }
    };

    let mut entry = ReferenceEntry::new(
        SourceKind::Web,
        hit.link.unwrap_or_default(),
        hit.title.unwrap_or_default(),
    )
    .with_snippet(hit.content.or(hit.snippet).or(hit.description).unwrap_or_default());
    entry.published = hit.date;
    entry.source = hit.source.filter(|s| !s.is_empty());
    entry.is_answer_box = hit.is_answer_box;
    entry.fetch_status = hit.fetch_status.as_deref().and_then(parse_fetch_status);
    entry.fetch_error = hit.error;
    Some(entry)
}

pub fn paper_entry(item: &Value) -> Option<ReferenceEntry> {
    if !item.is_object() {
        tracing::debug!(item = %item, "Skipping non-object paper result");
        return None;
    }
    let paper: PaperResult = match serde_json::from_value(item.clone()) {
        Ok(paper) => paper,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed paper result");
            return None;
        }
    };

    let link = paper
        .link
        .or(paper.pdf_url)
        .or_else(|| paper.paper_id.map(|id| format!("https://arxiv.org/abs/{id}")))
        .unwrap_or_default();
    let mut entry = ReferenceEntry::new(SourceKind::ArxivPaper, link, paper.title.unwrap_or_default())
        .with_snippet(
            paper
                .abstract_text
                .or(paper.content)
                .or(paper.summary)
                .unwrap_or_default(),
        );
    entry.authors = paper.authors.as_ref().map(authors).unwrap_or_default();
    entry.published = paper.submitted.or(paper.published).filter(|s| !s.is_empty());
    Some(entry)
}

fn authors(value: &Value) -> Vec<String> {
    match value {
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Value::String(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_fetch_status(raw: &str) -> Option<FetchStatus> {
    match raw {
        "pending" => Some(FetchStatus::Pending),
        "fetching" => Some(FetchStatus::Fetching),
        "completed" => Some(FetchStatus::Completed),
        "error" => Some(FetchStatus::Error),
        _ => None,
    }
}

/// Demultiplex a tool result by tool name.
///
/// Search tools become reference batches; anything else becomes an opaque
/// labeled block. A result object with `status: "error"` is a tool failure
/// regardless of the tool.
pub fn tool_content(
    tool_name: &str,
    result: &Value,
    message: Option<&str>,
) -> Result<ToolContent, BackendError> {
    if let Some(error) = envelope_error(result, message) {
        return Err(BackendError::tool(error).with_details(tool_name));
    }
    match tool_name {
        SEARCH_WEB => Ok(ToolContent::References(web_entries(envelope_items(result)))),
        SEARCH_ARXIV => Ok(ToolContent::References(paper_entries(envelope_items(result)))),
        other => Ok(ToolContent::Opaque(OpaqueBlock::from_value(other, result))),
    }
}

fn envelope_error(result: &Value, message: Option<&str>) -> Option<String> {
    let map = result.as_object()?;
    if map.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }
    let text = map
        .get("message")
        .or_else(|| map.get("error"))
        .map(value_text)
        .or_else(|| message.map(String::from))
        .unwrap_or_else(|| "tool failed".to_string());
    Some(text)
}

/// Items of a bare array or of a `{data: [...]}` / `{results: [...]}` envelope
fn envelope_items(result: &Value) -> &[Value] {
    match result {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("data")
            .or_else(|| map.get("results"))
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
        _ => &[],
    }
}
