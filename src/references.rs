//! De-duplicated, insertion-ordered collection of retrieved sources

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Where a reference came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Web,
    ArxivPaper,
    GenericTool,
}

/// Page-fetch progress reported by the backend for web results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    Fetching,
    Completed,
    Error,
}

/// Identity of an entry inside one store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceKey {
    Link(String),
    /// Linkless entries (answer boxes, generic tool items) key off the
    /// ordinal the store assigned them on insert.
    Slot { kind: SourceKind, slot: usize },
}

/// A single retrieved source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub source_kind: SourceKind,
    pub link: Option<String>,
    /// Store-assigned ordinal, used as identity when `link` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
    pub title: String,
    /// Snippet for web results, abstract for papers
    pub snippet: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub is_answer_box: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_status: Option<FetchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

impl ReferenceEntry {
    #[must_use]
    pub fn new(source_kind: SourceKind, link: impl Into<String>, title: impl Into<String>) -> Self {
        let link = link.into();
        Self {
            source_kind,
            link: if link.is_empty() { None } else { Some(link) },
            slot: None,
            title: title.into(),
            snippet: String::new(),
            authors: Vec::new(),
            published: None,
            source: None,
            is_answer_box: false,
            fetch_status: None,
            fetch_error: None,
        }
    }

    #[must_use]
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    fn has_link(&self) -> bool {
        self.link.as_deref().is_some_and(|link| !link.is_empty())
    }

    /// Identity key: the link, else the store-assigned slot.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::MissingKey`] when the entry has neither.
    pub fn key(&self) -> Result<ReferenceKey, ReferenceError> {
        match (&self.link, self.slot) {
            (Some(link), _) if !link.is_empty() => Ok(ReferenceKey::Link(link.clone())),
            (_, Some(slot)) => Ok(ReferenceKey::Slot {
                kind: self.source_kind,
                slot,
            }),
            _ => Err(ReferenceError::MissingKey {
                title: self.title.clone(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("reference {title:?} has neither a link nor a slot")]
    MissingKey { title: String },
    #[error("reference {title:?} names slot {slot}, which this store never assigned")]
    UnknownSlot { title: String, slot: usize },
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted(usize),
    Updated(usize),
}

impl Upsert {
    #[must_use]
    pub fn ordinal(self) -> usize {
        match self {
            Upsert::Inserted(ordinal) | Upsert::Updated(ordinal) => ordinal,
        }
    }

    #[must_use]
    pub fn is_new(self) -> bool {
        matches!(self, Upsert::Inserted(_))
    }
}

/// Ordered reference collection. Ordinals are insertion positions and are
/// never reassigned while the entry stays in the store.
#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    entries: Vec<ReferenceEntry>,
    index: HashMap<ReferenceKey, usize>,
}

impl ReferenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or replace the fields of the entry with the same key in place.
    ///
    /// A linkless entry without a slot is always new and is assigned the
    /// next ordinal as its slot. A linkless entry carrying a slot updates the
    /// entry stored under it.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::UnknownSlot`] when a linkless entry names a
    /// slot this store never assigned.
    pub fn upsert(&mut self, mut entry: ReferenceEntry) -> Result<Upsert, ReferenceError> {
        let ordinal = self.entries.len();
        if !entry.has_link() && entry.slot.is_none() {
            entry.slot = Some(ordinal);
        }
        let key = entry.key()?;
        if let Some(&existing) = self.index.get(&key) {
            self.entries[existing] = entry;
            return Ok(Upsert::Updated(existing));
        }
        if let ReferenceKey::Slot { slot, .. } = key {
            if slot != ordinal {
                return Err(ReferenceError::UnknownSlot {
                    title: entry.title,
                    slot,
                });
            }
        }
        self.entries.push(entry);
        self.index.insert(key, ordinal);
        Ok(Upsert::Inserted(ordinal))
    }

    /// Clear and repopulate from a fresh batch. Duplicate links inside the
    /// batch collapse onto their first position; linkless entries get fresh
    /// slots in batch order. The swap happens only once the whole batch is
    /// folded.
    pub fn replace_all(&mut self, entries: impl IntoIterator<Item = ReferenceEntry>) {
        let mut fresh = ReferenceStore::new();
        for mut entry in entries {
            if !entry.has_link() {
                entry.slot = None;
            }
            if let Err(e) = fresh.upsert(entry) {
                tracing::debug!(error = %e, "Dropping reference");
            }
        }
        *self = fresh;
    }

    /// Stable position of an entry with the same key, if present
    #[must_use]
    pub fn ordinal_for(&self, entry: &ReferenceEntry) -> Option<usize> {
        let key = entry.key().ok()?;
        self.index.get(&key).copied()
    }

    #[must_use]
    pub fn get(&self, ordinal: usize) -> Option<&ReferenceEntry> {
        self.entries.get(ordinal)
    }

    #[must_use]
    pub fn get_by_link(&self, link: &str) -> Option<&ReferenceEntry> {
        self.index
            .get(&ReferenceKey::Link(link.to_string()))
            .and_then(|&ordinal| self.entries.get(ordinal))
    }

    /// Entries in insertion order
    #[must_use]
    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
