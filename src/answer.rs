//! Append-only buffer for the streamed answer

/// Answer text for one session, formed by concatenating fragments in
/// arrival order. Only a new session starts a new buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerAccumulator {
    text: String,
}

impl AnswerAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the full text so far.
    pub fn append(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        &self.text
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
