/// Characters that end a spoken sentence.
///
/// Plain membership, so "3.5mm" or "Dr." also end one.
pub const SENTENCE_TERMINATORS: [char; 5] = ['.', '?', '!', ';', ':'];

pub fn contains_terminator(text: &str) -> bool {
    text.contains(SENTENCE_TERMINATORS)
}

/// Accumulates streamed text until it holds a sentence worth speaking.
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    pending: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the trimmed pending text if it now
    /// contains a terminator. The buffer is empty after a flush.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.pending.push_str(fragment);

        if contains_terminator(&self.pending) {
            let sentence = self.pending.trim().to_string();
            self.pending.clear();
            Some(sentence)
        } else {
            None
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
