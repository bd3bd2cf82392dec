//! Wake word matching on transcripts

/// Matches a configured wake word inside recognized text
#[derive(Debug, Clone)]
pub struct WakeWord {
    word: String,
}

impl WakeWord {
    /// Create a matcher for `word`
    #[must_use]
    pub fn new(word: &str) -> Self {
        let word = word.trim().to_lowercase();
        tracing::debug!(wake_word = %word, "wake word configured");
        Self { word }
    }

    /// The normalized wake word
    #[must_use]
    pub fn word(&self) -> &str {
        &self.word
    }

    /// Whether the transcript contains the wake word anywhere
    #[must_use]
    pub fn detect(&self, transcript: &str) -> bool {
        !self.word.is_empty() && transcript.to_lowercase().contains(&self.word)
    }
}
