//! Incremental sentence segmentation
//!
//! The accumulated response text is re-tokenized after every fragment. A unit
//! becomes ready once it ends in terminal punctuation and has not been spoken
//! yet; ready units are cut out of the buffer by first occurrence, so text
//! before them that is not yet complete stays put.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::Result;

/// Marks that end a speakable unit
pub const TERMINAL_PUNCTUATION: [char; 10] = [',', '.', '!', '?', '，', '。', '！', '？', '#', '-'];

/// Words whose trailing period does not end a sentence
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "fig", "inc", "ltd", "co",
    "approx", "dept", "e.g", "i.e", "u.s", "a.m", "p.m",
];

/// Splits text into sentence-like units
pub trait SentenceTokenizer: Send + Sync {
    /// Split `text` into trimmed, non-empty units in reading order
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be tokenized
    fn split(&self, text: &str) -> Result<Vec<String>>;
}

/// UAX #29 sentence boundaries refined for speech
///
/// Boundaries after known abbreviations are undone, and clauses are split
/// after `,` `#` `-` followed by whitespace and after `，`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeSentenceTokenizer;

impl SentenceTokenizer for UnicodeSentenceTokenizer {
    fn split(&self, text: &str) -> Result<Vec<String>> {
        let mut sentences: Vec<&str> = Vec::new();
        let mut start: Option<usize> = None;

        for (offset, piece) in text.split_sentence_bound_indices() {
            let begin = *start.get_or_insert(offset);
            let end = offset + piece.len();

            if !continues_into_next(text[begin..end].trim_end()) {
                sentences.push(&text[begin..end]);
                start = None;
            }
        }
        if let Some(begin) = start {
            sentences.push(&text[begin..]);
        }

        Ok(sentences
            .into_iter()
            .flat_map(split_clauses)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}

/// Whether a sentence boundary after `sentence` should be undone
fn continues_into_next(sentence: &str) -> bool {
    sentence.ends_with('.') && last_word_is_abbreviation(sentence)
}

fn last_word(text: &str) -> &str {
    text.rsplit(char::is_whitespace)
        .next()
        .unwrap_or(text)
        .trim_start_matches(|c: char| !c.is_alphanumeric())
}

fn last_word_is_abbreviation(text: &str) -> bool {
    let word = last_word(text).trim_end_matches('.');
    !word.is_empty() && ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

/// Split after clause marks inside one sentence
fn split_clauses(sentence: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut begin = 0;
    let mut chars = sentence.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let next_is_space = chars.peek().is_some_and(|(_, n)| n.is_whitespace());
        let cut = c == '，' || (matches!(c, ',' | '#' | '-') && next_is_space);

        if cut {
            let end = idx + c.len_utf8();
            clauses.push(&sentence[begin..end]);
            begin = end;
        }
    }

    if begin < sentence.len() {
        clauses.push(&sentence[begin..]);
    }

    clauses
}

/// Ready sentences plus what is left of the buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    /// Sentences to speak now, in reading order
    pub ready: Vec<String>,
    /// Buffer with the ready sentences removed
    pub remainder: String,
}

/// Finds speakable sentences in a growing buffer
pub struct SentenceSegmenter {
    tokenizer: Box<dyn SentenceTokenizer>,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(Box::new(UnicodeSentenceTokenizer))
    }
}

impl SentenceSegmenter {
    /// Create a segmenter around a tokenizer
    #[must_use]
    pub fn new(tokenizer: Box<dyn SentenceTokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Extract sentences that are ready while more text may still arrive
    ///
    /// A final unit whose mark could still be continued by the next fragment
    /// (a known abbreviation, or a `,` `.` `-` `#` with nothing after it yet)
    /// is held back; [`Self::extract_final_sentences`] releases it once the
    /// stream has ended.
    #[must_use]
    pub fn extract_ready_sentences(&self, buffer: &str, spoken: &HashSet<String>) -> Segmentation {
        self.extract(buffer, spoken, false)
    }

    /// Extract sentences once the stream has ended
    ///
    /// The end of the buffer counts as a boundary. Text without terminal
    /// punctuation is still left in the remainder.
    #[must_use]
    pub fn extract_final_sentences(&self, buffer: &str, spoken: &HashSet<String>) -> Segmentation {
        self.extract(buffer, spoken, true)
    }

    fn extract(&self, buffer: &str, spoken: &HashSet<String>, at_end: bool) -> Segmentation {
        let units = match self.tokenizer.split(buffer) {
            Ok(units) => units,
            Err(e) => {
                tracing::warn!(error = %e, "sentence tokenizer failed, nothing ready");
                return Segmentation {
                    ready: Vec::new(),
                    remainder: buffer.to_string(),
                };
            }
        };

        let trailing_space = buffer.ends_with(char::is_whitespace);
        let last = units.len().saturating_sub(1);
        let mut ready: Vec<String> = Vec::new();
        let mut remainder = buffer.to_string();

        for (idx, unit) in units.into_iter().enumerate() {
            if !ends_with_terminal(&unit) || spoken.contains(&unit) || ready.contains(&unit) {
                continue;
            }

            if !at_end && idx == last && is_open_tail(&unit, trailing_space) {
                tracing::trace!(unit = %unit, "holding back open tail");
                continue;
            }

            remainder = remainder.replacen(unit.as_str(), "", 1);
            ready.push(unit);
        }

        Segmentation { ready, remainder }
    }
}

/// Whether `text` ends in terminal punctuation
#[must_use]
pub fn ends_with_terminal(text: &str) -> bool {
    text.chars()
        .next_back()
        .is_some_and(|c| TERMINAL_PUNCTUATION.contains(&c))
}

/// Whether the last unit of an open buffer may still grow
fn is_open_tail(unit: &str, trailing_space: bool) -> bool {
    if continues_into_next(unit) {
        return true;
    }

    !trailing_space && unit.ends_with([',', '.', '-', '#'])
}
