//! Streaming response dispatch
//!
//! Fragments are consumed strictly in order and every ready sentence is
//! handed to the sink before the next fragment is read, so speech follows
//! generation order and the microphone never overlaps playback.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use super::segmenter::SentenceSegmenter;
use crate::Result;
use crate::llm::{FragmentBody, ResponseFragment};
use crate::voice::SpeechSynthesizer;

/// Receives each ready sentence
#[async_trait(?Send)]
pub trait SentenceSink {
    /// Handle one sentence, resolving when it has been spoken
    ///
    /// # Errors
    ///
    /// Returns error if the sentence could not be delivered
    async fn on_sentence(&self, sentence: &str) -> Result<()>;
}

#[async_trait(?Send)]
impl<T: SpeechSynthesizer + ?Sized> SentenceSink for T {
    async fn on_sentence(&self, sentence: &str) -> Result<()> {
        self.speak(sentence).await
    }
}

/// Outcome of one dispatched response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Text left in the buffer, never spoken
    pub remainder: String,
    /// Sentences handed to the sink, in order
    pub sentences: Vec<String>,
    /// Whether the stream ended normally
    pub completed: bool,
}

/// Turns one response stream into sentences
///
/// Owns the accumulation buffer and spoken set of a single response; consumed
/// by [`StreamDispatcher::run`].
pub struct StreamDispatcher<'a> {
    segmenter: &'a SentenceSegmenter,
    buffer: String,
    spoken: HashSet<String>,
    sentences: Vec<String>,
}

impl<'a> StreamDispatcher<'a> {
    /// Create a dispatcher for one response
    #[must_use]
    pub fn new(segmenter: &'a SentenceSegmenter) -> Self {
        Self {
            segmenter,
            buffer: String::new(),
            spoken: HashSet::new(),
            sentences: Vec::new(),
        }
    }

    /// Consume `fragments` to the end, speaking sentences as they complete
    ///
    /// Malformed fragments are skipped. A stream error stops consumption and
    /// the unspoken remainder is discarded. Sink failures are logged and
    /// dispatch continues with the next sentence.
    pub async fn run<S>(
        mut self,
        fragments: impl Stream<Item = Result<ResponseFragment>>,
        sink: &S,
    ) -> DispatchSummary
    where
        S: SentenceSink + ?Sized,
    {
        let mut fragments = std::pin::pin!(fragments);
        let mut completed = true;

        while let Some(item) = fragments.next().await {
            let fragment = match item {
                Ok(fragment) => fragment,
                Err(e) => {
                    tracing::error!(error = %e, "response stream failed");
                    completed = false;
                    break;
                }
            };

            let Some(content) = Self::content_of(&fragment) else {
                continue;
            };

            self.buffer.push_str(&content);
            let segmentation = self
                .segmenter
                .extract_ready_sentences(&self.buffer, &self.spoken);
            self.buffer = segmentation.remainder;
            self.emit(segmentation.ready, sink).await;
        }

        if completed {
            let segmentation = self
                .segmenter
                .extract_final_sentences(&self.buffer, &self.spoken);
            self.buffer = segmentation.remainder;
            self.emit(segmentation.ready, sink).await;
        }

        if !self.buffer.trim().is_empty() {
            tracing::debug!(remainder = %self.buffer.trim(), "unspoken remainder discarded");
        }

        DispatchSummary {
            remainder: self.buffer,
            sentences: self.sentences,
            completed,
        }
    }

    fn content_of(fragment: &ResponseFragment) -> Option<String> {
        match fragment.body() {
            Ok(FragmentBody::Delta {
                content: Some(content),
                ..
            }) if !content.is_empty() => Some(content),
            Ok(FragmentBody::Delta {
                finish_reason: Some(reason),
                ..
            }) => {
                tracing::debug!(reason = %reason, "response finished");
                None
            }
            Ok(FragmentBody::Delta { .. }) => {
                tracing::warn!("no content found in fragment");
                None
            }
            Ok(FragmentBody::Usage {
                prompt_tokens,
                completion_tokens,
            }) => {
                tracing::debug!(prompt_tokens, completion_tokens, "token usage");
                None
            }
            Ok(FragmentBody::NoChoices) => {
                tracing::warn!("no choices found in fragment");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, payload = %fragment.payload(), "skipping malformed fragment");
                None
            }
        }
    }

    async fn emit<S>(&mut self, ready: Vec<String>, sink: &S)
    where
        S: SentenceSink + ?Sized,
    {
        for sentence in ready {
            tracing::info!(sentence = %sentence, "speaking sentence");
            self.spoken.insert(sentence.clone());

            if let Err(e) = sink.on_sentence(&sentence).await {
                tracing::error!(error = %e, sentence = %sentence, "failed to speak sentence");
            }

            self.sentences.push(sentence);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::stream;

    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Collect {
        sentences: RefCell<Vec<String>>,
        fail: bool,
    }

    #[async_trait(?Send)]
    impl SentenceSink for Collect {
        async fn on_sentence(&self, sentence: &str) -> Result<()> {
            self.sentences.borrow_mut().push(sentence.to_string());
            if self.fail {
                return Err(Error::Tts("speaker unplugged".to_string()));
            }
            Ok(())
        }
    }

    fn delta(text: &str) -> Result<ResponseFragment> {
        Ok(ResponseFragment::new(
            serde_json::json!({ "choices": [{ "delta": { "content": text } }] }).to_string(),
        ))
    }

    #[tokio::test]
    async fn test_sentences_in_order() {
        let segmenter = SentenceSegmenter::default();
        let sink = Collect::default();
        let fragments = stream::iter(vec![delta("Hello, wor"), delta("ld. How are"), delta(" you?")]);

        let summary = StreamDispatcher::new(&segmenter).run(fragments, &sink).await;

        assert!(summary.completed);
        assert_eq!(*sink.sentences.borrow(), vec!["Hello,", "world.", "How are you?"]);
        assert_eq!(summary.sentences, *sink.sentences.borrow());
    }

    #[tokio::test]
    async fn test_malformed_and_empty_fragments_are_skipped() {
        let segmenter = SentenceSegmenter::default();
        let sink = Collect::default();
        let fragments = stream::iter(vec![
            delta("One."),
            Ok(ResponseFragment::new("{broken")),
            Ok(ResponseFragment::new(r#"{"choices":[]}"#)),
            Ok(ResponseFragment::new(
                r#"{"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2}}"#,
            )),
            delta(" Two!"),
        ]);

        let summary = StreamDispatcher::new(&segmenter).run(fragments, &sink).await;

        assert!(summary.completed);
        assert_eq!(*sink.sentences.borrow(), vec!["One.", "Two!"]);
    }

    #[tokio::test]
    async fn test_stream_error_discards_remainder() {
        let segmenter = SentenceSegmenter::default();
        let sink = Collect::default();
        let fragments = stream::iter(vec![
            delta("First! Second"),
            Err(Error::Llm("connection reset".to_string())),
            delta(" part."),
        ]);

        let summary = StreamDispatcher::new(&segmenter).run(fragments, &sink).await;

        assert!(!summary.completed);
        assert_eq!(*sink.sentences.borrow(), vec!["First!"]);
        assert_eq!(summary.remainder.trim(), "Second");
    }

    #[tokio::test]
    async fn test_final_flush_on_completion() {
        let segmenter = SentenceSegmenter::default();
        let sink = Collect::default();
        let fragments = stream::iter(vec![delta("It costs 5."), delta("")]);

        let summary = StreamDispatcher::new(&segmenter).run(fragments, &sink).await;

        assert_eq!(*sink.sentences.borrow(), vec!["It costs 5."]);
        assert!(summary.remainder.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_dispatch() {
        let segmenter = SentenceSegmenter::default();
        let sink = Collect {
            fail: true,
            ..Collect::default()
        };
        let fragments = stream::iter(vec![delta("A! B! C!")]);

        let summary = StreamDispatcher::new(&segmenter).run(fragments, &sink).await;

        assert!(summary.completed);
        assert_eq!(sink.sentences.borrow().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_sentence_spoken_once() {
        let segmenter = SentenceSegmenter::default();
        let sink = Collect::default();
        let fragments = stream::iter(vec![delta("Okay. "), delta("Okay. "), delta("Done.")]);

        StreamDispatcher::new(&segmenter).run(fragments, &sink).await;

        assert_eq!(*sink.sentences.borrow(), vec!["Okay.", "Done."]);
    }
}
