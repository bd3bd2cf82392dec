//! Sentence-by-sentence speech of streamed replies

mod dispatcher;
mod segmenter;

pub use dispatcher::{DispatchSummary, SentenceSink, StreamDispatcher};
pub use segmenter::{
    Segmentation, SentenceSegmenter, SentenceTokenizer, TERMINAL_PUNCTUATION,
    UnicodeSentenceTokenizer, ends_with_terminal,
};
