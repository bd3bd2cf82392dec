//! TARS - wake-word voice assistant for streamed LLM replies
//!
//! This library provides:
//! - Voice input (microphone capture, phrase endpointing, STT, wake word)
//! - Voice output (TTS, sped-up playback)
//! - Streaming chat completions from an OpenAI-compatible server
//! - Sentence-by-sentence speech of the reply while it is still streaming
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              InteractionController                   │
//! │  WakeListening → WakeConfirmed → CommandCapture     │
//! │        ▲                              │              │
//! │        └──── Recovering ◄── Dispatching              │
//! └───────┬──────────────────┬──────────────┬───────────┘
//!         │                  │              │
//! ┌───────▼───────┐ ┌────────▼────────┐ ┌───▼───────────┐
//! │ SpeechRecog.  │ │ StreamDispatcher│ │  LlmClient    │
//! │ mic + STT     │ │ + Segmenter     │ │  SSE stream   │
//! └───────────────┘ └────────┬────────┘ └───────────────┘
//!                            │
//!                   ┌────────▼────────┐
//!                   │ SpeechSynthesizer│
//!                   │ TTS + playback   │
//!                   └─────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod llm;
pub mod response;
pub mod voice;

pub use config::Config;
pub use controller::{AttemptCounter, InteractionConfig, InteractionController, InteractionState};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use llm::{ChatCompletionClient, FragmentStream, LlmClient, ResponseFragment};
pub use response::{DispatchSummary, SentenceSegmenter, SentenceSink, StreamDispatcher};
pub use voice::{RecognitionResult, SpeechRecognizer, SpeechSynthesizer};
