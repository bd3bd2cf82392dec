//! Language model access
//!
//! The interaction loop only sees [`LlmClient`]; responses arrive as a stream
//! of raw [`ResponseFragment`]s which the dispatcher interprets.

mod client;
mod fragment;
mod sse;

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use client::ChatCompletionClient;
pub use fragment::{FragmentBody, ResponseFragment};
pub use sse::{SseDecoder, SseEvent};

use crate::Result;

/// Ordered fragments of one streamed response
pub type FragmentStream = BoxStream<'static, Result<ResponseFragment>>;

/// Opens streamed completions
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send `prompt` (with optional images) and stream the reply
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened
    async fn stream_completion(&self, prompt: &str, images: &[PathBuf]) -> Result<FragmentStream>;
}
