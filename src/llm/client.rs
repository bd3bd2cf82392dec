//! OpenAI-compatible chat completions client

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::StreamExt;
use serde_json::{Value, json};

use super::fragment::ResponseFragment;
use super::sse::{SseDecoder, SseEvent};
use super::{FragmentStream, LlmClient};
use crate::config::LlmConfig;
use crate::{Error, Result};

/// Streams chat completions from `{base_url}/chat/completions`
pub struct ChatCompletionClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatCompletionClient {
    /// Create a client for the configured endpoint
    #[must_use]
    pub fn new(config: LlmConfig) -> Self {
        tracing::debug!(base_url = %config.base_url, model = %config.model, "LLM client configured");

        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Build the JSON request body
    ///
    /// Images that cannot be read are logged and left out.
    pub async fn request_body(&self, prompt: &str, images: &[PathBuf]) -> Value {
        let mut content = vec![json!({ "type": "text", "text": prompt })];

        for path in images {
            if let Some(url) = encode_image(path).await {
                content.push(json!({
                    "type": "image_url",
                    "image_url": { "url": url }
                }));
            }
        }

        json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": content }],
            "top_p": self.config.top_p,
            "stream": true,
            "stream_options": { "include_usage": self.config.include_usage },
        })
    }
}

#[async_trait]
impl LlmClient for ChatCompletionClient {
    async fn stream_completion(&self, prompt: &str, images: &[PathBuf]) -> Result<FragmentStream> {
        let body = self.request_body(prompt, images).await;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %url, "LLM request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("chat completion error {status}: {body}")));
        }

        tracing::debug!(status = %status, "response stream opened");

        let state = (
            response.bytes_stream().boxed(),
            SseDecoder::new(),
            VecDeque::new(),
            false,
        );

        let fragments = futures::stream::unfold(state, |(mut bytes, mut decoder, mut queue, mut done)| async move {
            loop {
                if let Some(fragment) = queue.pop_front() {
                    return Some((Ok(fragment), (bytes, decoder, queue, done)));
                }
                if done {
                    return None;
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        for event in decoder.push(&chunk) {
                            match event {
                                SseEvent::Data(data) => queue.push_back(ResponseFragment::new(data)),
                                SseEvent::Done => {
                                    done = true;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        done = true;
                        queue.clear();
                        return Some((Err(Error::Http(e)), (bytes, decoder, queue, done)));
                    }
                    None => {
                        done = true;
                        if let Some(SseEvent::Data(data)) = decoder.finish() {
                            queue.push_back(ResponseFragment::new(data));
                        }
                    }
                }
            }
        });

        Ok(fragments.boxed())
    }
}

/// Read an image and encode it as a JPEG data URL
async fn encode_image(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(format!("data:image/jpeg;base64,{}", BASE64.encode(bytes))),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
            None
        }
    }
}
