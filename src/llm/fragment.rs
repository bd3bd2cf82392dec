//! Streamed chat completion chunks

use serde::Deserialize;

use crate::Result;

/// One chunk of a streamed response, as delivered by the server
///
/// The payload is kept raw; [`ResponseFragment::body`] interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFragment {
    payload: String,
}

/// What a fragment carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentBody {
    /// Text delta from the first choice
    Delta {
        /// Appended text, if any
        content: Option<String>,
        /// Set on the last content chunk
        finish_reason: Option<String>,
    },
    /// Token accounting chunk sent at the end of the stream
    Usage {
        /// Prompt tokens
        prompt_tokens: u64,
        /// Completion tokens
        completion_tokens: u64,
    },
    /// Valid JSON without any choices
    NoChoices,
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ResponseFragment {
    /// Wrap a raw JSON payload
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Raw payload
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Parse the payload
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a JSON chat completion chunk
    pub fn body(&self) -> Result<FragmentBody> {
        let chunk: Chunk = serde_json::from_str(&self.payload)?;

        if let Some(choice) = chunk.choices.into_iter().next() {
            return Ok(FragmentBody::Delta {
                content: choice.delta.content,
                finish_reason: choice.finish_reason,
            });
        }

        Ok(chunk.usage.map_or(FragmentBody::NoChoices, |u| FragmentBody::Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }))
    }
}
