//! Text-to-speech (TTS) over HTTP
//!
//! Both providers return MP3 bytes.

use crate::config::{TtsConfig, TtsProvider};
use crate::{Error, Result};

const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text the Google endpoint accepts per request, in characters
const GOOGLE_MAX_CHARS: usize = 100;

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    provider: TtsProvider,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    language: String,
}

impl TextToSpeech {
    /// Build from configuration
    ///
    /// `language` is the full tag passed to Google (e.g. "zh-CN").
    ///
    /// # Errors
    ///
    /// Returns error if the `OpenAI` provider is selected without an API key
    pub fn from_config(config: &TtsConfig, language: &str) -> Result<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());

        if config.provider == TtsProvider::OpenAI && api_key.is_none() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider: config.provider,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            voice: config.voice.clone(),
            language: language.to_string(),
        })
    }

    /// Synthesize text to MP3 audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(provider = ?self.provider, chars = text.chars().count(), "synthesizing");

        match self.provider {
            TtsProvider::Google => self.synthesize_google(text).await,
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
        }
    }

    async fn synthesize_google(&self, text: &str) -> Result<Vec<u8>> {
        let chunks = split_for_google(text, GOOGLE_MAX_CHARS);
        let total = chunks.len();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let total = total.to_string();
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();

            let response = self
                .client
                .get(GOOGLE_TTS_URL)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Tts(format!("Google TTS error {status}: {body}")));
            }

            // MP3 frames concatenate cleanly
            audio.extend_from_slice(&response.bytes().await?);
        }

        Ok(audio)
    }

    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Split text into pieces of at most `max_chars` characters
///
/// Cuts after the last whitespace or punctuation inside the limit when there
/// is one, otherwise hard-cuts at the limit.
fn split_for_google(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest: Vec<char> = text.trim().chars().collect();

    while rest.len() > max_chars {
        let cut = rest[..max_chars]
            .iter()
            .rposition(|c| c.is_whitespace() || c.is_ascii_punctuation() || "，。！？；、".contains(*c))
            .map_or(max_chars, |i| i + 1);

        let piece: String = rest.drain(..cut).collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
    }

    let tail: String = rest.into_iter().collect();
    let tail = tail.trim();
    if !tail.is_empty() {
        pieces.push(tail.to_string());
    }

    pieces
}
