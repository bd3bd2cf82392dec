//! TOML configuration file loading
//!
//! Supports `~/.config/tars/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TarsConfigFile {
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Audio capture and playback configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Wake word configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible base URL (e.g. "http://localhost:11434/v1")
    pub base_url: Option<String>,

    /// API key sent as a bearer token
    pub api_key: Option<String>,

    /// Model identifier (e.g. "qwen2.5vl:32b")
    pub model: Option<String>,

    /// Nucleus sampling parameter
    pub top_p: Option<f32>,

    /// Request a usage chunk at the end of the stream
    pub include_usage: Option<bool>,
}

/// Audio configuration, durations in seconds
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Speech language (e.g. "zh-CN")
    pub language: Option<String>,

    /// Playback speed multiplier for synthesized speech
    pub playback_speed: Option<f32>,

    /// Ambient noise calibration before each command attempt
    pub ambient_noise_secs: Option<f64>,

    /// Ambient noise calibration at startup
    pub startup_calibration_secs: Option<f64>,

    /// Maximum length of a spoken command
    pub phrase_time_limit_secs: Option<f64>,

    /// Maximum length of a wake phrase
    pub wake_phrase_time_limit_secs: Option<f64>,

    /// Silence that ends a phrase
    pub pause_secs: Option<f64>,

    /// Command capture attempts before giving up
    pub max_attempts: Option<u32>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Trigger phrase
    pub word: Option<String>,

    /// Acknowledgment spoken after the wake word
    pub response_text: Option<String>,

    /// Delay after the acknowledgment, in seconds
    pub response_delay_secs: Option<f64>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "whisper" or "deepgram"
    pub provider: Option<String>,

    /// Whisper-compatible base URL
    pub base_url: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Model identifier (e.g. "whisper-1")
    pub model: Option<String>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "google" or "openai"
    pub provider: Option<String>,

    /// OpenAI-compatible base URL
    pub base_url: Option<String>,

    /// API key (OpenAI provider)
    pub api_key: Option<String>,

    /// Model identifier (e.g. "tts-1")
    pub model: Option<String>,

    /// Voice identifier (e.g. "alloy")
    pub voice: Option<String>,
}

/// Load the TOML config file
///
/// With an explicit path the file must exist and parse. Without one the
/// standard path is tried and any problem falls back to defaults.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<TarsConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(TarsConfigFile::default());
    };

    if !path.exists() {
        return Ok(TarsConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(TarsConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(TarsConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/tars/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("tars").join("config.toml"))
}
