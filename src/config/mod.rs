//! Configuration management for the TARS voice assistant
//!
//! The configuration is built once at startup and never mutated afterwards.
//! Precedence is environment > TOML file > default.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};
use file::TarsConfigFile;

/// Default OpenAI-compatible endpoint (local Ollama)
const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";

/// Default LLM model
pub const DEFAULT_MODEL: &str = "qwen2.5vl:32b";

/// Default wake word
const DEFAULT_WAKE_WORD: &str = "塔斯";

/// Default acknowledgment spoken after the wake word
const DEFAULT_RESPONSE_TEXT: &str = "需要什么帮助！";

/// Assistant configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Language model
    pub llm: LlmConfig,

    /// Audio capture and playback
    pub audio: AudioConfig,

    /// Wake word handling
    pub wake: WakeConfig,

    /// Speech recognition
    pub stt: SttConfig,

    /// Speech synthesis
    pub tts: TtsConfig,
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Bearer API key
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Nucleus sampling parameter
    pub top_p: f32,

    /// Ask the server for a trailing usage chunk
    pub include_usage: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: "ollama".to_string(),
            model: DEFAULT_MODEL.to_string(),
            top_p: 0.8,
            include_usage: true,
        }
    }
}

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Speech language for recognition and synthesis (e.g. "zh-CN")
    pub language: String,

    /// Playback speed multiplier for synthesized speech
    pub playback_speed: f32,

    /// Ambient noise calibration before each command attempt
    pub ambient_noise_duration: Duration,

    /// Ambient noise calibration at startup
    pub startup_calibration: Duration,

    /// Maximum length of a spoken command
    pub phrase_time_limit: Duration,

    /// Maximum length of a wake phrase
    pub wake_phrase_time_limit: Duration,

    /// Silence that ends a phrase
    pub pause_threshold: Duration,

    /// Command capture attempts before returning to wake listening
    pub max_attempts: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            language: "zh-CN".to_string(),
            playback_speed: 2.5,
            ambient_noise_duration: Duration::from_secs(1),
            startup_calibration: Duration::from_secs(5),
            phrase_time_limit: Duration::from_secs(10),
            wake_phrase_time_limit: Duration::from_secs(1),
            pause_threshold: Duration::from_millis(800),
            max_attempts: 5,
        }
    }
}

impl AudioConfig {
    /// Primary language subtag (e.g. "zh" for "zh-CN")
    #[must_use]
    pub fn language_code(&self) -> &str {
        self.language
            .split(['-', '_'])
            .next()
            .unwrap_or(&self.language)
    }
}

/// Wake word configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Trigger phrase, matched case-insensitively as a substring
    pub word: String,

    /// Acknowledgment spoken after the wake word
    pub response_text: String,

    /// Settle delay after the acknowledgment
    pub response_delay: Duration,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            word: DEFAULT_WAKE_WORD.to_string(),
            response_text: DEFAULT_RESPONSE_TEXT.to_string(),
            response_delay: Duration::from_secs(1),
        }
    }
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    /// Whisper-compatible transcription endpoint
    #[default]
    Whisper,
    /// Deepgram listen API
    Deepgram,
}

impl SttProvider {
    /// Parse a provider name
    ///
    /// # Errors
    ///
    /// Returns error for unknown provider names
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Backend
    pub provider: SttProvider,

    /// Whisper-compatible base URL
    pub base_url: String,

    /// API key (optional for local Whisper servers)
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: SttProvider::Whisper,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    /// Keyless Google translate voice
    #[default]
    Google,
    /// OpenAI-compatible speech endpoint
    OpenAI,
}

impl TtsProvider {
    /// Parse a provider name
    ///
    /// # Errors
    ///
    /// Returns error for unknown provider names
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Backend
    pub provider: TtsProvider,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// API key (OpenAI provider only)
    pub api_key: Option<String>,

    /// Model identifier (OpenAI provider only)
    pub model: String,

    /// Voice identifier (OpenAI provider only)
    pub voice: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::Google,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file or a value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is invalid
    pub fn from_sources(fc: TarsConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // LLM (env > toml > default)
        let llm = LlmConfig {
            base_url: env("LLM_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or(defaults.llm.base_url),
            api_key: env("LLM_API_KEY")
                .or(fc.llm.api_key)
                .unwrap_or(defaults.llm.api_key),
            model: env("LLM_MODEL_NAME")
                .or(fc.llm.model)
                .unwrap_or(defaults.llm.model),
            top_p: fc.llm.top_p.unwrap_or(defaults.llm.top_p),
            include_usage: fc.llm.include_usage.unwrap_or(defaults.llm.include_usage),
        };

        // Audio (env > toml > default)
        let audio_file = fc.audio;
        let audio = AudioConfig {
            language: env("AUDIO_LANGUAGE")
                .or(audio_file.language)
                .unwrap_or(defaults.audio.language),
            playback_speed: parse_env(&env, "AUDIO_PLAYBACK_SPEED")
                .or(audio_file.playback_speed)
                .unwrap_or(defaults.audio.playback_speed),
            ambient_noise_duration: secs_or(
                "audio.ambient_noise_secs",
                audio_file.ambient_noise_secs,
                defaults.audio.ambient_noise_duration,
            )?,
            startup_calibration: secs_or(
                "audio.startup_calibration_secs",
                audio_file.startup_calibration_secs,
                defaults.audio.startup_calibration,
            )?,
            phrase_time_limit: secs_or(
                "audio.phrase_time_limit_secs",
                audio_file.phrase_time_limit_secs,
                defaults.audio.phrase_time_limit,
            )?,
            wake_phrase_time_limit: secs_or(
                "audio.wake_phrase_time_limit_secs",
                audio_file.wake_phrase_time_limit_secs,
                defaults.audio.wake_phrase_time_limit,
            )?,
            pause_threshold: secs_or(
                "audio.pause_secs",
                audio_file.pause_secs,
                defaults.audio.pause_threshold,
            )?,
            max_attempts: audio_file.max_attempts.unwrap_or(defaults.audio.max_attempts),
        };

        // Wake word (env > toml > default)
        let wake = WakeConfig {
            word: env("WAKEUP_WORD")
                .or(fc.wake.word)
                .unwrap_or(defaults.wake.word),
            response_text: env("WAKEUP_RESPONSE_TEXT")
                .or(fc.wake.response_text)
                .unwrap_or(defaults.wake.response_text),
            response_delay: secs_or(
                "wake.response_delay_secs",
                fc.wake.response_delay_secs,
                defaults.wake.response_delay,
            )?,
        };

        // STT (env > toml > default)
        let stt = SttConfig {
            provider: fc
                .stt
                .provider
                .as_deref()
                .map(SttProvider::parse)
                .transpose()?
                .unwrap_or(defaults.stt.provider),
            base_url: env("STT_BASE_URL")
                .or(fc.stt.base_url)
                .unwrap_or(defaults.stt.base_url),
            api_key: env("STT_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or(fc.stt.api_key),
            model: env("STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or(defaults.stt.model),
        };

        // TTS (env > toml > default)
        let tts = TtsConfig {
            provider: env("TTS_PROVIDER")
                .or(fc.tts.provider)
                .as_deref()
                .map(TtsProvider::parse)
                .transpose()?
                .unwrap_or(defaults.tts.provider),
            base_url: fc.tts.base_url.unwrap_or(defaults.tts.base_url),
            api_key: env("TTS_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or(fc.tts.api_key),
            model: fc.tts.model.unwrap_or(defaults.tts.model),
            voice: fc.tts.voice.unwrap_or(defaults.tts.voice),
        };

        let config = Self {
            llm,
            audio,
            wake,
            stt,
            tts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.wake.word.trim().is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }
        if self.audio.max_attempts == 0 {
            return Err(Error::Config(
                "audio.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.audio.playback_speed.is_finite() && self.audio.playback_speed > 0.0) {
            return Err(Error::Config(format!(
                "playback speed must be positive, got {}",
                self.audio.playback_speed
            )));
        }
        if !(self.llm.top_p > 0.0 && self.llm.top_p <= 1.0) {
            return Err(Error::Config(format!(
                "llm.top_p must be in (0, 1], got {}",
                self.llm.top_p
            )));
        }
        Ok(())
    }
}

/// Parse an environment value, ignoring it with a warning if malformed
fn parse_env<T: std::str::FromStr>(env: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    if let Ok(value) = raw.trim().parse() {
        Some(value)
    } else {
        tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
        None
    }
}

/// Convert an optional seconds value, falling back to a default
fn secs_or(name: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    value.map_or(Ok(default), |secs| {
        Duration::try_from_secs_f64(secs)
            .map_err(|e| Error::Config(format!("{name}: invalid duration {secs}: {e}")))
    })
}
