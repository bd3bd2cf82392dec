//! Interaction state machine
//!
//! Wake listening → acknowledgment → command capture → response dispatch,
//! cycling until shutdown. Every failure returns to wake listening; only a
//! failed startup calibration is fatal.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::response::{DispatchSummary, SentenceSegmenter, StreamDispatcher};
use crate::voice::{
    AmbientCalibration, RecognitionResult, SpeechRecognizer, SpeechSynthesizer, WakeWord,
};
use crate::{Error, Result};

/// Where the assistant is in a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionState {
    /// Waiting for the wake word
    WakeListening,
    /// Wake word heard, acknowledgment pending
    WakeConfirmed,
    /// Capturing the spoken command
    CommandCapture,
    /// Streaming the reply to a command
    Dispatching {
        /// Recognized command text
        command: String,
    },
    /// Abandoning the current episode
    Recovering {
        /// Why the episode was abandoned
        reason: String,
    },
}

impl InteractionState {
    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::WakeListening => "wake_listening",
            Self::WakeConfirmed => "wake_confirmed",
            Self::CommandCapture => "command_capture",
            Self::Dispatching { .. } => "dispatching",
            Self::Recovering { .. } => "recovering",
        }
    }
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attempts used within one episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter {
    used: u32,
    limit: Option<u32>,
}

impl AttemptCounter {
    /// Counter allowing `limit` attempts
    #[must_use]
    pub const fn bounded(limit: u32) -> Self {
        Self {
            used: 0,
            limit: Some(limit),
        }
    }

    /// Counter that never runs out
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            used: 0,
            limit: None,
        }
    }

    /// Record one attempt
    pub const fn record(&mut self) {
        self.used = self.used.saturating_add(1);
    }

    /// Attempts recorded so far
    #[must_use]
    pub const fn used(&self) -> u32 {
        self.used
    }

    /// Whether no attempts remain
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        match self.limit {
            Some(limit) => self.used >= limit,
            None => false,
        }
    }
}

/// Values the interaction loop needs
#[derive(Debug, Clone)]
pub struct InteractionConfig {
    /// Trigger phrase
    pub wake_word: String,
    /// Spoken after the wake word
    pub acknowledgment: String,
    /// Pause after the acknowledgment so it is not captured as input
    pub settle_delay: Duration,
    /// Longest wake phrase
    pub wake_phrase_limit: Duration,
    /// Longest command phrase
    pub command_phrase_limit: Duration,
    /// Calibration before each command attempt
    pub ambient_duration: Duration,
    /// Calibration at startup
    pub startup_calibration: Duration,
    /// Command attempts per episode
    pub max_attempts: u32,
}

impl From<&Config> for InteractionConfig {
    fn from(config: &Config) -> Self {
        Self {
            wake_word: config.wake.word.clone(),
            acknowledgment: config.wake.response_text.clone(),
            settle_delay: config.wake.response_delay,
            wake_phrase_limit: config.audio.wake_phrase_time_limit,
            command_phrase_limit: config.audio.phrase_time_limit,
            ambient_duration: config.audio.ambient_noise_duration,
            startup_calibration: config.audio.startup_calibration,
            max_attempts: config.audio.max_attempts,
        }
    }
}

/// Drives one user through wake, capture and reply, forever
pub struct InteractionController {
    config: InteractionConfig,
    wake: WakeWord,
    recognizer: Box<dyn SpeechRecognizer>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    llm: Box<dyn LlmClient>,
    segmenter: SentenceSegmenter,
    calibration: AmbientCalibration,
    state: InteractionState,
}

impl InteractionController {
    /// Create a controller in [`InteractionState::WakeListening`]
    #[must_use]
    pub fn new(
        config: InteractionConfig,
        recognizer: Box<dyn SpeechRecognizer>,
        synthesizer: Box<dyn SpeechSynthesizer>,
        llm: Box<dyn LlmClient>,
    ) -> Self {
        Self {
            wake: WakeWord::new(&config.wake_word),
            config,
            recognizer,
            synthesizer,
            llm,
            segmenter: SentenceSegmenter::default(),
            calibration: AmbientCalibration::default(),
            state: InteractionState::WakeListening,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &InteractionState {
        &self.state
    }

    /// Current ambient calibration
    #[must_use]
    pub const fn calibration(&self) -> AmbientCalibration {
        self.calibration
    }

    /// Run until a message arrives on `shutdown` (or its sender is dropped)
    ///
    /// The microphone is released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns error if the startup calibration fails
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        let outcome = self.run_until(shutdown).await;
        self.recognizer.release();
        tracing::info!("microphone released");
        outcome
    }

    #[allow(clippy::future_not_send)]
    async fn run_until(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        let duration = self.config.startup_calibration;
        tracing::info!(seconds = duration.as_secs_f32(), "calibrating for ambient noise");

        let calibration = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!("shutdown requested");
                return Ok(());
            }
            calibration = self.recognizer.calibrate(duration) => calibration,
        };

        self.calibration = calibration
            .map_err(|e| Error::Audio(format!("startup calibration failed: {e}")))?;
        tracing::info!(
            wake_word = %self.wake.word(),
            threshold = self.calibration.energy_threshold(),
            "listening for wake word"
        );

        loop {
            let advanced = tokio::select! {
                biased;
                _ = shutdown.recv() => false,
                () = self.advance() => true,
            };

            if !advanced {
                tracing::info!(state = %self.state, "shutdown requested");
                return Ok(());
            }
        }
    }

    /// Perform one state transition
    #[allow(clippy::future_not_send)]
    pub async fn advance(&mut self) {
        let next = match self.state.clone() {
            InteractionState::WakeListening => self.listen_for_wake().await,
            InteractionState::WakeConfirmed => self.acknowledge().await,
            InteractionState::CommandCapture => self.capture_command().await,
            InteractionState::Dispatching { command } => self.dispatch(&command).await,
            InteractionState::Recovering { reason } => {
                tracing::warn!(reason = %reason, "returning to wake listening");
                InteractionState::WakeListening
            }
        };

        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    /// Stream a reply to `prompt` and speak it sentence by sentence
    ///
    /// # Errors
    ///
    /// Returns error if the response stream cannot be opened
    #[allow(clippy::future_not_send)]
    pub async fn respond(&self, prompt: &str, images: &[PathBuf]) -> Result<DispatchSummary> {
        let fragments = self.llm.stream_completion(prompt, images).await?;

        Ok(StreamDispatcher::new(&self.segmenter)
            .run(fragments, self.synthesizer.as_ref())
            .await)
    }

    async fn listen_for_wake(&mut self) -> InteractionState {
        let mut misses = AttemptCounter::unbounded();

        loop {
            let result = self
                .recognizer
                .capture(self.config.wake_phrase_limit, &self.calibration)
                .await;
            misses.record();

            match result {
                RecognitionResult::Text(text) if self.wake.detect(&text) => {
                    tracing::info!(transcript = %text, "wake word detected");
                    return InteractionState::WakeConfirmed;
                }
                RecognitionResult::Text(text) => {
                    tracing::debug!(transcript = %text, attempt = misses.used(), "no wake word");
                }
                RecognitionResult::NoMatch => {
                    tracing::debug!(attempt = misses.used(), "could not understand audio");
                }
                RecognitionResult::RequestFailed(reason) => {
                    tracing::warn!(reason = %reason, "recognition request failed");
                }
                RecognitionResult::Unknown(reason) => {
                    tracing::error!(reason = %reason, "recognition failed");
                }
            }
        }
    }

    async fn acknowledge(&mut self) -> InteractionState {
        if let Err(e) = self.synthesizer.speak(&self.config.acknowledgment).await {
            tracing::error!(error = %e, "failed to speak acknowledgment");
        }

        tokio::time::sleep(self.config.settle_delay).await;
        InteractionState::CommandCapture
    }

    async fn capture_command(&mut self) -> InteractionState {
        let mut attempts = AttemptCounter::bounded(self.config.max_attempts);

        while !attempts.exhausted() {
            attempts.record();
            tracing::info!(
                attempt = attempts.used(),
                max = self.config.max_attempts,
                "listening for command"
            );

            match self.recognizer.calibrate(self.config.ambient_duration).await {
                Ok(calibration) => self.calibration = calibration,
                Err(e) => {
                    tracing::error!(error = %e, "ambient calibration failed");
                    continue;
                }
            }

            match self
                .recognizer
                .capture(self.config.command_phrase_limit, &self.calibration)
                .await
            {
                RecognitionResult::Text(command) if command.trim().is_empty() => {
                    tracing::warn!(attempt = attempts.used(), "blank command ignored");
                }
                RecognitionResult::Text(command) => {
                    tracing::info!(command = %command, "command recognized");
                    return InteractionState::Dispatching { command };
                }
                RecognitionResult::NoMatch => {
                    tracing::warn!(attempt = attempts.used(), "could not understand command");
                }
                RecognitionResult::RequestFailed(reason) => {
                    tracing::error!(attempt = attempts.used(), reason = %reason, "recognition request failed");
                }
                RecognitionResult::Unknown(reason) => {
                    tracing::error!(attempt = attempts.used(), reason = %reason, "recognition failed");
                }
            }
        }

        InteractionState::Recovering {
            reason: format!("no command understood after {} attempts", attempts.used()),
        }
    }

    async fn dispatch(&mut self, command: &str) -> InteractionState {
        tracing::info!(command = %command, "dispatching command");

        match self.respond(command, &[]).await {
            Ok(summary) if summary.completed => {
                tracing::info!(sentences = summary.sentences.len(), "response complete");
                InteractionState::WakeListening
            }
            Ok(summary) => InteractionState::Recovering {
                reason: format!(
                    "response stream failed after {} sentences",
                    summary.sentences.len()
                ),
            },
            Err(e) => InteractionState::Recovering {
                reason: format!("failed to open response stream: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_counter() {
        let mut counter = AttemptCounter::bounded(2);
        assert!(!counter.exhausted());
        counter.record();
        assert!(!counter.exhausted());
        counter.record();
        assert!(counter.exhausted());
        assert_eq!(counter.used(), 2);
    }

    #[test]
    fn test_unbounded_counter() {
        let mut counter = AttemptCounter::unbounded();
        for _ in 0..1000 {
            counter.record();
        }
        assert!(!counter.exhausted());
    }

    #[test]
    fn test_config_mapping() {
        let config = Config::default();
        let interaction = InteractionConfig::from(&config);

        assert_eq!(interaction.wake_word, "塔斯");
        assert_eq!(interaction.max_attempts, 5);
        assert_eq!(interaction.wake_phrase_limit, Duration::from_secs(1));
        assert_eq!(interaction.command_phrase_limit, Duration::from_secs(10));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(InteractionState::WakeListening.to_string(), "wake_listening");
        assert_eq!(
            InteractionState::Dispatching {
                command: "x".to_string()
            }
            .to_string(),
            "dispatching"
        );
    }
}
