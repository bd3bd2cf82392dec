//! Daemon - wires the real collaborators into the interaction loop
//!
//! Audio devices are opened here; cpal streams are not `Send`, so the loop
//! runs on the main task.

use tokio::sync::mpsc;

use crate::config::Config;
use crate::controller::{InteractionConfig, InteractionController};
use crate::llm::ChatCompletionClient;
use crate::voice::{
    AudioCapture, AudioPlayback, CloudSynthesizer, MicrophoneRecognizer, SpeechToText,
    TextToSpeech,
};
use crate::Result;

/// The TARS daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a daemon from validated configuration
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if an audio device cannot be opened or startup
    /// calibration fails
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        let mut controller = build_controller(&self.config)?;

        tracing::info!(
            model = %self.config.llm.model,
            language = %self.config.audio.language,
            "TARS ready - say \"{}\"",
            self.config.wake.word
        );

        controller.run(&mut shutdown_rx).await
    }
}

/// Open the microphone and speech-to-text backend
///
/// # Errors
///
/// Returns error if no input device is available or STT is misconfigured
pub fn build_recognizer(config: &Config) -> Result<MicrophoneRecognizer> {
    let capture = AudioCapture::new()?;
    let stt = SpeechToText::from_config(&config.stt, config.audio.language_code())?;

    Ok(MicrophoneRecognizer::new(
        capture,
        stt,
        config.audio.pause_threshold,
    ))
}

/// Open the speakers and text-to-speech backend
///
/// # Errors
///
/// Returns error if no output device is available or TTS is misconfigured
pub fn build_synthesizer(config: &Config) -> Result<CloudSynthesizer> {
    let tts = TextToSpeech::from_config(&config.tts, &config.audio.language)?;
    let playback = AudioPlayback::new()?;

    Ok(CloudSynthesizer::new(
        tts,
        playback,
        config.audio.playback_speed,
    ))
}

/// Build the interaction loop with real devices and services
///
/// # Errors
///
/// Returns error if any collaborator cannot be constructed
pub fn build_controller(config: &Config) -> Result<InteractionController> {
    let recognizer = build_recognizer(config)?;
    let synthesizer = build_synthesizer(config)?;
    let llm = ChatCompletionClient::new(config.llm.clone());

    Ok(InteractionController::new(
        InteractionConfig::from(config),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    ))
}
