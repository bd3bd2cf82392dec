//! Speech recognition seam between the microphone and the interaction loop

use std::time::Duration;

use async_trait::async_trait;

use super::capture::{AudioCapture, samples_to_wav};
use super::phrase::{AmbientCalibration, PhraseDetector};
use super::stt::SpeechToText;
use crate::Error;
use crate::Result;

/// Poll interval while waiting for a phrase
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one listen-and-transcribe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    /// Recognized text
    Text(String),
    /// Audio was captured but nothing intelligible was recognized
    NoMatch,
    /// The recognition service could not be reached or rejected the request
    RequestFailed(String),
    /// Any other failure
    Unknown(String),
}

/// Listens to the microphone and turns a phrase into text
#[async_trait(?Send)]
pub trait SpeechRecognizer {
    /// Sample ambient noise for `duration` and derive a speech threshold
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    async fn calibrate(&mut self, duration: Duration) -> Result<AmbientCalibration>;

    /// Wait for one phrase (at most `time_limit` long) and transcribe it
    async fn capture(
        &mut self,
        time_limit: Duration,
        calibration: &AmbientCalibration,
    ) -> RecognitionResult;

    /// Release the microphone
    fn release(&mut self);
}

/// Recognizer backed by the default input device and an STT service
pub struct MicrophoneRecognizer {
    capture: AudioCapture,
    stt: SpeechToText,
    pause: Duration,
}

impl MicrophoneRecognizer {
    /// Create a recognizer
    ///
    /// `pause` is the silence that ends a phrase.
    #[must_use]
    pub const fn new(capture: AudioCapture, stt: SpeechToText, pause: Duration) -> Self {
        Self {
            capture,
            stt,
            pause,
        }
    }

    async fn record_phrase(
        &mut self,
        time_limit: Duration,
        calibration: &AmbientCalibration,
    ) -> Result<Vec<f32>> {
        self.capture.start()?;
        self.capture.clear_buffer();

        let mut detector = PhraseDetector::new(
            calibration,
            self.capture.sample_rate(),
            self.pause,
            time_limit,
        );

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            if let Some(phrase) = detector.process(&self.capture.take_buffer()) {
                return Ok(phrase);
            }
        }
    }
}

#[async_trait(?Send)]
impl SpeechRecognizer for MicrophoneRecognizer {
    async fn calibrate(&mut self, duration: Duration) -> Result<AmbientCalibration> {
        self.capture.start()?;
        self.capture.clear_buffer();

        tokio::time::sleep(duration).await;

        let ambient = self.capture.take_buffer();
        let calibration = AmbientCalibration::from_samples(&ambient);

        tracing::debug!(
            samples = ambient.len(),
            threshold = calibration.energy_threshold(),
            "ambient noise calibrated"
        );

        Ok(calibration)
    }

    async fn capture(
        &mut self,
        time_limit: Duration,
        calibration: &AmbientCalibration,
    ) -> RecognitionResult {
        let phrase = match self.record_phrase(time_limit, calibration).await {
            Ok(phrase) => phrase,
            Err(e) => return RecognitionResult::Unknown(e.to_string()),
        };

        let wav = match samples_to_wav(&phrase, self.capture.sample_rate()) {
            Ok(wav) => wav,
            Err(e) => return RecognitionResult::Unknown(e.to_string()),
        };

        classify(self.stt.transcribe(&wav).await)
    }

    fn release(&mut self) {
        self.capture.stop();
        self.capture.clear_buffer();
    }
}

/// Map a transcription outcome onto a recognition result
#[must_use]
pub fn classify(outcome: Result<String>) -> RecognitionResult {
    match outcome {
        Ok(text) if text.trim().is_empty() => RecognitionResult::NoMatch,
        Ok(text) => RecognitionResult::Text(text),
        Err(e @ (Error::Http(_) | Error::Stt(_))) => RecognitionResult::RequestFailed(e.to_string()),
        Err(e) => RecognitionResult::Unknown(e.to_string()),
    }
}
