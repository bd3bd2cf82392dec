//! Ambient noise calibration and phrase endpointing
//!
//! A phrase starts when block energy rises above the calibrated threshold and
//! ends after a pause or when the phrase time limit is reached.

use std::collections::VecDeque;
use std::time::Duration;

/// Energy analysis block (50ms at 16kHz)
const BLOCK_MS: u32 = 50;

/// Audio kept from before speech onset
const PRE_ROLL_MS: u32 = 300;

/// Ambient energy multiplier for the speech threshold
const DYNAMIC_RATIO: f32 = 1.5;

/// Threshold floor so a silent room does not trigger on hiss
pub const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Noise-floor threshold separating speech from background
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientCalibration {
    energy_threshold: f32,
}

impl AmbientCalibration {
    /// Build a calibration with an explicit threshold
    #[must_use]
    pub const fn with_threshold(energy_threshold: f32) -> Self {
        Self { energy_threshold }
    }

    /// Derive the threshold from a window of ambient audio
    #[must_use]
    pub fn from_samples(samples: &[f32]) -> Self {
        let ambient = calculate_energy(samples);
        Self {
            energy_threshold: (ambient * DYNAMIC_RATIO).max(MIN_ENERGY_THRESHOLD),
        }
    }

    /// Energy above which a block counts as speech
    #[must_use]
    pub const fn energy_threshold(&self) -> f32 {
        self.energy_threshold
    }
}

impl Default for AmbientCalibration {
    fn default() -> Self {
        Self::with_threshold(MIN_ENERGY_THRESHOLD)
    }
}

/// State of the phrase detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseState {
    /// Waiting for speech onset
    Waiting,
    /// Inside a phrase
    Speaking,
}

/// Finds the first complete phrase in a stream of samples
#[derive(Debug)]
pub struct PhraseDetector {
    threshold: f32,
    block: usize,
    pause_samples: usize,
    limit_samples: usize,
    state: PhraseState,
    pending: Vec<f32>,
    pre_roll: VecDeque<f32>,
    pre_roll_cap: usize,
    phrase: Vec<f32>,
    spoken: usize,
    silence: usize,
}

impl PhraseDetector {
    /// Create a detector for one phrase
    ///
    /// # Arguments
    ///
    /// * `calibration` - current ambient calibration
    /// * `sample_rate` - rate of the samples fed to [`Self::process`]
    /// * `pause` - silence that ends a phrase
    /// * `time_limit` - maximum phrase length after onset
    #[must_use]
    pub fn new(
        calibration: &AmbientCalibration,
        sample_rate: u32,
        pause: Duration,
        time_limit: Duration,
    ) -> Self {
        let per_ms = |ms: u128| -> usize {
            usize::try_from(ms * u128::from(sample_rate) / 1000).unwrap_or(usize::MAX)
        };

        Self {
            threshold: calibration.energy_threshold(),
            block: per_ms(u128::from(BLOCK_MS)).max(1),
            pause_samples: per_ms(pause.as_millis()),
            limit_samples: per_ms(time_limit.as_millis()).max(1),
            state: PhraseState::Waiting,
            pending: Vec::new(),
            pre_roll: VecDeque::new(),
            pre_roll_cap: per_ms(u128::from(PRE_ROLL_MS)),
            phrase: Vec::new(),
            spoken: 0,
            silence: 0,
        }
    }

    /// Feed captured samples
    ///
    /// Returns the phrase audio (pre-roll included) once it is complete.
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut consumed = 0;

        while self.pending.len() - consumed >= self.block {
            let block = &self.pending[consumed..consumed + self.block];
            consumed += self.block;

            let is_speech = calculate_energy(block) > self.threshold;

            match self.state {
                PhraseState::Waiting => {
                    if is_speech {
                        self.state = PhraseState::Speaking;
                        self.phrase.clear();
                        self.phrase.extend(self.pre_roll.drain(..));
                        self.phrase.extend_from_slice(block);
                        self.spoken = block.len();
                        self.silence = 0;
                        tracing::trace!(threshold = self.threshold, "speech onset");
                    } else {
                        self.pre_roll.extend(block.iter().copied());
                        let excess = self.pre_roll.len().saturating_sub(self.pre_roll_cap);
                        self.pre_roll.drain(..excess);
                    }
                }
                PhraseState::Speaking => {
                    self.phrase.extend_from_slice(block);
                    self.spoken += block.len();

                    if is_speech {
                        self.silence = 0;
                    } else {
                        self.silence += block.len();
                    }

                    if self.silence >= self.pause_samples || self.spoken >= self.limit_samples {
                        tracing::debug!(
                            samples = self.phrase.len(),
                            limited = self.spoken >= self.limit_samples,
                            "phrase complete"
                        );
                        return Some(self.take_phrase());
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        None
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> PhraseState {
        self.state
    }

    /// Reset to waiting, discarding everything buffered
    pub fn reset(&mut self) {
        self.state = PhraseState::Waiting;
        self.pending.clear();
        self.pre_roll.clear();
        self.phrase.clear();
        self.spoken = 0;
        self.silence = 0;
    }

    fn take_phrase(&mut self) -> Vec<f32> {
        let phrase = std::mem::take(&mut self.phrase);
        self.reset();
        phrase
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
