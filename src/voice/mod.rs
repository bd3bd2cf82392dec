//! Voice input and output
//!
//! Microphone capture, phrase endpointing, speech recognition, wake word
//! matching, speech synthesis and playback.

mod capture;
mod phrase;
mod playback;
mod recognizer;
mod stt;
mod synthesizer;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use phrase::{AmbientCalibration, PhraseDetector, PhraseState, calculate_energy};
pub use playback::{AudioPlayback, DecodedAudio, decode_mp3, speed_up};
pub use recognizer::{MicrophoneRecognizer, RecognitionResult, SpeechRecognizer, classify};
pub use stt::SpeechToText;
pub use synthesizer::{CloudSynthesizer, SpeechSynthesizer, is_speakable};
pub use tts::TextToSpeech;
pub use wake_word::WakeWord;
