//! Speech output seam between the interaction loop and the speakers

use async_trait::async_trait;

use super::playback::AudioPlayback;
use super::tts::TextToSpeech;
use crate::Result;

/// Speaks text aloud
#[async_trait(?Send)]
pub trait SpeechSynthesizer {
    /// Synthesize and play `text`, resolving when playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn render(&self, text: &str) -> Result<()>;

    /// Speak `text` unless it has nothing to pronounce
    ///
    /// Text made only of whitespace and punctuation is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()> {
        if !is_speakable(text) {
            tracing::warn!(text, "skipping text with nothing to speak");
            return Ok(());
        }
        self.render(text).await
    }
}

/// Whether `text` has at least one character that is not whitespace or punctuation
#[must_use]
pub fn is_speakable(text: &str) -> bool {
    text.chars()
        .any(|c| !c.is_whitespace() && !is_punctuation(c))
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '\u{2010}'..='\u{2027}'
                | '\u{3000}'..='\u{303F}'
                | '\u{FF01}'..='\u{FF0F}'
                | '\u{FF1A}'..='\u{FF20}'
                | '\u{FF3B}'..='\u{FF40}'
                | '\u{FF5B}'..='\u{FF65}'
        )
}

/// Cloud TTS played through the local output device
pub struct CloudSynthesizer {
    tts: TextToSpeech,
    playback: AudioPlayback,
    speed: f32,
}

impl CloudSynthesizer {
    /// Create a synthesizer playing at `speed` times normal rate
    #[must_use]
    pub const fn new(tts: TextToSpeech, playback: AudioPlayback, speed: f32) -> Self {
        Self {
            tts,
            playback,
            speed,
        }
    }
}

#[async_trait(?Send)]
impl SpeechSynthesizer for CloudSynthesizer {
    async fn render(&self, text: &str) -> Result<()> {
        let audio = self.tts.synthesize(text).await?;
        tracing::debug!(text, audio_bytes = audio.len(), "speaking");
        self.playback.play_mp3(&audio, self.speed).await
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        rendered: RefCell<Vec<String>>,
    }

    #[async_trait(?Send)]
    impl SpeechSynthesizer for Recorder {
        async fn render(&self, text: &str) -> Result<()> {
            self.rendered.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_speakable() {
        assert!(is_speakable("Hello,"));
        assert!(is_speakable("你好。"));
        assert!(is_speakable("42"));
    }

    #[test]
    fn test_not_speakable() {
        assert!(!is_speakable(""));
        assert!(!is_speakable("   "));
        assert!(!is_speakable("..."));
        assert!(!is_speakable("。，！？"));
        assert!(!is_speakable(" - … "));
        assert!(!is_speakable("（）"));
    }

    #[test]
    fn test_speak_skips_punctuation_only() {
        let recorder = Recorder::default();

        tokio_test::block_on(recorder.speak("?!")).unwrap();
        tokio_test::block_on(recorder.speak("Yes.")).unwrap();

        assert_eq!(*recorder.rendered.borrow(), vec!["Yes.".to_string()]);
    }
}
