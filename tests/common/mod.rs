//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, speakers and language model so the
//! interaction loop can run without audio hardware or network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use tars_voice::voice::AmbientCalibration;
use tars_voice::{
    Error, FragmentStream, InteractionConfig, LlmClient, RecognitionResult, ResponseFragment,
    Result, SpeechRecognizer, SpeechSynthesizer,
};

/// Build a content-delta fragment
#[must_use]
pub fn delta(text: &str) -> ResponseFragment {
    ResponseFragment::new(
        serde_json::json!({
            "choices": [{ "index": 0, "delta": { "content": text }, "finish_reason": null }]
        })
        .to_string(),
    )
}

/// Build a usage-only fragment
#[must_use]
pub fn usage() -> ResponseFragment {
    ResponseFragment::new(
        serde_json::json!({
            "choices": [],
            "usage": { "prompt_tokens": 12, "completion_tokens": 34 }
        })
        .to_string(),
    )
}

/// Interaction settings that never wait
#[must_use]
pub fn fast_config(wake_word: &str, max_attempts: u32) -> InteractionConfig {
    InteractionConfig {
        wake_word: wake_word.to_string(),
        acknowledgment: "Yes?".to_string(),
        settle_delay: Duration::ZERO,
        wake_phrase_limit: Duration::from_secs(1),
        command_phrase_limit: Duration::from_secs(10),
        ambient_duration: Duration::from_millis(200),
        startup_calibration: Duration::from_secs(1),
        max_attempts,
    }
}

/// What the scripted recognizer observed
#[derive(Debug, Default)]
pub struct RecognizerLog {
    pub captures: usize,
    pub calibrations: usize,
    pub released: bool,
}

/// Recognizer that replays a fixed list of results
///
/// Once the script runs out, `capture` never resolves.
pub struct ScriptedRecognizer {
    script: VecDeque<RecognitionResult>,
    fail_calibration: bool,
    log: Arc<Mutex<RecognizerLog>>,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<RecognitionResult>) -> (Self, Arc<Mutex<RecognizerLog>>) {
        let log = Arc::new(Mutex::new(RecognizerLog::default()));
        let recognizer = Self {
            script: script.into(),
            fail_calibration: false,
            log: Arc::clone(&log),
        };
        (recognizer, log)
    }

    #[must_use]
    pub fn failing_calibration(mut self) -> Self {
        self.fail_calibration = true;
        self
    }
}

#[async_trait(?Send)]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn calibrate(&mut self, _duration: Duration) -> Result<AmbientCalibration> {
        self.log.lock().unwrap().calibrations += 1;
        if self.fail_calibration {
            return Err(Error::Audio("no input device".to_string()));
        }
        Ok(AmbientCalibration::default())
    }

    async fn capture(
        &mut self,
        _time_limit: Duration,
        _calibration: &AmbientCalibration,
    ) -> RecognitionResult {
        self.log.lock().unwrap().captures += 1;
        match self.script.pop_front() {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    fn release(&mut self) {
        self.log.lock().unwrap().released = true;
    }
}

/// Synthesizer that records what it was asked to render
pub struct RecordingSynthesizer {
    rendered: Arc<Mutex<Vec<String>>>,
    stall_on: Option<String>,
}

impl RecordingSynthesizer {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                rendered: Arc::clone(&rendered),
                stall_on: None,
            },
            rendered,
        )
    }

    /// Never finish playing `text`
    #[must_use]
    pub fn stalling_on(mut self, text: &str) -> Self {
        self.stall_on = Some(text.to_string());
        self
    }
}

#[async_trait(?Send)]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn render(&self, text: &str) -> Result<()> {
        self.rendered.lock().unwrap().push(text.to_string());
        if self.stall_on.as_deref() == Some(text) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// One scripted completion
pub enum Reply {
    /// Stream these fragments and end normally
    Fragments(Vec<ResponseFragment>),
    /// Stream these fragments, then fail
    FailAfter(Vec<ResponseFragment>),
    /// Stream these fragments, then never yield again
    StallAfter(Vec<ResponseFragment>),
    /// Refuse to open the stream
    FailOpen,
}

/// Language model that answers from a script
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Reply>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Arc::clone(&prompts),
            },
            prompts,
        )
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn stream_completion(&self, prompt: &str, _images: &[PathBuf]) -> Result<FragmentStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let reply = self.replies.lock().unwrap().pop_front();
        let fragments: FragmentStream = match reply {
            Some(Reply::Fragments(fragments)) => {
                stream::iter(fragments.into_iter().map(Ok::<_, Error>)).boxed()
            }
            Some(Reply::FailAfter(fragments)) => stream::iter(
                fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(Error::Llm(
                        "connection reset".to_string(),
                    )))),
            )
            .boxed(),
            Some(Reply::StallAfter(fragments)) => stream::iter(fragments.into_iter().map(Ok::<_, Error>))
                .chain(stream::pending())
                .boxed(),
            Some(Reply::FailOpen) | None => {
                return Err(Error::Llm("server unavailable".to_string()));
            }
        };

        Ok(fragments)
    }
}
