//! Interaction loop tests with scripted audio and model

use std::time::Duration;

use tokio::sync::mpsc;

use tars_voice::{InteractionController, InteractionState, RecognitionResult};

mod common;

use common::{
    RecordingSynthesizer, Reply, ScriptedLlm, ScriptedRecognizer, delta, fast_config, usage,
};

fn text(s: &str) -> RecognitionResult {
    RecognitionResult::Text(s.to_string())
}

/// Run the loop and request shutdown once it has had time to block
async fn run_then_shutdown(controller: &mut InteractionController) -> tars_voice::Result<()> {
    let (tx, mut rx) = mpsc::channel::<()>(1);
    let (outcome, ()) = tokio::join!(controller.run(&mut rx), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).await.unwrap();
    });
    outcome
}

#[tokio::test]
async fn test_wake_word_anywhere_in_transcript() {
    let (recognizer, _log) = ScriptedRecognizer::new(vec![
        text("what is the weather"),
        RecognitionResult::NoMatch,
        text("hey TARS are you there"),
    ]);
    let (synthesizer, _) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    controller.advance().await;
    assert_eq!(controller.state(), &InteractionState::WakeConfirmed);
}

#[tokio::test]
async fn test_full_episode_speaks_in_order() {
    let (recognizer, log) =
        ScriptedRecognizer::new(vec![text("tars"), text("tell me something")]);
    let (synthesizer, rendered) = RecordingSynthesizer::new();
    let (llm, prompts) = ScriptedLlm::new(vec![Reply::Fragments(vec![
        delta("Hello, wor"),
        delta("ld. How are"),
        delta(" you?"),
        usage(),
    ])]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    controller.advance().await;
    assert_eq!(controller.state(), &InteractionState::WakeConfirmed);

    controller.advance().await;
    assert_eq!(controller.state(), &InteractionState::CommandCapture);

    controller.advance().await;
    assert_eq!(
        controller.state(),
        &InteractionState::Dispatching {
            command: "tell me something".to_string()
        }
    );

    controller.advance().await;
    assert_eq!(controller.state(), &InteractionState::WakeListening);

    assert_eq!(
        *rendered.lock().unwrap(),
        vec!["Yes?", "Hello,", "world.", "How are you?"]
    );
    assert_eq!(*prompts.lock().unwrap(), vec!["tell me something"]);
    assert_eq!(log.lock().unwrap().captures, 2);
}

#[tokio::test]
async fn test_command_retries_exhausted() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![
        text("tars"),
        RecognitionResult::NoMatch,
        RecognitionResult::RequestFailed("timeout".to_string()),
        RecognitionResult::NoMatch,
    ]);
    let (synthesizer, rendered) = RecordingSynthesizer::new();
    let (llm, prompts) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    controller.advance().await;
    controller.advance().await;
    controller.advance().await;
    assert!(matches!(
        controller.state(),
        InteractionState::Recovering { .. }
    ));

    controller.advance().await;
    assert_eq!(controller.state(), &InteractionState::WakeListening);

    let log = log.lock().unwrap();
    assert_eq!(log.captures, 4);
    assert_eq!(log.calibrations, 3);
    assert!(prompts.lock().unwrap().is_empty());
    assert_eq!(*rendered.lock().unwrap(), vec!["Yes?"]);
}

#[tokio::test]
async fn test_stream_open_failure_recovers() {
    let (recognizer, _log) = ScriptedRecognizer::new(vec![text("tars"), text("question")]);
    let (synthesizer, rendered) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![Reply::FailOpen]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    for _ in 0..4 {
        controller.advance().await;
    }
    assert!(matches!(
        controller.state(),
        InteractionState::Recovering { .. }
    ));

    controller.advance().await;
    assert_eq!(controller.state(), &InteractionState::WakeListening);
    assert_eq!(*rendered.lock().unwrap(), vec!["Yes?"]);
}

#[tokio::test]
async fn test_stream_failure_drops_unfinished_text() {
    let (recognizer, _log) = ScriptedRecognizer::new(vec![text("tars"), text("question")]);
    let (synthesizer, rendered) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![Reply::FailAfter(vec![delta("First one. Sec")])]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    for _ in 0..4 {
        controller.advance().await;
    }
    assert!(matches!(
        controller.state(),
        InteractionState::Recovering { .. }
    ));
    assert_eq!(*rendered.lock().unwrap(), vec!["Yes?", "First one."]);
}

#[tokio::test]
async fn test_shutdown_releases_microphone() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![text("nothing here")]);
    let (synthesizer, _) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    assert!(run_then_shutdown(&mut controller).await.is_ok());
    assert_eq!(controller.state(), &InteractionState::WakeListening);

    let log = log.lock().unwrap();
    assert!(log.released);
    assert_eq!(log.calibrations, 1);
    assert_eq!(log.captures, 2);
}

#[tokio::test]
async fn test_shutdown_during_command_capture() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![text("tars")]);
    let (synthesizer, rendered) = RecordingSynthesizer::new();
    let (llm, prompts) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    assert!(run_then_shutdown(&mut controller).await.is_ok());
    assert_eq!(controller.state(), &InteractionState::CommandCapture);
    assert_eq!(*rendered.lock().unwrap(), vec!["Yes?"]);
    assert!(prompts.lock().unwrap().is_empty());

    let log = log.lock().unwrap();
    assert!(log.released);
    assert_eq!(log.calibrations, 2);
    assert_eq!(log.captures, 2);
}

#[tokio::test]
async fn test_shutdown_while_reply_is_streaming() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![text("tars"), text("question")]);
    let (synthesizer, rendered) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![Reply::StallAfter(vec![delta("First one. Sec")])]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    assert!(run_then_shutdown(&mut controller).await.is_ok());
    assert!(matches!(
        controller.state(),
        InteractionState::Dispatching { .. }
    ));
    assert_eq!(*rendered.lock().unwrap(), vec!["Yes?", "First one."]);
    assert!(log.lock().unwrap().released);
}

#[tokio::test]
async fn test_shutdown_while_speaking() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![text("tars"), text("question")]);
    let (synthesizer, rendered) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![Reply::Fragments(vec![delta(
        "Hello, world. How are you?",
    )])]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer.stalling_on("world.")),
        Box::new(llm),
    );

    assert!(run_then_shutdown(&mut controller).await.is_ok());
    assert_eq!(
        *rendered.lock().unwrap(),
        vec!["Yes?", "Hello,", "world."]
    );
    assert!(log.lock().unwrap().released);
}

#[tokio::test]
async fn test_blank_command_spends_an_attempt() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![
        text("tars"),
        text("   "),
        text("what time is it"),
    ]);
    let (synthesizer, _) = RecordingSynthesizer::new();
    let (llm, prompts) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    for _ in 0..3 {
        controller.advance().await;
    }
    assert_eq!(
        controller.state(),
        &InteractionState::Dispatching {
            command: "what time is it".to_string()
        }
    );
    assert!(prompts.lock().unwrap().is_empty());

    let log = log.lock().unwrap();
    assert_eq!(log.captures, 3);
    assert_eq!(log.calibrations, 2);
}

#[tokio::test]
async fn test_blank_commands_exhaust_attempts() {
    let (recognizer, _log) =
        ScriptedRecognizer::new(vec![text("tars"), text(""), text(" \n ")]);
    let (synthesizer, _) = RecordingSynthesizer::new();
    let (llm, prompts) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 2),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    for _ in 0..3 {
        controller.advance().await;
    }
    assert!(matches!(
        controller.state(),
        InteractionState::Recovering { .. }
    ));
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dropped_sender_stops_loop() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![]);
    let (synthesizer, _) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer),
        Box::new(synthesizer),
        Box::new(llm),
    );

    let (tx, mut rx) = mpsc::channel::<()>(1);
    drop(tx);

    assert!(controller.run(&mut rx).await.is_ok());
    assert!(log.lock().unwrap().released);
}

#[tokio::test]
async fn test_startup_calibration_failure_is_fatal() {
    let (recognizer, log) = ScriptedRecognizer::new(vec![]);
    let (synthesizer, _) = RecordingSynthesizer::new();
    let (llm, _) = ScriptedLlm::new(vec![]);

    let mut controller = InteractionController::new(
        fast_config("tars", 3),
        Box::new(recognizer.failing_calibration()),
        Box::new(synthesizer),
        Box::new(llm),
    );

    let (_tx, mut rx) = mpsc::channel::<()>(1);
    assert!(controller.run(&mut rx).await.is_err());

    let log = log.lock().unwrap();
    assert!(log.released);
    assert_eq!(log.captures, 0);
}
