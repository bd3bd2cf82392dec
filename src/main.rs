use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tars_voice::daemon::build_synthesizer;
use tars_voice::voice::{
    AmbientCalibration, AudioCapture, AudioPlayback, SpeechSynthesizer, calculate_energy,
};
use tars_voice::{
    ChatCompletionClient, Config, Daemon, LlmClient, SentenceSegmenter, StreamDispatcher,
};

/// TARS - wake-word voice assistant
#[derive(Parser)]
#[command(name = "tars", version, about)]
struct Cli {
    /// Config file (default: ~/.config/tars/config.toml)
    #[arg(short, long, env = "TARS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "你好，我是塔斯。")]
        text: String,
    },
    /// Ask one question and speak the reply
    Ask {
        /// Prompt text
        prompt: String,
        /// Image to attach (repeatable)
        #[arg(short, long)]
        image: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,tars_voice=info",
        1 => "info,tars_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { text }) => test_tts(&Config::load(config_path)?, &text).await,
        Some(Command::Ask { prompt, image }) => {
            ask(&Config::load(config_path)?, &prompt, &image).await
        }
        None => {
            let config = Config::load(config_path)?;
            tracing::debug!(?config, "loaded configuration");
            tracing::info!("starting TARS");

            Daemon::new(config).run().await?;
            Ok(())
        }
    }
}

/// Test microphone input against a fresh calibration
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Stay quiet for the first second, then speak!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let calibration = AmbientCalibration::from_samples(&capture.take_buffer());
    println!("Speech threshold: {:.4}", calibration.energy_threshold());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let marker = if energy > calibration.energy_threshold() {
            "speech"
        } else {
            ""
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}] {}",
            i + 1,
            energy,
            peak,
            meter,
            marker
        );
    }

    capture.stop();

    println!("\n---");
    println!("If RMS rose above the threshold while you spoke, the mic is working.");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    playback.play(&samples, sample_rate).await?;

    println!("If you heard the tone, your speakers are working!");
    println!("If not, run: pactl list sinks short");

    Ok(())
}

/// Speak text through the configured synthesizer
#[allow(clippy::future_not_send)]
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS ({:?}) with text: \"{text}\"", config.tts.provider);

    let synthesizer = build_synthesizer(config)?;
    synthesizer.speak(text).await?;

    println!("Done.");
    Ok(())
}

/// One-shot prompt, spoken sentence by sentence
#[allow(clippy::future_not_send)]
async fn ask(config: &Config, prompt: &str, images: &[PathBuf]) -> anyhow::Result<()> {
    let synthesizer = build_synthesizer(config)?;
    let llm = ChatCompletionClient::new(config.llm.clone());
    let segmenter = SentenceSegmenter::default();

    let fragments = llm.stream_completion(prompt, images).await?;
    let summary = StreamDispatcher::new(&segmenter)
        .run(fragments, &synthesizer)
        .await;

    for sentence in &summary.sentences {
        println!("{sentence}");
    }

    if !summary.completed {
        anyhow::bail!("response stream ended early");
    }
    Ok(())
}
