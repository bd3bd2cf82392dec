//! Audio playback to speakers
//!
//! Synthesized MP3 is decoded, sped up without changing pitch, resampled to
//! the output device rate and played to completion.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, StreamConfig};

use crate::{Error, Result};

/// Speedup chunk length in milliseconds
const CHUNK_MS: f64 = 150.0;

/// Crossfade between kept chunks in milliseconds
const CROSSFADE_MS: f64 = 25.0;

/// Completion poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Extra wait beyond the nominal clip length before giving up
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Mono PCM decoded from MP3
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Samples in -1.0..=1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device at its default configuration
    ///
    /// # Errors
    ///
    /// Returns error if no output device or configuration is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("no usable output config: {e}")))?
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Decode, speed up and play MP3 audio
    ///
    /// # Errors
    ///
    /// Returns error if decoding, resampling or playback fails
    pub async fn play_mp3(&self, mp3: &[u8], speed: f32) -> Result<()> {
        let decoded = decode_mp3(mp3)?;
        let fast = speed_up(&decoded.samples, decoded.sample_rate, speed);
        self.play(&fast, decoded.sample_rate).await
    }

    /// Play mono samples recorded at `sample_rate`
    ///
    /// Resolves once the device has consumed every sample.
    ///
    /// # Errors
    ///
    /// Returns error if resampling or the output stream fails
    pub async fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let device_rate = self.config.sample_rate.0;
        let samples = if sample_rate == device_rate {
            samples.to_vec()
        } else {
            resample(samples, sample_rate, device_rate)?
        };

        let total = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let channels = usize::from(self.config.channels.max(1));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);

                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or(0.0);
                            frame.fill(sample);
                            pos = (pos + 1).min(samples.len());
                        }

                        position.store(pos, Ordering::Relaxed);
                        if pos >= samples.len() {
                            finished.store(true, Ordering::Release);
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let frames = u64::try_from(total).unwrap_or(u64::MAX);
        let nominal =
            Duration::from_millis(frames.saturating_mul(1000) / u64::from(device_rate.max(1)));
        let deadline = tokio::time::Instant::now() + nominal + DRAIN_GRACE;

        while !finished.load(Ordering::Acquire) {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    played = position.load(Ordering::Relaxed),
                    total,
                    "playback did not drain in time"
                );
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        // Let the device flush its last buffer
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(stream);

        tracing::debug!(samples = total, "playback complete");
        Ok(())
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let channels = frame.channels.max(1);
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);

                #[allow(clippy::cast_precision_loss)]
                let scale = 1.0 / (32768.0 * channels as f32);
                samples.extend(
                    frame
                        .data
                        .chunks(channels)
                        .map(|f| f.iter().map(|&s| f32::from(s)).sum::<f32>() * scale),
                );
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => {}
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 contained no audio frames".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Speed up speech without raising its pitch
///
/// Audio is cut into fixed windows; the tail of each window is dropped and
/// neighbours are joined with a short crossfade. The final window is kept
/// whole. Speeds at or below 1.0, and clips shorter than two windows, are
/// returned unchanged.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn speed_up(samples: &[f32], sample_rate: u32, speed: f32) -> Vec<f32> {
    if !speed.is_finite() || speed <= 1.0 {
        return samples.to_vec();
    }

    let to_samples = |ms: f64| (ms * f64::from(sample_rate) / 1000.0) as usize;

    let attack = 1.0 / f64::from(speed);
    let (chunk_ms, remove_ms) = if speed < 2.0 {
        (CHUNK_MS, (CHUNK_MS * (1.0 - attack) / attack).floor())
    } else {
        ((attack * CHUNK_MS / (1.0 - attack)).floor(), CHUNK_MS)
    };
    let crossfade_ms = CROSSFADE_MS.min(remove_ms - 1.0).max(0.0);

    let window = to_samples(chunk_ms + remove_ms);
    if window == 0 || samples.len() <= window {
        return samples.to_vec();
    }

    let drop_tail = to_samples(remove_ms - crossfade_ms);
    let crossfade = to_samples(crossfade_ms);

    let chunks: Vec<&[f32]> = samples.chunks(window).collect();
    let Some((last, body)) = chunks.split_last() else {
        return samples.to_vec();
    };

    let mut out = Vec::with_capacity(samples.len() / speed.max(1.0) as usize + window);
    for chunk in body {
        let kept = &chunk[..chunk.len().saturating_sub(drop_tail)];
        append_with_crossfade(&mut out, kept, crossfade);
    }
    out.extend_from_slice(last);

    out
}

/// Append `next`, blending its head over the last `crossfade` samples of `out`
#[allow(clippy::cast_precision_loss)]
fn append_with_crossfade(out: &mut Vec<f32>, next: &[f32], crossfade: usize) {
    let fade = crossfade.min(out.len()).min(next.len());
    let start = out.len() - fade;

    for (i, &incoming) in next[..fade].iter().enumerate() {
        let t = (i + 1) as f32 / (fade + 1) as f32;
        let existing = &mut out[start + i];
        *existing = existing.mul_add(1.0 - t, incoming * t);
    }

    out.extend_from_slice(&next[fade..]);
}

/// Resample mono audio with rubato
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        chunk_size,
        2,
        1,
    )
    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate.max(1) as usize);

    for chunk in samples.chunks(chunk_size) {
        let result = if chunk.len() == chunk_size {
            resampler.process(&[chunk], None)
        } else {
            resampler.process_partial(Some(&[chunk][..]), None)
        }
        .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;

        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    Ok(output)
}
