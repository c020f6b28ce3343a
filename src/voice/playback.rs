//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::{Error, Outcome, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often a playing segment checks for completion or interruption
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Destination for encoded speech
pub trait AudioSink: Send + Sync {
    /// Play one encoded (MP3) segment to completion
    ///
    /// `interrupted` is polled while playing; once it returns `true` the
    /// segment is cut short and reported as `Skip`. Device failures are
    /// `Fatal`.
    fn play(&self, audio: &[u8], interrupted: &dyn Fn() -> bool) -> Outcome<()>;
}

/// Plays audio to the default output device
///
/// Only one segment plays at a time; concurrent callers wait their turn.
pub struct AudioPlayback {
    config: StreamConfig,
    device_lock: Mutex<()>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            device_lock: Mutex::new(()),
        })
    }

    /// Play mono f32 samples at [`PLAYBACK_SAMPLE_RATE`] until done
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        self.play_blocking(samples, &|| false).map(|_| ())
    }

    /// Play audio from MP3 bytes until done
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let samples = decode_to_output_rate(mp3_data)?;
        self.play_samples(samples)
    }

    /// Play samples, returning `false` if cut short by `interrupted`
    fn play_blocking(&self, samples: Vec<f32>, interrupted: &dyn Fn() -> bool) -> Result<bool> {
        if samples.is_empty() {
            return Ok(true);
        }

        let _device = self.device_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = self.config.channels as usize;
        let sample_count = samples.len();

        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_cb.load(Ordering::Relaxed);

                    for frame in data.chunks_mut(channels) {
                        let sample = if let Some(&s) = samples_cb.get(pos) {
                            pos += 1;
                            s
                        } else {
                            finished_cb.store(true, Ordering::Release);
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }

                    position_cb.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Poll for completion with timeout
        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();
        let mut completed = true;

        while !finished.load(Ordering::Acquire) {
            if interrupted() {
                completed = false;
                break;
            }
            if start.elapsed() > timeout {
                tracing::warn!("playback did not report completion, stopping");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        if completed {
            // Let the device flush its last buffer
            std::thread::sleep(Duration::from_millis(100));
        }

        drop(stream);
        tracing::debug!(samples = sample_count, completed, "playback complete");

        Ok(completed)
    }
}

impl AudioSink for AudioPlayback {
    fn play(&self, audio: &[u8], interrupted: &dyn Fn() -> bool) -> Outcome<()> {
        let samples = match decode_to_output_rate(audio) {
            Ok(samples) => samples,
            Err(e) => return Outcome::Skip(e.to_string()),
        };

        match self.play_blocking(samples, interrupted) {
            Ok(true) => Outcome::Ready(()),
            Ok(false) => Outcome::Skip("interrupted".to_string()),
            Err(e) => Outcome::Fatal(e),
        }
    }
}

/// Decode MP3 and bring it to the playback rate
///
/// # Errors
///
/// Returns error if the data is not decodable MP3
pub fn decode_to_output_rate(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let (samples, sample_rate) = decode_mp3(mp3_data)?;
    resample(samples, sample_rate, PLAYBACK_SAMPLE_RATE)
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(PLAYBACK_SAMPLE_RATE);

                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            // ID3 tags and other non-audio bytes
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() && !mp3_data.is_empty() {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Resample mono audio between rates
fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples);
    }

    let ratio = f64::from(to) / f64::from(from);
    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.1, PolynomialDegree::Cubic, RESAMPLE_CHUNK, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let mut out = Vec::with_capacity((samples.len() as f64 * ratio) as usize + RESAMPLE_CHUNK);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
        out.extend_from_slice(&frames[0]);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let frames = resampler
            .process_partial(Some(&[rest]), None)
            .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
        out.extend_from_slice(&frames[0]);
    }

    // Flush the resampler delay line
    let tail = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
    out.extend_from_slice(&tail[0]);

    Ok(out)
}
