//! Microphone capture
//!
//! The input stream feeds a [`CaptureBuffer`], which downmixes to mono and
//! drops everything heard while the kiosk itself is speaking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Capture rate (16 kHz is what the speech services expect)
pub const SAMPLE_RATE: u32 = 16000;

/// Audio kept after the speaker falls silent still carries its echo
pub const ECHO_TAIL: Duration = Duration::from_millis(300);

/// Oldest audio is dropped past this many samples (one minute)
const MAX_BUFFERED: usize = 16_000 * 60;

/// Mono sample store shared with the input callback
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: Mutex<Vec<f32>>,
    gate: Option<Arc<AtomicUsize>>,
    echo_tail: Duration,
    gated_at: Mutex<Option<Instant>>,
}

impl CaptureBuffer {
    /// Buffer that drops input while `gate` is non-zero and for `echo_tail` after
    #[must_use]
    pub fn new(gate: Option<Arc<AtomicUsize>>, echo_tail: Duration) -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
            gate,
            echo_tail,
            gated_at: Mutex::new(None),
        }
    }

    /// Whether input is currently being dropped
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        let mut gated_at = self.gated_at.lock().unwrap_or_else(PoisonError::into_inner);
        if self.gate.as_ref().is_some_and(|g| g.load(Ordering::Acquire) > 0) {
            *gated_at = Some(Instant::now());
            return true;
        }
        gated_at.is_some_and(|at| at.elapsed() < self.echo_tail)
    }

    /// Append interleaved frames of `channels` samples each
    pub fn push(&self, data: &[f32], channels: usize) {
        if self.is_suppressed() {
            return;
        }

        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if channels <= 1 {
            samples.extend_from_slice(data);
        } else {
            #[allow(clippy::cast_precision_loss)]
            let scale = 1.0 / channels as f32;
            samples.extend(data.chunks(channels).map(|frame| frame.iter().sum::<f32>() * scale));
        }

        if samples.len() > MAX_BUFFERED {
            let excess = samples.len() - MAX_BUFFERED;
            samples.drain(..excess);
        }
    }

    /// Samples buffered since the last call
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        std::mem::take(&mut *self.samples.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Pick a 16 kHz input config, preferring mono
fn select_input_config(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
) -> Option<SupportedStreamConfigRange> {
    configs
        .filter(|c| {
            c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .min_by_key(SupportedStreamConfigRange::channels)
}

/// Records from the default input device into a [`CaptureBuffer`]
pub struct AudioCapture {
    config: StreamConfig,
    buffer: Arc<CaptureBuffer>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no 16 kHz input is available
    pub fn new() -> Result<Self> {
        Self::with_gate(None)
    }

    /// Open the default input device, muted while `gate` is non-zero
    ///
    /// # Errors
    ///
    /// Returns error if no 16 kHz input is available
    pub fn with_gate(gate: Option<Arc<AtomicUsize>>) -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let configs = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?;
        let config = select_input_config(configs)
            .ok_or_else(|| Error::Audio("no 16 kHz input config".to_string()))?
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            gated = gate.is_some(),
            "microphone opened"
        );

        Ok(Self {
            config,
            buffer: Arc::new(CaptureBuffer::new(gate, ECHO_TAIL)),
            stream: None,
        })
    }

    /// Start recording; a no-op if already recording
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let buffer = Arc::clone(&self.buffer);
        let channels = usize::from(self.config.channels);
        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| buffer.push(data, channels),
                |err| {
                    tracing::error!(error = %err, "microphone stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::trace!("microphone stopped");
        }
    }

    /// Mono samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer.take()
    }

    /// Discard anything captured so far
    pub fn clear_buffer(&self) {
        self.buffer.clear();
    }

    /// Input is being dropped because the kiosk is speaking
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.buffer.is_suppressed()
    }

    /// Record for a fixed duration and return the samples
    ///
    /// # Errors
    ///
    /// Returns error if recording cannot start
    pub fn record_for(&mut self, duration: Duration) -> Result<Vec<f32>> {
        self.clear_buffer();
        self.start()?;
        std::thread::sleep(duration);
        self.stop();
        Ok(self.take_buffer())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encode mono f32 samples as 16-bit PCM WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

    for &sample in samples {
        writer
            .write_sample(to_pcm16(sample))
            .map_err(|e| Error::Audio(e.to_string()))?;
    }
    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(cursor.into_inner())
}

#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_downmixes_stereo() {
        let buffer = CaptureBuffer::new(None, Duration::ZERO);
        buffer.push(&[0.2, 0.4, -1.0, 1.0], 2);
        let samples = buffer.take();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.3).abs() < 1e-6);
        assert!(samples[1].abs() < 1e-6);
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn test_buffer_drops_input_while_gated() {
        let gate = Arc::new(AtomicUsize::new(1));
        let buffer = CaptureBuffer::new(Some(Arc::clone(&gate)), Duration::ZERO);

        buffer.push(&[0.5; 160], 1);
        assert!(buffer.is_suppressed());
        assert!(buffer.take().is_empty());

        gate.store(0, Ordering::Release);
        buffer.push(&[0.5; 160], 1);
        assert_eq!(buffer.take().len(), 160);
    }

    #[test]
    fn test_buffer_echo_tail() {
        let gate = Arc::new(AtomicUsize::new(1));
        let buffer = CaptureBuffer::new(Some(Arc::clone(&gate)), Duration::from_millis(100));

        assert!(buffer.is_suppressed());
        gate.store(0, Ordering::Release);
        buffer.push(&[0.5; 160], 1);
        assert!(buffer.take().is_empty());

        std::thread::sleep(Duration::from_millis(150));
        buffer.push(&[0.5; 160], 1);
        assert_eq!(buffer.take().len(), 160);
    }

    #[test]
    fn test_buffer_keeps_latest_minute() {
        let buffer = CaptureBuffer::new(None, Duration::ZERO);
        buffer.push(&vec![0.0; MAX_BUFFERED], 1);
        buffer.push(&[1.0; 10], 1);
        let samples = buffer.take();
        assert_eq!(samples.len(), MAX_BUFFERED);
        assert!((samples[MAX_BUFFERED - 1] - 1.0).abs() < f32::EPSILON);
        assert!(samples[0].abs() < f32::EPSILON);
    }

    #[test]
    fn test_pcm_conversion_clamps() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.0), 32767);
        assert_eq!(to_pcm16(4.0), 32767);
        assert_eq!(to_pcm16(-4.0), -32768);
    }
}
