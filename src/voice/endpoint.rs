//! Utterance endpointing
//!
//! Energy-based detection of where a spoken request starts and stops.
//! The threshold is raised to sit above ambient noise after calibration.

use super::capture::SAMPLE_RATE;

/// Minimum speech before an utterance can complete (0.3 s)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends an utterance (0.5 s)
const SILENCE_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// Headroom over measured ambient energy
const AMBIENT_MARGIN: f32 = 1.5;

/// Where the detector is within an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech to begin
    Idle,
    /// Speech started, accumulating until silence
    Speaking,
    /// Speech followed by enough silence
    Complete,
}

/// Finds one utterance in a stream of audio chunks
#[derive(Debug)]
pub struct UtteranceDetector {
    base_threshold: f32,
    threshold: f32,
    state: DetectorState,
    speech: Vec<f32>,
    silence: usize,
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            base_threshold: threshold,
            threshold,
            state: DetectorState::Idle,
            speech: Vec::new(),
            silence: 0,
        }
    }

    /// Adjust the speech threshold from a sample of room noise
    ///
    /// Never drops below the configured threshold.
    pub fn calibrate(&mut self, ambient: &[f32]) {
        let ambient_energy = rms_energy(ambient);
        self.threshold = self.base_threshold.max(ambient_energy * AMBIENT_MARGIN);
        tracing::debug!(
            ambient = ambient_energy,
            threshold = self.threshold,
            "calibrated for ambient noise"
        );
    }

    /// Feed one chunk; returns `true` once the utterance is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech.clear();
                    self.speech.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            DetectorState::Speaking => {
                self.speech.extend_from_slice(samples);
                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                if self.silence > SILENCE_SAMPLES {
                    if self.speech.len() - self.silence > MIN_SPEECH_SAMPLES {
                        self.state = DetectorState::Complete;
                        tracing::debug!(samples = self.speech.len(), "utterance complete");
                    } else {
                        // A click or cough, not a request
                        self.reset();
                    }
                }
            }
            DetectorState::Complete => {}
        }

        self.state == DetectorState::Complete
    }

    /// Speech has begun but not finished
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == DetectorState::Speaking
    }

    /// Take the captured utterance and return to idle
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let speech = std::mem::take(&mut self.speech);
        self.reset();
        speech
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech.clear();
        self.silence = 0;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// RMS energy of a chunk
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
