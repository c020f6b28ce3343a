//! Capture one spoken request and turn it into text

use std::time::{Duration, Instant};

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::endpoint::UtteranceDetector;
use super::stt::SpeechToText;
use crate::Result;

/// How often the capture buffer is drained into the detector
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest single utterance before it is cut off
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

/// Source of spoken requests
pub trait Listener {
    /// Wait up to `timeout` for speech to start and return it as text
    ///
    /// `Ok(None)` means nobody spoke or nothing intelligible was heard.
    ///
    /// # Errors
    ///
    /// Returns error if the device or recognition service fails
    fn listen(&mut self, timeout: Duration) -> Result<Option<String>>;
}

/// Listens on the microphone and transcribes with a speech service
pub struct MicListener {
    capture: AudioCapture,
    stt: SpeechToText,
    energy_threshold: f32,
    ambient_calibration: Duration,
}

impl MicListener {
    #[must_use]
    pub const fn new(
        capture: AudioCapture,
        stt: SpeechToText,
        energy_threshold: f32,
        ambient_calibration: Duration,
    ) -> Self {
        Self {
            capture,
            stt,
            energy_threshold,
            ambient_calibration,
        }
    }

    /// Record until an utterance completes or the timeout passes
    fn record_utterance(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>> {
        let mut detector = UtteranceDetector::new(self.energy_threshold);

        self.capture.clear_buffer();
        self.capture.start()?;

        if !self.ambient_calibration.is_zero() {
            std::thread::sleep(self.ambient_calibration);
            detector.calibrate(&self.capture.take_buffer());
        }

        let mut started = Instant::now();
        let utterance = loop {
            std::thread::sleep(POLL_INTERVAL);

            // Time spent hearing our own prompt does not count against the caller
            if self.capture.is_suppressed() && !detector.is_speaking() {
                started = Instant::now();
                continue;
            }

            if detector.process(&self.capture.take_buffer()) {
                break Some(detector.take_utterance());
            }

            let elapsed = started.elapsed();
            if detector.is_speaking() {
                if elapsed > timeout + MAX_UTTERANCE {
                    tracing::debug!("utterance too long, cutting off");
                    break Some(detector.take_utterance());
                }
            } else if elapsed > timeout {
                break None;
            }
        };

        self.capture.stop();
        Ok(utterance)
    }
}

impl Listener for MicListener {
    fn listen(&mut self, timeout: Duration) -> Result<Option<String>> {
        tracing::debug!(timeout_secs = timeout.as_secs(), "listening");

        let Some(samples) = self.record_utterance(timeout)? else {
            tracing::debug!("no speech before timeout");
            return Ok(None);
        };

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        let transcript = self.stt.transcribe(&wav)?;

        Ok(normalize_request(&transcript))
    }
}

/// Lower-case and trim a transcript; blank becomes `None`
#[must_use]
pub fn normalize_request(transcript: &str) -> Option<String> {
    let request = transcript.trim().to_lowercase();
    (!request.is_empty()).then_some(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_request() {
        assert_eq!(
            normalize_request("  What Is The Hybrid Lab? "),
            Some("what is the hybrid lab?".to_string())
        );
        assert_eq!(normalize_request("   "), None);
    }
}
