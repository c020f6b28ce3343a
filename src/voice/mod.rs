//! Voice processing module
//!
//! Microphone capture with utterance endpointing, speech recognition,
//! speech synthesis, and speaker playback.

mod capture;
mod endpoint;
mod listener;
mod playback;
mod speaker;
mod stt;
mod tts;

pub use capture::{AudioCapture, CaptureBuffer, ECHO_TAIL, SAMPLE_RATE, samples_to_wav};
pub use endpoint::{DetectorState, UtteranceDetector, rms_energy};
pub use listener::{Listener, MicListener, normalize_request};
pub use playback::{AudioPlayback, AudioSink, PLAYBACK_SAMPLE_RATE, decode_to_output_rate};
pub use speaker::Speaker;
pub use stt::SpeechToText;
pub use tts::{SpeechSynthesizer, TextToSpeech};
