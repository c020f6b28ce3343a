//! Fixed phrases spoken outside the pipeline (greeting, farewell, prompts)

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::playback::AudioSink;
use super::tts::SpeechSynthesizer;
use crate::{Error, Outcome, Result};

/// Speaks a whole phrase in one synthesis call
///
/// Clones share one count of phrases playing right now. Capture mutes
/// itself while it is non-zero so the kiosk does not hear itself.
#[derive(Clone)]
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    speaking: Arc<AtomicUsize>,
}

impl Speaker {
    #[must_use]
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            synthesizer,
            sink,
            speaking: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Count that is non-zero while a phrase is playing
    #[must_use]
    pub fn speaking_gate(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.speaking)
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire) > 0
    }

    /// Speak `text` to completion
    ///
    /// # Errors
    ///
    /// Returns error if the audio device fails
    pub fn say(&self, text: &str) -> Result<()> {
        self.say_unless(text, &|| false)
    }

    /// Speak `text`, stopping early once `interrupted` returns `true`
    ///
    /// A phrase that cannot be synthesized is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the audio device fails
    pub fn say_unless(&self, text: &str, interrupted: &dyn Fn() -> bool) -> Result<()> {
        let audio = match self.synthesizer.synthesize(text) {
            Outcome::Ready(audio) => audio,
            Outcome::Skip(reason) => {
                tracing::warn!(reason = %reason, "could not synthesize phrase");
                return Ok(());
            }
            Outcome::Fatal(e) => return Err(e),
        };

        let _speaking = SpeakingGuard::raise(&self.speaking);
        match self.sink.play(&audio, interrupted) {
            Outcome::Ready(()) => Ok(()),
            Outcome::Skip(reason) => {
                tracing::debug!(reason = %reason, "phrase not played");
                Ok(())
            }
            Outcome::Fatal(e) => Err(Error::Audio(format!("could not play phrase: {e}"))),
        }
    }
}

/// Counts one playing phrase until dropped
struct SpeakingGuard<'a>(&'a AtomicUsize);

impl<'a> SpeakingGuard<'a> {
    fn raise(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count)
    }
}

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
