//! Speech synthesis stage

use std::sync::Arc;
use std::time::Duration;

use super::queue::SegmentQueue;
use super::signals::{Counters, Signal, Signals, StageGuard};
use super::{AudioSegment, TextSegment};
use crate::voice::SpeechSynthesizer;
use crate::Outcome;

/// Converter stage: text segments in, audio segments out, strictly in order
pub struct SynthesisStage {
    pub(super) synthesizer: Arc<dyn SpeechSynthesizer>,
    pub(super) text_queue: Arc<SegmentQueue<TextSegment>>,
    pub(super) audio_queue: Arc<SegmentQueue<AudioSegment>>,
    pub(super) signals: Arc<Signals>,
    pub(super) counters: Arc<Counters>,
    pub(super) queue_wait: Duration,
}

impl SynthesisStage {
    /// Run until caught up with a finished generation stage, or aborted
    ///
    /// Raises `SynthesisDone` only on the caught-up path.
    pub fn run(self) {
        let _guard = StageGuard::new(&self.signals, None, "synthesis");

        while !self.signals.is_aborted() {
            if let Some(segment) = self.text_queue.pop_timeout(self.queue_wait) {
                self.convert(segment);
            }

            if self.signals.is_set(Signal::GenerationDone)
                && self.counters.snapshot().synthesis_caught_up()
            {
                tracing::debug!("synthesis caught up");
                self.signals.set(Signal::SynthesisDone);
                return;
            }
        }

        let dropped = self.text_queue.drain();
        tracing::debug!(dropped, "synthesis aborted");
    }

    fn convert(&self, segment: TextSegment) {
        match self.synthesizer.synthesize(&segment.text) {
            Outcome::Ready(audio) => {
                self.counters.segment_synthesized();
                tracing::debug!(
                    segment = segment.index,
                    bytes = audio.len(),
                    "audio segment synthesized"
                );
                self.audio_queue.push(AudioSegment {
                    index: segment.index,
                    audio,
                });
            }
            Outcome::Skip(reason) => {
                self.counters.synthesis_skipped();
                tracing::warn!(segment = segment.index, reason, "dropping segment from playback");
            }
            Outcome::Fatal(e) => {
                self.counters.synthesis_skipped();
                tracing::error!(segment = segment.index, error = %e, "synthesis failed, aborting");
                self.signals.abort();
            }
        }
    }
}
