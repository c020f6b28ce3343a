//! Playback stage

use std::sync::Arc;
use std::time::Duration;

use super::queue::SegmentQueue;
use super::signals::{Counters, Signal, Signals, StageGuard};
use super::AudioSegment;
use crate::voice::AudioSink;
use crate::Outcome;

/// Player stage: audio segments in, sound out, one segment at a time
pub struct PlaybackStage {
    pub(super) sink: Arc<dyn AudioSink>,
    pub(super) audio_queue: Arc<SegmentQueue<AudioSegment>>,
    pub(super) signals: Arc<Signals>,
    pub(super) counters: Arc<Counters>,
    pub(super) queue_wait: Duration,
}

impl PlaybackStage {
    /// Play segments back-to-back until synthesis is done and every
    /// synthesized segment has been played, or until aborted
    ///
    /// Raises `PlaybackDone` however it exits.
    pub fn run(self) {
        let _guard = StageGuard::new(&self.signals, Some(Signal::PlaybackDone), "playback");

        while !self.signals.is_aborted() {
            if let Some(segment) = self.audio_queue.pop_timeout(self.queue_wait) {
                self.play(&segment);
            }

            if self.signals.is_set(Signal::SynthesisDone)
                && self.counters.snapshot().playback_caught_up()
            {
                tracing::debug!("playback drained");
                return;
            }
        }

        let dropped = self.audio_queue.drain();
        tracing::debug!(dropped, "playback aborted");
    }

    fn play(&self, segment: &AudioSegment) {
        let signals = Arc::clone(&self.signals);
        let interrupted = move || signals.is_aborted();

        match self.sink.play(&segment.audio, &interrupted) {
            Outcome::Ready(()) => {
                self.counters.segment_played();
                tracing::debug!(segment = segment.index, "segment played");
            }
            Outcome::Skip(reason) => {
                self.counters.playback_skipped();
                tracing::warn!(segment = segment.index, reason, "segment not played");
            }
            Outcome::Fatal(e) => {
                self.counters.playback_skipped();
                tracing::error!(
                    segment = segment.index,
                    error = %e,
                    "audio device failed, dropping remaining playback"
                );
                self.signals.abort();
            }
        }
    }
}
