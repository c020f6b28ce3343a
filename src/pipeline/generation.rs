//! Text generation stage
//!
//! Streams reply fragments from the generator, batches them into text
//! segments and publishes them in order.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::queue::SegmentQueue;
use super::signals::{Counters, Signal, Signals, StageGuard};
use super::TextSegment;
use crate::conversation_log::ConversationLog;
use crate::llm::TextGenerator;
use crate::Outcome;

/// A segment is flushed once the accumulator holds at least this many characters
pub const MIN_SEGMENT_CHARS: usize = 10;

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*#`]+").expect("valid regex"));

/// Remove emphasis and heading markers that should not be spoken
#[must_use]
pub fn strip_markup(fragment: &str) -> String {
    MARKUP.replace_all(fragment, "").into_owned()
}

/// Batches streamed fragments into segments of at least [`MIN_SEGMENT_CHARS`]
#[derive(Debug, Default)]
pub struct Segmenter {
    pending: String,
}

impl Segmenter {
    /// Create an empty segmenter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment, returning a segment once the threshold is reached
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.pending.push_str(fragment);
        if self.pending.chars().count() >= MIN_SEGMENT_CHARS {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Take whatever remains at end of stream, if it has speakable content
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        (!rest.trim().is_empty()).then_some(rest)
    }
}

/// How a generation run ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Full reply as published, markup stripped
    pub reply: String,
    /// Number of text segments emitted
    pub segments: usize,
    /// Fragments skipped because they could not be read
    pub skipped_fragments: usize,
    /// Stream ended on a fatal error
    pub failed: bool,
}

/// Producer stage: generator stream in, text segments out
pub struct GenerationStage {
    pub(super) generator: Arc<dyn TextGenerator>,
    pub(super) request: String,
    pub(super) queue: Arc<SegmentQueue<TextSegment>>,
    pub(super) signals: Arc<Signals>,
    pub(super) counters: Arc<Counters>,
    pub(super) log: Option<Arc<ConversationLog>>,
}

impl GenerationStage {
    /// Run to completion on the current thread
    ///
    /// `GenerationDone` is raised exactly once when this returns, and
    /// `Abort` as well if no segment was produced. Only a reply that
    /// streamed to its end is remembered and logged.
    pub fn run(self) -> GenerationReport {
        let _guard = StageGuard::new(&self.signals, Some(Signal::GenerationDone), "generation");
        let mut report = GenerationReport::default();

        match self.generator.stream(&self.request) {
            Ok(fragments) => self.consume(fragments, &mut report),
            Err(e) => {
                tracing::error!(error = %e, "generation request failed");
                report.failed = true;
            }
        }

        if report.segments == 0 {
            tracing::warn!("generation produced no segments, aborting pipeline");
            self.signals.abort();
        } else if report.failed {
            tracing::debug!("partial reply not recorded");
        } else if !self.signals.is_aborted() {
            self.generator.remember(&self.request, &report.reply);
            if let Some(log) = &self.log {
                log.append(&format!("AI: {} ", report.reply));
            }
        }

        tracing::debug!(
            segments = report.segments,
            skipped = report.skipped_fragments,
            failed = report.failed,
            "generation stage finished"
        );
        report
    }

    fn consume(&self, fragments: crate::llm::FragmentStream, report: &mut GenerationReport) {
        let mut segmenter = Segmenter::new();

        for item in fragments {
            if self.signals.is_aborted() {
                tracing::debug!("generation interrupted");
                return;
            }

            match item {
                Outcome::Ready(raw) => {
                    let text = strip_markup(&raw);
                    if let Some(segment) = segmenter.push(&text) {
                        self.publish(segment, report);
                    }
                }
                Outcome::Skip(reason) => {
                    tracing::warn!(reason, "skipping unreadable fragment");
                    report.skipped_fragments += 1;
                }
                Outcome::Fatal(e) => {
                    tracing::error!(error = %e, "generation stream failed");
                    report.failed = true;
                    break;
                }
            }
        }

        if let Some(rest) = segmenter.finish() {
            self.publish(rest, report);
        }
    }

    fn publish(&self, text: String, report: &mut GenerationReport) {
        report.reply.push_str(&text);
        report.segments += 1;

        let index = self.counters.segment_produced();
        tracing::debug!(segment = index, chars = text.chars().count(), "text segment produced");
        self.queue.push(TextSegment { index, text });
    }
}
