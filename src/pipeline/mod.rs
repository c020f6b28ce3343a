//! Streaming response pipeline
//!
//! One utterance flows through three stages running on their own threads:
//!
//! ```text
//! request ─▶ generation ─▶ [text queue] ─▶ synthesis ─▶ [audio queue] ─▶ playback ─▶ speaker
//!                 │                             │                            │
//!                 └──── GenerationDone ─────────┴──── SynthesisDone ─────────┴─ PlaybackDone
//! ```
//!
//! Completion travels through latches and counters, never through the
//! queues. `Abort` stops every stage within one queue wait.

mod generation;
mod playback;
mod queue;
mod signals;
mod synthesis;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use uuid::Uuid;

pub use generation::{GenerationReport, GenerationStage, MIN_SEGMENT_CHARS, Segmenter, strip_markup};
pub use playback::PlaybackStage;
pub use queue::SegmentQueue;
pub use signals::{CounterSnapshot, Counters, Signal, Signals};
pub use synthesis::SynthesisStage;

use crate::conversation_log::ConversationLog;
use crate::llm::TextGenerator;
use crate::voice::{AudioSink, SpeechSynthesizer};
use crate::Result;

/// Default bounded wait on a stage queue
pub const DEFAULT_QUEUE_WAIT: Duration = Duration::from_secs(1);

/// A chunk of the generated reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Position within the reply, starting at zero
    pub index: usize,
    /// Non-empty reply text
    pub text: String,
}

/// Encoded audio for one [`TextSegment`], same index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    /// Index of the text segment this was synthesized from
    pub index: usize,
    /// Encoded audio (MP3)
    pub audio: Vec<u8>,
}

/// Pipeline tuning
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Bounded wait used by synthesis and playback when their queue is empty
    pub queue_wait: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_wait: DEFAULT_QUEUE_WAIT,
        }
    }
}

/// Summary of one finished utterance
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Id attached to every log line of this run
    pub utterance_id: Uuid,
    /// Final counter values
    pub counters: CounterSnapshot,
    /// Outcome of the generation stage
    pub generation: GenerationReport,
    /// `Abort` was raised before the pipeline drained on its own
    pub aborted: bool,
    /// Wall time from start to full teardown
    pub elapsed: Duration,
}

/// Runs one pipeline per utterance and never overlaps two of them
pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    log: Option<Arc<ConversationLog>>,
    settings: PipelineSettings,
    active: Mutex<Option<ActiveRun>>,
    running: Mutex<()>,
}

impl Orchestrator {
    /// Create an orchestrator over the three external services
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            sink,
            log: None,
            settings,
            active: Mutex::new(None),
            running: Mutex::new(()),
        }
    }

    /// Record each full reply in the conversation log
    #[must_use]
    pub fn with_log(mut self, log: Arc<ConversationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Whether a pipeline is currently running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Raise `Abort` on the running pipeline, if any
    ///
    /// Returns `true` if a pipeline was running
    pub fn abort_active(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.as_ref().is_some_and(|run| {
            tracing::info!("aborting active pipeline");
            run.signals.abort();
            true
        })
    }

    /// Live counters of the running pipeline, if any
    #[must_use]
    pub fn active_counters(&self) -> Option<CounterSnapshot> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| run.counters.snapshot())
    }

    /// Run the full pipeline for one utterance
    ///
    /// Returns only after all three stages have terminated.
    ///
    /// # Errors
    ///
    /// Returns error if a stage thread cannot be spawned
    pub fn run(&self, request: &str) -> Result<PipelineReport> {
        let _exclusive = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        let utterance_id = Uuid::new_v4();
        let span = tracing::info_span!("utterance", id = %utterance_id);
        let _enter = span.enter();
        let started = Instant::now();

        // Fresh state per utterance
        let signals = Arc::new(Signals::new());
        let counters = Arc::new(Counters::new());
        let text_queue = Arc::new(SegmentQueue::new());
        let audio_queue = Arc::new(SegmentQueue::new());

        let _active = ActiveSlot::install(
            &self.active,
            ActiveRun {
                signals: Arc::clone(&signals),
                counters: Arc::clone(&counters),
            },
        );
        tracing::info!(request, "pipeline started");

        let generation = GenerationStage {
            generator: Arc::clone(&self.generator),
            request: request.to_string(),
            queue: Arc::clone(&text_queue),
            signals: Arc::clone(&signals),
            counters: Arc::clone(&counters),
            log: self.log.clone(),
        };
        let synthesis = SynthesisStage {
            synthesizer: Arc::clone(&self.synthesizer),
            text_queue,
            audio_queue: Arc::clone(&audio_queue),
            signals: Arc::clone(&signals),
            counters: Arc::clone(&counters),
            queue_wait: self.settings.queue_wait,
        };
        let playback = PlaybackStage {
            sink: Arc::clone(&self.sink),
            audio_queue,
            signals: Arc::clone(&signals),
            counters: Arc::clone(&counters),
            queue_wait: self.settings.queue_wait,
        };

        let generation = spawn_stage("generation", &span, move || generation.run())?;
        let synthesis = match spawn_stage("synthesis", &span, move || synthesis.run()) {
            Ok(handle) => handle,
            Err(e) => {
                signals.abort();
                join_stage("generation", generation);
                return Err(e);
            }
        };
        let playback = match spawn_stage("playback", &span, move || playback.run()) {
            Ok(handle) => handle,
            Err(e) => {
                signals.abort();
                join_stage("generation", generation);
                join_stage("synthesis", synthesis);
                return Err(e);
            }
        };

        signals.wait_any(&[Signal::GenerationDone]);
        let generation = join_stage("generation", generation).unwrap_or_default();

        signals.wait_any(&[Signal::SynthesisDone, Signal::Abort]);
        signals.wait_any(&[Signal::PlaybackDone, Signal::Abort]);
        let aborted = signals.is_aborted();

        // Blanket stop; a no-op for stages that already finished
        signals.abort();
        join_stage("synthesis", synthesis);
        join_stage("playback", playback);

        let report = PipelineReport {
            utterance_id,
            counters: counters.snapshot(),
            generation,
            aborted,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            produced = report.counters.produced,
            synthesized = report.counters.synthesized,
            played = report.counters.played,
            aborted,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "pipeline finished"
        );

        Ok(report)
    }
}

/// Shared state of the running pipeline
struct ActiveRun {
    signals: Arc<Signals>,
    counters: Arc<Counters>,
}

/// Publishes the running pipeline and clears it on drop
struct ActiveSlot<'a> {
    slot: &'a Mutex<Option<ActiveRun>>,
}

impl<'a> ActiveSlot<'a> {
    fn install(slot: &'a Mutex<Option<ActiveRun>>, run: ActiveRun) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(run);
        Self { slot }
    }
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn spawn_stage<T, F>(name: &str, span: &tracing::Span, body: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let span = span.clone();
    let handle = std::thread::Builder::new()
        .name(format!("pipeline-{name}"))
        .spawn(move || span.in_scope(body))?;
    Ok(handle)
}

fn join_stage<T>(name: &str, handle: JoinHandle<T>) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!(stage = name, "stage thread panicked");
            None
        }
    }
}
