//! Completion latches and segment counters shared by the pipeline stages

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One-shot completion signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Generation stream has ended (success, empty, or failure)
    GenerationDone,
    /// Synthesis has caught up with a finished generation stage
    SynthesisDone,
    /// Playback stage has exited
    PlaybackDone,
    /// Force every stage to stop
    Abort,
}

impl Signal {
    const fn slot(self) -> usize {
        match self {
            Self::GenerationDone => 0,
            Self::SynthesisDone => 1,
            Self::PlaybackDone => 2,
            Self::Abort => 3,
        }
    }
}

/// Set-once latches observed by any number of waiters
///
/// All latches share one condition variable so a waiter can block on
/// "whichever of these fires first".
#[derive(Debug, Default)]
pub struct Signals {
    flags: Mutex<[bool; 4]>,
    changed: Condvar,
}

impl Signals {
    /// Create a fresh set with every latch cleared
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, [bool; 4]> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a latch, waking all waiters
    ///
    /// Returns `true` if this call performed the transition
    pub fn set(&self, signal: Signal) -> bool {
        let mut flags = self.lock();
        let slot = &mut flags[signal.slot()];
        if *slot {
            return false;
        }
        *slot = true;
        drop(flags);

        tracing::trace!(?signal, "signal set");
        self.changed.notify_all();
        true
    }

    /// Check a latch without blocking
    #[must_use]
    pub fn is_set(&self, signal: Signal) -> bool {
        self.lock()[signal.slot()]
    }

    /// Shorthand for `is_set(Signal::Abort)`
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.is_set(Signal::Abort)
    }

    /// Set the abort latch
    pub fn abort(&self) -> bool {
        self.set(Signal::Abort)
    }

    /// Block until any of `signals` is set and return the first one found
    pub fn wait_any(&self, signals: &[Signal]) -> Signal {
        let mut flags = self.lock();
        loop {
            if let Some(hit) = first_set(&flags, signals) {
                return hit;
            }
            flags = self
                .changed
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`Signals::wait_any`] but gives up after `timeout`
    pub fn wait_any_timeout(&self, signals: &[Signal], timeout: Duration) -> Option<Signal> {
        let deadline = Instant::now() + timeout;
        let mut flags = self.lock();
        loop {
            if let Some(hit) = first_set(&flags, signals) {
                return Some(hit);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            flags = self
                .changed
                .wait_timeout(flags, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

fn first_set(flags: &[bool; 4], signals: &[Signal]) -> Option<Signal> {
    signals.iter().copied().find(|s| flags[s.slot()])
}

/// Monotonic per-utterance segment counters
///
/// Writers increment a counter before handing the item downstream, so
/// `played <= synthesized <= produced` holds whenever the counters are
/// read downstream-first (see [`Counters::snapshot`]).
#[derive(Debug, Default)]
pub struct Counters {
    produced: AtomicUsize,
    synthesized: AtomicUsize,
    synthesis_skipped: AtomicUsize,
    played: AtomicUsize,
    playback_skipped: AtomicUsize,
}

/// Point-in-time view of [`Counters`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Text segments emitted by generation
    pub produced: usize,
    /// Audio segments emitted by synthesis
    pub synthesized: usize,
    /// Text segments synthesis dropped
    pub synthesis_skipped: usize,
    /// Audio segments played to completion
    pub played: usize,
    /// Audio segments playback dropped
    pub playback_skipped: usize,
}

impl CounterSnapshot {
    /// `(produced, synthesized, played)`
    #[must_use]
    pub const fn triple(&self) -> (usize, usize, usize) {
        (self.produced, self.synthesized, self.played)
    }

    /// Every produced segment has been handled by synthesis
    #[must_use]
    pub const fn synthesis_caught_up(&self) -> bool {
        self.synthesized + self.synthesis_skipped == self.produced
    }

    /// Every synthesized segment has been handled by playback
    #[must_use]
    pub const fn playback_caught_up(&self) -> bool {
        self.played + self.playback_skipped == self.synthesized
    }
}

impl Counters {
    /// Fresh counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one emitted text segment; returns its ordinal
    pub fn segment_produced(&self) -> usize {
        self.produced.fetch_add(1, Ordering::SeqCst)
    }

    /// Record one emitted audio segment
    pub fn segment_synthesized(&self) {
        self.synthesized.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one text segment dropped by synthesis
    pub fn synthesis_skipped(&self) {
        self.synthesis_skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one audio segment played to completion
    pub fn segment_played(&self) {
        self.played.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one audio segment dropped by playback
    pub fn playback_skipped(&self) {
        self.playback_skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Read all counters, downstream first
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let played = self.played.load(Ordering::SeqCst);
        let playback_skipped = self.playback_skipped.load(Ordering::SeqCst);
        let synthesized = self.synthesized.load(Ordering::SeqCst);
        let synthesis_skipped = self.synthesis_skipped.load(Ordering::SeqCst);
        let produced = self.produced.load(Ordering::SeqCst);

        CounterSnapshot {
            produced,
            synthesized,
            synthesis_skipped,
            played,
            playback_skipped,
        }
    }
}

/// Drop guard run at the end of every stage thread
///
/// Raises `on_exit` however the stage ends, and `Abort` as well when the
/// stage is unwinding from a panic.
pub(crate) struct StageGuard<'a> {
    signals: &'a Signals,
    on_exit: Option<Signal>,
    stage: &'static str,
}

impl<'a> StageGuard<'a> {
    pub(crate) const fn new(signals: &'a Signals, on_exit: Option<Signal>, stage: &'static str) -> Self {
        Self {
            signals,
            on_exit,
            stage,
        }
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(stage = self.stage, "stage panicked, aborting pipeline");
            self.signals.abort();
        }
        if let Some(signal) = self.on_exit {
            self.signals.set(signal);
        }
    }
}
