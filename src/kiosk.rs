//! Kiosk - the main listen loop
//!
//! Waits for the handset to be lifted, greets once per lift, then turns
//! each spoken request into a streamed reply until the handset goes back.

use std::sync::Arc;
use std::time::Duration;

use crate::config::KioskConfig;
use crate::conversation_log::ConversationLog;
use crate::hardware::WakeController;
use crate::pipeline::{Orchestrator, PipelineReport};
use crate::voice::{Listener, Speaker};
use crate::Result;

/// Pause after a failed listen before trying again
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What one listen turn led to
#[derive(Debug)]
pub enum Turn {
    /// Nothing usable was heard
    Silence,
    /// Speech arrived after a hang-up and was dropped
    Discarded,
    /// The termination phrase was spoken
    Farewell,
    /// A reply was generated and played
    Replied(PipelineReport),
}

/// The voice kiosk
pub struct Kiosk<L> {
    config: KioskConfig,
    listen_timeout: Duration,
    listener: L,
    orchestrator: Arc<Orchestrator>,
    speaker: Speaker,
    wake: Arc<WakeController>,
    log: Arc<ConversationLog>,
}

impl<L: Listener> Kiosk<L> {
    #[must_use]
    pub const fn new(
        config: KioskConfig,
        listen_timeout: Duration,
        listener: L,
        orchestrator: Arc<Orchestrator>,
        speaker: Speaker,
        wake: Arc<WakeController>,
        log: Arc<ConversationLog>,
    ) -> Self {
        Self {
            config,
            listen_timeout,
            listener,
            orchestrator,
            speaker,
            wake,
            log,
        }
    }

    /// Run until the hardware source shuts the wake controller down
    pub fn run(&mut self) {
        self.log.separator();
        tracing::info!("kiosk ready");

        let mut greeted = None;
        while let Some(epoch) = self.wake.wait_for_wake() {
            if greeted != Some(epoch) {
                greeted = Some(epoch);
                if let Err(e) = self.greet(epoch) {
                    tracing::warn!(error = %e, "greeting failed");
                }
                continue;
            }

            match self.turn(epoch) {
                Ok(Turn::Replied(report)) => {
                    tracing::debug!(
                        id = %report.utterance_id,
                        aborted = report.aborted,
                        "turn complete"
                    );
                }
                Ok(turn) => tracing::trace!(?turn, "turn complete"),
                Err(e) => {
                    tracing::warn!(error = %e, "turn failed");
                    std::thread::sleep(LISTEN_RETRY_DELAY);
                }
            }
        }

        tracing::info!("kiosk stopped");
    }

    fn greet(&self, epoch: u64) -> Result<()> {
        tracing::info!(epoch, "greeting caller");
        let wake = Arc::clone(&self.wake);
        self.speaker
            .say_unless(&self.config.greeting, &|| !wake.is_awake_in(epoch))
    }

    /// Listen once and act on what was heard
    ///
    /// # Errors
    ///
    /// Returns error if listening, the farewell, or the pipeline fails
    pub fn turn(&mut self, epoch: u64) -> Result<Turn> {
        tracing::info!("listening");
        let Some(request) = self.listener.listen(self.listen_timeout)? else {
            return Ok(Turn::Silence);
        };

        if !self.wake.is_awake_in(epoch) {
            tracing::debug!(request, "handset replaced while listening, dropping request");
            return Ok(Turn::Discarded);
        }

        self.handle_request(&request)
    }

    /// Answer one recognized request
    ///
    /// # Errors
    ///
    /// Returns error if the farewell or the pipeline fails
    pub fn handle_request(&self, request: &str) -> Result<Turn> {
        tracing::info!(request, "heard");
        self.log.append(&format!("You: {request}"));

        if is_termination(request, &self.config.termination_phrase) {
            tracing::info!("termination phrase heard");
            self.speaker.say(&self.config.farewell)?;
            self.log.append(&format!("AI: {}", self.config.farewell));
            return Ok(Turn::Farewell);
        }

        let report = self.orchestrator.run(request)?;
        Ok(Turn::Replied(report))
    }
}

/// Whether `request` contains the termination phrase
#[must_use]
pub fn is_termination(request: &str, phrase: &str) -> bool {
    !phrase.is_empty() && request.to_lowercase().contains(phrase)
}
