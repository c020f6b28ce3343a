//! Routes hardware events to the wake controller, pipeline, and keypad

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use super::keypad::{Keypad, KeypadAction};
use super::wake::WakeController;
use super::{HardwareEvent, Key};
use crate::pipeline::Orchestrator;
use crate::voice::Speaker;

/// Consumes [`HardwareEvent`]s for the lifetime of the process
pub struct Dispatcher {
    wake: Arc<WakeController>,
    orchestrator: Arc<Orchestrator>,
    keypad: Keypad,
    speaker: Option<Speaker>,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(
        wake: Arc<WakeController>,
        orchestrator: Arc<Orchestrator>,
        keypad: Keypad,
        speaker: Option<Speaker>,
    ) -> Self {
        Self {
            wake,
            orchestrator,
            keypad,
            speaker,
        }
    }

    /// Run on a named thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn(self, events: Receiver<HardwareEvent>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("hardware-events".to_string())
            .spawn(move || self.run(&events))
    }

    /// Handle events until every source has closed, then shut the wake
    /// controller down
    pub fn run(&self, events: &Receiver<HardwareEvent>) {
        for event in events {
            self.handle(event);
        }
        tracing::info!("hardware event source closed");
        self.wake.shutdown();
    }

    pub fn handle(&self, event: HardwareEvent) {
        tracing::debug!(?event, "hardware event");
        match event {
            HardwareEvent::HookLifted => {
                self.wake.wake();
            }
            HardwareEvent::HookReplaced => {
                if self.wake.sleep() && self.orchestrator.abort_active() {
                    tracing::info!("hang-up cut the reply short");
                }
            }
            HardwareEvent::KeyPressed(key) => self.key_pressed(key),
        }
    }

    fn key_pressed(&self, key: Key) {
        if self.orchestrator.is_busy() {
            tracing::debug!(%key, "key ignored while replying");
            return;
        }
        if !self.wake.is_awake() {
            tracing::debug!(%key, "key ignored while on-hook");
            return;
        }

        match self.keypad.action(key) {
            KeypadAction::Speak(phrase) => {
                tracing::info!(%key, "keypad prompt");
                if let Some(speaker) = &self.speaker {
                    self.speak_detached(speaker.clone(), phrase);
                }
            }
            KeypadAction::Unassigned => tracing::info!(%key, "key has no action"),
        }
    }

    /// Play off the event thread so a hang-up can still cut it short
    fn speak_detached(&self, speaker: Speaker, phrase: String) {
        let wake = Arc::clone(&self.wake);
        let spawned = std::thread::Builder::new()
            .name("keypad-prompt".to_string())
            .spawn(move || {
                if let Err(e) = speaker.say_unless(&phrase, &|| !wake.is_awake()) {
                    tracing::warn!(error = %e, "keypad prompt failed");
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start keypad prompt");
        }
    }
}
