//! Shared test utilities: scripted stand-ins for the external services

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use handset_assistant::hardware::WakeController;
use handset_assistant::llm::{FragmentStream, TextGenerator};
use handset_assistant::voice::{AudioSink, Listener, SpeechSynthesizer};
use handset_assistant::{Error, Orchestrator, Outcome, PipelineSettings, Result};

/// Short queue wait so termination checks run often
pub const TEST_QUEUE_WAIT: Duration = Duration::from_millis(50);

/// One step of a scripted generation stream
#[derive(Debug, Clone)]
pub enum Step {
    Text(&'static str),
    Skip,
    Fail,
    Pause(Duration),
}

/// Generator that replays a fixed script on every call
pub struct ScriptedGenerator {
    script: Vec<Step>,
    open_fails: bool,
    pub remembered: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            open_fails: false,
            remembered: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(fragments: &[&'static str]) -> Self {
        Self::new(fragments.iter().map(|&t| Step::Text(t)).collect())
    }

    /// The request itself fails before any fragment
    pub fn unreachable() -> Self {
        Self {
            script: Vec::new(),
            open_fails: true,
            remembered: Mutex::new(Vec::new()),
        }
    }
}

impl TextGenerator for ScriptedGenerator {
    fn stream(&self, _request: &str) -> Result<FragmentStream> {
        if self.open_fails {
            return Err(Error::Llm("service unavailable".to_string()));
        }

        let steps = self.script.clone().into_iter().filter_map(|step| match step {
            Step::Text(t) => Some(Outcome::Ready(t.to_string())),
            Step::Skip => Some(Outcome::Skip("garbled event".to_string())),
            Step::Fail => Some(Outcome::Fatal(Error::Llm("stream reset".to_string()))),
            Step::Pause(d) => {
                std::thread::sleep(d);
                None
            }
        });
        Ok(Box::new(steps))
    }

    fn remember(&self, request: &str, reply: &str) {
        self.remembered
            .lock()
            .unwrap()
            .push((request.to_string(), reply.to_string()));
    }
}

/// Synthesizer whose "audio" is the segment text as bytes
#[derive(Default)]
pub struct EchoSynthesizer {
    /// Segments containing any of these fail with `Skip`
    pub fail_on: Vec<&'static str>,
    pub delay: Duration,
    pub calls: Mutex<Vec<String>>,
}

impl EchoSynthesizer {
    pub fn failing_on(fail_on: &[&'static str]) -> Self {
        Self {
            fail_on: fail_on.to_vec(),
            ..Self::default()
        }
    }
}

impl SpeechSynthesizer for EchoSynthesizer {
    fn synthesize(&self, text: &str) -> Outcome<Vec<u8>> {
        self.calls.lock().unwrap().push(text.to_string());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_on.iter().any(|needle| text.contains(needle)) {
            return Outcome::Skip("synthesis rejected".to_string());
        }
        Outcome::Ready(text.as_bytes().to_vec())
    }
}

/// Sink that records what it played
#[derive(Default)]
pub struct RecordingSink {
    /// Time each segment takes to "play"
    pub duration: Duration,
    /// Report a device failure on every call
    pub broken: bool,
    pub played: Mutex<Vec<Vec<u8>>>,
    pub interrupted: Mutex<usize>,
}

impl RecordingSink {
    pub fn slow(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn played_text(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, audio: &[u8], interrupted: &dyn Fn() -> bool) -> Outcome<()> {
        if self.broken {
            return Outcome::Fatal(Error::Audio("device unplugged".to_string()));
        }

        let started = Instant::now();
        while started.elapsed() < self.duration {
            if interrupted() {
                *self.interrupted.lock().unwrap() += 1;
                return Outcome::Skip("interrupted".to_string());
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        self.played.lock().unwrap().push(audio.to_vec());
        Outcome::Ready(())
    }
}

/// Listener that replays heard requests, then shuts the kiosk down
pub struct ScriptedListener {
    heard: VecDeque<Option<&'static str>>,
    wake: Arc<WakeController>,
}

impl ScriptedListener {
    pub fn new(heard: Vec<Option<&'static str>>, wake: Arc<WakeController>) -> Self {
        Self {
            heard: heard.into(),
            wake,
        }
    }
}

impl Listener for ScriptedListener {
    fn listen(&mut self, _timeout: Duration) -> Result<Option<String>> {
        match self.heard.pop_front() {
            Some(heard) => Ok(heard.map(str::to_string)),
            None => {
                self.wake.shutdown();
                Ok(None)
            }
        }
    }
}

pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        queue_wait: TEST_QUEUE_WAIT,
    }
}

pub fn orchestrator(
    generator: Arc<ScriptedGenerator>,
    synthesizer: Arc<EchoSynthesizer>,
    sink: Arc<RecordingSink>,
) -> Orchestrator {
    Orchestrator::new(generator, synthesizer, sink, test_settings())
}
