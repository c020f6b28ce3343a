//! Streaming pipeline integration tests
//!
//! Runs the three stages against scripted services; no network or audio
//! hardware involved.

use std::sync::Arc;
use std::time::{Duration, Instant};

use handset_assistant::{ConversationLog, Orchestrator};

mod common;
use common::{EchoSynthesizer, RecordingSink, ScriptedGenerator, Step, orchestrator};

/// Upper bound for any run in these tests
const DEADLINE: Duration = Duration::from_secs(5);

#[test]
fn test_reply_played_in_order() {
    let generator = Arc::new(ScriptedGenerator::texts(&[
        "Hello there, ",
        "how can I ",
        "help you today?",
    ]));
    let synthesizer = Arc::new(EchoSynthesizer::default());
    let sink = Arc::new(RecordingSink::default());

    let report = orchestrator(generator, Arc::clone(&synthesizer), Arc::clone(&sink))
        .run("hi")
        .unwrap();

    assert!(!report.aborted);
    assert_eq!(report.counters.triple(), (3, 3, 3));
    assert_eq!(report.generation.reply, "Hello there, how can I help you today?");
    assert_eq!(
        sink.played_text(),
        vec!["Hello there, ", "how can I ", "help you today?"]
    );
    assert_eq!(synthesizer.calls.lock().unwrap().len(), 3);
}

#[test]
fn test_short_fragments_are_merged() {
    let generator = Arc::new(ScriptedGenerator::texts(&["Hi", " there", " friend", "!"]));
    let sink = Arc::new(RecordingSink::default());

    let report = orchestrator(
        generator,
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    )
    .run("hello")
    .unwrap();

    // "Hi there" is 8 chars; " friend" pushes it past 10, "!" is the remainder
    assert_eq!(sink.played_text(), vec!["Hi there friend", "!"]);
    assert_eq!(report.counters.produced, 2);
}

#[test]
fn test_single_long_fragment() {
    let text = "This one fragment is already long enough to stand on its own.";
    let sink = Arc::new(RecordingSink::default());

    let report = orchestrator(
        Arc::new(ScriptedGenerator::texts(&[text])),
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    )
    .run("tell me")
    .unwrap();

    assert_eq!(report.counters.triple(), (1, 1, 1));
    assert_eq!(sink.played_text(), vec![text]);
}

#[test]
fn test_generation_failure_aborts_without_hanging() {
    let sink = Arc::new(RecordingSink::default());
    let started = Instant::now();

    let report = orchestrator(
        Arc::new(ScriptedGenerator::unreachable()),
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    )
    .run("anyone there?")
    .unwrap();

    assert!(report.aborted);
    assert!(report.generation.failed);
    assert_eq!(report.counters.triple(), (0, 0, 0));
    assert!(sink.played_text().is_empty());
    assert!(started.elapsed() < DEADLINE);
}

#[test]
fn test_empty_stream_aborts() {
    let report = orchestrator(
        Arc::new(ScriptedGenerator::texts(&["   "])),
        Arc::new(EchoSynthesizer::default()),
        Arc::new(RecordingSink::default()),
    )
    .run("silence")
    .unwrap();

    assert!(report.aborted);
    assert_eq!(report.counters.produced, 0);
}

#[test]
fn test_failed_segment_is_skipped_and_pipeline_finishes() {
    let generator = Arc::new(ScriptedGenerator::texts(&[
        "First segment here. ",
        "Second BAD segment. ",
        "Third segment here.",
    ]));
    let sink = Arc::new(RecordingSink::default());
    let started = Instant::now();

    let report = orchestrator(
        generator,
        Arc::new(EchoSynthesizer::failing_on(&["BAD"])),
        Arc::clone(&sink),
    )
    .run("go")
    .unwrap();

    assert!(!report.aborted);
    assert_eq!(report.counters.produced, 3);
    assert_eq!(report.counters.synthesized, 2);
    assert_eq!(report.counters.synthesis_skipped, 1);
    assert_eq!(report.counters.played, 2);
    assert_eq!(
        sink.played_text(),
        vec!["First segment here. ", "Third segment here."]
    );
    assert!(started.elapsed() < DEADLINE);
}

#[test]
fn test_every_segment_failing_still_terminates() {
    let report = orchestrator(
        Arc::new(ScriptedGenerator::texts(&["nope nope nope ", "nope again here"])),
        Arc::new(EchoSynthesizer::failing_on(&["nope"])),
        Arc::new(RecordingSink::default()),
    )
    .run("go")
    .unwrap();

    assert_eq!(report.counters.produced, 2);
    assert_eq!(report.counters.synthesized, 0);
    assert_eq!(report.counters.played, 0);
}

#[test]
fn test_unreadable_fragment_is_skipped() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Step::Text("Good start here. "),
        Step::Skip,
        Step::Text("And a good finish."),
    ]));
    let sink = Arc::new(RecordingSink::default());

    let report = orchestrator(generator, Arc::new(EchoSynthesizer::default()), Arc::clone(&sink))
        .run("go")
        .unwrap();

    assert_eq!(report.generation.skipped_fragments, 1);
    assert_eq!(sink.played_text(), vec!["Good start here. ", "And a good finish."]);
}

#[test]
fn test_stream_failure_keeps_what_arrived() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Step::Text("Complete sentence. "),
        Step::Text("Half"),
        Step::Fail,
        Step::Text("never seen"),
    ]));
    let sink = Arc::new(RecordingSink::default());
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(ConversationLog::new(dir.path()));

    let report = orchestrator(
        Arc::clone(&generator),
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    )
    .with_log(Arc::clone(&log))
    .run("go")
    .unwrap();

    assert!(report.generation.failed);
    assert!(!report.aborted);
    assert_eq!(sink.played_text(), vec!["Complete sentence. ", "Half"]);

    // A cut-off reply is spoken but never recorded
    assert!(!log.path_for(chrono::Local::now().date_naive()).exists());
    assert!(generator.remembered.lock().unwrap().is_empty());
}

#[test]
fn test_markup_is_not_spoken() {
    let sink = Arc::new(RecordingSink::default());

    orchestrator(
        Arc::new(ScriptedGenerator::texts(&["**Bold** claim, ", "# heading `code`"])),
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    )
    .run("format")
    .unwrap();

    let spoken = sink.played_text().concat();
    assert_eq!(spoken, "Bold claim,  heading code");
}

#[test]
fn test_playback_starts_before_generation_ends() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Step::Text("The first part arrives. "),
        Step::Pause(Duration::from_millis(400)),
        Step::Text("The rest arrives later."),
    ]));
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Arc::new(orchestrator(
        generator,
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    ));

    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        std::thread::spawn(move || orchestrator.run("stream").unwrap())
    };

    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(sink.played_text(), vec!["The first part arrives. "]);

    let report = runner.join().unwrap();
    assert_eq!(report.counters.played, 2);
}

#[test]
fn test_abort_active_stops_playback() {
    let generator = Arc::new(ScriptedGenerator::texts(&[
        "Segment number one. ",
        "Segment number two. ",
        "Segment number three.",
    ]));
    let sink = Arc::new(RecordingSink::slow(Duration::from_millis(300)));
    let orchestrator = Arc::new(orchestrator(
        generator,
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    ));

    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        std::thread::spawn(move || orchestrator.run("long reply").unwrap())
    };

    std::thread::sleep(Duration::from_millis(100));
    assert!(orchestrator.is_busy());

    let started = Instant::now();
    assert!(orchestrator.abort_active());
    let report = runner.join().unwrap();

    assert!(report.aborted);
    assert!(report.counters.played < 3);
    assert!(*sink.interrupted.lock().unwrap() >= 1);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!orchestrator.is_busy());
}

#[test]
fn test_abort_when_idle_is_noop() {
    let orchestrator = orchestrator(
        Arc::new(ScriptedGenerator::texts(&["unused"])),
        Arc::new(EchoSynthesizer::default()),
        Arc::new(RecordingSink::default()),
    );
    assert!(!orchestrator.is_busy());
    assert!(!orchestrator.abort_active());
}

#[test]
fn test_device_failure_aborts() {
    let report = orchestrator(
        Arc::new(ScriptedGenerator::texts(&["Segment number one. ", "Segment number two."])),
        Arc::new(EchoSynthesizer::default()),
        Arc::new(RecordingSink::broken()),
    )
    .run("go")
    .unwrap();

    assert!(report.aborted);
    assert_eq!(report.counters.played, 0);
    assert!(report.counters.playback_skipped >= 1);
}

#[test]
fn test_consecutive_runs_are_independent() {
    let generator = Arc::new(ScriptedGenerator::texts(&[
        "Same reply every time. ",
        "It has a second part, ",
        "and a short end.",
    ]));
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = orchestrator(
        Arc::clone(&generator),
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    );

    let first = orchestrator.run("one").unwrap();
    let second = orchestrator.run("two").unwrap();

    assert_eq!(first.counters.triple(), (3, 3, 3));
    assert_eq!(second.counters.triple(), (3, 3, 3));
    assert_ne!(first.utterance_id, second.utterance_id);

    let played = sink.played_text();
    assert_eq!(played.len(), 6);
    assert_eq!(played[..3], played[3..]);
    assert_eq!(
        played[..3],
        ["Same reply every time. ", "It has a second part, ", "and a short end."]
    );

    let remembered = generator.remembered.lock().unwrap();
    assert_eq!(remembered.len(), 2);
    assert_eq!(remembered[1].0, "two");
    assert_eq!(
        remembered[1].1,
        "Same reply every time. It has a second part, and a short end."
    );
}

#[test]
fn test_counters_stay_ordered_while_running() {
    let synthesizer = EchoSynthesizer {
        delay: Duration::from_millis(30),
        ..EchoSynthesizer::default()
    };
    let orchestrator = Arc::new(orchestrator(
        Arc::new(ScriptedGenerator::new(vec![
            Step::Text("First segment here. "),
            Step::Pause(Duration::from_millis(20)),
            Step::Text("Second segment here. "),
            Step::Text("Third segment here. "),
            Step::Pause(Duration::from_millis(20)),
            Step::Text("Fourth segment here."),
        ])),
        Arc::new(synthesizer),
        Arc::new(RecordingSink::slow(Duration::from_millis(40))),
    ));

    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        std::thread::spawn(move || orchestrator.run("go").unwrap())
    };

    let started = Instant::now();
    let mut samples = Vec::new();
    while !runner.is_finished() && started.elapsed() < DEADLINE {
        if let Some(snapshot) = orchestrator.active_counters() {
            samples.push(snapshot);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    let report = runner.join().unwrap();

    assert!(samples.len() > 10, "only {} samples taken", samples.len());
    for sample in &samples {
        let (produced, synthesized, played) = sample.triple();
        assert!(played <= synthesized && synthesized <= produced, "{sample:?}");
    }
    for pair in samples.windows(2) {
        let (before, after) = (pair[0].triple(), pair[1].triple());
        assert!(after.0 >= before.0 && after.1 >= before.1 && after.2 >= before.2);
    }

    assert_eq!(report.counters.triple(), (4, 4, 4));
    assert!(orchestrator.active_counters().is_none());
}

#[test]
fn test_overlapping_runs_are_serialized() {
    let generator = Arc::new(ScriptedGenerator::texts(&["A reply that plays a while."]));
    let sink = Arc::new(RecordingSink::slow(Duration::from_millis(150)));
    let orchestrator = Arc::new(orchestrator(
        generator,
        Arc::new(EchoSynthesizer::default()),
        Arc::clone(&sink),
    ));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            std::thread::spawn(move || orchestrator.run(&format!("request {i}")).unwrap())
        })
        .collect();

    for handle in handles {
        let report = handle.join().unwrap();
        assert_eq!(report.counters.triple(), (1, 1, 1));
    }
    assert_eq!(sink.played_text().len(), 2);
}

#[test]
fn test_reply_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(ConversationLog::new(dir.path()));

    let orchestrator = Orchestrator::new(
        Arc::new(ScriptedGenerator::texts(&["Logged reply text."])),
        Arc::new(EchoSynthesizer::default()),
        Arc::new(RecordingSink::default()),
        common::test_settings(),
    )
    .with_log(Arc::clone(&log));

    orchestrator.run("log this").unwrap();

    let path = log.path_for(chrono::Local::now().date_naive());
    let contents = std::fs::read_to_string(path).unwrap();
    assert_eq!(contents, "AI: Logged reply text. \n");
}

#[test]
fn test_failed_generation_is_not_logged_or_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(ConversationLog::new(dir.path()));
    let generator = Arc::new(ScriptedGenerator::unreachable());

    let orchestrator = Orchestrator::new(
        Arc::<ScriptedGenerator>::clone(&generator),
        Arc::new(EchoSynthesizer::default()),
        Arc::new(RecordingSink::default()),
        common::test_settings(),
    )
    .with_log(Arc::clone(&log));

    orchestrator.run("log this").unwrap();

    assert!(generator.remembered.lock().unwrap().is_empty());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
