use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use handset_assistant::hardware::{self, Dispatcher, Keypad, WakeController};
use handset_assistant::voice::{
    AudioCapture, AudioPlayback, AudioSink, MicListener, PLAYBACK_SAMPLE_RATE, SAMPLE_RATE,
    Speaker, SpeechToText, TextToSpeech, rms_energy,
};
use handset_assistant::{Config, ConversationLog, Kiosk, Orchestrator, llm};

/// Handset - telephone voice kiosk with streamed spoken replies
#[derive(Parser)]
#[command(name = "handset", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/handset/config.toml)
    #[arg(short, long, env = "HANDSET_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Answer one request through the pipeline, without handset or microphone
    Ask {
        /// Request text
        text: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,handset_assistant=info",
        1 => "info,handset_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_thread_names(true)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let load_config = || match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match cli.command {
        Some(Command::Ask { text }) => ask(load_config()?, &text),
        Some(Command::TestMic { duration }) => test_mic(duration),
        Some(Command::TestSpeaker) => test_speaker(),
        Some(Command::TestTts { text }) => test_tts(&load_config()?, &text),
        None => run_kiosk(load_config()?),
    }
}

/// Run the kiosk until the hardware source closes
fn run_kiosk(config: Config) -> anyhow::Result<()> {
    tracing::debug!(?config, "loaded configuration");

    let generator = llm::from_config(&config.llm)?;
    let synthesizer = TextToSpeech::from_config(&config.voice, &config.api_keys)?;
    let sink: Arc<dyn AudioSink> = Arc::new(AudioPlayback::new()?);
    let log = Arc::new(ConversationLog::new(&config.kiosk.log_dir));

    let orchestrator = Arc::new(
        Orchestrator::new(
            generator,
            Arc::clone(&synthesizer),
            Arc::clone(&sink),
            config.pipeline,
        )
        .with_log(Arc::clone(&log)),
    );
    let speaker = Speaker::new(synthesizer, sink);

    let listener = MicListener::new(
        AudioCapture::with_gate(Some(speaker.speaking_gate()))?,
        SpeechToText::from_config(&config.voice, &config.api_keys)?,
        config.voice.energy_threshold,
        config.voice.ambient_calibration,
    );

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let sources = hardware::spawn_source(&config.hardware, events_tx)?;

    let wake = if sources.is_empty() {
        Arc::new(WakeController::awake())
    } else {
        let wake = Arc::new(WakeController::new());
        Dispatcher::new(
            Arc::clone(&wake),
            Arc::clone(&orchestrator),
            Keypad::new(config.kiosk.keypad_prompts.clone()),
            Some(speaker.clone()),
        )
        .spawn(events_rx)?;
        wake
    };

    tracing::info!(
        log_dir = %log.dir().display(),
        hardware = ?config.hardware.source,
        "handset ready - lift the receiver"
    );

    let mut kiosk = Kiosk::new(
        config.kiosk,
        config.voice.listen_timeout,
        listener,
        orchestrator,
        speaker,
        wake,
        log,
    );
    kiosk.run();

    Ok(())
}

/// Run one request through the pipeline and print the reply
fn ask(config: Config, text: &str) -> anyhow::Result<()> {
    let generator = llm::from_config(&config.llm)?;
    let synthesizer = TextToSpeech::from_config(&config.voice, &config.api_keys)?;
    let sink: Arc<dyn AudioSink> = Arc::new(AudioPlayback::new()?);

    let orchestrator = Orchestrator::new(generator, synthesizer, sink, config.pipeline);
    let report = orchestrator.run(&text.to_lowercase())?;

    println!("{}", report.generation.reply.trim());
    println!("\n---");
    println!(
        "segments: {} produced, {} synthesized, {} played{}",
        report.counters.produced,
        report.counters.synthesized,
        report.counters.played,
        if report.aborted { " (aborted)" } else { "" }
    );
    println!("elapsed: {:.2}s", report.elapsed.as_secs_f64());

    Ok(())
}

/// Test microphone input
fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        let samples = capture.record_for(Duration::from_secs(1))?;
        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    println!("\n---");
    println!("If the meter moved, the microphone works.");
    println!("Compare quiet-room RMS with voice.energy_threshold in the config.");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());
    playback.play_samples(samples)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Synthesize and play one phrase
fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = TextToSpeech::from_config(&config.voice, &config.api_keys)?;
    let playback: Arc<dyn AudioSink> = Arc::new(AudioPlayback::new()?);

    println!("Synthesizing and playing with {:?}...", config.voice.tts_provider);
    Speaker::new(synthesizer, playback).say(text)?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
