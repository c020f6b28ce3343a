//! Configuration management for the handset assistant
//!
//! Values resolve as environment variable, then TOML file, then default.

pub mod file;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::pipeline::PipelineSettings;
use crate::{Error, Result};

/// Default lab assistant context
pub const DEFAULT_SYSTEM_CONTEXT: &str = "You are the Hybrid Lab Assistant. Answer based on \
https://portal.cca.edu/learning/shops/hybrid-lab/. Keep responses concise and conversational.";

/// Handset assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Text generation service
    pub llm: LlmConfig,

    /// Recognition and synthesis
    pub voice: VoiceConfig,

    /// Keys for the speech services
    pub api_keys: ApiKeys,

    /// Pipeline tuning
    pub pipeline: PipelineSettings,

    /// Kiosk behavior
    pub kiosk: KioskConfig,

    /// Hookswitch and keypad wiring
    pub hardware: HardwareConfig,
}

/// Text generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Google Gemini `streamGenerateContent`
    #[default]
    Gemini,
    /// OpenAI-compatible chat completions
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown llm provider: {other}"))),
        }
    }
}

/// Text generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Backend
    pub provider: LlmProvider,

    /// Generation service credential
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// Service base URL
    pub base_url: String,

    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,

    /// Fixed system context sent with every request
    pub system_context: String,

    /// Chat turns kept as context
    pub history_turns: usize,
}

impl LlmConfig {
    fn defaults_for(provider: LlmProvider) -> (&'static str, &'static str) {
        match provider {
            LlmProvider::Gemini => (
                "gemini-2.0-flash",
                "https://generativelanguage.googleapis.com",
            ),
            LlmProvider::OpenAi => ("gpt-4o-mini", "https://api.openai.com"),
        }
    }
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    /// `OpenAI` Whisper
    #[default]
    Whisper,
    /// Deepgram
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown stt provider: {other}"))),
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    /// Google Translate speech endpoint
    #[default]
    Google,
    /// `OpenAI` speech API
    OpenAi,
    /// ElevenLabs
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown tts provider: {other}"))),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Recognition locale (e.g. "en-EN")
    pub recognition_language: String,

    pub stt_provider: SttProvider,
    pub stt_model: String,

    pub tts_provider: TtsProvider,

    /// Synthesis language (e.g. "en")
    pub tts_language: String,

    /// Google accent domain (e.g. "us")
    pub tts_tld: String,

    /// Provider model; `None` picks the provider default
    pub tts_model: Option<String>,

    pub tts_voice: String,
    pub tts_speed: f32,

    /// How long to wait for speech to start
    pub listen_timeout: Duration,

    /// RMS energy that counts as speech
    pub energy_threshold: f32,

    /// Ambient noise sampled before each listen
    pub ambient_calibration: Duration,
}

/// API keys for the speech services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<SecretString>,

    /// ElevenLabs API key
    pub elevenlabs: Option<SecretString>,

    /// Deepgram API key
    pub deepgram: Option<SecretString>,
}

/// Kiosk behavior
#[derive(Debug, Clone)]
pub struct KioskConfig {
    /// Spoken when the handset is lifted
    pub greeting: String,

    /// Spoken when the termination phrase is heard
    pub farewell: String,

    /// Lower-case phrase that ends a conversation turn without a reply
    pub termination_phrase: String,

    /// Directory for daily conversation logs
    pub log_dir: PathBuf,

    /// Phrase spoken per keypad key
    pub keypad_prompts: BTreeMap<char, String>,
}

/// Where hookswitch and keypad events come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareSource {
    /// Typed commands on stdin
    #[default]
    Console,
    /// GPIO character device
    Gpio,
    /// No handset; always awake
    None,
}

impl FromStr for HardwareSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" | "stdin" => Ok(Self::Console),
            "gpio" => Ok(Self::Gpio),
            "none" => Ok(Self::None),
            other => Err(Error::Config(format!("unknown hardware source: {other}"))),
        }
    }
}

/// Hookswitch and keypad wiring
#[derive(Debug, Clone)]
pub struct HardwareConfig {
    pub source: HardwareSource,

    /// GPIO character device
    pub chip: PathBuf,

    /// Hookswitch line; low means off-hook
    pub hook_pin: u32,

    /// Keypad row lines (inputs), top to bottom
    pub row_pins: Vec<u32>,

    /// Keypad column lines (outputs), left to right
    pub col_pins: Vec<u32>,

    /// Ignore repeat edges on a line within this window
    pub debounce: Duration,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            source: HardwareSource::default(),
            chip: PathBuf::from("/dev/gpiochip0"),
            hook_pin: 26,
            row_pins: vec![4, 17, 27, 22],
            col_pins: vec![5, 6, 13],
            debounce: Duration::from_millis(300),
        }
    }
}

/// Default data directory: `~/.local/share/handset`
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/handset"),
        |d| d.data_dir().join("handset"),
    )
}

fn parse_or<T: FromStr<Err = Error>>(value: Option<String>, default: T) -> Result<T> {
    value.map_or(Ok(default), |v| v.parse())
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), &|key| std::env::var(key).ok())
    }

    /// Load configuration using an explicit config file path
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::resolve(file::load_from(path), &|key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    #[allow(clippy::too_many_lines)]
    pub fn resolve(
        fc: file::HandsetConfigFile,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // LLM config (env > toml > default)
        let provider = parse_or(
            env("HANDSET_LLM_PROVIDER").or(fc.llm.provider),
            LlmProvider::default(),
        )?;
        let (default_model, default_base_url) = LlmConfig::defaults_for(provider);
        let llm_key_var = match provider {
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        };
        let llm = LlmConfig {
            provider,
            api_key: env(llm_key_var).or(fc.llm.api_key).map(SecretString::from),
            model: env("HANDSET_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| default_model.to_string()),
            base_url: env("HANDSET_LLM_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| default_base_url.to_string()),
            temperature: fc.llm.temperature.unwrap_or(0.9),
            top_p: fc.llm.top_p.unwrap_or(0.95),
            top_k: fc.llm.top_k.unwrap_or(64),
            max_output_tokens: fc.llm.max_output_tokens.unwrap_or(60),
            system_context: fc
                .llm
                .system_context
                .unwrap_or_else(|| DEFAULT_SYSTEM_CONTEXT.to_string()),
            history_turns: fc.llm.history_turns.unwrap_or(20),
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
        };

        // Voice config (env > toml > default)
        let voice = VoiceConfig {
            recognition_language: env("HANDSET_LANGUAGE")
                .or(fc.voice.recognition_language)
                .unwrap_or_else(|| "en-EN".to_string()),
            stt_provider: parse_or(
                env("HANDSET_STT_PROVIDER").or(fc.voice.stt_provider),
                SttProvider::default(),
            )?,
            stt_model: fc
                .voice
                .stt_model
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_provider: parse_or(
                env("HANDSET_TTS_PROVIDER").or(fc.voice.tts_provider),
                TtsProvider::default(),
            )?,
            tts_language: fc.voice.tts_language.unwrap_or_else(|| "en".to_string()),
            tts_tld: fc.voice.tts_tld.unwrap_or_else(|| "us".to_string()),
            tts_model: fc.voice.tts_model,
            tts_voice: fc.voice.tts_voice.unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            listen_timeout: Duration::from_secs(fc.voice.listen_timeout_secs.unwrap_or(10)),
            energy_threshold: fc.voice.energy_threshold.unwrap_or(0.03),
            ambient_calibration: Duration::from_millis(
                fc.voice.ambient_calibration_ms.unwrap_or(500),
            ),
        };

        let pipeline = PipelineSettings {
            queue_wait: fc
                .pipeline
                .queue_wait_ms
                .map_or(crate::pipeline::DEFAULT_QUEUE_WAIT, Duration::from_millis),
        };

        // Keypad prompts: keys are single characters
        let mut keypad_prompts = BTreeMap::from([(
            '1',
            "What inventory questions do you have?".to_string(),
        )]);
        for (key, phrase) in fc.kiosk.keypad {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => {
                    keypad_prompts.insert(c, phrase);
                }
                _ => return Err(Error::Config(format!("invalid keypad key: {key:?}"))),
            }
        }

        let kiosk = KioskConfig {
            greeting: fc.kiosk.greeting.unwrap_or_else(|| {
                "Hello! Welcome to the Hybrid Lab. How may I help you?".to_string()
            }),
            farewell: fc.kiosk.farewell.unwrap_or_else(|| "Bye now".to_string()),
            termination_phrase: fc
                .kiosk
                .termination_phrase
                .unwrap_or_else(|| "that's all".to_string())
                .to_lowercase(),
            log_dir: env("HANDSET_LOG_DIR")
                .or(fc.kiosk.log_dir)
                .map_or_else(|| default_data_dir().join("logs"), PathBuf::from),
            keypad_prompts,
        };

        let hw_defaults = HardwareConfig::default();
        let hardware = HardwareConfig {
            source: parse_or(
                env("HANDSET_HARDWARE").or(fc.hardware.source),
                HardwareSource::default(),
            )?,
            chip: env("HANDSET_GPIO_CHIP")
                .or(fc.hardware.chip)
                .map_or(hw_defaults.chip, PathBuf::from),
            hook_pin: fc.hardware.hook_pin.unwrap_or(hw_defaults.hook_pin),
            row_pins: fc.hardware.row_pins.unwrap_or(hw_defaults.row_pins),
            col_pins: fc.hardware.col_pins.unwrap_or(hw_defaults.col_pins),
            debounce: fc
                .hardware
                .debounce_ms
                .map_or(hw_defaults.debounce, Duration::from_millis),
        };

        let config = Self {
            llm,
            voice,
            api_keys,
            pipeline,
            kiosk,
            hardware,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Config(format!(
                "llm.temperature must be within 0..=2, got {}",
                self.llm.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.llm.top_p) {
            return Err(Error::Config(format!(
                "llm.top_p must be within 0..=1, got {}",
                self.llm.top_p
            )));
        }
        if self.llm.max_output_tokens == 0 {
            return Err(Error::Config("llm.max_output_tokens must be positive".to_string()));
        }
        if self.pipeline.queue_wait.is_zero() {
            return Err(Error::Config("pipeline.queue_wait_ms must be positive".to_string()));
        }
        if self.kiosk.termination_phrase.trim().is_empty() {
            return Err(Error::Config("kiosk.termination_phrase must not be empty".to_string()));
        }
        if self.hardware.row_pins.len() != 4 || self.hardware.col_pins.len() != 3 {
            return Err(Error::Config(
                "keypad wiring needs 4 row pins and 3 column pins".to_string(),
            ));
        }
        Ok(())
    }
}
