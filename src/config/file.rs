//! TOML configuration file loading
//!
//! Supports `~/.config/handset/config.toml` as a persistent config source.
//! All fields are optional; the file overlays the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HandsetConfigFile {
    /// Text generation configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Kiosk behavior
    #[serde(default)]
    pub kiosk: KioskFileConfig,

    /// Hookswitch and keypad wiring
    #[serde(default)]
    pub hardware: HardwareFileConfig,
}

/// Text generation configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Provider ("gemini" or "openai")
    pub provider: Option<String>,
    /// Generation service credential
    pub api_key: Option<String>,
    /// Model identifier (e.g. "gemini-2.0-flash")
    pub model: Option<String>,
    /// Service base URL override
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    /// Fixed system context sent with every request
    pub system_context: Option<String>,
    /// Chat turns kept as context
    pub history_turns: Option<usize>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Recognition locale (e.g. "en-EN")
    pub recognition_language: Option<String>,
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,
    /// TTS provider ("google", "openai" or "elevenlabs")
    pub tts_provider: Option<String>,
    /// TTS language (e.g. "en")
    pub tts_language: Option<String>,
    /// Google TTS top-level domain accent (e.g. "us")
    pub tts_tld: Option<String>,
    /// TTS model for providers that have one
    pub tts_model: Option<String>,
    /// TTS voice identifier
    pub tts_voice: Option<String>,
    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
    /// Seconds to wait for speech to start
    pub listen_timeout_secs: Option<u64>,
    /// RMS energy that counts as speech
    pub energy_threshold: Option<f32>,
    /// Milliseconds of ambient noise sampled before listening
    pub ambient_calibration_ms: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Pipeline tuning
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Bounded queue wait in milliseconds
    pub queue_wait_ms: Option<u64>,
}

/// Kiosk behavior
#[derive(Debug, Default, Deserialize)]
pub struct KioskFileConfig {
    pub greeting: Option<String>,
    pub farewell: Option<String>,
    pub termination_phrase: Option<String>,
    /// Directory for daily conversation logs
    pub log_dir: Option<String>,
    /// Phrase spoken per keypad key
    #[serde(default)]
    pub keypad: BTreeMap<String, String>,
}

/// Hookswitch and keypad wiring
#[derive(Debug, Default, Deserialize)]
pub struct HardwareFileConfig {
    /// Event source ("console", "gpio" or "none")
    pub source: Option<String>,
    /// GPIO character device (e.g. "/dev/gpiochip0")
    pub chip: Option<String>,
    pub hook_pin: Option<u32>,
    pub row_pins: Option<Vec<u32>>,
    pub col_pins: Option<Vec<u32>>,
    pub debounce_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HandsetConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HandsetConfigFile {
    config_file_path().map_or_else(HandsetConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> HandsetConfigFile {
    if !path.exists() {
        return HandsetConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HandsetConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HandsetConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/handset/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("handset").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let fc = load_from(Path::new("/nonexistent/handset/config.toml"));
        assert!(fc.llm.model.is_none());
        assert!(fc.kiosk.keypad.is_empty());
    }

    #[test]
    fn test_partial_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[llm]
model = "gemini-1.5-flash"
top_k = 32

[kiosk.keypad]
"2" = "Ask me about the laser cutter."

[hardware]
source = "gpio"
row_pins = [1, 2, 3, 4]
"#
        )
        .unwrap();

        let fc = load_from(file.path());
        assert_eq!(fc.llm.model.as_deref(), Some("gemini-1.5-flash"));
        assert_eq!(fc.llm.top_k, Some(32));
        assert!(fc.llm.temperature.is_none());
        assert_eq!(
            fc.kiosk.keypad.get("2").map(String::as_str),
            Some("Ask me about the laser cutter.")
        );
        assert_eq!(fc.hardware.source.as_deref(), Some("gpio"));
        assert_eq!(fc.hardware.row_pins, Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_malformed_file_is_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nmodel = ").unwrap();

        let fc = load_from(file.path());
        assert!(fc.llm.model.is_none());
    }
}
