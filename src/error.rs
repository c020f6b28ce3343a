//! Error types for the handset assistant

use thiserror::Error;

/// Result type alias for handset operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the handset assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Text generation error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Hookswitch or keypad error
    #[error("hardware error: {0}")]
    Hardware(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result of processing a single streamed item
///
/// Stages decide per item whether to use it, drop it and keep going, or
/// stop the stage altogether.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Item is usable
    Ready(T),
    /// Item failed on its own; skip it and continue the stream
    Skip(String),
    /// Failure that ends the stage
    Fatal(Error),
}

impl<T> Outcome<T> {
    /// Classify a fallible call as either ready or skipped
    pub fn skip_on_err(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(e) => Self::Skip(e.to_string()),
        }
    }

    /// Whether the item is usable
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}
