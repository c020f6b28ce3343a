//! Speech-to-text (STT) processing

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{ApiKeys, SttProvider, VoiceConfig};
use crate::{Error, Result};

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes WAV audio to text
pub struct SpeechToText {
    client: reqwest::blocking::Client,
    api_key: SecretString,
    model: String,
    language: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a transcriber for the given provider
    ///
    /// `language` is a locale such as "en-EN"; only the language part is sent.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        provider: SttProvider,
        api_key: Option<SecretString>,
        model: String,
        language: &str,
    ) -> Result<Self> {
        let api_key = api_key.ok_or_else(|| {
            Error::Config(match provider {
                SttProvider::Whisper => "OpenAI API key required for Whisper".to_string(),
                SttProvider::Deepgram => "Deepgram API key required".to_string(),
            })
        })?;

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            language: language_code(language),
            provider,
        })
    }

    /// Build the configured transcriber
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Self> {
        match voice.stt_provider {
            SttProvider::Whisper => Self::new(
                SttProvider::Whisper,
                keys.openai.clone(),
                voice.stt_model.clone(),
                &voice.recognition_language,
            ),
            SttProvider::Deepgram => {
                let model = if voice.stt_model.starts_with("whisper") {
                    "nova-2".to_string()
                } else {
                    voice.stt_model.clone()
                };
                Self::new(
                    SttProvider::Deepgram,
                    keys.deepgram.clone(),
                    model,
                    &voice.recognition_language,
                )
            }
        }
    }

    /// Transcribe audio to text
    ///
    /// # Arguments
    ///
    /// * `audio` - WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub fn transcribe(&self, audio: &[u8]) -> Result<String> {
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio),
            SttProvider::Deepgram => self.transcribe_deepgram(audio),
        }
    }

    fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::blocking::multipart::Form::new()
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json()?;
        tracing::debug!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let response = self
            .client
            .post("https://api.deepgram.com/v1/listen")
            .query(&[
                ("model", self.model.as_str()),
                ("language", self.language.as_str()),
                ("punctuate", "true"),
            ])
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json()?;
        let transcript = first_transcript(result);

        tracing::debug!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

fn first_transcript(response: DeepgramResponse) -> String {
    response
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .unwrap_or_default()
}

/// Language part of a locale ("en-EN" -> "en")
fn language_code(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
        .to_lowercase()
}
