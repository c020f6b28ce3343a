//! Text-to-speech (TTS) processing

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{ApiKeys, TtsProvider, VoiceConfig};
use crate::{Error, Outcome, Result};

/// Longest text the Google endpoint accepts per request
const GOOGLE_MAX_CHARS: usize = 100;

/// Speech synthesis service
pub trait SpeechSynthesizer: Send + Sync {
    /// Convert one text segment to encoded audio (MP3)
    ///
    /// A failed call is reported as `Skip` so the caller can drop the
    /// segment and keep going.
    fn synthesize(&self, text: &str) -> Outcome<Vec<u8>>;
}

#[derive(Debug)]
enum Backend {
    Google { language: String, tld: String },
    OpenAI { voice: String, speed: f32, model: String },
    ElevenLabs { voice_id: String, model: String },
}

/// Synthesizes speech from text over HTTP
pub struct TextToSpeech {
    client: reqwest::blocking::Client,
    api_key: Option<SecretString>,
    backend: Backend,
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}

impl TextToSpeech {
    /// Create a TTS instance using the Google Translate speech endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new_google(language: String, tld: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key: None,
            backend: Backend::Google { language, tld },
        })
    }

    /// Create a TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(
        api_key: Option<SecretString>,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        let Some(api_key) = api_key else {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        };

        Ok(Self {
            client: http_client()?,
            api_key: Some(api_key),
            backend: Backend::OpenAI { voice, speed, model },
        })
    }

    /// Create a TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(
        api_key: Option<SecretString>,
        voice_id: String,
        model: String,
    ) -> Result<Self> {
        let Some(api_key) = api_key else {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        };

        Ok(Self {
            client: http_client()?,
            api_key: Some(api_key),
            backend: Backend::ElevenLabs { voice_id, model },
        })
    }

    /// Build the configured synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Arc<dyn SpeechSynthesizer>> {
        let tts = match voice.tts_provider {
            TtsProvider::Google => {
                Self::new_google(voice.tts_language.clone(), voice.tts_tld.clone())?
            }
            TtsProvider::OpenAi => Self::new_openai(
                keys.openai.clone(),
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone().unwrap_or_else(|| "tts-1".to_string()),
            )?,
            TtsProvider::ElevenLabs => Self::new_elevenlabs(
                keys.elevenlabs.clone(),
                voice.tts_voice.clone(),
                voice
                    .tts_model
                    .clone()
                    .unwrap_or_else(|| "eleven_monolingual_v1".to_string()),
            )?,
        };

        tracing::debug!(provider = ?voice.tts_provider, "tts initialized");
        Ok(Arc::new(tts))
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub fn synthesize_mp3(&self, text: &str) -> Result<Vec<u8>> {
        match &self.backend {
            Backend::Google { language, tld } => self.synthesize_google(text, language, tld),
            Backend::OpenAI { voice, speed, model } => {
                self.synthesize_openai(text, voice, *speed, model)
            }
            Backend::ElevenLabs { voice_id, model } => {
                self.synthesize_elevenlabs(text, voice_id, model)
            }
        }
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| Error::Config("TTS API key missing".to_string()))
    }

    /// Synthesize using the Google Translate speech endpoint
    fn synthesize_google(&self, text: &str, language: &str, tld: &str) -> Result<Vec<u8>> {
        let url = format!("https://translate.google.{tld}/translate_tts");
        let mut audio = Vec::new();

        let parts = split_for_google(text);
        let total = parts.len().to_string();
        for (idx, part) in parts.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = part.chars().count().to_string();

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", part.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().unwrap_or_default();
                return Err(Error::Tts(format!("Google TTS error {status}: {body}")));
            }

            audio.extend_from_slice(&response.bytes()?);
        }

        Ok(audio)
    }

    /// Synthesize using `OpenAI` TTS
    fn synthesize_openai(&self, text: &str, voice: &str, speed: f32, model: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model,
            input: text,
            voice,
            speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.key()?))
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response.bytes()?.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    fn synthesize_elevenlabs(&self, text: &str, voice_id: &str, model: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{voice_id}");

        let request = ElevenLabsRequest {
            text,
            model_id: model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.key()?)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        Ok(response.bytes()?.to_vec())
    }
}

impl SpeechSynthesizer for TextToSpeech {
    fn synthesize(&self, text: &str) -> Outcome<Vec<u8>> {
        if text.trim().is_empty() {
            return Outcome::Skip("nothing to synthesize".to_string());
        }
        Outcome::skip_on_err(self.synthesize_mp3(text))
    }
}

/// Split text into pieces the Google endpoint accepts, on word boundaries
fn split_for_google(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();

        if !current.is_empty() && current_len + 1 + word_len > GOOGLE_MAX_CHARS {
            parts.push(std::mem::take(&mut current));
        }

        if word_len > GOOGLE_MAX_CHARS {
            // No boundary to break on; cut the word itself
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(GOOGLE_MAX_CHARS) {
                parts.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_text() {
        assert_eq!(split_for_google("Hello there."), vec!["Hello there."]);
        assert!(split_for_google("   ").is_empty());
    }

    #[test]
    fn test_split_on_word_boundaries() {
        let text = "word ".repeat(60);
        let parts = split_for_google(&text);

        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.chars().count() <= GOOGLE_MAX_CHARS);
            assert!(!part.starts_with(' ') && !part.ends_with(' '));
        }
        assert_eq!(parts.join(" "), text.trim());
    }

    #[test]
    fn test_split_overlong_word() {
        let word = "a".repeat(250);
        let parts = split_for_google(&word);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 50);
    }

    #[test]
    fn test_openai_requires_key() {
        let result = TextToSpeech::new_openai(None, "alloy".to_string(), 1.0, "tts-1".to_string());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_blank_text_is_skipped() {
        let tts = TextToSpeech::new_google("en".to_string(), "us".to_string()).unwrap();
        assert!(matches!(tts.synthesize("  "), Outcome::Skip(_)));
    }
}
