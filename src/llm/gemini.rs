//! Google Gemini streaming backend

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::sse::SseFragments;
use super::{ChatTurn, FragmentStream, TextGenerator, trim_history};
use crate::config::LlmConfig;
use crate::{Error, Outcome, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    candidate_count: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

/// One streamed `GenerateContentResponse`
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Extract the text of the first candidate from one SSE payload
pub(crate) fn parse_event(data: &str) -> Option<Outcome<String>> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Outcome::Skip(format!("unparseable Gemini event: {e}"))),
    };

    let text: String = chunk
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    (!text.is_empty()).then_some(Outcome::Ready(text))
}

/// Gemini chat session that streams replies
pub struct GeminiGenerator {
    client: reqwest::blocking::Client,
    config: LlmConfig,
    history: Mutex<Vec<ChatTurn>>,
}

impl GeminiGenerator {
    /// Create a Gemini generator
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the client cannot be built
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(Error::Config("GEMINI_API_KEY required for generation".to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        tracing::debug!(model = %config.model, "gemini generator initialized");

        Ok(Self {
            client,
            config,
            history: Mutex::new(Vec::new()),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl TextGenerator for GeminiGenerator {
    fn stream(&self, request: &str) -> Result<FragmentStream> {
        let history = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut contents = Vec::with_capacity(history.len() * 2 + 1);
        for turn in &history {
            contents.push(Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &turn.request,
                }],
            });
            contents.push(Content {
                role: Some("model"),
                parts: vec![Part { text: &turn.reply }],
            });
        }
        contents.push(Content {
            role: Some("user"),
            parts: vec![Part { text: request }],
        });

        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &self.config.system_context,
                }],
            },
            contents,
            generation_config: GenerationConfig {
                candidate_count: 1,
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY required for generation".to_string()))?;

        tracing::debug!(turns = history.len(), "opening Gemini stream");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Llm(format!("Gemini error {status}: {body}")));
        }

        Ok(Box::new(SseFragments::new(response, parse_event)))
    }

    fn remember(&self, request: &str, reply: &str) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(ChatTurn {
            request: request.to_string(),
            reply: reply.to_string(),
        });
        trim_history(&mut history, self.config.history_turns);
    }
}
