//! OpenAI-compatible chat completions backend
//!
//! Works with any server implementing `/v1/chat/completions` streaming.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Deserialize;

use super::sse::SseFragments;
use super::{ChatTurn, FragmentStream, TextGenerator, trim_history};
use crate::config::LlmConfig;
use crate::{Error, Outcome, Result};

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

pub(crate) fn parse_event(data: &str) -> Option<Outcome<String>> {
    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Outcome::Skip(format!("unparseable completion event: {e}"))),
    };

    let content = chunk.choices.into_iter().next()?.delta?.content?;
    (!content.is_empty()).then_some(Outcome::Ready(content))
}

/// Chat session against an OpenAI-compatible server
pub struct OpenAiGenerator {
    client: reqwest::blocking::Client,
    config: LlmConfig,
    history: Mutex<Vec<ChatTurn>>,
}

impl OpenAiGenerator {
    /// Create an OpenAI-compatible generator
    ///
    /// # Errors
    ///
    /// Returns error if the client cannot be built
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        if config.api_key.is_none() {
            tracing::warn!(url = %config.base_url, "no API key set for chat completions");
        }

        Ok(Self {
            client,
            config,
            history: Mutex::new(Vec::new()),
        })
    }

    fn url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{base}/v1/chat/completions")
    }

    fn messages(&self, request: &str) -> Vec<serde_json::Value> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.config.system_context,
        })];
        for turn in history.iter() {
            messages.push(serde_json::json!({ "role": "user", "content": turn.request }));
            messages.push(serde_json::json!({ "role": "assistant", "content": turn.reply }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request }));
        messages
    }
}

impl TextGenerator for OpenAiGenerator {
    fn stream(&self, request: &str) -> Result<FragmentStream> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": self.messages(request),
            "stream": true,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "max_tokens": self.config.max_output_tokens,
        });

        let mut req = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let response = req.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Llm(format!("chat completions error {status}: {body}")));
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
