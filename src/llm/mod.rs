//! Text generation service clients
//!
//! Each backend opens a streaming request and hands back the reply as a
//! lazy sequence of fragments.

mod gemini;
mod openai;
mod sse;

use std::sync::Arc;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

use crate::config::{LlmConfig, LlmProvider};
use crate::{Outcome, Result};

/// Ordered, finite, non-restartable stream of reply fragments
pub type FragmentStream = Box<dyn Iterator<Item = Outcome<String>> + Send>;

/// Streaming text generation service
pub trait TextGenerator: Send + Sync {
    /// Start a reply to `request`
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be opened; nothing was streamed
    fn stream(&self, request: &str) -> Result<FragmentStream>;

    /// Record a finished exchange so later replies can refer back to it
    fn remember(&self, _request: &str, _reply: &str) {}
}

/// One turn in the running chat session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChatTurn {
    pub request: String,
    pub reply: String,
}

/// Keep only the newest `max` turns
pub(crate) fn trim_history(history: &mut Vec<ChatTurn>, max: usize) {
    if history.len() > max {
        let excess = history.len() - max;
        history.drain(..excess);
    }
}

/// Build the configured generator
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiGenerator::new(config.clone())?),
        LlmProvider::OpenAi => Arc::new(OpenAiGenerator::new(config.clone())?),
    };
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_history_keeps_newest() {
        let mut history: Vec<ChatTurn> = (0..5)
            .map(|i| ChatTurn {
                request: format!("q{i}"),
                reply: format!("a{i}"),
            })
            .collect();

        trim_history(&mut history, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].request, "q3");
        assert_eq!(history[1].request, "q4");

        trim_history(&mut history, 10);
        assert_eq!(history.len(), 2);
    }
}
