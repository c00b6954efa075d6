//! The provider abstraction every generation goes through.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use endstate_core::config::{LlmConfig, LlmProviderKind};
use endstate_core::ChatMessage;

use crate::error::Result;
use crate::providers::{GeminiProvider, OllamaProvider};

/// A single completion call.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Ask the provider for a JSON document instead of free text.
    pub json_output: bool,
    /// Overrides the provider's configured temperature.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            messages: Vec::new(),
            json_output: false,
            temperature: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Append a single user turn.
    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content, None));
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub duration_ms: u64,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Provider identifier, e.g. `gemini`.
    fn name(&self) -> &str;

    fn model(&self) -> &str;
}

/// Build the configured provider.
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.provider {
        LlmProviderKind::Gemini => Arc::new(GeminiProvider::new(config)?),
        LlmProviderKind::Ollama => Arc::new(OllamaProvider::new(config)?),
    };
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "Initialized LLM provider"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_configured_provider() {
        let mut config = LlmConfig::default();
        config.provider = LlmProviderKind::Ollama;
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), OllamaProvider::DEFAULT_MODEL);

        config.provider = LlmProviderKind::Gemini;
        config.model = "gemini-1.5-pro".to_string();
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.model(), "gemini-1.5-pro");
    }

    #[test]
    fn request_builder() {
        let req = CompletionRequest::new("sys")
            .with_user("hello")
            .json()
            .with_temperature(0.1);
        assert_eq!(req.system.as_deref(), Some("sys"));
        assert_eq!(req.messages.len(), 1);
        assert!(req.json_output);
        assert_eq!(req.temperature, Some(0.1));
    }
}
