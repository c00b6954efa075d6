//! Local models through Ollama's `/api/chat`.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use endstate_core::config::LlmConfig;

use super::{error_for_status, http_client};
use crate::error::{LlmError, Result};
use crate::provider::{Completion, CompletionRequest, LlmProvider};

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    pub const DEFAULT_MODEL: &'static str = "llama3.1";
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = if config.model.is_empty() {
            Self::DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            temperature: config.temperature,
        })
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| OllamaMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: request.json_output.then_some("json"),
            options: Options {
                temperature: request.temperature.unwrap_or(self.temperature),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let start = Instant::now();

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.build_body(&request))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: ChatResponse = response.json().await?;
        let content = body.message.map(|m| m.content).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(model = %self.model, duration_ms, "Ollama completion");
        Ok(Completion {
            content,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            duration_ms,
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: Options,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use endstate_core::ChatMessage;

    #[test]
    fn body_prepends_system_and_sets_format() {
        let config = LlmConfig {
            base_url: Some("http://ollama:11434/".to_string()),
            ..LlmConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();
        assert_eq!(provider.base_url, "http://ollama:11434");

        let request = CompletionRequest::new("sys")
            .with_messages(vec![ChatMessage::user("hi", None)])
            .json();
        let body = serde_json::to_value(provider.build_body(&request)).unwrap();

        assert_eq!(body["model"], OllamaProvider::DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn free_text_omits_format() {
        let provider = OllamaProvider::new(&LlmConfig::default()).unwrap();
        let request = CompletionRequest::new("sys");
        let body = serde_json::to_value(provider.build_body(&request)).unwrap();
        assert!(body.get("format").is_none());
    }
}
