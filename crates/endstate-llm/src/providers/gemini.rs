//! Google Gemini over the `generateContent` REST endpoint.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use endstate_core::config::LlmConfig;
use endstate_core::Role;

use super::{error_for_status, http_client};
use crate::error::{LlmError, Result};
use crate::provider::{Completion, CompletionRequest, LlmProvider};

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiProvider {
    pub const DEFAULT_MODEL: &'static str = "gemini-1.5-flash";
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

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
            api_key: config.api_key.clone(),
            model,
            temperature: config.temperature,
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> GenerateRequest {
        // System-role history entries join the system instruction.
        let mut system: Vec<String> = request.system.iter().cloned().collect();
        let mut contents = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            let role = match message.role {
                Role::System => {
                    system.push(message.content.clone());
                    continue;
                }
                Role::User => "user",
                Role::Assistant => "model",
            };
            contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![Part {
                    text: message.content.clone(),
                }],
            });
        }
        // Gemini rejects an empty conversation.
        if contents.is_empty() {
            contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: "Begin.".to_string(),
                }],
            });
        }

        GenerateRequest {
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: system.join("\n\n"),
                }],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(self.temperature),
                response_mime_type: request
                    .json_output
                    .then(|| "application/json".to_string()),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        if self.api_key.is_empty() {
            return Err(LlmError::Config("llm.api_key is not set".to_string()));
        }
        let start = Instant::now();
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.build_body(&request))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: GenerateResponse = response.json().await?;
        let content = body
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(model = %self.model, duration_ms, "Gemini completion");
        Ok(Completion {
            content,
            model: self.model.clone(),
            duration_ms,
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ── Wire Types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
