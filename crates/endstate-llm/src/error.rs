//! Error types for the endstate-llm crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("Could not parse model output: {0}")]
    Parse(String),

    #[error("LLM configuration error: {0}")]
    Config(String),

    #[error("Scripted provider has no responses left")]
    Exhausted,
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
