//! Concrete `LlmProvider` implementations.

mod gemini;
mod ollama;
mod scripted;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use scripted::ScriptedProvider;

use crate::error::LlmError;

/// Longest provider error body kept in [`LlmError::Provider`].
const MAX_ERROR_BODY: usize = 512;

/// Turn a non-success response into [`LlmError::Provider`].
pub(crate) async fn error_for_status(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    LlmError::Provider { status, body }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}
