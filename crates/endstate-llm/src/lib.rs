//! endstate-llm: the LLM side of Endstate.
//!
//! A small provider abstraction (Gemini, Ollama, and a scripted provider for
//! tests), the prompts that drive tutoring and generation, and the
//! extraction layer that turns model output into typed values.

pub mod error;
pub mod extract;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod tutor;

pub use error::{LlmError, Result};
pub use provider::{provider_from_config, Completion, CompletionRequest, LlmProvider};
pub use providers::{GeminiProvider, OllamaProvider, ScriptedProvider};
pub use tutor::Tutor;
