//! LLM client module for interacting with language models.
//!
//! A single-method trait keeps the extraction pipeline independent of the
//! provider; Gemini is the production implementation.

mod error;
mod gemini;

pub use error::{classify_http_status, LlmError, LlmErrorKind};
pub use gemini::GeminiClient;

use async_trait::async_trait;

/// Trait for LLM clients.
///
/// Implementations hold no mutable state across calls beyond their
/// credential and transport configuration.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single prompt and return the model's raw text answer.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
