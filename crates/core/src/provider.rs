//! Provider trait, the abstraction over text-generation backends.
//!
//! A Provider knows how to send one rendered prompt to an LLM and get the raw
//! response text back. Parsing structured output is the caller's job.
//!
//! Implementations: OpenAI-compatible, Gemini, and the retrying wrapper.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The fully rendered prompt
    pub prompt: String,

    /// Temperature override (provider default when `None`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum output tokens override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Ask the backend for a JSON response when it supports a response format
    #[serde(default)]
    pub json_output: bool,
}

impl GenerationRequest {
    /// A plain-text request with provider defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            max_output_tokens: None,
            json_output: false,
        }
    }

    /// A request whose answer must be a JSON object.
    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            json_output: true,
            ..Self::new(prompt)
        }
    }
}

/// The core Provider trait.
///
/// The research assembler and the chat service call `generate()` without
/// knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini", "openai").
    fn name(&self) -> &str;

    /// Send a prompt and get the raw response text.
    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
