//! Text-generation provider implementations for polibrief.
//!
//! All providers implement the `polibrief_core::Provider` trait.
//! [`build_from_config`] assembles the configured backend wrapped in the
//! bounded-timeout retry layer.

pub mod gemini;
pub mod openai_compat;
pub mod retry;
pub mod router;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryingProvider;
pub use router::build_from_config;
