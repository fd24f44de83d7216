//! Builds the configured generation provider.

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryingProvider;
use polibrief_config::GenerationConfig;
use polibrief_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the provider named by `config.provider`, wrapped in a
/// [`RetryingProvider`] with the configured timeout and retry count.
pub fn build_from_config(config: &GenerationConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();

    let backend: Arc<dyn Provider> = match config.provider.as_str() {
        "gemini" => {
            let mut p = GeminiProvider::new(&api_key, &config.model)
                .with_temperature(config.temperature)
                .with_max_output_tokens(config.max_output_tokens);
            if let Some(url) = &config.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        name => {
            let base_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(name));
            Arc::new(
                OpenAiCompatProvider::new(name, base_url, &api_key, &config.model)
                    .with_temperature(config.temperature)
                    .with_max_output_tokens(config.max_output_tokens),
            )
        }
    };

    info!(
        provider = %config.provider,
        model = %config.model,
        timeout_secs = config.timeout_secs,
        max_retries = config.max_retries,
        "Generation provider ready"
    );

    Arc::new(
        RetryingProvider::new(backend)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_max_retries(config.max_retries),
    )
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config_is_gemini() {
        let config = GenerationConfig::default();
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn build_openai_compatible() {
        let config = GenerationConfig {
            provider: "openrouter".into(),
            model: "google/gemini-flash-1.5".into(),
            api_key: Some("sk-test".into()),
            ..GenerationConfig::default()
        };
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "openrouter");
    }
}
