//! Capability seams for the external model providers.
//!
//! Components receive these traits, never concrete clients, so tests can
//! substitute deterministic fakes and the completion backend can be
//! swapped by configuration.

use std::sync::Arc;

use thiserror::Error;

use crate::ai::ollama::OllamaClient;
use crate::ai::openrouter::OpenRouterClient;
use crate::config::AiConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("malformed {provider} response: {detail}")]
    Malformed {
        provider: &'static str,
        detail: String,
    },

    #[error("no API key configured for the cloud provider")]
    MissingCredential,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
}

/// Turns text into a fixed-length vector. Documents compared against
/// each other must come from the same model; that contract is the
/// caller's, not checked here.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

pub trait Completer: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Model identifier recorded on generated artifacts.
    fn model_name(&self) -> &str;

    /// Short tag recorded next to the model ("ollama" / "openrouter").
    fn provider_name(&self) -> &'static str;
}

/// Embeddings always come from the local daemon.
pub fn embedder_for(config: &AiConfig) -> Arc<dyn Embedder> {
    Arc::new(OllamaClient::new(
        &config.ollama_url,
        &config.embedding_model,
        &config.local_model,
    ))
}

/// Completion strategy selected by the persisted cloud toggle.
pub fn completer_for(
    config: &AiConfig,
    api_key: Option<String>,
) -> Result<Box<dyn Completer>, ProviderError> {
    if config.use_cloud {
        let key = api_key.ok_or(ProviderError::MissingCredential)?;
        Ok(Box::new(OpenRouterClient::new(&config.cloud_model, key)))
    } else {
        Ok(Box::new(OllamaClient::new(
            &config.ollama_url,
            &config.embedding_model,
            &config.local_model,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_toggle_without_key_is_rejected() {
        let config = AiConfig {
            use_cloud: true,
            ..AiConfig::default()
        };
        assert!(matches!(
            completer_for(&config, None),
            Err(ProviderError::MissingCredential)
        ));
    }

    #[test]
    fn strategy_follows_the_toggle() {
        let local = completer_for(&AiConfig::default(), None).unwrap();
        assert_eq!(local.provider_name(), "ollama");

        let config = AiConfig {
            use_cloud: true,
            ..AiConfig::default()
        };
        let cloud = completer_for(&config, Some("sk-test".to_string())).unwrap();
        assert_eq!(cloud.provider_name(), "openrouter");
    }
}
