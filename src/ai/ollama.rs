//! Client for a locally running Ollama-compatible daemon.

use serde::Deserialize;
use serde_json::json;

use crate::ai::provider::{Completer, CompletionRequest, Embedder, ProviderError};

const PROVIDER: &str = "ollama";

pub struct OllamaClient {
    base_url: String,
    embedding_model: String,
    completion_model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, embedding_model: &str, completion_model: &str) -> OllamaClient {
        OllamaClient {
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            embedding_model: embedding_model.to_string(),
            completion_model: completion_model.to_string(),
        }
    }

    fn post(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {url}");
        reqwest::blocking::Client::new().post(url)
    }

    fn check<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().map_err(|err| ProviderError::Malformed {
            provider: PROVIDER,
            detail: err.to_string(),
        })
    }

    /// Whether the daemon answers at all, and which models it serves.
    pub fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        log::debug!("GET {url}");
        let response = reqwest::blocking::Client::new().get(url).send()?;
        let tags: TagsResponse = Self::check(response)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .post("/api/embeddings")
            .json(&json!({
                "model": self.embedding_model,
                "prompt": text,
            }))
            .send()?;

        let parsed: EmbeddingResponse = Self::check(response)?;
        if parsed.embedding.is_empty() {
            return Err(ProviderError::Malformed {
                provider: PROVIDER,
                detail: "empty embedding".to_string(),
            });
        }
        Ok(parsed.embedding)
    }
}

impl Completer for OllamaClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response = self
            .post("/api/generate")
            .json(&json!({
                "model": self.completion_model,
                "prompt": request.prompt,
                "system": request.system,
                "stream": false,
                "options": { "temperature": request.temperature },
            }))
            .send()?;

        let parsed: GenerateResponse = Self::check(response)?;
        Ok(parsed.response)
    }

    fn model_name(&self) -> &str {
        &self.completion_model
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
