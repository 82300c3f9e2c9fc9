//! Cloud completion client (OpenRouter-compatible chat API).

use serde::Deserialize;
use serde_json::json;

use crate::ai::provider::{Completer, CompletionRequest, ProviderError};

const PROVIDER: &str = "openrouter";
const API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub struct OpenRouterClient {
    model: String,
    api_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenRouterClient {
    pub fn new(model: &str, api_key: String) -> OpenRouterClient {
        OpenRouterClient {
            model: model.to_string(),
            api_key,
            api_url: API_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_url(model: &str, api_key: String, api_url: &str) -> OpenRouterClient {
        OpenRouterClient {
            model: model.to_string(),
            api_key,
            api_url: api_url.to_string(),
        }
    }
}

impl Completer for OpenRouterClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        log::debug!("POST {} model={}", self.api_url, self.model);
        let response = reqwest::blocking::Client::new()
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "temperature": request.temperature,
            }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().map_err(|err| ProviderError::Malformed {
            provider: PROVIDER,
            detail: err.to_string(),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ProviderError::Malformed {
                provider: PROVIDER,
                detail: "response carried no choices".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
