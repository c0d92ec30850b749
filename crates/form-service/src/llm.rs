//! OpenAI-compatible chat client used to draft forms.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use form_spec::{GenerateError, Generator, system_prompt};

use crate::settings::{Provider, ResolvedProvider};

const TEMPERATURE: f32 = 0.7;
const FREQUENCY_PENALTY: f32 = 0.1;
const MODELS_TIMEOUT: Duration = Duration::from_secs(5);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking client for `/chat/completions` on OpenAI or a local Ollama.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    target: ResolvedProvider,
}

impl ChatClient {
    pub fn new(target: ResolvedProvider) -> Result<Self, GenerateError> {
        let http = Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .map_err(provider_error)?;
        Ok(Self { http, target })
    }

    pub fn target(&self) -> &ResolvedProvider {
        &self.target
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.target.base_url.trim_end_matches('/'))
    }

    /// Asks Ollama to drop the model from memory. Failures are only logged.
    fn unload(&self) {
        if self.target.provider != Provider::Ollama {
            return;
        }
        let url = format!("{}/api/chat", self.target.native_base_url());
        debug!(model = %self.target.model, %url, "unloading model");
        let result = self
            .http
            .post(&url)
            .json(&json!({ "model": self.target.model, "keep_alive": 0 }))
            .send();
        if let Err(err) = result {
            warn!(model = %self.target.model, error = %err, "failed to unload model");
        }
    }

    fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let system = system_prompt()?;
        let request = ChatRequest {
            model: &self.target.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            frequency_penalty: FREQUENCY_PENALTY,
        };

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.target.api_key)
            .json(&request)
            .send()
            .map_err(provider_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerateError::Provider(format!(
                "{} returned {}: {}",
                self.target.provider, status, body
            )));
        }

        let body: ChatResponse = response.json().map_err(provider_error)?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerateError::EmptyResponse)
    }
}

impl Generator for ChatClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        info!(
            provider = %self.target.provider,
            model = %self.target.model,
            "generating form"
        );
        let result = self.complete(prompt);
        self.unload();
        result
    }
}

/// Lists the models an OpenAI-compatible endpoint advertises (`GET {base}/models`).
pub fn list_models(base_url: &str) -> Result<Value, GenerateError> {
    let url = format!("{}/models", base_url.trim_end_matches('/'));
    debug!(%url, "listing models");
    let client = Client::builder()
        .timeout(MODELS_TIMEOUT)
        .build()
        .map_err(provider_error)?;
    let response = client.get(&url).send().map_err(provider_error)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(GenerateError::Provider(format!(
            "{} returned {}: {}",
            url, status, body
        )));
    }
    response.json().map_err(provider_error)
}

/// Extracts model ids from an OpenAI-style `{ "data": [{ "id": .. }] }` listing.
pub fn model_ids(listing: &Value) -> Vec<String> {
    listing
        .get("data")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|model| model.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn provider_error(err: reqwest::Error) -> GenerateError {
    GenerateError::Provider(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(base_url: &str) -> ResolvedProvider {
        ResolvedProvider {
            provider: Provider::Ollama,
            base_url: base_url.into(),
            model: "llama3".into(),
            api_key: "ollama".into(),
        }
    }

    #[test]
    fn completions_url_ignores_trailing_slash() {
        let client = ChatClient::new(target("http://127.0.0.1:11434/v1/")).unwrap();
        assert_eq!(
            client.completions_url(),
            "http://127.0.0.1:11434/v1/chat/completions"
        );
    }

    #[test]
    fn request_carries_sampling_parameters() {
        let request = ChatRequest {
            model: "gpt-4o",
            messages: vec![ChatMessage {
                role: "user",
                content: "a survey",
            }],
            temperature: TEMPERATURE,
            frequency_penalty: FREQUENCY_PENALTY,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"][0]["role"], "user");
        assert!((value["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!((value["frequency_penalty"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn model_ids_reads_openai_listing() {
        let listing = json!({ "object": "list", "data": [{ "id": "llama3" }, { "id": "mistral" }] });
        assert_eq!(model_ids(&listing), vec!["llama3", "mistral"]);
        assert!(model_ids(&json!({})).is_empty());
    }
}
