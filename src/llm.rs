//! LLM completion capability.
//!
//! The pipeline only needs two things from a language model: a JSON object
//! constrained to a schema, and a short free-text completion. [`LlmClient`]
//! is that seam; [`OpenAiChat`] implements it against the chat completions
//! API using `response_format: json_schema` with `strict: true`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{credential, Error, Result};
use crate::http::send_with_retry;

const SERVICE: &str = "openai";

/// A structured-output request.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    /// Schema name reported to the provider, e.g. `"document_tags"`.
    pub name: String,
    pub prompt: String,
    /// JSON schema the response object must satisfy.
    pub schema: Value,
    pub temperature: f32,
    /// Overrides the client's default model.
    pub model: Option<String>,
}

impl JsonRequest {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            schema,
            temperature: 0.0,
            model: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub prompt: String,
    pub model: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete `request.prompt` into a JSON object matching `request.schema`.
    async fn complete_json(&self, request: JsonRequest) -> Result<Value>;

    /// Complete a prompt into plain text.
    async fn complete_text(&self, request: TextRequest) -> Result<String>;
}

/// Run a structured request and deserialize the result.
///
/// A response that does not match `T` is a contract violation.
pub async fn structured<T: DeserializeOwned>(llm: &dyn LlmClient, request: JsonRequest) -> Result<T> {
    let name = request.name.clone();
    let value = llm.complete_json(request).await?;
    serde_json::from_value(value)
        .map_err(|e| Error::contract(SERVICE, format!("{} did not match schema: {}", name, e)))
}

/// OpenAI chat completions client.
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn chat(&self, body: Value) -> Result<String> {
        let api_key = credential("OPENAI_API_KEY")?;
        let url = format!("{}/chat/completions", self.base_url);

        let response = send_with_retry(SERVICE, self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
        })
        .await?;

        let json: Value = response.json().await?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl LlmClient for OpenAiChat {
    async fn complete_json(&self, request: JsonRequest) -> Result<Value> {
        let body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.name,
                    "schema": request.schema,
                    "strict": true,
                },
            },
        });

        let content = self.chat(body).await?;
        serde_json::from_str(&content).map_err(|e| {
            Error::contract(SERVICE, format!("{} returned invalid JSON: {}", request.name, e))
        })
    }

    async fn complete_text(&self, request: TextRequest) -> Result<String> {
        let body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        self.chat(body).await
    }
}

fn parse_chat_response(json: &Value) -> Result<String> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| Error::contract(SERVICE, "missing choices[0].message"))?;

    if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
        return Err(Error::contract(SERVICE, format!("model refused: {}", refusal)));
    }

    message
        .get("content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::contract(SERVICE, "missing message content"))
}

/// Schema for `{ "<field>": [string] }`.
pub fn string_array_schema(field: &str) -> Value {
    json!({
        "type": "object",
        "properties": { field: { "type": "array", "items": { "type": "string" } } },
        "required": [field],
        "additionalProperties": false,
    })
}
