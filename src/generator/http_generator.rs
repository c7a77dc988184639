//! Generator backed by an OpenAI-compatible chat completions API

use super::types::{
    GenerationRequest, GenerationResponse, Generator, GeneratorError, TokenUsage,
};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone)]
pub struct HttpGenerator {
    name: String,
    /// Base URL, e.g. `http://localhost:11434/v1`
    base_url: String,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl HttpGenerator {
    pub fn from_config(
        name: impl Into<String>,
        config: &BackendConfig,
    ) -> Result<Self, GeneratorError> {
        let mut generator = Self::new(name, config.command.clone())?
            .with_timeout(Duration::from_secs(config.timeout));
        if let Some(key) = config.api_key() {
            generator = generator.with_api_key(key);
        }
        if let Some(model) = &config.model {
            generator = generator.with_model(model.clone());
        }
        Ok(generator)
    }

    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GeneratorError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            model: None,
            timeout: Duration::from_secs(300),
            client,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn chat_completion_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> GeneratorError {
        match status.as_u16() {
            401 | 403 => GeneratorError::auth(format!("HTTP {}: {}", status, body)),
            429 => GeneratorError::rate_limit(parse_retry_after(body)),
            408 | 504 => GeneratorError::timeout(self.timeout, None),
            400..=499 => GeneratorError::config(format!("HTTP {}: {}", status, body)),
            500..=599 => GeneratorError::network(format!("HTTP {}: {}", status, body)),
            _ => GeneratorError::network(format!("unexpected HTTP {}: {}", status, body)),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

impl HttpGenerator {
    /// Text of the first choice; a completion without one is a parse error
    fn to_response(
        &self,
        completion: ChatCompletionResponse,
        elapsed: Duration,
    ) -> Result<GenerationResponse, GeneratorError> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GeneratorError::parse("response has no choices"))?;
        let text = choice
            .message
            .content
            .ok_or_else(|| GeneratorError::parse("first choice has no message content"))?;

        let mut generated = GenerationResponse::new(text, self.name.clone(), elapsed);
        if let Some(model) = completion.model {
            generated = generated.with_model(model);
        }
        if let Some(usage) = completion.usage {
            generated = generated.with_usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }
        Ok(generated)
    }
}

fn parse_retry_after(body: &str) -> Option<Duration> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_f64())
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(Message {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(Message {
            role: "user",
            content: request.prompt.clone(),
        });

        let body = ChatCompletionRequest {
            model: self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.into()),
            messages,
        };

        debug!(generator = %self.name, model = %body.model, "posting chat completion");

        let http_request = self.authorize(self.client.post(self.chat_completion_url()).json(&body));
        let timeout = request.timeout.unwrap_or(self.timeout);
        let result = tokio::time::timeout(timeout, http_request.send()).await;
        let elapsed = start.elapsed();

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(GeneratorError::timeout(elapsed, None)),
            Ok(Err(e)) if e.is_connect() => {
                return Err(GeneratorError::network(format!("connection failed: {}", e)));
            }
            Ok(Err(e)) => return Err(GeneratorError::network(format!("request failed: {}", e))),
            Err(_) => return Err(GeneratorError::timeout(elapsed, None)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_http_error(status, &body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::parse(format!("failed to parse response: {}", e)))?;

        self.to_response(completion, elapsed)
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        let request = self.authorize(self.client.get(&url));

        match tokio::time::timeout(Duration::from_secs(5), request.send()).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }
}
