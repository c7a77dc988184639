//! Core types and traits for text generation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error types that can occur while calling a generator
///
/// The patch engine never retries these; any of them ends the invocation.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// Request timed out
    #[error("timeout after {elapsed:?}")]
    Timeout {
        elapsed: Duration,
        partial_output: Option<String>,
    },

    /// Rate limited by the provider
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimit { retry_after: Option<Duration> },

    /// Authentication failed
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Network error
    #[error("network error: {message}")]
    Network { message: String },

    /// Failed to parse response
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Command execution failed
    #[error("execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Generator unavailable
    #[error("generator unavailable: {message}")]
    Unavailable { message: String },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl GeneratorError {
    pub fn timeout(elapsed: Duration, partial: Option<String>) -> Self {
        Self::Timeout {
            elapsed,
            partial_output: partial,
        }
    }

    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimit { retry_after }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn execution_failed(exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        Self::ExecutionFailed {
            exit_code,
            stdout,
            stderr,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Text returned by a generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Raw text output
    pub text: String,

    /// Generator name that produced this response
    pub generator: String,

    /// Model used (if known)
    pub model: Option<String>,

    /// Time taken
    pub duration: Duration,

    /// Token usage (if available)
    pub usage: Option<TokenUsage>,
}

impl GenerationResponse {
    pub fn new(text: impl Into<String>, generator: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            generator: generator.into(),
            model: None,
            duration,
            usage: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// One prompt sent to a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The prompt to send
    pub prompt: String,

    /// System prompt (if supported)
    pub system_prompt: Option<String>,

    /// Working directory for CLI generators
    pub working_dir: Option<PathBuf>,

    /// Override timeout for this request
    pub timeout: Option<Duration>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            working_dir: None,
            timeout: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A text-generation backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a response for one prompt
    async fn generate(&self, request: &GenerationRequest)
    -> Result<GenerationResponse, GeneratorError>;

    /// Get the generator name
    fn name(&self) -> &str;

    /// Check if this generator can be reached
    async fn is_available(&self) -> bool {
        true
    }
}

#[async_trait]
impl Generator for Box<dyn Generator> {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }
}
