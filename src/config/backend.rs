//! Generator backend configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for a single generator backend
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Command to execute (or HTTP base URL for API backends)
    pub command: String,

    /// Arguments placed before the prompt
    #[serde(default)]
    pub args: Vec<String>,

    /// Whether this backend is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Timeout in seconds for one generation
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Model name (for API backends)
    pub model: Option<String>,

    /// Environment variable holding the bearer token (for API backends)
    pub api_key_env: Option<String>,

    /// Additional environment variables for the command
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Replaces the built-in edit-format instructions
    pub system_prompt: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            enabled: true,
            timeout: default_timeout(),
            model: None,
            api_key_env: None,
            env: HashMap::new(),
            system_prompt: None,
        }
    }
}

impl BackendConfig {
    /// Returns true if this is an HTTP API backend (URL starts with http)
    pub fn is_http(&self) -> bool {
        self.command.starts_with("http://") || self.command.starts_with("https://")
    }

    /// Bearer token read from `api_key_env`, if set and present
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            command = "claude"
        "#;
        let config: BackendConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.command, "claude");
        assert!(config.enabled);
        assert_eq!(config.timeout, 300);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            command = "claude"
            args = ["-p", "--output-format", "text"]
            enabled = true
            timeout = 60
            system_prompt = "Reply only with edit blocks"

            [env]
            NO_COLOR = "1"
        "#;
        let config: BackendConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.args, vec!["-p", "--output-format", "text"]);
        assert_eq!(config.timeout, 60);
        assert_eq!(config.env.get("NO_COLOR"), Some(&"1".to_string()));
        assert_eq!(
            config.system_prompt.as_deref(),
            Some("Reply only with edit blocks")
        );
    }

    #[test]
    fn test_deserialize_http_backend() {
        let toml = r#"
            command = "http://localhost:11434/v1"
            model = "qwen3-coder"
            api_key_env = "LLM_PATCH_TEST_UNSET_KEY"
        "#;
        let config: BackendConfig = toml::from_str(toml).unwrap();
        assert!(config.is_http());
        assert_eq!(config.model, Some("qwen3-coder".into()));
        assert_eq!(config.api_key(), None);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let toml = r#"
            command = "claude"
            max_retries = 3
        "#;
        let result: Result<BackendConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
