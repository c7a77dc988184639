//! Configuration loading with multi-layer merge

use super::BackendConfig;
use crate::patch::{DEFAULT_SNIPPET_WIDTH, PromptError, PromptTemplates};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level llm-patch configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmPatchConfig {
    /// Global defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Backend definitions
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,

    /// Correction prompt overrides
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Global default settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Backend used when none is named on the command line
    pub backend: Option<String>,

    /// Overrides every backend's timeout (seconds)
    pub timeout: Option<u64>,

    /// Characters of the SEARCH first line quoted in diagnostics
    #[serde(default = "default_snippet_width")]
    pub snippet_width: usize,

    /// Log file path; `~` is expanded
    pub log_file: Option<String>,
}

fn default_snippet_width() -> usize {
    DEFAULT_SNIPPET_WIDTH
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            backend: None,
            timeout: None,
            snippet_width: default_snippet_width(),
            log_file: None,
        }
    }
}

/// minijinja templates replacing the built-in correction prompts
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromptsConfig {
    pub correction: Option<String>,
    pub duplicate_separator: Option<String>,
}

impl LlmPatchConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/llm-patch/config.toml
    /// 3. .llm-patch/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = Self::project_config_path(project_dir);
        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        config
            .prompt_templates()
            .with_context(|| format!("checking prompts in {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/llm-patch/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("llm-patch/config.toml"))
    }

    pub fn project_config_path(project_dir: Option<&Path>) -> PathBuf {
        project_dir
            .map(|p| p.join(".llm-patch/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".llm-patch/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.backend.is_some() {
            self.defaults.backend = other.defaults.backend;
        }
        if other.defaults.timeout.is_some() {
            self.defaults.timeout = other.defaults.timeout;
        }
        if other.defaults.snippet_width != default_snippet_width() {
            self.defaults.snippet_width = other.defaults.snippet_width;
        }
        if other.defaults.log_file.is_some() {
            self.defaults.log_file = other.defaults.log_file;
        }

        // Other wins for same key
        for (name, backend) in other.backends {
            self.backends.insert(name, backend);
        }

        if other.prompts.correction.is_some() {
            self.prompts.correction = other.prompts.correction;
        }
        if other.prompts.duplicate_separator.is_some() {
            self.prompts.duplicate_separator = other.prompts.duplicate_separator;
        }
    }

    pub fn get_backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    /// Get all enabled backends
    pub fn enabled_backends(&self) -> impl Iterator<Item = (&String, &BackendConfig)> {
        self.backends.iter().filter(|(_, b)| b.enabled)
    }

    /// Pick the backend to use
    ///
    /// An explicit name wins, then `defaults.backend`, then the only enabled
    /// backend if there is exactly one.
    pub fn select_backend(&self, requested: Option<&str>) -> Result<(String, BackendConfig)> {
        let name = match requested.or(self.defaults.backend.as_deref()) {
            Some(name) => name.to_string(),
            None => {
                let enabled: Vec<&String> = self.enabled_backends().map(|(n, _)| n).collect();
                match enabled.as_slice() {
                    [only] => (*only).clone(),
                    [] => anyhow::bail!(
                        "no backends configured; add one under [backends.<name>] in {}",
                        Self::user_config_path()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "config.toml".into())
                    ),
                    _ => anyhow::bail!(
                        "several backends configured ({}); pick one with --backend or defaults.backend",
                        enabled
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }
            }
        };

        let mut backend = self
            .get_backend(&name)
            .cloned()
            .with_context(|| format!("backend '{}' not found", name))?;
        if !backend.enabled {
            anyhow::bail!("backend '{}' is disabled", name);
        }
        if let Some(timeout) = self.defaults.timeout {
            backend.timeout = timeout;
        }
        Ok((name, backend))
    }

    /// Correction templates with any configured overrides applied
    pub fn prompt_templates(&self) -> Result<PromptTemplates, PromptError> {
        let mut templates = PromptTemplates::new();
        if let Some(source) = &self.prompts.correction {
            templates = templates.with_correction(source.clone())?;
        }
        if let Some(source) = &self.prompts.duplicate_separator {
            templates = templates.with_duplicate_separator(source.clone())?;
        }
        Ok(templates)
    }

    /// Configured log file with `~` and environment variables expanded
    pub fn log_file(&self) -> Option<PathBuf> {
        self.defaults.log_file.as_deref().map(expand_path)
    }
}

/// Expand `~` and `$VAR` in a user-supplied path
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}
