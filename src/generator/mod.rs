//! Text generators the patch engine sends prompts to
//!
//! Provides a CLI-process generator and an OpenAI-compatible HTTP generator
//! behind the [`Generator`] trait.
//!
//! # Example
//!
//! ```ignore
//! use crate::generator::{CliGenerator, Generator, GenerationRequest};
//!
//! let generator = CliGenerator::new("claude", "claude").with_args(vec!["-p".into()]);
//! let request = GenerationRequest::new("Rename add() to sum() in calc.py");
//! let response = generator.generate(&request).await?;
//!
//! println!("{}", response.text);
//! ```

mod cli_generator;
mod http_generator;
mod instructions;
mod types;

pub use cli_generator::CliGenerator;
pub use http_generator::HttpGenerator;
pub use instructions::EDIT_FORMAT_INSTRUCTIONS;
pub use types::{GenerationRequest, GenerationResponse, Generator, GeneratorError, TokenUsage};

use crate::config::BackendConfig;

/// Create an appropriate generator for a backend config
pub fn create_generator(
    name: &str,
    config: &BackendConfig,
) -> Result<Box<dyn Generator>, GeneratorError> {
    if config.command.is_empty() {
        return Err(GeneratorError::config(format!(
            "backend '{}' has no command",
            name
        )));
    }

    if config.is_http() {
        Ok(Box::new(HttpGenerator::from_config(name, config)?))
    } else {
        Ok(Box::new(CliGenerator::from_config(name, config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cli_generator() {
        let config = BackendConfig {
            command: "claude".into(),
            ..Default::default()
        };

        let generator = create_generator("claude", &config).unwrap();
        assert_eq!(generator.name(), "claude");
    }

    #[test]
    fn test_create_http_generator() {
        let config = BackendConfig {
            command: "https://api.openai.com/v1".into(),
            ..Default::default()
        };

        let generator = create_generator("openai", &config).unwrap();
        assert_eq!(generator.name(), "openai");
    }

    #[test]
    fn test_create_without_command() {
        let result = create_generator("empty", &BackendConfig::default());
        assert!(matches!(result, Err(GeneratorError::Config { .. })));
    }

    #[tokio::test]
    async fn test_boxed_generator_delegates() {
        let generator: Box<dyn Generator> = Box::new(CliGenerator::new("echo", "echo"));
        let response = generator
            .generate(&GenerationRequest::new("boxed"))
            .await
            .unwrap();
        assert_eq!(response.text, "boxed");
    }
}
