//! Generator that runs a local command-line tool

use super::types::{GenerationRequest, GenerationResponse, Generator, GeneratorError};
use crate::config::BackendConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

/// Runs `command args... <prompt>` and takes stdout as the response
#[derive(Debug, Clone)]
pub struct CliGenerator {
    name: String,
    command: String,
    args: Vec<String>,
    timeout: Duration,
    env: HashMap<String, String>,
}

impl CliGenerator {
    pub fn from_config(name: impl Into<String>, config: &BackendConfig) -> Self {
        Self::new(name, config.command.clone())
            .with_args(config.args.clone())
            .with_timeout(Duration::from_secs(config.timeout))
            .with_env(config.env.clone())
    }

    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(300),
            env: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra environment for the spawned process
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn build_command(&self, request: &GenerationRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        cmd.envs(&self.env);

        // CLI tools have no separate system channel; prepend it
        match &request.system_prompt {
            Some(system) => cmd.arg(format!("{}\n\n{}", system, request.prompt)),
            None => cmd.arg(&request.prompt),
        };

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Generator for CliGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        let start = Instant::now();
        let timeout = request.timeout.unwrap_or(self.timeout);

        debug!(
            generator = %self.name,
            command = %self.command,
            prompt_chars = request.prompt.len(),
            "spawning generator"
        );

        let mut child = self.build_command(request).spawn().map_err(|e| {
            GeneratorError::unavailable(format!("failed to spawn '{}': {}", self.command, e))
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(GeneratorError::unavailable("child process has no output pipes"));
        };

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut stdout_lines = Vec::new();
        let mut stderr_lines = Vec::new();

        let result = tokio::time::timeout(timeout, async {
            let mut stderr_done = false;
            loop {
                tokio::select! {
                    biased;
                    line = stdout_reader.next_line() => {
                        match line {
                            Ok(Some(l)) => {
                                trace!(generator = %self.name, "stdout: {}", l);
                                stdout_lines.push(l);
                            }
                            Ok(None) => break,
                            Err(e) => return Err(GeneratorError::parse(format!("stdout read error: {}", e))),
                        }
                    }
                    line = stderr_reader.next_line(), if !stderr_done => {
                        match line {
                            Ok(Some(l)) => stderr_lines.push(l),
                            Ok(None) => stderr_done = true,
                            Err(e) => return Err(GeneratorError::parse(format!("stderr read error: {}", e))),
                        }
                    }
                }
            }

            child
                .wait()
                .await
                .map_err(|e| GeneratorError::unavailable(format!("failed to wait for process: {}", e)))
        })
        .await;

        let elapsed = start.elapsed();

        match result {
            Ok(Ok(status)) if status.success() => Ok(GenerationResponse::new(
                stdout_lines.join("\n"),
                self.name.clone(),
                elapsed,
            )),
            Ok(Ok(status)) => Err(GeneratorError::execution_failed(
                status.code(),
                stdout_lines.join("\n"),
                stderr_lines.join("\n"),
            )),
            Ok(Err(e)) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                Err(e)
            }
            Err(_) => {
                let _ = child.kill().await;
                let partial = (!stdout_lines.is_empty()).then(|| stdout_lines.join("\n"));
                Err(GeneratorError::timeout(elapsed, partial))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        tokio::process::Command::new("which")
            .arg(&self.command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
