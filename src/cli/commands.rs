//! CLI command implementations

use super::output::{CheckReport, OutputEvent, OutputHandler};
use crate::config::LlmPatchConfig;
use crate::generator::{Generator, create_generator};
use crate::patch::{
    CandidateFiles, MAX_ROUNDS, PatchEngine, PythonImports, format_file_with_line_numbers,
    prepare_response,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load the files named on the command line, plus their imports if asked
pub fn load_candidates(root: &Path, files: &[PathBuf], related: bool) -> Result<CandidateFiles> {
    let candidates = if related {
        CandidateFiles::load_with_related(root, files, &PythonImports)
    } else {
        CandidateFiles::load(root, files)
    };
    candidates.context("loading files")
}

/// The first prompt: the user's request followed by every file, numbered
pub fn compose_request(request: &str, candidates: &CandidateFiles) -> String {
    if candidates.is_empty() {
        return request.to_string();
    }

    let listings: Vec<String> = candidates
        .iter()
        .map(|(path, content)| format_file_with_line_numbers(path, content))
        .collect();

    format!(
        "{}\n\nThe files below are the current content on disk. \
         Line numbers are for reference only; never copy them into SEARCH text.\n\n{}",
        request.trim_end(),
        listings.join("\n")
    )
}

/// Run an edit request against the configured backend
pub async fn edit(
    request: &str,
    files: &[PathBuf],
    backend: Option<&str>,
    related: bool,
    root: &Path,
    config: &LlmPatchConfig,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let (name, backend) = config.select_backend(backend)?;
    let generator = create_generator(&name, &backend)
        .with_context(|| format!("creating backend '{}'", name))?;

    let candidates = load_candidates(root, files, related)?;
    handler.emit(OutputEvent::Info {
        message: format!(
            "Sending request to '{}' with {} file(s)",
            name,
            candidates.len()
        ),
    });

    let prompt = compose_request(request, &candidates);
    let mut engine = PatchEngine::new(generator, root)
        .with_candidates(candidates)
        .with_prompts(config.prompt_templates()?)
        .with_snippet_width(config.defaults.snippet_width)
        .with_timeout(Duration::from_secs(backend.timeout));
    if let Some(system_prompt) = backend.system_prompt {
        engine = engine.with_system_prompt(Some(system_prompt));
    }

    run_edit(&engine, &prompt, handler).await
}

/// Drive an engine and report its rounds; exit code 0 only when applied
pub async fn run_edit<G: Generator>(
    engine: &PatchEngine<G>,
    prompt: &str,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let result = match engine.invoke(prompt).await {
        Ok(result) => result,
        Err(e) => {
            handler.emit(OutputEvent::Error {
                message: format!("{} ({})", e, engine.generator().name()),
            });
            return Ok(1);
        }
    };

    for round in &result.rounds {
        handler.emit(OutputEvent::RoundComplete {
            index: round.index,
            max_rounds: MAX_ROUNDS,
            stage: round.stage,
            outcome: round.outcome.clone(),
        });
    }
    handler.invoke_result(&result);

    Ok(if result.applied { 0 } else { 1 })
}

/// Read a saved response from a file, or stdin when none is given
pub fn read_response(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading response {}", path.display())),
        None => std::io::read_to_string(std::io::stdin()).context("reading response from stdin"),
    }
}

/// Check that a saved response would apply, without writing anything
pub fn check(
    response: &str,
    files: &[PathBuf],
    related: bool,
    root: &Path,
    config: &LlmPatchConfig,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let candidates = load_candidates(root, files, related)?;
    let report = check_response(response, &candidates, root, config.defaults.snippet_width);
    let code = if report.valid { 0 } else { 1 };
    handler.check_result(&report);
    Ok(code)
}

fn check_response(
    response: &str,
    candidates: &CandidateFiles,
    root: &Path,
    snippet_width: usize,
) -> CheckReport {
    match prepare_response(response, candidates, root, snippet_width) {
        Ok(None) => CheckReport {
            valid: true,
            ..Default::default()
        },
        Ok(Some(validated)) => CheckReport {
            valid: true,
            would_modify: validated
                .edits
                .iter()
                .map(|edit| (edit.path.clone(), edit.replacements.len()))
                .collect(),
            would_create: validated
                .creates
                .iter()
                .map(|create| create.path.clone())
                .collect(),
            ..Default::default()
        },
        Err(err) => CheckReport {
            valid: false,
            error: Some(err.message()),
            error_kind: Some(err.kind()),
            ..Default::default()
        },
    }
}

/// Check backend availability
pub async fn doctor(config: &LlmPatchConfig, handler: &dyn OutputHandler) -> i32 {
    handler.emit(OutputEvent::Info {
        message: "Checking backends...".into(),
    });

    let mut all_ok = true;

    for (name, backend) in config.enabled_backends() {
        let kind = if backend.is_http() { "http" } else { "cli" };
        let status = match create_generator(name, backend) {
            Ok(generator) if generator.is_available().await => {
                format!("✓ {} ({}: {})", name, kind, backend.command)
            }
            Ok(_) => {
                all_ok = false;
                format!("✗ {} ({}: {} - unreachable)", name, kind, backend.command)
            }
            Err(e) => {
                all_ok = false;
                format!("✗ {} ({}: {})", name, kind, e)
            }
        };

        handler.emit(OutputEvent::Info { message: status });
    }

    if config.backends.is_empty() {
        handler.emit(OutputEvent::Info {
            message: "  (no backends configured)".into(),
        });
    }

    if all_ok { 0 } else { 1 }
}

/// List configured backends
pub fn list_backends(config: &LlmPatchConfig, handler: &dyn OutputHandler) {
    if config.backends.is_empty() {
        handler.emit(OutputEvent::Info {
            message: "(no backends configured)".into(),
        });
        return;
    }

    for (name, backend) in &config.backends {
        let enabled = if backend.enabled { "✓" } else { "✗" };
        let kind = if backend.is_http() { "http" } else { "cli" };
        let default = if config.defaults.backend.as_deref() == Some(name.as_str()) {
            " [default]"
        } else {
            ""
        };
        handler.emit(OutputEvent::Info {
            message: format!(
                "{} {} ({}: {}){}",
                enabled, name, kind, backend.command, default
            ),
        });
    }
}
