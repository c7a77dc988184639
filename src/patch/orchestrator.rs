//! The correction loop: generate, check, apply, or ask again
//!
//! Each round sends one prompt to the generator and pushes the response
//! through parse, format check, resolution and dry run. A round that passes
//! is applied and ends the invocation. A rejected round turns into a
//! correction prompt for the next one, up to [`MAX_ROUNDS`] in total.

use super::applier::{ApplyReport, apply_round};
use super::block_parser::{Directive, parse_directives};
use super::candidates::CandidateFiles;
use super::correction::{CorrectionContext, PromptTemplates, relevant_files};
use super::dry_run::{DryRun, ValidatedRound};
use super::error::{ErrorKind, PatchError, RoundError};
use super::format_validator::validate_block_format;
use super::resolver::resolve_targets;
use crate::generator::{
    EDIT_FORMAT_INSTRUCTIONS, GenerationRequest, GenerationResponse, Generator, TokenUsage,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};

/// Rounds per invocation, the first included
pub const MAX_ROUNDS: usize = 3;

/// Characters of the SEARCH first line quoted in diagnostics
pub const DEFAULT_SNIPPET_WIDTH: usize = 60;

/// Where a round is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generating,
    Extracting,
    Resolving,
    Validating,
    Applying,
    Correcting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Generating => "generating",
            Stage::Extracting => "extracting",
            Stage::Resolving => "resolving",
            Stage::Validating => "validating",
            Stage::Applying => "applying",
            Stage::Correcting => "correcting",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// How a single round ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Every directive was written
    Applied(ApplyReport),
    /// The response contained no edit blocks
    NoDirectives,
    /// A check failed; the next round gets a correction prompt
    Rejected {
        kind: ErrorKind,
        classes: Vec<&'static str>,
        message: String,
    },
}

impl RoundOutcome {
    fn rejected(err: &RoundError) -> Self {
        RoundOutcome::Rejected {
            kind: err.kind(),
            classes: err.errors().iter().map(PatchError::class).collect(),
            message: err.message(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, RoundOutcome::Rejected { .. })
    }
}

/// One generator call and everything done with its response
#[derive(Debug, Clone, Serialize)]
pub struct Round {
    /// 1-based
    pub index: usize,
    pub prompt: String,
    pub response: String,
    /// Directives as parsed, before resolution
    pub directives: Vec<Directive>,
    /// Last stage reached
    pub stage: Stage,
    pub outcome: RoundOutcome,
    /// Generator that answered, and the model when it reports one
    pub generator: String,
    pub model: Option<String>,
    pub duration_ms: u64,
    pub usage: Option<TokenUsage>,
}

/// What an invocation produced
///
/// `error` and `error_kind` are set exactly when directives were found but
/// no round could apply them.
#[derive(Debug, Clone, Serialize)]
pub struct InvokeResult {
    /// Last generator response
    pub output: String,
    pub applied: bool,
    pub files_modified: BTreeMap<PathBuf, usize>,
    pub files_created: BTreeMap<PathBuf, usize>,
    pub rounds_used: usize,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Per-round trace, oldest first
    pub rounds: Vec<Round>,
}

/// Turns a natural-language request into applied file edits
pub struct PatchEngine<G> {
    generator: G,
    root: PathBuf,
    candidates: CandidateFiles,
    prompts: PromptTemplates,
    snippet_width: usize,
    system_prompt: Option<String>,
    timeout: Option<Duration>,
}

impl<G: Generator> PatchEngine<G> {
    pub fn new(generator: G, project_root: impl Into<PathBuf>) -> Self {
        Self {
            generator,
            root: project_root.into(),
            candidates: CandidateFiles::new(),
            prompts: PromptTemplates::new(),
            snippet_width: DEFAULT_SNIPPET_WIDTH,
            system_prompt: Some(EDIT_FORMAT_INSTRUCTIONS.to_string()),
            timeout: None,
        }
    }

    /// Files shown to the generator, used to resolve blocks without `FILE:`
    pub fn with_candidates(mut self, candidates: CandidateFiles) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_snippet_width(mut self, width: usize) -> Self {
        self.snippet_width = width;
        self
    }

    /// Replace the built-in format instructions; `None` sends no system prompt
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Run the request through at most [`MAX_ROUNDS`] rounds
    ///
    /// Rejected rounds are not errors: when every round is rejected the result
    /// carries the last diagnostic. `Err` is reserved for failures a new round
    /// cannot fix (generator failure, or a write failing after validation).
    pub async fn invoke(&self, user_request: &str) -> Result<InvokeResult, PatchError> {
        let dry_run = DryRun::new(&self.root, self.snippet_width);
        let mut rounds: Vec<Round> = Vec::new();
        let mut prompt = user_request.to_string();
        let mut last_error: Option<RoundError> = None;

        for index in 1..=MAX_ROUNDS {
            let span = info_span!("round", index);
            let (round, rejection) = self
                .run_round(index, prompt.clone(), &dry_run)
                .instrument(span.clone())
                .await?;

            let Some(err) = rejection else {
                info!(parent: &span, stage = %round.stage, "round succeeded");
                rounds.push(round);
                return Ok(self.finish(rounds, None));
            };

            if index < MAX_ROUNDS {
                debug!(parent: &span, stage = %Stage::Correcting, "building correction prompt");
                prompt = self.correction_prompt(user_request, &round, &err)?;
            }
            rounds.push(round);
            last_error = Some(err);
        }

        warn!(rounds = MAX_ROUNDS, "giving up: no round could be applied");
        Ok(self.finish(rounds, last_error))
    }

    async fn run_round(
        &self,
        index: usize,
        prompt: String,
        dry_run: &DryRun,
    ) -> Result<(Round, Option<RoundError>), PatchError> {
        debug!(stage = %Stage::Generating, prompt_chars = prompt.len(), "calling generator");
        let GenerationResponse {
            text,
            generator,
            model,
            duration,
            usage,
        } = self.generator.generate(&self.request(&prompt)).await?;
        debug!(%generator, duration_ms = duration.as_millis() as u64, "response received");

        debug!(stage = %Stage::Extracting, "parsing response");
        let directives = parse_directives(&text);
        debug!(count = directives.len(), "parsed directives");

        let (stage, outcome, rejection) =
            match check(&text, directives.clone(), &self.candidates, dry_run) {
                Ok(None) => {
                    info!("no edit blocks in response");
                    (Stage::Done, RoundOutcome::NoDirectives, None)
                }
                Ok(Some(validated)) => {
                    debug!(stage = %Stage::Applying, "writing files");
                    match apply_round(&validated) {
                        Ok(report) => (Stage::Done, RoundOutcome::Applied(report), None),
                        Err(e) if e.is_retryable() => {
                            let err = RoundError::from(e);
                            warn!(kind = %err.kind(), "apply rejected: {}", err.message());
                            (Stage::Applying, RoundOutcome::rejected(&err), Some(err))
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err((stage, err)) => {
                    warn!(%stage, kind = %err.kind(), "round rejected: {}", err.message());
                    (stage, RoundOutcome::rejected(&err), Some(err))
                }
            };

        let round = Round {
            index,
            prompt,
            response: text,
            directives,
            stage,
            outcome,
            generator,
            model,
            duration_ms: duration.as_millis() as u64,
            usage,
        };
        Ok((round, rejection))
    }

    fn request(&self, prompt: &str) -> GenerationRequest {
        let mut request = GenerationRequest::new(prompt).with_working_dir(self.root.clone());
        if let Some(system) = &self.system_prompt {
            request = request.with_system_prompt(system.clone());
        }
        if let Some(timeout) = self.timeout {
            request = request.with_timeout(timeout);
        }
        request
    }

    fn correction_prompt(
        &self,
        user_request: &str,
        round: &Round,
        err: &RoundError,
    ) -> Result<String, PatchError> {
        let directive_paths: Vec<PathBuf> = round
            .directives
            .iter()
            .filter_map(Directive::file_path)
            .cloned()
            .collect();

        let ctx = CorrectionContext {
            error: err.message(),
            error_kind: err.kind().as_str(),
            request: user_request,
            previous_response: &round.response,
            files: relevant_files(&self.root, &directive_paths, err, &self.candidates),
            round: round.index,
            max_rounds: MAX_ROUNDS,
        };
        Ok(self.prompts.render(err, &ctx)?)
    }

    fn finish(&self, rounds: Vec<Round>, last_error: Option<RoundError>) -> InvokeResult {
        let output = rounds.last().map(|r| r.response.clone()).unwrap_or_default();
        let report = match rounds.last().map(|r| &r.outcome) {
            Some(RoundOutcome::Applied(report)) => report.clone(),
            _ => ApplyReport::default(),
        };

        InvokeResult {
            output,
            applied: last_error.is_none(),
            files_modified: report.files_modified,
            files_created: report.files_created,
            rounds_used: rounds.len(),
            error: last_error.as_ref().map(RoundError::message),
            error_kind: last_error.as_ref().map(RoundError::kind),
            rounds,
        }
    }
}

/// Parse, format-check, resolve and dry-run a response without writing
///
/// `Ok(None)` means the response holds no directives.
pub fn prepare_response(
    response: &str,
    candidates: &CandidateFiles,
    root: &Path,
    snippet_width: usize,
) -> Result<Option<ValidatedRound>, RoundError> {
    let dry_run = DryRun::new(root, snippet_width);
    check(response, parse_directives(response), candidates, &dry_run).map_err(|(_, err)| err)
}

/// Stages after parsing, in order; the first to fail rejects the round
fn check(
    text: &str,
    directives: Vec<Directive>,
    candidates: &CandidateFiles,
    dry_run: &DryRun,
) -> Result<Option<ValidatedRound>, (Stage, RoundError)> {
    validate_block_format(text).map_err(|e| (Stage::Extracting, e))?;
    if directives.is_empty() {
        return Ok(None);
    }

    debug!(stage = %Stage::Resolving, "resolving target files");
    let resolved = resolve_targets(directives, candidates, dry_run.snippet_width())
        .map_err(|e| (Stage::Resolving, e))?;

    debug!(stage = %Stage::Validating, "dry run");
    let validated = dry_run
        .validate(&resolved)
        .map_err(|e| (Stage::Validating, e))?;
    Ok(Some(validated))
}
