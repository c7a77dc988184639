//! Error taxonomy for the patch engine

use super::correction::PromptError;
use crate::generator::GeneratorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level failure categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Structurally malformed directive
    FormatError,
    /// Zero or several candidate files match a directive
    ResolutionError,
    /// Target missing, or SEARCH text absent from current content
    ValidationError,
    /// Path-safety violation, already-exists, or write failure
    ApplyError,
    /// The text generator failed, or its next prompt could not be built
    GeneratorError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FormatError => "format_error",
            ErrorKind::ResolutionError => "resolution_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ApplyError => "apply_error",
            ErrorKind::GeneratorError => "generator_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failure raised while turning a response into file changes
#[derive(Debug, Error)]
pub enum PatchError {
    #[error(
        "Block {block}: Malformed SEARCH/REPLACE block - missing `=======` separator.\n\
         Each block must have EXACTLY ONE `=======` line separating SEARCH from REPLACE.\n\
         Block preview: {preview}"
    )]
    MissingSeparator { block: usize, preview: String },

    #[error(
        "Block {block}: Malformed SEARCH/REPLACE block - contains {count} `=======` markers.\n\
         The separator was used as content by mistake: `=======` is a SEPARATOR, not part of your code.\n\
         Each block must have EXACTLY ONE `=======` line."
    )]
    DuplicateSeparator { block: usize, count: usize },

    #[error(
        "Block {block}: SEARCH section is empty.\n\
         Copy the exact lines to be replaced from the file into the SEARCH section."
    )]
    EmptySearch { block: usize },

    #[error(
        "SEARCH content not found in any of the provided files.\n\
         First line of SEARCH: '{snippet}'\n\
         Files searched: {}",
        join_paths(.searched)
    )]
    NoCandidateMatch { snippet: String, searched: Vec<PathBuf> },

    #[error(
        "SEARCH content found in {} files: {}.\n\
         First line of SEARCH: '{snippet}'\n\
         Include more surrounding lines so the SEARCH text matches exactly one file, \
         or prefix the block with `FILE: <path>`.",
        .matches.len(),
        join_paths(.matches)
    )]
    AmbiguousMatch { snippet: String, matches: Vec<PathBuf> },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error(
        "SEARCH content not found in {path}.\n\
         First line of SEARCH: '{snippet}'\n\
         Make sure text matches EXACTLY (including whitespace)."
    )]
    SearchNotFound { path: PathBuf, snippet: String },

    #[error("Path '{path}' is outside the project root (security violation prevented)")]
    PathEscapesRoot { path: PathBuf },

    #[error("File '{path}' already exists. Use a SEARCH/REPLACE block to modify it.")]
    AlreadyExists { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} changed on disk between validation and write")]
    ContentChanged { path: PathBuf },

    #[error("generator failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("could not build correction prompt: {0}")]
    Prompt(#[from] PromptError),
}

impl PatchError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::MissingSeparator { .. }
            | PatchError::DuplicateSeparator { .. }
            | PatchError::EmptySearch { .. } => ErrorKind::FormatError,
            PatchError::NoCandidateMatch { .. } | PatchError::AmbiguousMatch { .. } => {
                ErrorKind::ResolutionError
            }
            PatchError::FileNotFound { .. }
            | PatchError::Unreadable { .. }
            | PatchError::SearchNotFound { .. } => ErrorKind::ValidationError,
            PatchError::PathEscapesRoot { .. }
            | PatchError::AlreadyExists { .. }
            | PatchError::WriteFailed { .. }
            | PatchError::ContentChanged { .. } => ErrorKind::ApplyError,
            PatchError::Generator(_) | PatchError::Prompt(_) => ErrorKind::GeneratorError,
        }
    }

    /// Finer-grained class within the kind
    pub fn class(&self) -> &'static str {
        match self {
            PatchError::MissingSeparator { .. } => "missing-separator",
            PatchError::DuplicateSeparator { .. } => "duplicate-separator",
            PatchError::EmptySearch { .. } => "empty-search",
            PatchError::NoCandidateMatch { .. } => "no-match",
            PatchError::AmbiguousMatch { .. } => "ambiguous",
            PatchError::FileNotFound { .. } | PatchError::Unreadable { .. } => "not-found",
            PatchError::SearchNotFound { .. } => "search-not-found",
            PatchError::PathEscapesRoot { .. } => "security",
            PatchError::AlreadyExists { .. } => "already-exists",
            PatchError::WriteFailed { .. } => "write-failed",
            PatchError::ContentChanged { .. } => "stale",
            PatchError::Generator(_) => "generator",
            PatchError::Prompt(_) => "prompt",
        }
    }

    /// Returns true if a corrective round may fix this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PatchError::WriteFailed { .. }
                | PatchError::ContentChanged { .. }
                | PatchError::Generator(_)
                | PatchError::Prompt(_)
        )
    }

    /// File the error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            PatchError::FileNotFound { path }
            | PatchError::Unreadable { path, .. }
            | PatchError::SearchNotFound { path, .. }
            | PatchError::PathEscapesRoot { path }
            | PatchError::AlreadyExists { path }
            | PatchError::WriteFailed { path, .. }
            | PatchError::ContentChanged { path } => Some(path),
            _ => None,
        }
    }
}

/// First line of a SEARCH text, cut to `width` characters
pub fn first_line_snippet(search: &str, width: usize) -> String {
    let first = search.split('\n').next().unwrap_or_default();
    if first.chars().count() > width {
        let head: String = first.chars().take(width).collect();
        format!("{}...", head)
    } else {
        first.to_string()
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(none)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// All failures collected from the stage that rejected a round
///
/// Every directive is checked before the round is rejected, so a single
/// rejection can carry several errors. They always share one kind.
#[derive(Debug)]
pub struct RoundError {
    kind: ErrorKind,
    errors: Vec<PatchError>,
}

impl From<PatchError> for RoundError {
    fn from(err: PatchError) -> Self {
        Self {
            kind: err.kind(),
            errors: vec![err],
        }
    }
}

impl RoundError {
    pub fn new(errors: Vec<PatchError>) -> Option<Self> {
        let kind = errors.first()?.kind();
        Some(Self { kind, errors })
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn errors(&self) -> &[PatchError] {
        &self.errors
    }

    /// True if any block used the separator line as content
    pub fn has_duplicate_separator(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, PatchError::DuplicateSeparator { .. }))
    }

    /// Files mentioned by the errors
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for path in self.errors.iter().filter_map(PatchError::path) {
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_path_buf());
            }
        }
        paths
    }

    /// Diagnostic text used both in the result and the correction prompt
    pub fn message(&self) -> String {
        match self.errors.as_slice() {
            [single] => single.to_string(),
            many => many
                .iter()
                .enumerate()
                .map(|(i, e)| format!("{}. {}", i + 1, e))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

impl fmt::Display for RoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message())
    }
}

impl std::error::Error for RoundError {}
