//! Correction prompts sent back to the generator after a rejected round

use super::candidates::CandidateFiles;
use super::error::RoundError;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Width of the rule drawn around line-numbered listings
const RULE_WIDTH: usize = 60;

/// Generic correction prompt
pub const DEFAULT_CORRECTION_TEMPLATE: &str = r#"Your previous response could not be applied ({{ error_kind }}, attempt {{ round }} of {{ max_rounds }}).

ERROR:
{{ error }}

ORIGINAL REQUEST:
{{ request }}

YOUR PREVIOUS RESPONSE:
{{ previous_response }}
{% if files %}
CURRENT FILE CONTENT (line numbers are for reference only, do not include them in SEARCH):
{% for file in files %}
{{ file.listing }}
{% endfor %}{% endif %}
Produce corrected SEARCH/REPLACE blocks. Copy the SEARCH text EXACTLY from the current file content, including indentation, blank lines and trailing whitespace."#;

/// Prompt used when a block contained more than one separator line
pub const DEFAULT_DUPLICATE_SEPARATOR_TEMPLATE: &str = r#"Your previous response could not be applied (attempt {{ round }} of {{ max_rounds }}).

ERROR:
{{ error }}

The line `=======` is the SEPARATOR between SEARCH and REPLACE. It must appear EXACTLY ONCE per block and is never part of your code.

WRONG:
<<<<<<< SEARCH
old line
=======
new line
=======
another new line
>>>>>>> REPLACE

RIGHT:
<<<<<<< SEARCH
old line
=======
new line
another new line
>>>>>>> REPLACE

ORIGINAL REQUEST:
{{ request }}

YOUR PREVIOUS RESPONSE:
{{ previous_response }}
{% if files %}
CURRENT FILE CONTENT (line numbers are for reference only, do not include them in SEARCH):
{% for file in files %}
{{ file.listing }}
{% endfor %}{% endif %}
Resend the edit with exactly one `=======` line in every block."#;

/// Errors from prompt templates
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("invalid {name} template: {source}")]
    Syntax {
        name: &'static str,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render {name} template: {source}")]
    Render {
        name: &'static str,
        #[source]
        source: minijinja::Error,
    },
}

/// A file shown to the generator in a correction prompt
#[derive(Debug, Clone, Serialize)]
pub struct FileListing {
    pub path: PathBuf,
    pub listing: String,
}

/// Everything a correction template can reference
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionContext<'a> {
    /// Diagnostic message of the rejected round
    pub error: String,
    pub error_kind: &'a str,
    pub request: &'a str,
    pub previous_response: &'a str,
    pub files: Vec<FileListing>,
    /// 1-based index of the round that failed
    pub round: usize,
    pub max_rounds: usize,
}

/// The two correction templates, rendered with strict undefined handling
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    env: Environment<'static>,
    correction: String,
    duplicate_separator: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptTemplates {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        Self {
            env,
            correction: DEFAULT_CORRECTION_TEMPLATE.to_string(),
            duplicate_separator: DEFAULT_DUPLICATE_SEPARATOR_TEMPLATE.to_string(),
        }
    }

    /// Replace the generic correction template
    pub fn with_correction(mut self, source: impl Into<String>) -> Result<Self, PromptError> {
        let source = source.into();
        self.check("correction", &source)?;
        self.correction = source;
        Ok(self)
    }

    /// Replace the duplicate-separator template
    pub fn with_duplicate_separator(
        mut self,
        source: impl Into<String>,
    ) -> Result<Self, PromptError> {
        let source = source.into();
        self.check("duplicate_separator", &source)?;
        self.duplicate_separator = source;
        Ok(self)
    }

    /// Syntax-check a template without rendering it
    pub fn check(&self, name: &'static str, source: &str) -> Result<(), PromptError> {
        self.env
            .template_from_str(source)
            .map(|_| ())
            .map_err(|source| PromptError::Syntax { name, source })
    }

    /// Build the prompt for the next round
    ///
    /// Picks the duplicate-separator template whenever that mistake is among
    /// the errors.
    pub fn render(&self, err: &RoundError, ctx: &CorrectionContext) -> Result<String, PromptError> {
        let (name, source) = if err.has_duplicate_separator() {
            ("duplicate_separator", &self.duplicate_separator)
        } else {
            ("correction", &self.correction)
        };

        self.env
            .render_str(source, ctx)
            .map_err(|source| PromptError::Render { name, source })
    }
}

/// Render a file as a numbered listing
///
/// ```text
/// File: src/calc.py (2 lines total)
/// ────────────────────────────────────────────────────────────
/// 1 | def add(a, b):
/// 2 |     return a + b
/// ────────────────────────────────────────────────────────────
/// ```
pub fn format_file_with_line_numbers(path: &Path, content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let width = lines.len().to_string().len();
    let rule = "─".repeat(RULE_WIDTH);

    let mut out = format!(
        "File: {} ({} lines total)\n{}\n",
        path.display(),
        lines.len(),
        rule
    );
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{:>width$} | {}\n", i + 1, line, width = width));
    }
    out.push_str(&rule);
    out
}

/// Files worth showing alongside a correction
///
/// The files named by the rejected directives and by the errors, or every
/// candidate when neither names one. Content is read fresh from disk and
/// falls back to the candidate snapshot; files that exist in neither place
/// are left out.
pub fn relevant_files(
    root: &Path,
    directive_paths: &[PathBuf],
    err: &RoundError,
    candidates: &CandidateFiles,
) -> Vec<FileListing> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for path in directive_paths.iter().cloned().chain(err.paths()) {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        paths = candidates.paths();
    }

    paths
        .into_iter()
        .filter_map(|path| {
            let content = read_fresh(root, &path)
                .or_else(|| candidates.get(&path).map(str::to_string))?;
            Some(FileListing {
                listing: format_file_with_line_numbers(&path, &content),
                path,
            })
        })
        .collect()
}

/// Only paths that stay lexically inside the root are read
fn read_fresh(root: &Path, path: &Path) -> Option<String> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    let full = root.join(path);
    if escapes || !full.is_file() {
        return None;
    }
    fs::read_to_string(full).ok()
}
