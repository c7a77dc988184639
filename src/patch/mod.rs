//! Patch engine: from generator text to verified file edits
//!
//! A response is parsed into [`Directive`]s, checked for structural
//! mistakes, matched to target files, dry-run against the current disk
//! content, and only then written. Any rejected stage produces a correction
//! prompt for another round, bounded by [`MAX_ROUNDS`].
//!
//! # Example
//!
//! ```ignore
//! use crate::patch::{CandidateFiles, PatchEngine};
//!
//! let candidates = CandidateFiles::load(root, &[PathBuf::from("src/calc.py")])?;
//! let engine = PatchEngine::new(generator, root).with_candidates(candidates);
//!
//! let result = engine.invoke("Rename add() to sum()").await?;
//! println!("applied={} rounds={}", result.applied, result.rounds_used);
//! ```

mod applier;
mod block_parser;
mod candidates;
mod correction;
mod dry_run;
mod error;
mod format_validator;
mod imports;
mod orchestrator;
mod resolver;
mod rollback;

pub use applier::ApplyReport;
pub use candidates::CandidateFiles;
pub use correction::{PromptError, PromptTemplates, format_file_with_line_numbers};
pub use error::ErrorKind;
pub use imports::PythonImports;
pub use orchestrator::{
    DEFAULT_SNIPPET_WIDTH, InvokeResult, MAX_ROUNDS, PatchEngine, RoundOutcome, Stage,
    prepare_response,
};
