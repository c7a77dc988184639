//! Target file resolution for directives without a `FILE:` section
//!
//! A directive resolves to the single candidate whose content contains its
//! SEARCH text. No match and several matches both fail; there is no
//! tie-break beyond uniqueness.

use super::block_parser::Directive;
use super::candidates::CandidateFiles;
use super::error::{PatchError, RoundError, first_line_snippet};
use tracing::debug;

/// Fill in `file_path` for every unassigned REPLACE directive
///
/// Each directive is resolved independently, but the batch fails as a whole
/// if any one of them cannot be resolved.
pub fn resolve_targets(
    directives: Vec<Directive>,
    candidates: &CandidateFiles,
    snippet_width: usize,
) -> Result<Vec<Directive>, RoundError> {
    let mut resolved = Vec::with_capacity(directives.len());
    let mut errors = Vec::new();

    for directive in directives {
        match directive {
            Directive::Replace(mut replace) if replace.file_path.is_none() => {
                let mut matches = candidates.containing(&replace.search);
                match matches.len() {
                    1 => {
                        let path = matches.remove(0);
                        debug!(path = %path.display(), "auto-detected target file");
                        replace.file_path = Some(path);
                        resolved.push(Directive::Replace(replace));
                    }
                    0 => errors.push(PatchError::NoCandidateMatch {
                        snippet: first_line_snippet(&replace.search, snippet_width),
                        searched: candidates.paths(),
                    }),
                    _ => errors.push(PatchError::AmbiguousMatch {
                        snippet: first_line_snippet(&replace.search, snippet_width),
                        matches,
                    }),
                }
            }
            other => resolved.push(other),
        }
    }

    match RoundError::new(errors) {
        Some(err) => Err(err),
        None => Ok(resolved),
    }
}
