//! Structural checks on SEARCH/REPLACE blocks
//!
//! Works on the raw text between the SEARCH and REPLACE markers rather than
//! on parsed directives. A block with a stray separator line still parses
//! (it is split on the first separator), so counting separators in the raw
//! span is the only way to notice that the replacement was cut in two.

use super::block_parser::raw_blocks;
use super::error::{PatchError, RoundError};

/// Characters of block body quoted when a separator is missing
const PREVIEW_CHARS: usize = 100;

/// Check every closed block in the response
pub fn validate_block_format(text: &str) -> Result<(), RoundError> {
    let mut errors = Vec::new();

    for block in raw_blocks(text) {
        match block.separator_count() {
            0 => errors.push(PatchError::MissingSeparator {
                block: block.index,
                preview: preview(block.body),
            }),
            1 => {
                let empty = block
                    .split()
                    .is_none_or(|(search, _)| search.trim().is_empty());
                if empty {
                    errors.push(PatchError::EmptySearch { block: block.index });
                }
            }
            count => errors.push(PatchError::DuplicateSeparator {
                block: block.index,
                count,
            }),
        }
    }

    match RoundError::new(errors) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::error::ErrorKind;

    #[test]
    fn test_valid_blocks_pass() {
        let text = "<<<<<<< SEARCH\na\n=======\nb\n>>>>>>> REPLACE\n\
                    <<<<<<< SEARCH\nc\n=======\n>>>>>>> REPLACE\n";
        assert!(validate_block_format(text).is_ok());
    }

    #[test]
    fn test_no_blocks_pass() {
        assert!(validate_block_format("just talking").is_ok());
    }

    #[test]
    fn test_missing_separator() {
        let text = "<<<<<<< SEARCH\nfn a() {}\nfn b() {}\n>>>>>>> REPLACE";
        let err = validate_block_format(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatError);
        assert!(matches!(
            err.errors()[0],
            PatchError::MissingSeparator { block: 1, .. }
        ));
        assert!(err.message().contains("missing `=======` separator"));
        assert!(err.message().contains("fn a() {}"));
    }

    #[test]
    fn test_duplicate_separator_rejected_either_split() {
        // Stray separator in the replacement half
        let late = "<<<<<<< SEARCH\nold\n=======\nnew\n=======\nmore\n>>>>>>> REPLACE";
        // Stray separator in the search half
        let early = "<<<<<<< SEARCH\nold\n=======\nstill old\n=======\nnew\n>>>>>>> REPLACE";

        for text in [late, early] {
            let err = validate_block_format(text).unwrap_err();
            assert!(err.has_duplicate_separator());
            assert!(err.message().contains("contains 2 `=======` markers"));
            assert!(err.message().contains("used as content by mistake"));
        }
    }

    #[test]
    fn test_reports_every_bad_block_with_index() {
        let text = "<<<<<<< SEARCH\nok\n=======\nfine\n>>>>>>> REPLACE\n\
                    <<<<<<< SEARCH\nno separator\n>>>>>>> REPLACE\n\
                    <<<<<<< SEARCH\na\n=======\n=======\n=======\nb\n>>>>>>> REPLACE\n";
        let err = validate_block_format(text).unwrap_err();
        assert_eq!(err.errors().len(), 2);
        assert!(matches!(
            err.errors()[0],
            PatchError::MissingSeparator { block: 2, .. }
        ));
        assert!(matches!(
            err.errors()[1],
            PatchError::DuplicateSeparator { block: 3, count: 3 }
        ));
    }

    #[test]
    fn test_empty_search_rejected() {
        let text = "<<<<<<< SEARCH\n=======\nadded line\n>>>>>>> REPLACE";
        let err = validate_block_format(text).unwrap_err();
        assert!(matches!(err.errors()[0], PatchError::EmptySearch { block: 1 }));
    }

    #[test]
    fn test_separator_must_be_whole_line() {
        let text = "<<<<<<< SEARCH\nlet s = \"=======\";\n=======\nlet s = \"\";\n>>>>>>> REPLACE";
        assert!(validate_block_format(text).is_ok());
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(150);
        let p = preview(&long);
        assert_eq!(p.len(), 103);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
