//! Directive parser for generator output
//!
//! Recognises three shapes of edit directive:
//! - SEARCH/REPLACE blocks with no target file (resolved later)
//! - SEARCH/REPLACE blocks inside a `FILE: <path>` section
//! - `NEW_FILE: <path>` followed by a fenced code block
//!
//! The parser never fails. Anything that does not close is simply not
//! matched; structural problems inside closed blocks are reported by the
//! format validator, which works on the same raw spans.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Line separating the SEARCH and REPLACE halves of a block
pub const SEPARATOR: &str = "=======";

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<<<<<<< SEARCH\n(.*?)\n>>>>>>> REPLACE").expect("block regex is valid")
});

static FILE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:\*\*)?FILE:[ \t]*(.*?)[ \t]*$").expect("file regex is valid")
});

static NEW_FILE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:\*\*)?NEW_FILE:[ \t]*(.*?)[ \t]*$").expect("new file regex is valid")
});

/// Shortest backtick run that opens or closes a fence
const FENCE_MIN: usize = 3;

/// Replace the first occurrence of `search` with `replace`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceDirective {
    pub search: String,
    pub replace: String,
    /// Explicit target from a `FILE:` section; `None` triggers resolution
    pub file_path: Option<PathBuf>,
}

/// Create a file that must not exist yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDirective {
    pub file_path: PathBuf,
    pub content: String,
    /// Fence language tag; informational only
    pub language_hint: Option<String>,
}

/// One parsed edit instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Replace(ReplaceDirective),
    Create(CreateDirective),
}

impl Directive {
    /// Target path if already known
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Directive::Replace(r) => r.file_path.as_ref(),
            Directive::Create(c) => Some(&c.file_path),
        }
    }
}

/// How SEARCH/REPLACE blocks get their target file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// No `FILE:` sections; every block is resolved by content
    SingleFile,
    /// Blocks inherit the path of the enclosing `FILE:` section
    MultiFile,
}

/// A closed SEARCH ... REPLACE span, before splitting on the separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock<'a> {
    /// 1-based position among all blocks in the response
    pub index: usize,
    /// Byte range of the whole block, markers included
    pub range: Range<usize>,
    /// Text between the SEARCH and REPLACE marker lines
    pub body: &'a str,
}

impl<'a> RawBlock<'a> {
    /// Number of lines that are exactly the separator
    pub fn separator_count(&self) -> usize {
        self.body.split('\n').filter(|line| *line == SEPARATOR).count()
    }

    /// Split on the first separator line into (search, replace)
    pub fn split(&self) -> Option<(&'a str, &'a str)> {
        let body = self.body;
        let mut offset = 0;
        for line in body.split('\n') {
            if line == SEPARATOR {
                let before = &body[..offset];
                let search = before.strip_suffix('\n').unwrap_or(before);
                let replace = body.get(offset + line.len() + 1..).unwrap_or("");
                return Some((search, replace));
            }
            offset += line.len() + 1;
        }
        None
    }
}

/// Detect whether the response uses `FILE:` sections
///
/// Headers inside NEW_FILE content or inside a SEARCH/REPLACE block are
/// content, not sections.
pub fn parse_mode(text: &str) -> ParseMode {
    if file_headers(text).is_empty() {
        ParseMode::SingleFile
    } else {
        ParseMode::MultiFile
    }
}

/// Parse all directives, in the order they appear in the text
pub fn parse_directives(text: &str) -> Vec<Directive> {
    let mut found: Vec<(usize, Directive)> = Vec::new();

    for (start, create) in parse_new_file_blocks(text) {
        found.push((start, Directive::Create(create)));
    }

    let headers = match parse_mode(text) {
        ParseMode::SingleFile => Vec::new(),
        ParseMode::MultiFile => file_headers(text),
    };
    for block in raw_blocks(text) {
        let Some((search, replace)) = block.split() else {
            continue;
        };
        if search.is_empty() {
            continue;
        }
        let file_path = headers
            .iter()
            .take_while(|(pos, _)| *pos < block.range.start)
            .last()
            .map(|(_, path)| path.clone());
        found.push((
            block.range.start,
            Directive::Replace(ReplaceDirective {
                search: search.to_string(),
                replace: replace.to_string(),
                file_path,
            }),
        ));
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, directive)| directive).collect()
}

/// Every closed SEARCH/REPLACE span outside NEW_FILE content
pub fn raw_blocks(text: &str) -> Vec<RawBlock<'_>> {
    let fenced = new_file_ranges(text);
    BLOCK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if inside(&fenced, whole.start()) {
                return None;
            }
            let body = caps.get(1)?.as_str();
            Some((whole.range(), body))
        })
        .enumerate()
        .map(|(i, (range, body))| RawBlock {
            index: i + 1,
            range,
            body,
        })
        .collect()
}

/// `NEW_FILE:` blocks with their starting offsets
fn parse_new_file_blocks(text: &str) -> Vec<(usize, CreateDirective)> {
    new_file_spans(text)
        .into_iter()
        .filter_map(|span| {
            let path = clean_path(span.path);
            if path.is_empty() {
                return None;
            }
            Some((
                span.range.start,
                CreateDirective {
                    file_path: PathBuf::from(path),
                    content: span.content.to_string(),
                    language_hint: span.language.map(String::from),
                },
            ))
        })
        .collect()
}

/// A `NEW_FILE:` header and the fenced block under it
#[derive(Debug, Clone, PartialEq, Eq)]
struct NewFileSpan<'a> {
    /// Header line through the closing fence line
    range: Range<usize>,
    path: &'a str,
    language: Option<&'a str>,
    content: &'a str,
}

/// Every well-formed NEW_FILE block, outermost only
fn new_file_spans(text: &str) -> Vec<NewFileSpan<'_>> {
    let mut spans: Vec<NewFileSpan<'_>> = Vec::new();
    for caps in NEW_FILE_HEADER_RE.captures_iter(text) {
        let (Some(header), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if spans.last().is_some_and(|s| header.start() < s.range.end) {
            continue;
        }
        if let Some(span) = fenced_body(text, header.start(), header.end(), path.as_str()) {
            spans.push(span);
        }
    }
    spans
}

/// Read the fence that follows a header
///
/// A fence line with an info string (```` ```rust ````) opens a nested fence;
/// a bare fence line closes the innermost open one. The block ends at the
/// bare fence that closes the outer fence, which must be at least as long as
/// the opening one. An unclosed block yields nothing.
fn fenced_body<'a>(
    text: &'a str,
    start: usize,
    header_end: usize,
    path: &'a str,
) -> Option<NewFileSpan<'a>> {
    // The first line is the rest of the header line itself
    let mut lines = lines_from(text, header_end).skip(1);
    let (open_len, open_info, content_start) = loop {
        let (_, line_end, line) = lines.next()?;
        if line.trim().is_empty() {
            continue;
        }
        let (len, info) = fence(line)?;
        break (len, info, line_end);
    };

    let mut depth = 0usize;
    for (line_start, line_end, line) in lines {
        let Some((len, info)) = fence(line) else {
            continue;
        };
        if !info.is_empty() {
            depth += 1;
        } else if depth > 0 {
            depth -= 1;
        } else if len >= open_len {
            return Some(NewFileSpan {
                range: start..line_end,
                path,
                language: language_tag(open_info),
                content: &text[content_start..line_start],
            });
        }
    }
    None
}

/// Lines from `from` as (start, end including the newline, text)
fn lines_from<'a>(text: &'a str, from: usize) -> impl Iterator<Item = (usize, usize, &'a str)> + 'a {
    let mut pos = from;
    std::iter::from_fn(move || {
        if pos >= text.len() {
            return None;
        }
        let rest = &text[pos..];
        let (line, next) = match rest.find('\n') {
            Some(i) => (&rest[..i], pos + i + 1),
            None => (rest, text.len()),
        };
        let start = pos;
        pos = next;
        Some((start, next, line))
    })
}

/// Backtick run length and info string of a fence line
fn fence(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start_matches([' ', '\t']).trim_end_matches('\r');
    let len = trimmed.bytes().take_while(|b| *b == b'`').count();
    if len < FENCE_MIN {
        return None;
    }
    let info = trimmed[len..].trim();
    // Backticks after the run make it inline code, not a fence
    (!info.contains('`')).then_some((len, info))
}

/// Leading language word of an info string (`python`, `c++`, `objective-c`)
fn language_tag(info: &str) -> Option<&str> {
    let end = info
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '+' | '#' | '.' | '-')))
        .unwrap_or(info.len());
    let tag = &info[..end];
    (!tag.is_empty()).then_some(tag)
}

/// `FILE:` section headers as (offset, path)
///
/// Lines inside NEW_FILE content or inside a SEARCH/REPLACE block are not
/// headers.
fn file_headers(text: &str) -> Vec<(usize, PathBuf)> {
    let mut excluded = new_file_ranges(text);
    excluded.extend(raw_blocks(text).into_iter().map(|block| block.range));
    FILE_HEADER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            if inside(&excluded, start) {
                return None;
            }
            let path = clean_path(caps.get(1)?.as_str());
            (!path.is_empty()).then(|| (start, PathBuf::from(path)))
        })
        .collect()
}

fn new_file_ranges(text: &str) -> Vec<Range<usize>> {
    new_file_spans(text)
        .into_iter()
        .map(|span| span.range)
        .collect()
}

fn inside(ranges: &[Range<usize>], pos: usize) -> bool {
    ranges.iter().any(|r| r.contains(&pos))
}

/// Strip markdown decoration models like to put around paths
fn clean_path(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c| matches!(c, '`' | '*' | '"' | '\''))
        .trim()
}
