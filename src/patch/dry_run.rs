//! Dry-run validation of a resolved batch against the filesystem
//!
//! Nothing is written here. Every directive is checked before the verdict
//! so the correction prompt can list all problems at once; if any check
//! fails the whole round is rejected.

use super::block_parser::Directive;
use super::error::{PatchError, RoundError, first_line_snippet};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// All replacements for one existing file, in directive order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    /// Path as written in the directive
    pub path: PathBuf,
    /// Absolute path inside the project root
    pub full_path: PathBuf,
    /// Content the replacements were validated against
    pub original: String,
    /// (search, replace) pairs
    pub replacements: Vec<(String, String)>,
}

/// A file to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCreate {
    pub path: PathBuf,
    pub full_path: PathBuf,
    pub content: String,
}

/// A round that passed validation and may be applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedRound {
    pub edits: Vec<FileEdit>,
    pub creates: Vec<FileCreate>,
}

/// Validates directives relative to a project root
#[derive(Debug, Clone)]
pub struct DryRun {
    root: PathBuf,
    snippet_width: usize,
}

impl DryRun {
    pub fn new(root: &Path, snippet_width: usize) -> Self {
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root,
            snippet_width,
        }
    }

    pub fn snippet_width(&self) -> usize {
        self.snippet_width
    }

    /// Check every directive; succeed only if all of them are applicable
    pub fn validate(&self, directives: &[Directive]) -> Result<ValidatedRound, RoundError> {
        let mut round = ValidatedRound::default();
        let mut errors = Vec::new();
        // Working copy per edited file, advanced as each replacement is simulated
        let mut working: Vec<String> = Vec::new();
        let mut unreadable: HashSet<PathBuf> = HashSet::new();
        let mut creating: HashSet<PathBuf> = HashSet::new();

        for directive in directives {
            match directive {
                Directive::Replace(replace) => {
                    let Some(path) = replace.file_path.as_ref() else {
                        errors.push(PatchError::NoCandidateMatch {
                            snippet: first_line_snippet(&replace.search, self.snippet_width),
                            searched: Vec::new(),
                        });
                        continue;
                    };

                    let full_path = match self.confine(path) {
                        Ok(p) => p,
                        Err(e) => {
                            errors.push(e);
                            continue;
                        }
                    };
                    if unreadable.contains(&full_path) {
                        continue;
                    }

                    let slot = match round.edits.iter().position(|e| e.full_path == full_path) {
                        Some(slot) => slot,
                        None => match read_target(path, &full_path) {
                            Ok(content) => {
                                round.edits.push(FileEdit {
                                    path: path.clone(),
                                    full_path: full_path.clone(),
                                    original: content.clone(),
                                    replacements: Vec::new(),
                                });
                                working.push(content);
                                round.edits.len() - 1
                            }
                            Err(e) => {
                                unreadable.insert(full_path);
                                errors.push(e);
                                continue;
                            }
                        },
                    };

                    if !working[slot].contains(&replace.search) {
                        errors.push(PatchError::SearchNotFound {
                            path: path.clone(),
                            snippet: first_line_snippet(&replace.search, self.snippet_width),
                        });
                        continue;
                    }

                    working[slot] = working[slot].replacen(&replace.search, &replace.replace, 1);
                    round.edits[slot]
                        .replacements
                        .push((replace.search.clone(), replace.replace.clone()));
                }
                Directive::Create(create) => {
                    let full_path = match self.confine(&create.file_path) {
                        Ok(p) => p,
                        Err(e) => {
                            errors.push(e);
                            continue;
                        }
                    };

                    if full_path.symlink_metadata().is_ok() || !creating.insert(full_path.clone())
                    {
                        errors.push(PatchError::AlreadyExists {
                            path: create.file_path.clone(),
                        });
                        continue;
                    }

                    round.creates.push(FileCreate {
                        path: create.file_path.clone(),
                        full_path,
                        content: create.content.clone(),
                    });
                }
            }
        }

        // Files whose every directive failed carry nothing to apply
        round.edits.retain(|e| !e.replacements.is_empty());

        if let Some(err) = RoundError::new(errors) {
            return Err(err);
        }

        debug!(
            edits = round.edits.len(),
            creates = round.creates.len(),
            "dry run passed"
        );
        Ok(round)
    }

    /// Resolve `path` under the root, rejecting anything that escapes it
    pub fn confine(&self, path: &Path) -> Result<PathBuf, PatchError> {
        let escape = || PatchError::PathEscapesRoot {
            path: path.to_path_buf(),
        };

        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let normalized = normalize(&joined);

        if !normalized.starts_with(&self.root) || normalized == self.root {
            return Err(escape());
        }

        // Symlinked ancestors may still point outside the root
        let existing = normalized
            .ancestors()
            .find(|p| p.symlink_metadata().is_ok())
            .unwrap_or(&self.root);
        match fs::canonicalize(existing) {
            Ok(real) if real.starts_with(&self.root) => Ok(normalized),
            Ok(_) => Err(escape()),
            // Dangling symlink: the target cannot be confirmed
            Err(_) => Err(escape()),
        }
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn read_target(path: &Path, full_path: &Path) -> Result<String, PatchError> {
    if !full_path.exists() {
        return Err(PatchError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if !full_path.is_file() {
        return Err(PatchError::Unreadable {
            path: path.to_path_buf(),
            reason: "path is not a file".into(),
        });
    }
    fs::read_to_string(full_path).map_err(|e| PatchError::Unreadable {
        path: path.to_path_buf(),
        reason: if e.kind() == io::ErrorKind::InvalidData {
            "file is not valid UTF-8".into()
        } else {
            e.to_string()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::block_parser::{CreateDirective, ReplaceDirective};
    use crate::patch::error::ErrorKind;
    use tempfile::TempDir;

    fn setup_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn replace(path: &str, search: &str, replace: &str) -> Directive {
        Directive::Replace(ReplaceDirective {
            search: search.into(),
            replace: replace.into(),
            file_path: Some(PathBuf::from(path)),
        })
    }

    fn create(path: &str, content: &str) -> Directive {
        Directive::Create(CreateDirective {
            file_path: PathBuf::from(path),
            content: content.into(),
            language_hint: None,
        })
    }

    #[test]
    fn test_valid_replace() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "src/lib.rs", "fn old() {}\n");

        let dry_run = DryRun::new(dir.path(), 60);
        let round = dry_run
            .validate(&[replace("src/lib.rs", "fn old() {}", "fn new() {}")])
            .unwrap();

        assert_eq!(round.edits.len(), 1);
        assert_eq!(round.edits[0].path, PathBuf::from("src/lib.rs"));
        assert_eq!(round.edits[0].original, "fn old() {}\n");
        let root = fs::canonicalize(dir.path()).unwrap();
        assert!(round.edits[0].full_path.starts_with(&root));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = DryRun::new(dir.path(), 60)
            .validate(&[replace("gone.rs", "x", "y")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.errors()[0].class(), "not-found");
    }

    #[test]
    fn test_directory_target_is_unreadable() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        let err = DryRun::new(dir.path(), 60)
            .validate(&[replace("src", "x", "y")])
            .unwrap_err();
        assert!(matches!(err.errors()[0], PatchError::Unreadable { .. }));
    }

    #[test]
    fn test_search_not_found_has_snippet() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.rs", "fn real() {}\n");

        let err = DryRun::new(dir.path(), 60)
            .validate(&[replace("a.rs", "fn imagined() {\n    body\n}", "x")])
            .unwrap_err();

        match &err.errors()[0] {
            PatchError::SearchNotFound { path, snippet } => {
                assert_eq!(path, &PathBuf::from("a.rs"));
                assert_eq!(snippet, "fn imagined() {");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.errors()[0].class(), "search-not-found");
    }

    #[test]
    fn test_whitespace_must_match_exactly() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.py", "def f():\n    return 1\n");

        let result = DryRun::new(dir.path(), 60).validate(&[replace(
            "a.py",
            "def f():\n  return 1",
            "def f():\n  return 2",
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sequential_replacements_in_one_file() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.rs", "let x = 1;\n");

        // The second block targets text produced by the first
        let round = DryRun::new(dir.path(), 60)
            .validate(&[
                replace("a.rs", "let x = 1;", "let x = 2;"),
                replace("a.rs", "let x = 2;", "let x = 3;"),
            ])
            .unwrap();

        assert_eq!(round.edits.len(), 1);
        assert_eq!(round.edits[0].replacements.len(), 2);
    }

    #[test]
    fn test_any_failure_rejects_round() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.rs", "fn a() {}\n");
        setup_test_file(dir.path(), "b.rs", "fn b() {}\n");

        let err = DryRun::new(dir.path(), 60)
            .validate(&[
                replace("a.rs", "fn a() {}", "fn a2() {}"),
                replace("b.rs", "fn nope() {}", "fn b2() {}"),
            ])
            .unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.paths(), vec![PathBuf::from("b.rs")]);
    }

    #[test]
    fn test_create_rejects_existing() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "exists.rs", "");

        let err = DryRun::new(dir.path(), 60)
            .validate(&[create("exists.rs", "fn x() {}")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApplyError);
        assert_eq!(err.errors()[0].class(), "already-exists");
    }

    #[test]
    fn test_create_rejects_duplicate_in_round() {
        let dir = TempDir::new().unwrap();
        let err = DryRun::new(dir.path(), 60)
            .validate(&[create("new.rs", "a"), create("./new.rs", "b")])
            .unwrap_err();
        assert!(matches!(err.errors()[0], PatchError::AlreadyExists { .. }));
    }

    #[test]
    fn test_create_rejects_escape() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("project")).unwrap();
        let root = dir.path().join("project");

        let dry_run = DryRun::new(&root, 60);
        for path in ["../outside.rs", "src/../../outside.rs", "/etc/passwd"] {
            let err = dry_run.validate(&[create(path, "x")]).unwrap_err();
            assert_eq!(err.errors()[0].class(), "security", "path {}", path);
        }
    }

    #[test]
    fn test_replace_rejects_escape() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        fs::create_dir(&root).unwrap();
        setup_test_file(dir.path(), "secret.txt", "token");

        let err = DryRun::new(&root, 60)
            .validate(&[replace("../secret.txt", "token", "stolen")])
            .unwrap_err();
        assert!(matches!(err.errors()[0], PatchError::PathEscapesRoot { .. }));
    }

    #[test]
    fn test_create_in_new_directory() {
        let dir = TempDir::new().unwrap();
        let round = DryRun::new(dir.path(), 60)
            .validate(&[create("src/utils/helper.rs", "pub fn help() {}\n")])
            .unwrap();
        assert_eq!(round.creates.len(), 1);
        assert!(round.creates[0].full_path.ends_with("src/utils/helper.rs"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        let outside = dir.path().join("outside");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let err = DryRun::new(&root, 60)
            .validate(&[create("link/evil.rs", "x")])
            .unwrap_err();
        assert_eq!(err.errors()[0].class(), "security");
    }

    #[test]
    fn test_absolute_path_inside_root_is_allowed() {
        let dir = TempDir::new().unwrap();
        let dry_run = DryRun::new(dir.path(), 60);
        let inside = fs::canonicalize(dir.path()).unwrap().join("a.rs");
        assert_eq!(dry_run.confine(&inside).unwrap(), inside);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
    }
}
