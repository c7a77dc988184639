//! Writes a validated round to disk
//!
//! Each edited file is read once, every replacement is applied in directive
//! order (first occurrence only), and the result is written once. If anything
//! fails after the first write, the files already touched are restored.

use super::dry_run::{FileCreate, FileEdit, ValidatedRound};
use super::error::PatchError;
use super::rollback::Snapshots;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Files touched by a successfully applied round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Path -> number of directives applied
    pub files_modified: BTreeMap<PathBuf, usize>,
    /// Path -> 1 for every file created
    pub files_created: BTreeMap<PathBuf, usize>,
}

/// Apply a round that passed the dry run
pub fn apply_round(round: &ValidatedRound) -> Result<ApplyReport, PatchError> {
    let mut snapshots = Snapshots::new();

    match apply_all(round, &mut snapshots) {
        Ok(report) => Ok(report),
        Err(e) => {
            if !snapshots.is_empty() {
                let result = snapshots.restore();
                if result.is_complete() {
                    info!(restored = result.restored.len(), "rolled back partial round");
                } else {
                    error!(
                        restored = result.restored.len(),
                        failed = result.failed.len(),
                        "rollback incomplete"
                    );
                }
            }
            Err(e)
        }
    }
}

fn apply_all(round: &ValidatedRound, snapshots: &mut Snapshots) -> Result<ApplyReport, PatchError> {
    let mut report = ApplyReport::default();

    for edit in &round.edits {
        let count = apply_edit(edit, snapshots)?;
        report.files_modified.insert(edit.path.clone(), count);
    }

    for create in &round.creates {
        apply_create(create, snapshots)?;
        report.files_created.insert(create.path.clone(), 1);
    }

    Ok(report)
}

fn apply_edit(edit: &FileEdit, snapshots: &mut Snapshots) -> Result<usize, PatchError> {
    let stale = || PatchError::ContentChanged {
        path: edit.path.clone(),
    };

    let current = fs::read_to_string(&edit.full_path).map_err(|_| stale())?;
    if current != edit.original {
        return Err(stale());
    }

    let mut content = current.clone();
    for (search, replace) in &edit.replacements {
        if !content.contains(search.as_str()) {
            return Err(stale());
        }
        content = content.replacen(search.as_str(), replace, 1);
    }

    snapshots.record_modified(&edit.full_path, current);
    fs::write(&edit.full_path, &content).map_err(|e| PatchError::WriteFailed {
        path: edit.path.clone(),
        source: e,
    })?;

    let delta = content.chars().count() as i64 - edit.original.chars().count() as i64;
    info!(
        path = %edit.path.display(),
        replacements = edit.replacements.len(),
        "modified file ({:+} characters)",
        delta
    );
    Ok(edit.replacements.len())
}

fn apply_create(create: &FileCreate, snapshots: &mut Snapshots) -> Result<(), PatchError> {
    let write_failed = |e| PatchError::WriteFailed {
        path: create.path.clone(),
        source: e,
    };

    if create.full_path.symlink_metadata().is_ok() {
        return Err(PatchError::ContentChanged {
            path: create.path.clone(),
        });
    }

    if let Some(parent) = create.full_path.parent() {
        let missing = missing_ancestors(parent);
        fs::create_dir_all(parent).map_err(write_failed)?;
        // Outermost first, so restore removes the innermost first
        for dir in missing.iter().rev() {
            snapshots.record_created_dir(dir);
        }
    }

    snapshots.record_created(&create.full_path);
    fs::write(&create.full_path, &create.content).map_err(write_failed)?;

    info!(
        path = %create.path.display(),
        "created file ({} characters)",
        create.content.chars().count()
    );
    Ok(())
}

/// Directories from `dir` upward that do not exist yet, innermost first
fn missing_ancestors(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn edit(dir: &Path, name: &str, original: &str, replacements: &[(&str, &str)]) -> FileEdit {
        FileEdit {
            path: PathBuf::from(name),
            full_path: dir.join(name),
            original: original.to_string(),
            replacements: replacements
                .iter()
                .map(|(s, r)| (s.to_string(), r.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_apply_first_occurrence_only() {
        let dir = TempDir::new().unwrap();
        let original = "x = 1\nx = 1\n";
        let path = setup_test_file(dir.path(), "a.py", original);

        let round = ValidatedRound {
            edits: vec![edit(dir.path(), "a.py", original, &[("x = 1", "x = 2")])],
            creates: vec![],
        };
        let report = apply_round(&round).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 2\nx = 1\n");
        assert_eq!(report.files_modified.get(Path::new("a.py")), Some(&1));
    }

    #[test]
    fn test_apply_in_directive_order() {
        let dir = TempDir::new().unwrap();
        let original = "let x = 1;\n";
        let path = setup_test_file(dir.path(), "a.rs", original);

        let round = ValidatedRound {
            edits: vec![edit(
                dir.path(),
                "a.rs",
                original,
                &[("let x = 1;", "let x = 2;"), ("let x = 2;", "let x = 3;")],
            )],
            creates: vec![],
        };
        let report = apply_round(&round).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "let x = 3;\n");
        assert_eq!(report.files_modified.get(Path::new("a.rs")), Some(&2));
    }

    #[test]
    fn test_create_with_parents() {
        let dir = TempDir::new().unwrap();
        let round = ValidatedRound {
            edits: vec![],
            creates: vec![FileCreate {
                path: PathBuf::from("src/util/helper.rs"),
                full_path: dir.path().join("src/util/helper.rs"),
                content: "pub fn help() {}\n".into(),
            }],
        };

        let report = apply_round(&round).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("src/util/helper.rs")).unwrap(),
            "pub fn help() {}\n"
        );
        assert_eq!(
            report.files_created.get(Path::new("src/util/helper.rs")),
            Some(&1)
        );
    }

    #[test]
    fn test_stale_content_is_fatal() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.rs", "changed by someone else");

        let round = ValidatedRound {
            edits: vec![edit(dir.path(), "a.rs", "fn a() {}", &[("fn a() {}", "fn b() {}")])],
            creates: vec![],
        };
        let err = apply_round(&round).unwrap_err();

        assert_eq!(err.class(), "stale");
        assert!(!err.is_retryable());
        assert_eq!(
            fs::read_to_string(dir.path().join("a.rs")).unwrap(),
            "changed by someone else"
        );
    }

    #[test]
    fn test_failure_rolls_back_earlier_writes() {
        let dir = TempDir::new().unwrap();
        let first = setup_test_file(dir.path(), "a.rs", "fn a() {}");
        setup_test_file(dir.path(), "b.rs", "drifted");

        let round = ValidatedRound {
            edits: vec![
                edit(dir.path(), "a.rs", "fn a() {}", &[("fn a() {}", "fn a2() {}")]),
                edit(dir.path(), "b.rs", "fn b() {}", &[("fn b() {}", "fn b2() {}")]),
            ],
            creates: vec![FileCreate {
                path: PathBuf::from("new/c.rs"),
                full_path: dir.path().join("new/c.rs"),
                content: "fn c() {}".into(),
            }],
        };

        assert!(apply_round(&round).is_err());
        assert_eq!(fs::read_to_string(&first).unwrap(), "fn a() {}");
        assert!(!dir.path().join("new").exists());
    }

    #[test]
    fn test_create_rolls_back_dirs() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "taken.rs", "exists");

        let round = ValidatedRound {
            edits: vec![],
            creates: vec![
                FileCreate {
                    path: PathBuf::from("pkg/deep/x.rs"),
                    full_path: dir.path().join("pkg/deep/x.rs"),
                    content: "x".into(),
                },
                FileCreate {
                    path: PathBuf::from("taken.rs"),
                    full_path: dir.path().join("taken.rs"),
                    content: "y".into(),
                },
            ],
        };

        let err = apply_round(&round).unwrap_err();
        assert_eq!(err.class(), "stale");
        assert!(!dir.path().join("pkg").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("taken.rs")).unwrap(),
            "exists"
        );
    }

    #[test]
    fn test_missing_ancestors() {
        let dir = TempDir::new().unwrap();
        let missing = missing_ancestors(&dir.path().join("a/b"));
        assert_eq!(missing, vec![dir.path().join("a/b"), dir.path().join("a")]);
        assert!(missing_ancestors(dir.path()).is_empty());
    }
}
