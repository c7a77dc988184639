//! Undo for a round that failed part-way through writing

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One change made while applying a round
#[derive(Debug, Clone, PartialEq, Eq)]
enum Snapshot {
    /// Existing file overwritten; holds its prior content
    Modified { path: PathBuf, original: String },
    /// File created by the round
    Created { path: PathBuf },
    /// Directory created to hold a new file
    CreatedDir { path: PathBuf },
}

/// Result of a rollback operation
#[derive(Debug, Default)]
pub struct RollbackResult {
    /// Paths that were restored or removed
    pub restored: Vec<PathBuf>,
    /// Paths that could not be restored, with error messages
    pub failed: Vec<(PathBuf, String)>,
}

impl RollbackResult {
    /// Check if all paths were restored
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// In-memory record of everything written so far in a round
#[derive(Debug, Default)]
pub struct Snapshots {
    entries: Vec<Snapshot>,
}

impl Snapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_modified(&mut self, path: &Path, original: String) {
        self.entries.push(Snapshot::Modified {
            path: path.to_path_buf(),
            original,
        });
    }

    pub fn record_created(&mut self, path: &Path) {
        self.entries.push(Snapshot::Created {
            path: path.to_path_buf(),
        });
    }

    pub fn record_created_dir(&mut self, path: &Path) {
        self.entries.push(Snapshot::CreatedDir {
            path: path.to_path_buf(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Undo every recorded change, newest first
    ///
    /// Created directories are only removed when empty.
    pub fn restore(self) -> RollbackResult {
        let mut result = RollbackResult::default();

        for entry in self.entries.into_iter().rev() {
            let (path, outcome) = match entry {
                Snapshot::Modified { path, original } => {
                    let outcome = fs::write(&path, original);
                    (path, outcome)
                }
                Snapshot::Created { path } => {
                    let outcome = fs::remove_file(&path);
                    (path, outcome)
                }
                Snapshot::CreatedDir { path } => {
                    let outcome = fs::remove_dir(&path);
                    (path, outcome)
                }
            };

            match outcome {
                Ok(()) => {
                    debug!(path = %path.display(), "rolled back");
                    result.restored.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "rollback failed");
                    result.failed.push((path, e.to_string()));
                }
            }
        }

        result
    }
}
