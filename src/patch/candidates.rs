//! Snapshot of the files shown to the generator

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors while loading candidate files
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("path is not a file: {path}")]
    NotAFile { path: PathBuf },

    #[error("file is not valid UTF-8: {path}")]
    NotUtf8 { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Supplies extra files worth offering as candidates (e.g. imports)
pub trait RelatedFiles {
    /// Paths related to `file`, relative to `root`
    fn related(&self, root: &Path, file: &Path, content: &str) -> Vec<PathBuf>;
}

/// Path -> content mapping, read once per invocation
///
/// Paths are kept as given (relative to the project root). The snapshot is
/// only used to pick a target file; validation always re-reads from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFiles {
    files: BTreeMap<PathBuf, String>,
}

impl CandidateFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Read the given files relative to `root`
    pub fn load(root: &Path, paths: &[PathBuf]) -> Result<Self, CandidateError> {
        let mut files = Self::new();
        for path in paths {
            let key = relative_key(root, path);
            let content = read_candidate(&root.join(&key))?;
            files.insert(key, content);
        }
        Ok(files)
    }

    /// Read the given files plus whatever `provider` says they depend on
    ///
    /// Requested files must load; related files that cannot be read are
    /// skipped.
    pub fn load_with_related(
        root: &Path,
        paths: &[PathBuf],
        provider: &dyn RelatedFiles,
    ) -> Result<Self, CandidateError> {
        let mut files = Self::load(root, paths)?;

        let related: Vec<PathBuf> = files
            .iter()
            .flat_map(|(path, content)| provider.related(root, path, content))
            .collect();

        for path in related {
            let key = relative_key(root, &path);
            if files.files.contains_key(&key) {
                continue;
            }
            match read_candidate(&root.join(&key)) {
                Ok(content) => {
                    debug!(path = %key.display(), "added related candidate");
                    files.insert(key, content);
                }
                Err(e) => warn!("skipping related file: {}", e),
            }
        }

        Ok(files)
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &String)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files whose content contains `needle` exactly
    pub fn containing(&self, needle: &str) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|(_, content)| content.contains(needle))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl<P: Into<PathBuf>, C: Into<String>> FromIterator<(P, C)> for CandidateFiles {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut files = Self::new();
        for (path, content) in iter {
            files.insert(path, content);
        }
        files
    }
}

/// Key a path relative to the root when it lives under it
fn relative_key(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

fn read_candidate(path: &Path) -> Result<String, CandidateError> {
    if !path.exists() {
        return Err(CandidateError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(CandidateError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(CandidateError::NotUtf8 {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(CandidateError::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
