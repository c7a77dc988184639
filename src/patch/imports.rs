//! Related-file discovery from Python imports

use super::candidates::RelatedFiles;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:from[ \t]+([\w.]+)[ \t]+import\b|import[ \t]+([^#;\n]+))")
        .expect("import regex is valid")
});

/// Offers the project modules a `.py` file imports
///
/// `a.b.c` resolves to `a/b/c.py`, then `a/b/c/__init__.py`. Imports that
/// resolve to nothing under the root (stdlib, third-party) are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonImports;

impl PythonImports {
    /// Module paths imported by `content`, in source order without repeats
    ///
    /// `import a, b as c` names both `a` and `b`.
    pub fn imports(content: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for caps in IMPORT_RE.captures_iter(content) {
            let modules: Vec<&str> = match (caps.get(1), caps.get(2)) {
                (Some(from), _) => vec![from.as_str()],
                (None, Some(list)) => list
                    .as_str()
                    .split(',')
                    .filter_map(|item| item.split_whitespace().next())
                    .filter(|m| m.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.'))
                    .collect(),
                (None, None) => continue,
            };
            for module in modules {
                if !seen.iter().any(|m| m == module) {
                    seen.push(module.to_string());
                }
            }
        }
        seen
    }

    fn resolve(root: &Path, module: &str) -> Option<PathBuf> {
        // Relative imports (`from . import x`) carry no module path
        if module.starts_with('.') {
            return None;
        }
        let base: PathBuf = module.split('.').collect();
        let module_file = base.with_extension("py");
        if root.join(&module_file).is_file() {
            return Some(module_file);
        }
        let package = base.join("__init__.py");
        root.join(&package).is_file().then_some(package)
    }
}

impl RelatedFiles for PythonImports {
    fn related(&self, root: &Path, file: &Path, content: &str) -> Vec<PathBuf> {
        if file.extension().is_none_or(|ext| ext != "py") {
            return Vec::new();
        }
        Self::imports(content)
            .iter()
            .filter_map(|module| Self::resolve(root, module))
            .filter(|path| path != file)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::CandidateFiles;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_extract_imports() {
        let content = "import os\nfrom app.models import User\n  import app.util\nfrom app.models import Group\n";
        assert_eq!(
            PythonImports::imports(content),
            vec!["os", "app.models", "app.util"]
        );
    }

    #[test]
    fn test_import_lists_and_aliases() {
        let content = "import json, app.db as db
                       from app.models import User
                       import app.cache  # warm
                       import json
                       importlib = None
";
        assert_eq!(
            PythonImports::imports(content),
            vec!["json", "app.db", "app.models", "app.cache"]
        );
    }

    #[test]
    fn test_related_follows_source_order() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "app/db.py", "");
        setup_test_file(dir.path(), "app/models.py", "");

        let content = "import app.db, os
from app.models import User
";
        let related = PythonImports.related(dir.path(), Path::new("main.py"), content);
        assert_eq!(
            related,
            vec![PathBuf::from("app/db.py"), PathBuf::from("app/models.py")]
        );
    }

    #[test]
    fn test_resolve_module_and_package() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "app/models.py", "class User: pass\n");
        setup_test_file(dir.path(), "app/services/__init__.py", "");

        let content = "import os\nfrom app.models import User\nfrom app.services import run\n";
        let related = PythonImports.related(dir.path(), Path::new("main.py"), content);

        assert_eq!(
            related,
            vec![
                PathBuf::from("app/models.py"),
                PathBuf::from("app/services/__init__.py")
            ]
        );
    }

    #[test]
    fn test_non_python_files_ignored() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "os.py", "");
        let related = PythonImports.related(dir.path(), Path::new("main.rs"), "import os\n");
        assert!(related.is_empty());
    }

    #[test]
    fn test_loads_as_candidates() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "main.py", "from calc import add\nprint(add(1, 2))\n");
        setup_test_file(dir.path(), "calc.py", "def add(a, b):\n    return a + b\n");

        let files =
            CandidateFiles::load_with_related(dir.path(), &[PathBuf::from("main.py")], &PythonImports)
                .unwrap();
        assert_eq!(
            files.paths(),
            vec![PathBuf::from("calc.py"), PathBuf::from("main.py")]
        );
    }
}
