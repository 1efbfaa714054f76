//! QML module discovery and copying.
//!
//! Application QML sources are scanned for `import Module Version`
//! statements. Each module is resolved inside Qt's QML directory, copied
//! into the staging tree, and scanned in turn (its `.qml` files and the
//! `depends` lines of its `qmldir`) until no new modules appear.

use crate::error::{DeployError, Result};
use crate::staging::copy_tree;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeSet, VecDeque};
use walkdir::WalkDir;

/// A versioned QML module reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct QmlImport {
    /// Dotted module URI, e.g. `QtQuick.Controls`.
    pub module: String,
    /// Major version, when the import names one.
    pub major: Option<String>,
}

impl QmlImport {
    fn new(module: &str, version: Option<&str>) -> Self {
        Self {
            module: module.to_owned(),
            major: version
                .and_then(|v| v.split('.').next())
                .filter(|major| !major.is_empty())
                .map(str::to_owned),
        }
    }

    /// Candidate directories for this module under `qt_qml`, most specific
    /// first: `A/B.N`, then `A/B`.
    #[must_use]
    pub fn candidates(&self, qt_qml: &Utf8Path) -> Vec<Utf8PathBuf> {
        let base = qt_qml.join(self.module.replace('.', "/"));
        let mut candidates = Vec::with_capacity(2);
        if let Some(major) = &self.major {
            candidates.push(Utf8PathBuf::from(format!("{base}.{major}")));
        }
        candidates.push(base);
        candidates
    }

    /// First existing candidate directory.
    #[must_use]
    pub fn resolve(&self, qt_qml: &Utf8Path) -> Option<Utf8PathBuf> {
        self.candidates(qt_qml).into_iter().find(|dir| dir.is_dir())
    }
}

/// Extract module imports from QML source. Directory imports (quoted
/// paths) and JavaScript imports are ignored.
///
/// # Examples
///
/// ```
/// use webcamoid_deploy::qml::parse_qml_imports;
///
/// let source = "import QtQuick 2.7\nimport QtQuick.Controls 2.0 as C\nimport \"../share\"\n";
/// let imports = parse_qml_imports(source);
/// assert_eq!(imports.len(), 2);
/// assert_eq!(imports[1].module, "QtQuick.Controls");
/// assert_eq!(imports[1].major.as_deref(), Some("2"));
/// ```
#[must_use]
pub fn parse_qml_imports(source: &str) -> Vec<QmlImport> {
    statements(source, "import")
}

/// Extract `depends Module Version` lines from a `qmldir` file.
#[must_use]
pub fn parse_qmldir_depends(qmldir: &str) -> Vec<QmlImport> {
    statements(qmldir, "depends")
}

fn statements(text: &str, keyword: &str) -> Vec<QmlImport> {
    text.lines()
        .filter_map(|line| {
            let mut words = line.trim().trim_end_matches(';').split_whitespace();
            if words.next() != Some(keyword) {
                return None;
            }
            let module = words.next()?;
            if module.starts_with('"') || module.starts_with('\'') {
                return None;
            }
            Some(QmlImport::new(module, words.next()))
        })
        .collect()
}

/// Copy every QML module reachable from the sources under `source_roots`
/// into `qml_dir`, preserving each module's location relative to `qt_qml`.
///
/// Returns the module directories copied, in copy order.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when a module cannot be copied or
/// a source file cannot be read.
pub fn deploy_qml_modules(
    source_roots: &[Utf8PathBuf],
    qt_qml: &Utf8Path,
    qml_dir: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>> {
    let mut queue: VecDeque<QmlImport> = VecDeque::new();
    for root in source_roots {
        queue.extend(imports_under(root)?);
    }

    let mut seen = BTreeSet::new();
    let mut copied: Vec<Utf8PathBuf> = Vec::new();

    while let Some(import) = queue.pop_front() {
        if !seen.insert(import.clone()) {
            continue;
        }

        let Some(module_dir) = import.resolve(qt_qml) else {
            log::debug!("QML module {} not found in {qt_qml}", import.module);
            continue;
        };
        if copied.iter().any(|dir| module_dir.starts_with(dir)) {
            continue;
        }
        let Ok(relative) = module_dir.strip_prefix(qt_qml) else {
            continue;
        };

        let target = qml_dir.join(relative);
        log::info!("    {module_dir} -> {target}");
        copy_tree(&module_dir, &target)?;
        queue.extend(imports_under(&module_dir)?);
        copied.push(module_dir);
    }

    Ok(copied)
}

/// Imports of every `.qml` file and `depends` of every `qmldir` under `dir`.
fn imports_under(dir: &Utf8Path) -> Result<Vec<QmlImport>> {
    let mut imports = Vec::new();
    if !dir.is_dir() {
        log::debug!("QML source directory {dir} does not exist");
        return Ok(imports);
    }

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        let is_qml = name.ends_with(".qml");
        let is_qmldir = name == "qmldir";
        if !is_qml && !is_qmldir {
            continue;
        }

        let text = std::fs::read_to_string(entry.path()).map_err(|e| DeployError::StagingFailed {
            reason: format!("failed to read {}: {e}", entry.path().display()),
        })?;
        if is_qml {
            imports.extend(parse_qml_imports(&text));
        } else {
            imports.extend(parse_qmldir_depends(&text));
        }
    }

    Ok(imports)
}
