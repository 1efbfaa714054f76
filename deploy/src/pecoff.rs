//! PE/COFF dependency scanning.
//!
//! Import tables are read with the MinGW `objdump -p` rather than by
//! parsing PE headers in-process, which keeps cross-compiled binaries
//! inspectable from a Linux host without executing them. Imported DLL names
//! are resolved case-insensitively against the host's MinGW runtime
//! directories.

use crate::error::{DeployError, Result};
use crate::exec::{CommandExecutor, Invocation, stderr_text};
use camino::{Utf8Path, Utf8PathBuf};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use walkdir::WalkDir;

/// Sorted, deduplicated host paths of libraries the staged binaries need.
pub type DependencySet = BTreeSet<Utf8PathBuf>;

/// Finds the libraries a set of PE binaries needs at runtime.
pub trait DependencyScanner: Send + Sync {
    /// DLL names imported directly by `binary`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::ScanFailed`] when the import table cannot be
    /// read.
    fn imports(&self, binary: &Utf8Path) -> Result<Vec<String>>;

    /// Resolve a DLL name to a host path.
    fn locate(&self, name: &str) -> Option<Utf8PathBuf>;

    /// Returns true when `name` must never be resolved (system DLLs).
    fn is_excluded(&self, _name: &str) -> bool {
        false
    }

    /// Transitive imports of every PE binary under `root` that no file
    /// already under `root` satisfies.
    ///
    /// # Errors
    ///
    /// Returns an error when `root` cannot be walked.
    fn scan_dependencies(&self, root: &Utf8Path) -> Result<DependencySet> {
        let staged = staged_names(root)?;
        resolve_closure(self, pe_files(root)?, &staged)
    }

    /// `library` plus its transitive imports not satisfied under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error when `root` cannot be walked.
    fn all_dependencies(&self, library: &Utf8Path, root: &Utf8Path) -> Result<DependencySet> {
        let staged = staged_names(root)?;
        let mut deps = resolve_closure(self, vec![library.to_owned()], &staged)?;
        deps.insert(library.to_owned());
        Ok(deps)
    }
}

/// Breadth-first walk over import tables starting at `binaries`.
///
/// Binaries whose import table cannot be read are skipped with a warning.
fn resolve_closure<S>(
    scanner: &S,
    binaries: Vec<Utf8PathBuf>,
    staged: &BTreeSet<String>,
) -> Result<DependencySet>
where
    S: DependencyScanner + ?Sized,
{
    let mut resolved = DependencySet::new();
    let mut queue: VecDeque<Utf8PathBuf> = binaries.into();

    while let Some(binary) = queue.pop_front() {
        let names = match scanner.imports(&binary) {
            Ok(names) => names,
            Err(err) => {
                log::warn!("{err}");
                continue;
            }
        };

        for name in names {
            if staged.contains(&name.to_ascii_lowercase()) || scanner.is_excluded(&name) {
                continue;
            }

            match scanner.locate(&name) {
                Some(path) => {
                    if resolved.insert(path.clone()) {
                        queue.push_back(path);
                    }
                }
                None => log::debug!("{binary}: could not locate {name}"),
            }
        }
    }

    Ok(resolved)
}

/// Lower-cased basenames of every file under `root`.
fn staged_names(root: &Utf8Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for item in WalkDir::new(root) {
        let entry = item.map_err(|e| DeployError::ScanFailed {
            path: root.to_owned(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            names.insert(entry.file_name().to_string_lossy().to_ascii_lowercase());
        }
    }
    Ok(names)
}

/// Every `.exe` and `.dll` under `root`, in file-name order.
///
/// # Errors
///
/// Returns [`DeployError::ScanFailed`] when `root` cannot be walked and
/// [`DeployError::NonUtf8Path`] for non-UTF-8 file names.
pub fn pe_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    for item in WalkDir::new(root).sort_by_file_name() {
        let entry = item.map_err(|e| DeployError::ScanFailed {
            path: root.to_owned(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::try_from(entry.into_path())?;
        if is_pe_file(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Returns true for `.exe` and `.dll` file names, ignoring case.
#[must_use]
pub fn is_pe_file(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe") || ext.eq_ignore_ascii_case("dll"))
}

/// Extract `DLL Name:` entries from `objdump -p` output.
///
/// # Examples
///
/// ```
/// use webcamoid_deploy::pecoff::parse_objdump_imports;
///
/// let report = "The Import Tables:\n\tDLL Name: Qt5Core.dll\n\tvma:  Hint/Ord Member-Name\n\tDLL Name: KERNEL32.dll\n";
/// assert_eq!(parse_objdump_imports(report), ["Qt5Core.dll", "KERNEL32.dll"]);
/// ```
#[must_use]
pub fn parse_objdump_imports(report: &str) -> Vec<String> {
    report
        .lines()
        .filter_map(|line| line.trim().strip_prefix("DLL Name:"))
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

/// DLL name patterns the scanner must not resolve.
#[derive(Debug, Clone, Default)]
pub struct ExcludeList {
    patterns: Vec<Regex>,
}

impl ExcludeList {
    /// Read an exclude list; a missing file yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] when the file exists but cannot be read,
    /// or [`DeployError::InvalidExcludePattern`] for a malformed pattern.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no exclude list at {path}");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse one pattern per line; blank lines and `#` comments are
    /// ignored. Patterns match whole names, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidExcludePattern`] for a malformed
    /// pattern.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcamoid_deploy::pecoff::ExcludeList;
    ///
    /// let list = ExcludeList::parse("# system\nkernel32\\.dll\nmsvcr.*\\.dll\n")?;
    /// assert!(list.is_excluded("KERNEL32.dll"));
    /// assert!(list.is_excluded("msvcrt.dll"));
    /// assert!(!list.is_excluded("Qt5Core.dll"));
    /// # Ok::<(), webcamoid_deploy::error::DeployError>(())
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let patterns = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|pattern| {
                RegexBuilder::new(&format!("^(?:{pattern})$"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| DeployError::InvalidExcludePattern {
                        pattern: pattern.to_owned(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Returns true when any pattern matches `name`.
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(name))
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true when the list has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// [`DependencyScanner`] backed by the MinGW `objdump`.
pub struct ObjdumpScanner {
    executor: Arc<dyn CommandExecutor>,
    objdump: Utf8PathBuf,
    search_dirs: Vec<Utf8PathBuf>,
    excludes: ExcludeList,
}

impl ObjdumpScanner {
    /// Build a scanner that resolves DLLs in `search_dirs`, in order.
    #[must_use]
    pub const fn new(
        executor: Arc<dyn CommandExecutor>,
        objdump: Utf8PathBuf,
        search_dirs: Vec<Utf8PathBuf>,
        excludes: ExcludeList,
    ) -> Self {
        Self {
            executor,
            objdump,
            search_dirs,
            excludes,
        }
    }
}

impl DependencyScanner for ObjdumpScanner {
    fn imports(&self, binary: &Utf8Path) -> Result<Vec<String>> {
        let invocation = Invocation::new(self.objdump.as_str())
            .arg("-p")
            .arg(binary.as_str());
        let output = self.executor.run(&invocation).map_err(|e| DeployError::ScanFailed {
            path: binary.to_owned(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(DeployError::ScanFailed {
                path: binary.to_owned(),
                reason: stderr_text(&output),
            });
        }

        Ok(parse_objdump_imports(&String::from_utf8_lossy(&output.stdout)))
    }

    fn locate(&self, name: &str) -> Option<Utf8PathBuf> {
        self.search_dirs
            .iter()
            .find_map(|dir| find_ignoring_case(dir, name))
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excludes.is_excluded(name)
    }
}

/// Find a file called `name` in `dir`, comparing names without regard to
/// ASCII case.
fn find_ignoring_case(dir: &Utf8Path, name: &str) -> Option<Utf8PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }

    dir.read_dir_utf8()
        .ok()?
        .filter_map(std::result::Result::ok)
        .find(|entry| entry.file_name().eq_ignore_ascii_case(name) && entry.path().is_file())
        .map(|entry| entry.path().to_owned())
}
