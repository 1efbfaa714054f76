//! Build-info record written into the staged tree.
//!
//! The record documents where a package came from: the source commit, the
//! host distribution, the Wine installation used for probing, and the host
//! packages that supplied every bundled library. Collection never fails;
//! missing facts are written as `Unknown` or omitted.

use crate::exec::{CommandExecutor, Invocation, run_for_stdout};
use crate::provenance::ProvenanceResolver;
use crate::staging::ensure_dir;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;

const UNKNOWN: &str = "Unknown";

/// Provenance facts about a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    /// Source commit, or `Unknown`.
    pub commit_hash: String,
    /// Non-empty lines of the host's `*-release` files.
    pub host_release: Vec<String>,
    /// `wine --version`, or `Unknown`.
    pub wine_version: String,
    /// Windows version reported under Wine, or `Unknown`.
    pub windows_version: String,
    /// `"name version"` of the host packages owning bundled libraries.
    pub packages: BTreeSet<String>,
}

impl BuildInfo {
    /// Gather every fact, degrading failures to placeholders.
    #[must_use]
    pub fn collect(
        executor: &dyn CommandExecutor,
        root_dir: &Utf8Path,
        sysconf_dir: &Utf8Path,
        dependencies: &[Utf8PathBuf],
    ) -> Self {
        let resolver = ProvenanceResolver::new(executor);
        let packages = dependencies
            .iter()
            .map(|dep| resolver.search_package_for(dep))
            .filter(|info| !info.is_empty())
            .collect();

        Self {
            commit_hash: or_unknown(commit_hash(executor, root_dir)),
            host_release: host_release_lines(sysconf_dir),
            wine_version: or_unknown(run_for_stdout(
                executor,
                &Invocation::new("wine").arg("--version"),
            )),
            windows_version: or_unknown(run_for_stdout(
                executor,
                &Invocation::new("wine").args(["cmd", "/c", "ver"]),
            )),
            packages,
        }
    }

    /// Render the record as written to `build-info.txt`.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcamoid_deploy::build_info::BuildInfo;
    ///
    /// let info = BuildInfo {
    ///     commit_hash: "0123abc".to_owned(),
    ///     host_release: vec!["ID=arch".to_owned()],
    ///     wine_version: "wine-9.0".to_owned(),
    ///     windows_version: "Unknown".to_owned(),
    ///     packages: ["mingw-w64-zlib 1.3".to_owned()].into_iter().collect(),
    /// };
    /// assert_eq!(
    ///     info.render(),
    ///     "Commit hash: 0123abc\n\nID=arch\n\nWine Version: wine-9.0\nWindows Version: Unknown\n\nmingw-w64-zlib 1.3\n",
    /// );
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Commit hash: {}", self.commit_hash), String::new()];
        lines.extend(self.host_release.iter().cloned());
        lines.push(String::new());
        lines.push(format!("Wine Version: {}", self.wine_version));
        lines.push(format!("Windows Version: {}", self.windows_version));
        lines.push(String::new());
        lines.extend(self.packages.iter().cloned());

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

fn or_unknown(value: Option<String>) -> String {
    value
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_owned())
}

/// `git rev-parse HEAD` run from the source root.
fn commit_hash(executor: &dyn CommandExecutor, root_dir: &Utf8Path) -> Option<String> {
    let invocation = Invocation::new("git")
        .args(["rev-parse", "HEAD"])
        .in_dir(root_dir);
    run_for_stdout(executor, &invocation)
}

/// Non-empty lines of every `*-release` file in `sysconf_dir`, files in
/// name order. Unreadable files are skipped.
#[must_use]
pub fn host_release_lines(sysconf_dir: &Utf8Path) -> Vec<String> {
    let mut files: Vec<Utf8PathBuf> = match sysconf_dir.read_dir_utf8() {
        Ok(entries) => entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().ends_with("-release"))
            .map(|entry| entry.path().to_owned())
            .collect(),
        Err(err) => {
            log::debug!("cannot list {sysconf_dir}: {err}");
            Vec::new()
        }
    };
    files.sort();

    files
        .iter()
        .filter_map(|file| match std::fs::read_to_string(file) {
            Ok(text) => Some(text),
            Err(err) => {
                log::debug!("cannot read {file}: {err}");
                None
            }
        })
        .flat_map(|text| {
            text.lines()
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Collect the build-info record and write it to `path`.
///
/// `pkgs_dir` is created on the way so the packaging jobs find it in place.
/// Nothing here aborts the run: failures are logged.
pub fn write_build_info(
    executor: &dyn CommandExecutor,
    root_dir: &Utf8Path,
    sysconf_dir: &Utf8Path,
    dependencies: &[Utf8PathBuf],
    pkgs_dir: &Utf8Path,
    path: &Utf8Path,
) -> BuildInfo {
    if let Err(err) = ensure_dir(pkgs_dir) {
        log::debug!("{err}");
    }

    let info = BuildInfo::collect(executor, root_dir, sysconf_dir, dependencies);
    let text = info.render();
    for line in text.lines() {
        log::info!("    {line}");
    }

    let written = path
        .parent()
        .map_or(Ok(()), ensure_dir)
        .and_then(|()| std::fs::write(path, &text).map_err(Into::into));
    if let Err(err) = written {
        log::warn!("failed to write {path}: {err}");
    }

    info
}
