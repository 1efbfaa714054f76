//! Filesystem operations on the staging tree.
//!
//! Copies into the tree surface [`DeployError::StagingFailed`] naming both
//! ends of the copy. Cleanup helpers remove build byproducts once every
//! runtime file is in place.

use crate::error::{DeployError, Result};
use crate::pecoff::DependencySet;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use walkdir::WalkDir;

/// Remove `dir` and everything under it, then create it empty.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when the directory cannot be
/// removed or created.
pub fn recreate_dir(dir: &Utf8Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(DeployError::StagingFailed {
                reason: format!("failed to remove {dir}: {e}"),
            });
        }
    }
    ensure_dir(dir)
}

/// Create `dir` and its parents; an existing directory is not an error.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when the directory cannot be
/// created.
pub fn ensure_dir(dir: &Utf8Path) -> Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(DeployError::StagingFailed {
            reason: format!("failed to create {dir}: {e}"),
        }),
    }
}

/// Copy one file, creating the destination's parent directories.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when the copy fails.
pub fn copy_file(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst).map_err(|e| DeployError::StagingFailed {
        reason: format!("failed to copy {src} to {dst}: {e}"),
    })?;
    Ok(())
}

/// Recursively copy the directory `src` to `dst`, merging into any existing
/// content.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when any entry cannot be read or
/// copied.
pub fn copy_tree(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    for item in WalkDir::new(src).sort_by_file_name() {
        let entry = item.map_err(|e| DeployError::StagingFailed {
            reason: format!("failed to read {src}: {e}"),
        })?;
        let path = Utf8PathBuf::try_from(entry.path().to_path_buf())?;
        let Ok(relative) = path.strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            copy_file(&path, &target)?;
        }
    }
    Ok(())
}

/// Copy every dependency into `bin_dir` under its basename, in sorted
/// order, and return the sources in copy order.
///
/// Basenames compare case-insensitively, as Windows resolves them. When two
/// sources share a basename the later one replaces the earlier and a
/// warning names both.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when a copy fails.
pub fn copy_dependencies(deps: &DependencySet, bin_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut by_name: BTreeMap<String, &Utf8Path> = BTreeMap::new();
    let mut copied = Vec::with_capacity(deps.len());

    for dep in deps {
        let Some(name) = dep.file_name() else {
            continue;
        };
        if let Some(previous) = by_name.insert(name.to_ascii_lowercase(), dep) {
            log::warn!("{dep} overwrites {previous}: both are named {name}");
            if let Some(previous_name) = previous.file_name().filter(|prev| *prev != name) {
                remove_file(&bin_dir.join(previous_name))?;
            }
        }

        let target = bin_dir.join(name);
        log::info!("    {dep} -> {target}");
        copy_file(dep, &target)?;
        copied.push(dep.clone());
    }

    Ok(copied)
}

/// Delete the debug variant `<stem>d.dll` of every `.dll` under `dir`.
///
/// Returns the deleted paths, sorted. A missing debug variant is not an
/// error and each file is deleted at most once.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when a debug library cannot be
/// removed.
pub fn remove_debugs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut debug_files = BTreeSet::new();

    for entry in WalkDir::new(dir).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
            continue;
        };
        if path.extension() != Some("dll") {
            continue;
        }
        let Some(stem) = path.file_stem() else {
            continue;
        };
        let debug = path.with_file_name(format!("{stem}d.dll"));
        if debug.is_file() {
            debug_files.insert(debug);
        }
    }

    for file in &debug_files {
        log::debug!("removing {file}");
        remove_file(file)?;
    }

    Ok(debug_files.into_iter().collect())
}

/// Delete every file under `dir` whose name ends with one of `suffixes`.
///
/// Returns the number of files removed.
///
/// # Errors
///
/// Returns [`DeployError::StagingFailed`] when a file cannot be removed.
pub fn remove_unneeded_files(dir: &Utf8Path, suffixes: &[String]) -> Result<usize> {
    let unneeded: BTreeSet<Utf8PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| Utf8PathBuf::try_from(entry.into_path()).ok())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())))
        })
        .collect();

    for file in &unneeded {
        remove_file(file)?;
    }
    Ok(unneeded.len())
}

fn remove_file(path: &Utf8Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DeployError::StagingFailed {
            reason: format!("failed to remove {path}: {e}"),
        }),
    }
}
