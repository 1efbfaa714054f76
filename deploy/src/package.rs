//! Package artefacts and the portable zip archive.

use crate::error::{DeployError, Result};
use crate::staging::ensure_dir;
use crate::summary::package_info;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// The two kinds of distributable package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    /// Zip archive that runs without installation.
    Portable,
    /// Qt Installer Framework executable.
    Installer,
}

impl PackageKind {
    /// Console header printed above the package summary.
    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::Portable => "Created portable package:",
            Self::Installer => "Created installable package:",
        }
    }
}

/// A package written to the packages directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifact {
    /// Package kind.
    pub kind: PackageKind,
    /// Output path.
    pub path: Utf8PathBuf,
}

impl PackageArtifact {
    /// Header plus size and checksum lines, ready for one console write.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}\n{}", self.kind.header(), package_info(&self.path))
    }
}

/// Archive the contents of `src_dir` into a deflate-compressed zip at
/// `zip_path`, placing every entry under `prefix/`.
///
/// Entries are added in file-name order with a fixed timestamp, so the
/// same tree always yields the same archive.
///
/// # Errors
///
/// Returns [`DeployError::Archive`] or [`DeployError::Io`] when reading
/// the tree or writing the archive fails.
pub fn create_zip(src_dir: &Utf8Path, prefix: &str, zip_path: &Utf8Path) -> Result<()> {
    let file = fs::File::create(zip_path).map_err(|source| DeployError::WriteFailed {
        path: zip_path.to_owned(),
        source,
    })?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for item in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = item.map_err(std::io::Error::from)?;
        let path = Utf8PathBuf::try_from(entry.path().to_path_buf())?;
        let Ok(relative) = path.strip_prefix(src_dir) else {
            continue;
        };
        let name = format!("{prefix}/{}", relative.as_str().replace('\\', "/"));

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
        } else {
            writer.start_file(name, options)?;
            let mut source = fs::File::open(&path)?;
            std::io::copy(&mut source, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(())
}

/// Build the portable archive of `root_install_dir` at `package_path`.
///
/// # Errors
///
/// Propagates archive failures; the portable package is mandatory.
pub fn create_portable(
    root_install_dir: &Utf8Path,
    program_name: &str,
    package_path: &Utf8Path,
) -> Result<PackageArtifact> {
    if let Some(pkgs_dir) = package_path.parent() {
        ensure_dir(pkgs_dir)?;
    }
    create_zip(root_install_dir, program_name, package_path)?;
    Ok(PackageArtifact {
        kind: PackageKind::Portable,
        path: package_path.to_owned(),
    })
}
