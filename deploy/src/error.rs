//! Error types for the deploy pipeline.
//!
//! Only the mandatory steps (detection, `make install`, staging copies and
//! the portable archive) surface these errors. Diagnostic steps such as
//! provenance lookup or build-info collection degrade to placeholder text
//! instead and never produce a [`DeployError`].

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that abort a deploy run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A required external program could not be found.
    #[error("required tool {tool} not found; install it or set its path in the deploy config")]
    ToolNotFound {
        /// Name of the missing tool.
        tool: String,
    },

    /// `make install` failed, so there is nothing to package.
    #[error("make install failed: {reason}")]
    MakeInstall {
        /// Captured stderr or exit description.
        reason: String,
    },

    /// `qmake -query` failed or lacked a required key.
    #[error("qmake query failed: {reason}")]
    QtQuery {
        /// Description of the failure.
        reason: String,
    },

    /// The project version marker could not be read.
    #[error("could not read program version from {path}: {reason}")]
    VersionDetection {
        /// Path to the version marker file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The deploy configuration file could not be parsed.
    #[error("invalid deploy config at {path}: {reason}")]
    InvalidConfig {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// Description of the parse error.
        reason: String,
    },

    /// An exclude-list pattern is not a valid regular expression.
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    InvalidExcludePattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The binary dependency scanner could not inspect a file.
    #[error("dependency scan of {path} failed: {reason}")]
    ScanFailed {
        /// The binary being scanned.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Copying a file or directory into the staging tree failed.
    #[error("staging failed: {reason}")]
    StagingFailed {
        /// Description of the staging failure.
        reason: String,
    },

    /// A generated file (launcher, qt.conf) could not be written.
    #[error("failed to write {path}")]
    WriteFailed {
        /// Destination path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The portable archive could not be written.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The installer generator failed before producing an artefact.
    #[error("installer generation failed: {reason}")]
    InstallerFailed {
        /// Description of the failure.
        reason: String,
    },

    /// A packaging worker thread panicked.
    #[error("{job} packaging job panicked")]
    WorkerPanicked {
        /// Name of the job whose thread panicked.
        job: &'static str,
    },

    /// A path on disk is not valid UTF-8.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl From<camino::FromPathBufError> for DeployError {
    fn from(err: camino::FromPathBufError) -> Self {
        Self::NonUtf8Path(err.into_path_buf())
    }
}

/// Result type alias using [`DeployError`].
pub type Result<T> = std::result::Result<T, DeployError>;
