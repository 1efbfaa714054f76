//! Qt toolchain queries.
//!
//! This module locates the cross-compiling `qmake`, parses its `-query`
//! report into install paths, and detects Qt Installer Framework.

use crate::error::{DeployError, Result};
use crate::exec::{CommandExecutor, Invocation, run_for_stdout, stderr_text};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;

/// `qmake` names tried on `PATH` when neither the config nor the Makefile
/// names one.
const QMAKE_CANDIDATES: &[&str] = &[
    "x86_64-w64-mingw32-qmake-qt5",
    "i686-w64-mingw32-qmake-qt5",
    "qmake-qt5",
    "qmake",
];

/// Qt install paths reported by `qmake -query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QtPaths {
    /// `QT_INSTALL_PREFIX`.
    pub prefix: Utf8PathBuf,
    /// `QT_INSTALL_BINS`.
    pub bins: Utf8PathBuf,
    /// `QT_INSTALL_LIBS`.
    pub libs: Utf8PathBuf,
    /// `QT_INSTALL_ARCHDATA`.
    pub archdata: Utf8PathBuf,
    /// `QT_INSTALL_QML`.
    pub qml: Utf8PathBuf,
    /// `QT_INSTALL_PLUGINS`.
    pub plugins: Utf8PathBuf,
}

/// Parsed `qmake -query` report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QtQuery {
    values: BTreeMap<String, String>,
}

impl QtQuery {
    /// Parse `KEY:VALUE` lines. Only the first colon separates key and
    /// value, so Windows drive letters in values survive.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcamoid_deploy::qt::QtQuery;
    ///
    /// let query = QtQuery::parse("QT_INSTALL_PREFIX:/usr/x86_64-w64-mingw32\nQT_VERSION:5.15.2\n");
    /// assert_eq!(query.get("QT_VERSION"), Some("5.15.2"));
    /// assert_eq!(query.get("QT_INSTALL_DOCS"), None);
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { values }
    }

    /// Run `qmake -query` and parse the report.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::QtQuery`] when qmake cannot be started or exits
    /// unsuccessfully.
    pub fn run(executor: &dyn CommandExecutor, qmake: &Utf8Path) -> Result<Self> {
        let invocation = Invocation::new(qmake.as_str()).arg("-query");
        let output = executor.run(&invocation).map_err(|e| DeployError::QtQuery {
            reason: format!("could not run {qmake}: {e}"),
        })?;

        if !output.status.success() {
            return Err(DeployError::QtQuery {
                reason: format!(
                    "{qmake} -query exited with {}: {}",
                    output.status,
                    stderr_text(&output)
                ),
            });
        }

        Ok(Self::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Look up a query value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a query value that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::QtQuery`] when the key is missing or empty.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| DeployError::QtQuery {
                reason: format!("qmake did not report {key}"),
            })
    }

    /// Collect the install paths the deploy layout needs.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::QtQuery`] when any required key is missing.
    pub fn paths(&self) -> Result<QtPaths> {
        Ok(QtPaths {
            prefix: self.require("QT_INSTALL_PREFIX")?.into(),
            bins: self.require("QT_INSTALL_BINS")?.into(),
            libs: self.require("QT_INSTALL_LIBS")?.into(),
            archdata: self.require("QT_INSTALL_ARCHDATA")?.into(),
            qml: self.require("QT_INSTALL_QML")?.into(),
            plugins: self.require("QT_INSTALL_PLUGINS")?.into(),
        })
    }
}

/// Extract the `QMAKE = <path>` assignment from a qmake-generated Makefile.
#[must_use]
pub fn qmake_from_makefile(makefile: &str) -> Option<Utf8PathBuf> {
    makefile.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        let value = value.trim();
        (key.trim() == "QMAKE" && !value.is_empty()).then(|| Utf8PathBuf::from(value))
    })
}

/// Locate `qmake`: explicit configuration first, then the standalone
/// Makefile, then well-known names on `PATH`.
///
/// # Errors
///
/// Returns [`DeployError::ToolNotFound`] when no candidate exists.
pub fn detect_qmake(
    executor: &dyn CommandExecutor,
    configured: Option<&Utf8Path>,
    makefile: &Utf8Path,
) -> Result<Utf8PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_owned());
    }

    let from_makefile = std::fs::read_to_string(makefile)
        .ok()
        .and_then(|text| qmake_from_makefile(&text));
    if let Some(path) = from_makefile {
        log::debug!("using qmake from {makefile}: {path}");
        return Ok(path);
    }

    QMAKE_CANDIDATES
        .iter()
        .find_map(|name| executor.find_program(name))
        .ok_or_else(|| DeployError::ToolNotFound {
            tool: "qmake".to_owned(),
        })
}

/// A detected Qt Installer Framework installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QtIfw {
    /// Path to `binarycreator`.
    pub binarycreator: Utf8PathBuf,
    /// Framework version, empty when unknown.
    pub version: String,
}

/// Detect Qt Installer Framework. Returns `None` when `binarycreator` is
/// not available; an undeterminable version is reported as empty.
pub fn detect_ifw(executor: &dyn CommandExecutor, configured: Option<&Utf8Path>) -> Option<QtIfw> {
    let binarycreator = configured
        .map(Utf8Path::to_owned)
        .or_else(|| executor.find_program("binarycreator"))?;

    let installerbase = binarycreator.with_file_name("installerbase");
    let query = Invocation::new(installerbase.as_str()).arg("--version");
    let version = run_for_stdout(executor, &query)
        .and_then(|text| parse_ifw_version(&text))
        .unwrap_or_default();

    Some(QtIfw {
        binarycreator,
        version,
    })
}

/// Extract the version from `installerbase --version` output, which
/// contains a line such as `IFW Version: "3.0.4", Build date: ...`.
#[must_use]
pub fn parse_ifw_version(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (_, rest) = line.split_once("IFW Version:")?;
        let version: String = rest
            .trim_start()
            .trim_start_matches('"')
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        (!version.is_empty()).then_some(version)
    })
}
