//! Deploy configuration.
//!
//! Settings live in a TOML file (by default `ports/deploy/deploy.toml` under
//! the source root) split into a `[deploy]` table for staging and a
//! `[installer]` table for installer metadata. Every key is optional; a
//! missing file yields [`DeployConfig::default`].

use crate::error::{DeployError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Location of the configuration file relative to the source root.
///
/// The project's own `package_info.conf` metadata file sits beside it and is
/// never read as deploy configuration.
pub const DEFAULT_CONFIG_PATH: &str = "ports/deploy/deploy.toml";

/// Top-level deploy configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Staging settings.
    pub deploy: StagingConfig,
    /// Installer metadata.
    pub installer: InstallerConfig,
}

impl DeployConfig {
    /// Load the configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidConfig`] when the file exists but cannot
    /// be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no deploy config at {path}; using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| DeployError::InvalidConfig {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Self::parse(path, &contents)
    }

    /// Parse configuration text. `path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidConfig`] on malformed TOML or unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use webcamoid_deploy::config::DeployConfig;
    ///
    /// let config = DeployConfig::parse(
    ///     Utf8Path::new("deploy.toml"),
    ///     "[deploy]\nprogram_name = \"webcamoid\"\n",
    /// )?;
    /// assert_eq!(config.deploy.program_name, "webcamoid");
    /// assert_eq!(config.installer.icon_size, 256);
    /// # Ok::<(), webcamoid_deploy::error::DeployError>(())
    /// ```
    pub fn parse(path: &Utf8Path, contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| DeployError::InvalidConfig {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Settings for building the staging tree.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    /// Executable name without extension.
    pub program_name: String,
    /// Directories (relative to the source root) scanned for QML imports.
    pub qml_root_dirs: Vec<Utf8PathBuf>,
    /// Libraries loaded at runtime that no import table mentions.
    pub extra_libraries: Vec<String>,
    /// File suffixes deleted from the staging tree before packaging.
    pub removable_suffixes: Vec<String>,
    /// Directory holding `*-release` files for the build-info record.
    pub sysconf_dir: Utf8PathBuf,
    /// Explicit path to `qmake`.
    pub qmake: Option<Utf8PathBuf>,
    /// Explicit path to `make`.
    pub make: Option<Utf8PathBuf>,
    /// Explicit path to the MinGW `objdump`.
    pub objdump: Option<Utf8PathBuf>,
    /// Explicit path to the MinGW `strip`.
    pub strip: Option<Utf8PathBuf>,
    /// Explicit path to Qt Installer Framework's `binarycreator`.
    pub binarycreator: Option<Utf8PathBuf>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            program_name: "webcamoid".to_owned(),
            qml_root_dirs: vec![
                Utf8PathBuf::from("StandAlone/share/qml"),
                Utf8PathBuf::from("libAvKys/Plugins"),
            ],
            extra_libraries: [
                "libeay32.dll",
                "ssleay32.dll",
                "libEGL.dll",
                "libGLESv2.dll",
                "D3DCompiler_43.dll",
                "D3DCompiler_46.dll",
                "D3DCompiler_47.dll",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            removable_suffixes: [".a", ".static.prl", ".pdb", ".lib"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            sysconf_dir: Utf8PathBuf::from("/etc"),
            qmake: None,
            make: None,
            objdump: None,
            strip: None,
            binarycreator: None,
        }
    }
}

/// Metadata written into the Qt Installer Framework configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Component identifier under `installer/packages`.
    pub package_id: String,
    /// Human-readable application name.
    pub title: String,
    /// Publisher shown by the installer.
    pub publisher: String,
    /// Product home page.
    pub product_url: String,
    /// Component description.
    pub description: String,
    /// Edge length, in pixels, of the application icon used by the installer.
    pub icon_size: u32,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            package_id: "com.webcamoidprj.webcamoid".to_owned(),
            title: "Webcamoid".to_owned(),
            publisher: "Webcamoid".to_owned(),
            product_url: "https://webcamoid.github.io/".to_owned(),
            description: "Webcamoid, the full webcam and multimedia suite.".to_owned(),
            icon_size: 256,
        }
    }
}
