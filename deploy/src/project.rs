//! Project metadata and the `make install` step.

use crate::error::{DeployError, Result};
use crate::exec::{CommandExecutor, Invocation, stderr_text};
use camino::{Utf8Path, Utf8PathBuf};

/// Version string used for daily builds.
pub const DAILY_VERSION: &str = "daily";

/// `make` names tried on `PATH`.
const MAKE_CANDIDATES: &[&str] = &["make", "mingw32-make"];

/// Read the program version from a `commons.pri` project file.
///
/// # Errors
///
/// Returns [`DeployError::VersionDetection`] when the file cannot be read.
pub fn read_version(path: &Utf8Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| DeployError::VersionDetection {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    Ok(parse_version(&text))
}

/// Join the `VER_MAJ`, `VER_MIN` and `VER_PAT` assignments with dots.
/// Missing components are `0`.
///
/// # Examples
///
/// ```
/// use webcamoid_deploy::project::parse_version;
///
/// let pri = "isEmpty(VER_MAJ): VER_MAJ = 8\nisEmpty(VER_MIN): VER_MIN = 7\nVER_PAT = 1\n";
/// assert_eq!(parse_version(pri), "8.7.1");
/// assert_eq!(parse_version("VER_MAJ = 9\n"), "9.0.0");
/// ```
#[must_use]
pub fn parse_version(text: &str) -> String {
    ["VER_MAJ", "VER_MIN", "VER_PAT"]
        .iter()
        .map(|key| assignment(text, key).unwrap_or("0"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Value of the first `KEY = value` assignment, ignoring an optional
/// `isEmpty(KEY):` guard in front of it.
fn assignment<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let statement = line
            .split_once(':')
            .filter(|(guard, _)| guard.trim_start().starts_with("isEmpty("))
            .map_or(line, |(_, rest)| rest);
        let (lhs, rhs) = statement.split_once('=')?;
        let value = rhs.trim();
        (lhs.trim() == key && !value.is_empty()).then_some(value)
    })
}

/// Locate `make`: explicit configuration first, then `PATH`.
///
/// # Errors
///
/// Returns [`DeployError::ToolNotFound`] when no candidate exists.
pub fn detect_make(
    executor: &dyn CommandExecutor,
    configured: Option<&Utf8Path>,
) -> Result<Utf8PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_owned());
    }

    MAKE_CANDIDATES
        .iter()
        .find_map(|name| executor.find_program(name))
        .ok_or_else(|| DeployError::ToolNotFound {
            tool: "make".to_owned(),
        })
}

/// Run `make INSTALL_ROOT=<install_dir> install` from `build_dir`.
///
/// # Errors
///
/// Returns [`DeployError::MakeInstall`] when make cannot be started or exits
/// unsuccessfully.
pub fn make_install(
    executor: &dyn CommandExecutor,
    make: &Utf8Path,
    build_dir: &Utf8Path,
    install_dir: &Utf8Path,
) -> Result<()> {
    let invocation = Invocation::new(make.as_str())
        .arg(format!("INSTALL_ROOT={install_dir}"))
        .arg("install")
        .in_dir(build_dir);

    log::info!("Executing make install");
    let output = executor.run(&invocation).map_err(|e| DeployError::MakeInstall {
        reason: format!("could not run `{invocation}`: {e}"),
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(DeployError::MakeInstall {
            reason: format!(
                "`{invocation}` exited with {}: {}",
                output.status,
                stderr_text(&output)
            ),
        })
    }
}
