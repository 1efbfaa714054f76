//! Generated runtime files: `qt.conf` and the batch launcher.
//!
//! Both files locate Qt's libraries, plugins and QML modules relative to
//! the application so the staged tree runs from any directory.

use crate::error::{DeployError, Result};
use crate::layout::{Layout, relative_path, windows_separators};
use camino::{Utf8Path, Utf8PathBuf};

/// Render `qt.conf` for a binary in `layout.bin_dir`.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use webcamoid_deploy::launcher::qt_conf_contents;
/// use webcamoid_deploy::layout::Layout;
/// use webcamoid_deploy::qt::QtPaths;
///
/// let qt = QtPaths {
///     prefix: "/qt".into(),
///     bins: "/qt/bin".into(),
///     libs: "/qt/lib".into(),
///     archdata: "/qt".into(),
///     qml: "/qt/qml".into(),
///     plugins: "/qt/plugins".into(),
/// };
/// let layout = Layout::new(Utf8Path::new("/src"), Utf8Path::new("/build"), "webcamoid", &qt);
/// assert_eq!(
///     qt_conf_contents(&layout),
///     "[Paths]\nBinaries = .\nLibraries = ../lib\nPlugins = ../plugins\nQml2Imports = ../qml\n",
/// );
/// ```
#[must_use]
pub fn qt_conf_contents(layout: &Layout) -> String {
    let libraries = relative_path(&layout.bin_dir, &layout.lib_dir);
    let plugins = relative_path(&layout.bin_dir, &layout.plugins_dir);
    let qml = relative_path(&layout.bin_dir, &layout.qml_dir);

    format!(
        "[Paths]\nBinaries = .\nLibraries = {libraries}\nPlugins = {plugins}\nQml2Imports = {qml}\n"
    )
}

/// Render the batch launcher placed at the application root.
#[must_use]
pub fn launcher_contents(layout: &Layout) -> String {
    let program = &layout.program_name;
    let lib = windows_separators(&relative_path(&layout.root_install_dir, &layout.lib_dir));
    let qml = windows_separators(&relative_path(&layout.root_install_dir, &layout.qml_dir));

    format!(
        r#"@echo off

rem Default values: desktop | angle | software
rem set QT_OPENGL=angle

rem Default values: d3d11 | d3d9 | warp
rem set QT_ANGLE_PLATFORM=d3d11

rem Default values: software | d3d12 | openvg
rem set QT_QUICK_BACKEND=""

start /b "" "%~dp0bin\{program}" -p "%~dp0{lib}\avkys" -q "%~dp0{qml}" -c "%~dp0share\config"
"#
    )
}

/// Write `qt.conf` next to the main binary.
///
/// # Errors
///
/// Returns [`DeployError::WriteFailed`] when the file cannot be written.
pub fn write_qt_conf(layout: &Layout) -> Result<Utf8PathBuf> {
    let path = layout.qt_conf();
    write_file(&path, &qt_conf_contents(layout))?;
    Ok(path)
}

/// Write the batch launcher.
///
/// # Errors
///
/// Returns [`DeployError::WriteFailed`] when the file cannot be written.
pub fn write_launcher(layout: &Layout) -> Result<Utf8PathBuf> {
    let path = layout.launcher();
    write_file(&path, &launcher_contents(layout))?;
    Ok(path)
}

fn write_file(path: &Utf8Path, contents: &str) -> Result<()> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    };
    write().map_err(|source| DeployError::WriteFailed {
        path: path.to_owned(),
        source,
    })
}
