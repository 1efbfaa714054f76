//! Staging tree layout and target architecture.
//!
//! The staging tree mirrors the final install layout:
//!
//! ```text
//! {build}/ports/deploy/temp_priv/            install_dir
//!   {program}/                               root_install_dir
//!     bin/{program}.exe, bin/qt.conf
//!     lib/, qml/, plugins/                   Qt paths rebased onto the root
//!     share/build-info.txt
//!     {program}.bat
//!   installer/config, installer/packages     Qt IFW inputs
//! {build}/ports/deploy/packages_auto/windows package output
//! ```

use crate::qt::QtPaths;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::fmt;

/// Windows architecture the build targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArch {
    /// 32-bit x86.
    Win32,
    /// 64-bit x86.
    Win64,
}

impl TargetArch {
    /// Detect the architecture from Qt's binary directory: MinGW x86_64 Qt
    /// builds live under an `x86_64-w64-mingw32` prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcamoid_deploy::layout::TargetArch;
    ///
    /// let arch = TargetArch::from_qt_bins("/usr/x86_64-w64-mingw32/lib/qt/bin");
    /// assert_eq!(arch, TargetArch::Win64);
    /// assert_eq!(TargetArch::from_qt_bins("/usr/i686-w64-mingw32/bin"), TargetArch::Win32);
    /// ```
    #[must_use]
    pub fn from_qt_bins(qt_install_bins: &str) -> Self {
        if qt_install_bins.contains("x86_64") {
            Self::Win64
        } else {
            Self::Win32
        }
    }

    /// MinGW toolchain triplet.
    #[must_use]
    pub const fn mingw_triplet(self) -> &'static str {
        match self {
            Self::Win32 => "i686-w64-mingw32",
            Self::Win64 => "x86_64-w64-mingw32",
        }
    }

    /// Host directory holding the MinGW runtime DLLs.
    #[must_use]
    pub fn system_bins_dir(self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("/usr/{}/bin", self.mingw_triplet()))
    }

    /// Suffix used in package file names.
    #[must_use]
    pub const fn package_suffix(self) -> &'static str {
        match self {
            Self::Win32 => "win32",
            Self::Win64 => "win64",
        }
    }

    /// Qt IFW applications-directory placeholder for this architecture.
    ///
    /// IFW versions before 3 (or an unknown version) only know the generic
    /// `@ApplicationsDir@`.
    #[must_use]
    pub fn ifw_applications_dir(self, ifw_version: &str) -> &'static str {
        let major = ifw_version
            .split('.')
            .next()
            .and_then(|major| major.trim().parse::<u32>().ok());

        match (major, self) {
            (Some(major), Self::Win32) if major >= 3 => "@ApplicationsDirX86@",
            (Some(major), Self::Win64) if major >= 3 => "@ApplicationsDirX64@",
            _ => "@ApplicationsDir@",
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Win32 => f.write_str("32bit"),
            Self::Win64 => f.write_str("64bit"),
        }
    }
}

/// Every path the deploy pipeline reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Source checkout root.
    pub root_dir: Utf8PathBuf,
    /// Completed native build directory.
    pub build_dir: Utf8PathBuf,
    /// Executable name without extension.
    pub program_name: String,
    /// Staging root; recreated on every run.
    pub install_dir: Utf8PathBuf,
    /// Directory written by the packaging jobs.
    pub pkgs_dir: Utf8PathBuf,
    /// Application root inside the staging tree.
    pub root_install_dir: Utf8PathBuf,
    /// Directory of executables and resolved DLLs.
    pub bin_dir: Utf8PathBuf,
    /// Qt libraries directory.
    pub lib_dir: Utf8PathBuf,
    /// Qt architecture-dependent data directory.
    pub lib_qt_dir: Utf8PathBuf,
    /// QML module directory.
    pub qml_dir: Utf8PathBuf,
    /// Qt plugin directory.
    pub plugins_dir: Utf8PathBuf,
    /// Shared data directory holding the build-info record.
    pub share_dir: Utf8PathBuf,
    /// Qt IFW configuration directory.
    pub installer_config_dir: Utf8PathBuf,
    /// Qt IFW packages directory.
    pub installer_packages_dir: Utf8PathBuf,
}

impl Layout {
    /// Derive the layout from the source root, build directory and Qt
    /// install paths. Qt paths under the Qt prefix are rebased onto the
    /// application root; paths outside it fall back to conventional
    /// subdirectories.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use webcamoid_deploy::layout::Layout;
    /// use webcamoid_deploy::qt::QtPaths;
    ///
    /// let qt = QtPaths {
    ///     prefix: "/usr/x86_64-w64-mingw32/lib/qt".into(),
    ///     bins: "/usr/x86_64-w64-mingw32/lib/qt/bin".into(),
    ///     libs: "/usr/x86_64-w64-mingw32/lib/qt/lib".into(),
    ///     archdata: "/usr/x86_64-w64-mingw32/lib/qt".into(),
    ///     qml: "/usr/x86_64-w64-mingw32/lib/qt/qml".into(),
    ///     plugins: "/usr/x86_64-w64-mingw32/lib/qt/plugins".into(),
    /// };
    /// let layout = Layout::new(Utf8Path::new("/src"), Utf8Path::new("/build"), "webcamoid", &qt);
    /// assert_eq!(layout.qml_dir, "/build/ports/deploy/temp_priv/webcamoid/qml");
    /// assert_eq!(layout.main_binary(), "/build/ports/deploy/temp_priv/webcamoid/bin/webcamoid.exe");
    /// ```
    #[must_use]
    pub fn new(
        root_dir: &Utf8Path,
        build_dir: &Utf8Path,
        program_name: &str,
        qt: &QtPaths,
    ) -> Self {
        let install_dir = build_dir.join("ports/deploy/temp_priv");
        let root_install_dir = install_dir.join(program_name);

        Self {
            root_dir: root_dir.to_owned(),
            build_dir: build_dir.to_owned(),
            program_name: program_name.to_owned(),
            pkgs_dir: build_dir.join("ports/deploy/packages_auto/windows"),
            bin_dir: root_install_dir.join("bin"),
            lib_dir: rebase(&qt.libs, &qt.prefix, &root_install_dir, "lib"),
            lib_qt_dir: rebase(&qt.archdata, &qt.prefix, &root_install_dir, ""),
            qml_dir: rebase(&qt.qml, &qt.prefix, &root_install_dir, "qml"),
            plugins_dir: rebase(&qt.plugins, &qt.prefix, &root_install_dir, "plugins"),
            share_dir: root_install_dir.join("share"),
            installer_config_dir: install_dir.join("installer/config"),
            installer_packages_dir: install_dir.join("installer/packages"),
            root_install_dir,
            install_dir,
        }
    }

    /// Path of the staged main executable.
    #[must_use]
    pub fn main_binary(&self) -> Utf8PathBuf {
        self.bin_dir.join(format!("{}.exe", self.program_name))
    }

    /// Path of the generated `qt.conf`.
    #[must_use]
    pub fn qt_conf(&self) -> Utf8PathBuf {
        self.bin_dir.join("qt.conf")
    }

    /// Path of the generated batch launcher.
    #[must_use]
    pub fn launcher(&self) -> Utf8PathBuf {
        self.root_install_dir
            .join(format!("{}.bat", self.program_name))
    }

    /// Path of the build-info record.
    #[must_use]
    pub fn build_info(&self) -> Utf8PathBuf {
        self.share_dir.join("build-info.txt")
    }

    /// Output path of the portable archive.
    #[must_use]
    pub fn portable_package(&self, version: &str, arch: TargetArch) -> Utf8PathBuf {
        self.pkgs_dir.join(format!(
            "{}-portable-{version}-{}.zip",
            self.program_name,
            arch.package_suffix()
        ))
    }

    /// Output path of the installer executable.
    #[must_use]
    pub fn installer_package(&self, version: &str, arch: TargetArch) -> Utf8PathBuf {
        self.pkgs_dir.join(format!(
            "{}-{version}-{}.exe",
            self.program_name,
            arch.package_suffix()
        ))
    }

    /// Application icon shipped with the installer.
    #[must_use]
    pub fn app_icon(&self, icon_size: u32) -> Utf8PathBuf {
        self.root_dir.join(format!(
            "StandAlone/share/icons/hicolor/{icon_size}x{icon_size}/{}.ico",
            self.program_name
        ))
    }

    /// License text shown by the installer.
    #[must_use]
    pub fn license_file(&self) -> Utf8PathBuf {
        self.root_dir.join("COPYING")
    }

    /// Qt IFW control script.
    #[must_use]
    pub fn installer_script(&self) -> Utf8PathBuf {
        self.root_dir.join("ports/deploy/installscript.windows.qs")
    }

    /// Release notes.
    #[must_use]
    pub fn changelog(&self) -> Utf8PathBuf {
        self.root_dir.join("ChangeLog")
    }

    /// Version marker file.
    #[must_use]
    pub fn version_file(&self) -> Utf8PathBuf {
        self.root_dir.join("commons.pri")
    }

    /// Exclude list for the host operating system.
    #[must_use]
    pub fn exclude_list(&self) -> Utf8PathBuf {
        self.root_dir.join(format!(
            "ports/deploy/exclude.{}.{}.txt",
            host_os_family(),
            host_platform()
        ))
    }
}

/// Move `path` from under `prefix` to under `root`, or use `root/fallback`
/// when `path` lies outside the prefix.
fn rebase(path: &Utf8Path, prefix: &Utf8Path, root: &Utf8Path, fallback: &str) -> Utf8PathBuf {
    let rest = path.strip_prefix(prefix).unwrap_or(Utf8Path::new(fallback));
    if rest.as_str().is_empty() {
        root.to_owned()
    } else {
        root.join(rest)
    }
}

/// Host OS family in the naming used by the exclude lists.
#[must_use]
pub fn host_os_family() -> &'static str {
    if cfg!(windows) { "nt" } else { "posix" }
}

/// Host platform in the naming used by the exclude lists.
#[must_use]
pub fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Express `target` relative to the directory `base`.
///
/// Both paths must be absolute or both relative for the result to be
/// meaningful.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use webcamoid_deploy::layout::relative_path;
///
/// let rel = relative_path(Utf8Path::new("/stage/app/bin"), Utf8Path::new("/stage/app/lib/qt"));
/// assert_eq!(rel, "../lib/qt");
/// assert_eq!(relative_path(Utf8Path::new("/stage"), Utf8Path::new("/stage")), ".");
/// ```
#[must_use]
pub fn relative_path(base: &Utf8Path, target: &Utf8Path) -> Utf8PathBuf {
    let base_parts: Vec<Utf8Component<'_>> = base.components().collect();
    let target_parts: Vec<Utf8Component<'_>> = target.components().collect();
    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = Utf8PathBuf::new();
    for _ in base_parts.iter().skip(common) {
        relative.push("..");
    }
    for part in target_parts.iter().skip(common) {
        relative.push(part.as_str());
    }

    if relative.as_str().is_empty() {
        Utf8PathBuf::from(".")
    } else {
        relative
    }
}

/// Render a relative path with Windows separators.
#[must_use]
pub fn windows_separators(path: &Utf8Path) -> String {
    path.as_str().replace('/', "\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn qt_paths() -> QtPaths {
        QtPaths {
            prefix: "/usr/i686-w64-mingw32/lib/qt".into(),
            bins: "/usr/i686-w64-mingw32/lib/qt/bin".into(),
            libs: "/usr/i686-w64-mingw32/lib/qt/lib".into(),
            archdata: "/usr/i686-w64-mingw32/lib/qt".into(),
            qml: "/usr/i686-w64-mingw32/lib/qt/qml".into(),
            plugins: "/usr/i686-w64-mingw32/lib/qt/plugins".into(),
        }
    }

    #[fixture]
    fn layout(qt_paths: QtPaths) -> Layout {
        Layout::new(
            Utf8Path::new("/src/webcamoid"),
            Utf8Path::new("/src/webcamoid/build"),
            "webcamoid",
            &qt_paths,
        )
    }

    #[rstest]
    fn qt_paths_are_rebased_onto_the_application_root(layout: Layout) {
        let root = Utf8Path::new("/src/webcamoid/build/ports/deploy/temp_priv/webcamoid");
        assert_eq!(layout.root_install_dir, root);
        assert_eq!(layout.lib_dir, root.join("lib"));
        assert_eq!(layout.lib_qt_dir, root);
        assert_eq!(layout.plugins_dir, root.join("plugins"));
    }

    #[rstest]
    fn paths_outside_the_qt_prefix_use_conventional_dirs(mut qt_paths: QtPaths) {
        qt_paths.qml = "/opt/elsewhere/qml".into();
        let layout = Layout::new(
            Utf8Path::new("/src"),
            Utf8Path::new("/build"),
            "webcamoid",
            &qt_paths,
        );
        assert_eq!(layout.qml_dir, layout.root_install_dir.join("qml"));
    }

    #[rstest]
    #[case::win32(
        TargetArch::Win32,
        "webcamoid-portable-8.1.0-win32.zip",
        "webcamoid-8.1.0-win32.exe"
    )]
    #[case::win64(
        TargetArch::Win64,
        "webcamoid-portable-8.1.0-win64.zip",
        "webcamoid-8.1.0-win64.exe"
    )]
    fn package_names_encode_version_and_arch(
        layout: Layout,
        #[case] arch: TargetArch,
        #[case] portable: &str,
        #[case] installer: &str,
    ) {
        assert_eq!(
            layout.portable_package("8.1.0", arch).file_name(),
            Some(portable)
        );
        assert_eq!(
            layout.installer_package("8.1.0", arch).file_name(),
            Some(installer)
        );
        assert!(layout.portable_package("8.1.0", arch).starts_with(&layout.pkgs_dir));
    }

    #[rstest]
    #[case::unknown("", TargetArch::Win64, "@ApplicationsDir@")]
    #[case::ifw2("2.0.5", TargetArch::Win64, "@ApplicationsDir@")]
    #[case::ifw3_x86("3.0.1", TargetArch::Win32, "@ApplicationsDirX86@")]
    #[case::ifw4_x64("4.6.0", TargetArch::Win64, "@ApplicationsDirX64@")]
    fn ifw_applications_dir_depends_on_version(
        #[case] version: &str,
        #[case] arch: TargetArch,
        #[case] expected: &str,
    ) {
        assert_eq!(arch.ifw_applications_dir(version), expected);
    }

    #[test]
    fn system_bins_dir_follows_triplet() {
        assert_eq!(
            TargetArch::Win32.system_bins_dir(),
            "/usr/i686-w64-mingw32/bin"
        );
        assert_eq!(TargetArch::Win64.to_string(), "64bit");
    }

    #[rstest]
    #[case::sibling("/a/bin", "/a/lib", "../lib")]
    #[case::nested("/a", "/a/lib/avkys", "lib/avkys")]
    #[case::same("/a/bin", "/a/bin", ".")]
    fn relative_path_walks_up_then_down(
        #[case] base: &str,
        #[case] target: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(
            relative_path(Utf8Path::new(base), Utf8Path::new(target)),
            expected
        );
    }

    #[test]
    fn windows_separators_replace_slashes() {
        assert_eq!(windows_separators(Utf8Path::new("lib/qt/qml")), "lib\\qt\\qml");
    }

    #[cfg(target_os = "linux")]
    #[rstest]
    fn exclude_list_uses_host_naming(layout: Layout) {
        assert_eq!(
            layout.exclude_list(),
            "/src/webcamoid/ports/deploy/exclude.posix.linux.txt"
        );
    }
}
