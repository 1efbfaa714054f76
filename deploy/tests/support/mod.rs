//! Test support utilities for deploy behavioural tests.
//!
//! This module builds a throwaway cross-compiled build on disk: a source
//! root, a fake MinGW Qt install, host DLLs and an executor whose
//! `make install` drops the application into the staging tree.

use camino::{Utf8Path, Utf8PathBuf};
use std::process::Output;
use std::sync::Arc;
use tempfile::TempDir;
use webcamoid_deploy::config::DeployConfig;
use webcamoid_deploy::error::Result;
use webcamoid_deploy::exec::{CommandExecutor, Invocation};
use webcamoid_deploy::installer::InstallerGenerator;
use webcamoid_deploy::layout::{Layout, TargetArch};
use webcamoid_deploy::pipeline::{Deploy, DeployParts};
use webcamoid_deploy::qt::QtPaths;
use webcamoid_deploy::test_utils::{
    ExpectedCall, FakeScanner, StubExecutor, failure_output, success_output,
};

/// Files `make install` places under the application root.
const INSTALLED_FILES: &[(&str, &[u8])] = &[
    ("bin/webcamoid.exe", b"MZ webcamoid"),
    ("bin/avkys.dll", b"MZ avkys"),
    ("lib/avkys/VideoFx.dll", b"MZ plugin"),
    ("lib/libavkys.a", b"!<arch>"),
    ("share/config/webcamoid.conf", b"[General]\n"),
];

/// A source root, build directory and fake toolchain under one temp dir.
pub struct DeployTree {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl DeployTree {
    /// Lay out the source tree, Qt install and host libraries.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8 temp dir");
        let tree = Self { _temp: temp, root };

        tree.write("src/StandAlone/share/qml/main.qml", b"import QtQuick 2.9\n");
        tree.write("src/COPYING", b"GPL-3.0-or-later\n");
        tree.write("mingw/qt/qml/QtQuick.2/qmldir", b"module QtQuick\n");
        tree.write("mingw/qt/qml/QtQuick.2/qtquick2plugin.dll", b"MZ qtquick");
        tree.write("mingw/qt/plugins/platforms/qwindows.dll", b"MZ qwindows");
        tree.write("mingw/qt/plugins/imageformats/qjpeg.dll", b"MZ qjpeg");
        tree.write("mingw/bin/Qt5Core.dll", b"MZ core");
        tree.write("mingw/bin/Qt5Gui.dll", b"MZ gui");
        tree.write("mingw/bin/libEGL.dll", b"MZ egl");
        tree.write("mingw/bin/zlib1.dll", b"MZ zlib");
        tree.write("etc/os-release", b"ID=arch\nPRETTY_NAME=\"Arch Linux\"\n");
        tree
    }

    /// Write `contents` at `relative`, creating parents.
    pub fn write(&self, relative: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, contents).expect("write");
        path
    }

    /// Path under the temp root.
    pub fn path(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    /// The fake MinGW Qt install.
    pub fn qt(&self) -> QtPaths {
        let prefix = self.root.join("mingw/qt");
        QtPaths {
            bins: prefix.join("bin"),
            libs: prefix.join("lib"),
            archdata: prefix.clone(),
            qml: prefix.join("qml"),
            plugins: prefix.join("plugins"),
            prefix,
        }
    }

    /// Layout of the build under test.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.path("src"), &self.path("build"), "webcamoid", &self.qt())
    }

    /// Default configuration reading host release files from the tree.
    pub fn config(&self) -> DeployConfig {
        let mut config = DeployConfig::default();
        config.deploy.sysconf_dir = self.path("etc");
        config
    }

    /// Scanner that knows the fake binaries' imports.
    pub fn scanner(&self) -> FakeScanner {
        FakeScanner::new()
            .with_imports("webcamoid.exe", &["avkys.dll", "Qt5Gui.dll", "KERNEL32.dll"])
            .with_imports("avkys.dll", &["Qt5Core.dll"])
            .with_imports("Qt5Gui.dll", &["Qt5Core.dll", "zlib1.dll"])
            .with_library("Qt5Core.dll", self.path("mingw/bin/Qt5Core.dll"))
            .with_library("Qt5Gui.dll", self.path("mingw/bin/Qt5Gui.dll"))
            .with_library("zlib1.dll", self.path("mingw/bin/zlib1.dll"))
            .with_library("libEGL.dll", self.path("mingw/bin/libEGL.dll"))
            .excluding("KERNEL32.dll")
    }

    /// A deploy driven by `executor` and `installer`.
    pub fn deploy(
        &self,
        executor: Arc<dyn CommandExecutor>,
        installer: Option<Box<dyn InstallerGenerator>>,
    ) -> Deploy {
        Deploy::from_parts(DeployParts {
            executor,
            config: self.config(),
            layout: self.layout(),
            qt: self.qt(),
            arch: TargetArch::Win64,
            version: "8.8.0".to_owned(),
            make: Utf8PathBuf::from("make"),
            scanner: Box::new(self.scanner()),
            installer,
        })
    }

    /// A staged application tree as `prepare` would leave it.
    pub fn stage(&self) -> Layout {
        let layout = self.layout();
        for (relative, contents) in INSTALLED_FILES {
            let path = layout.root_install_dir.join(relative);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(path, contents).expect("write");
        }
        layout
    }
}

/// Wraps a [`StubExecutor`] and stages [`INSTALLED_FILES`] when it sees
/// `make install`.
pub struct InstallingExecutor {
    inner: StubExecutor,
    program_name: String,
}

impl InstallingExecutor {
    /// Answers `make install` into `layout` with success and every
    /// diagnostic probe with failure; no host tool is available.
    pub fn without_host_tools(layout: &Layout) -> Self {
        let make_install = [
            format!("INSTALL_ROOT={}", layout.install_dir),
            "install".to_owned(),
        ];
        let calls = vec![
            ExpectedCall::new("make", make_install, Ok(success_output())),
            ExpectedCall::new(
                "git",
                ["rev-parse", "HEAD"],
                Ok(failure_output("not a git repository")),
            ),
            ExpectedCall::new("wine", ["--version"], Ok(failure_output("wine: not found"))),
            ExpectedCall::new("wine", ["cmd", "/c", "ver"], Ok(failure_output("wine: not found"))),
        ];
        Self {
            inner: StubExecutor::new(calls),
            program_name: layout.program_name.clone(),
        }
    }

    /// Every invocation received so far.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.invocations()
    }

    /// Asserts every expected probe ran.
    pub fn assert_finished(&self) {
        self.inner.assert_finished();
    }
}

impl CommandExecutor for InstallingExecutor {
    fn run(&self, invocation: &Invocation) -> Result<Output> {
        let install_root = invocation
            .args
            .iter()
            .find_map(|arg| arg.strip_prefix("INSTALL_ROOT="));
        if let Some(install_root) = install_root {
            let app_root = Utf8Path::new(install_root).join(&self.program_name);
            for (relative, contents) in INSTALLED_FILES {
                let path = app_root.join(relative);
                std::fs::create_dir_all(path.parent().expect("parent"))?;
                std::fs::write(path, contents)?;
            }
        }
        self.inner.run(invocation)
    }

    fn find_program(&self, name: &str) -> Option<Utf8PathBuf> {
        self.inner.find_program(name)
    }
}

/// An installer tool double that optionally writes an installer file.
pub struct FakeInstaller {
    output: Utf8PathBuf,
    produces_package: bool,
}

impl FakeInstaller {
    /// Writes `output` when `produces_package`, otherwise leaves nothing.
    pub fn new(output: Utf8PathBuf, produces_package: bool) -> Self {
        Self {
            output,
            produces_package,
        }
    }
}

impl InstallerGenerator for FakeInstaller {
    fn create(&self) -> Result<Option<Utf8PathBuf>> {
        if !self.produces_package {
            return Ok(None);
        }
        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.output, b"MZ installer")?;
        Ok(Some(self.output.clone()))
    }

    fn output_path(&self) -> Utf8PathBuf {
        self.output.clone()
    }
}
