//! Deploy orchestration.
//!
//! [`Deploy`] ties detection, staging and packaging together. `prepare`
//! builds the staging tree step by step; `package` runs the portable and
//! installer jobs on scoped threads that share one console lock, so each
//! job's summary is printed as a single uninterrupted block.

use crate::build_info::write_build_info;
use crate::config::{DEFAULT_CONFIG_PATH, DeployConfig};
use crate::error::{DeployError, Result};
use crate::exec::CommandExecutor;
use crate::installer::{InstallerGenerator, InstallerSettings, QtIfwGenerator};
use crate::launcher::{write_launcher, write_qt_conf};
use crate::layout::{Layout, TargetArch};
use crate::package::{PackageArtifact, PackageKind, create_portable};
use crate::pecoff::{DependencyScanner, DependencySet, ExcludeList, ObjdumpScanner, pe_files};
use crate::plugins::{deploy_plugins, qt_modules};
use crate::project::{DAILY_VERSION, detect_make, make_install, read_version};
use crate::qml::deploy_qml_modules;
use crate::qt::{QtPaths, QtQuery, detect_ifw, detect_qmake};
use crate::staging::{copy_dependencies, recreate_dir, remove_debugs, remove_unneeded_files};
use crate::strip::SymbolStripper;
use crate::summary::print_locked;
use camino::Utf8PathBuf;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;

/// Where to find the sources and build, and how to version the packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Source checkout root.
    pub root_dir: Utf8PathBuf,
    /// Completed native build directory.
    pub build_dir: Utf8PathBuf,
    /// Configuration file; `<root>/ports/deploy/deploy.toml` when `None`.
    pub config_path: Option<Utf8PathBuf>,
    /// Version packages as `daily` instead of the project version.
    pub daily: bool,
}

/// Everything a [`Deploy`] needs, for callers that detect it themselves.
pub struct DeployParts {
    /// Runs external programs.
    pub executor: Arc<dyn CommandExecutor>,
    /// Loaded configuration.
    pub config: DeployConfig,
    /// Staging and output paths.
    pub layout: Layout,
    /// Qt install paths.
    pub qt: QtPaths,
    /// Target architecture.
    pub arch: TargetArch,
    /// Package version.
    pub version: String,
    /// `make` binary.
    pub make: Utf8PathBuf,
    /// Import-table scanner.
    pub scanner: Box<dyn DependencyScanner>,
    /// Installer job, when an installer tool is available.
    pub installer: Option<Box<dyn InstallerGenerator>>,
}

/// Packages produced by [`Deploy::package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    /// The portable archive.
    pub portable: PackageArtifact,
    /// The installer, when one was produced.
    pub installer: Option<PackageArtifact>,
}

/// The Windows deploy of a cross-compiled build.
pub struct Deploy {
    executor: Arc<dyn CommandExecutor>,
    config: DeployConfig,
    layout: Layout,
    qt: QtPaths,
    arch: TargetArch,
    version: String,
    make: Utf8PathBuf,
    scanner: Box<dyn DependencyScanner>,
    installer: Option<Box<dyn InstallerGenerator>>,
    dependencies: Vec<Utf8PathBuf>,
}

impl Deploy {
    /// Assemble a deploy from already-detected parts.
    #[must_use]
    pub fn from_parts(parts: DeployParts) -> Self {
        Self {
            executor: parts.executor,
            config: parts.config,
            layout: parts.layout,
            qt: parts.qt,
            arch: parts.arch,
            version: parts.version,
            make: parts.make,
            scanner: parts.scanner,
            installer: parts.installer,
            dependencies: Vec::new(),
        }
    }

    /// Detect the toolchain, project version and layout on the host.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid, qmake, make or objdump is
    /// missing, qmake's report lacks an install path, or the project
    /// version cannot be read.
    pub fn detect(options: &DeployOptions, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        let config_path = options
            .config_path
            .clone()
            .unwrap_or_else(|| options.root_dir.join(DEFAULT_CONFIG_PATH));
        let config = DeployConfig::load(&config_path)?;
        let staging = &config.deploy;

        let qmake = detect_qmake(
            executor.as_ref(),
            staging.qmake.as_deref(),
            &options.build_dir.join("StandAlone/Makefile"),
        )?;
        log::debug!("using qmake {qmake}");
        let qt = QtQuery::run(executor.as_ref(), &qmake)?.paths()?;
        let arch = TargetArch::from_qt_bins(qt.bins.as_str());
        let layout = Layout::new(&options.root_dir, &options.build_dir, &staging.program_name, &qt);

        let version = if options.daily {
            DAILY_VERSION.to_owned()
        } else {
            read_version(&layout.version_file())?
        };
        let make = detect_make(executor.as_ref(), staging.make.as_deref())?;

        let objdump_name = format!("{}-objdump", arch.mingw_triplet());
        let objdump = staging
            .objdump
            .clone()
            .or_else(|| executor.find_program(&objdump_name))
            .ok_or(DeployError::ToolNotFound { tool: objdump_name })?;
        let scanner = ObjdumpScanner::new(
            Arc::clone(&executor),
            objdump,
            vec![qt.bins.clone(), arch.system_bins_dir()],
            ExcludeList::load(&layout.exclude_list())?,
        );

        let installer = detect_ifw(executor.as_ref(), staging.binarycreator.as_deref()).map(|ifw| {
            let settings = InstallerSettings {
                metadata: config.installer.clone(),
                version: version.clone(),
                arch,
                ifw,
                release_date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            };
            Box::new(QtIfwGenerator::new(Arc::clone(&executor), layout.clone(), settings))
                as Box<dyn InstallerGenerator>
        });
        if installer.is_none() {
            log::info!("Qt Installer Framework not found; skipping the installer");
        }

        log::info!("Deploying {} {version} ({arch})", layout.program_name);
        Ok(Self::from_parts(DeployParts {
            executor,
            config,
            layout,
            qt,
            arch,
            version,
            make,
            scanner: Box::new(scanner),
            installer,
        }))
    }

    /// Host libraries copied by the last [`Deploy::prepare`], in copy order.
    #[must_use]
    pub fn dependencies(&self) -> &[Utf8PathBuf] {
        &self.dependencies
    }

    /// Output path of the portable archive.
    #[must_use]
    pub fn portable_package(&self) -> Utf8PathBuf {
        self.layout.portable_package(&self.version, self.arch)
    }

    /// Build the staging tree from scratch.
    ///
    /// # Errors
    ///
    /// Fails when `make install` fails or a staging copy, generated file or
    /// cleanup step fails. Build-info collection never fails.
    pub fn prepare(&mut self) -> Result<()> {
        let layout = &self.layout;

        recreate_dir(&layout.install_dir)?;
        make_install(self.executor.as_ref(), &self.make, &layout.build_dir, &layout.install_dir)?;

        if let Some(installer) = &self.installer {
            log::info!("Installer will be written to {}", installer.output_path());
        }

        log::info!("Copying Qml modules");
        let qml_roots: Vec<Utf8PathBuf> = self
            .config
            .deploy
            .qml_root_dirs
            .iter()
            .map(|dir| layout.root_dir.join(dir))
            .collect();
        deploy_qml_modules(&qml_roots, &self.qt.qml, &layout.qml_dir)?;

        log::info!("Copying required plugins");
        let staged = pe_files(&layout.install_dir)?;
        let linked = self.scanner.scan_dependencies(&layout.install_dir)?;
        let modules = qt_modules(staged.iter().chain(&linked).map(Utf8PathBuf::as_path));
        deploy_plugins(&modules, &self.qt.plugins, &layout.plugins_dir)?;

        log::info!("Removing Qt debug libraries");
        remove_debugs(&layout.lib_qt_dir)?;

        log::info!("Copying required libs");
        let deps = self.resolve_libraries()?;
        let copied = copy_dependencies(&deps, &layout.bin_dir)?;

        log::info!("Writing qt.conf file");
        write_qt_conf(layout)?;

        log::info!("Stripping symbols");
        SymbolStripper::detect(
            self.executor.as_ref(),
            self.config.deploy.strip.as_deref(),
            self.arch.mingw_triplet(),
        )
        .strip_symbols(&layout.install_dir)?;

        log::info!("Writing launcher file");
        write_launcher(layout)?;

        log::info!("Removing unnecessary files");
        remove_unneeded_files(&layout.install_dir, &self.config.deploy.removable_suffixes)?;

        log::info!("Writing build system information");
        write_build_info(
            self.executor.as_ref(),
            &layout.root_dir,
            &self.config.deploy.sysconf_dir,
            &copied,
            &layout.pkgs_dir,
            &layout.build_info(),
        );

        self.dependencies = copied;
        Ok(())
    }

    /// Imports of the staged tree plus the runtime-only libraries and their
    /// own imports.
    fn resolve_libraries(&self) -> Result<DependencySet> {
        let install_dir = &self.layout.install_dir;
        let mut deps = self.scanner.scan_dependencies(install_dir)?;

        for name in &self.config.deploy.extra_libraries {
            match self.scanner.locate(name) {
                Some(path) => deps.extend(self.scanner.all_dependencies(&path, install_dir)?),
                None => log::debug!("runtime library {name} not available"),
            }
        }

        Ok(deps)
    }

    /// Build the portable zip and print its summary.
    ///
    /// # Errors
    ///
    /// Fails when the archive cannot be written.
    pub fn create_portable<W: Write>(&self, console: &Mutex<W>) -> Result<PackageArtifact> {
        let artifact = create_portable(
            &self.layout.root_install_dir,
            &self.layout.program_name,
            &self.portable_package(),
        )?;
        print_locked(console, &artifact.summary())?;
        Ok(artifact)
    }

    /// Build the installer, if an installer tool is configured, and print
    /// its summary.
    ///
    /// Failures are logged and yield `None`, as does a tool run that leaves
    /// no installer behind; neither prints anything.
    pub fn create_app_installer<W: Write>(&self, console: &Mutex<W>) -> Option<PackageArtifact> {
        let generator = self.installer.as_deref()?;

        let path = match generator.create() {
            Ok(Some(path)) => path,
            Ok(None) => {
                log::debug!("installer tool produced no package");
                return None;
            }
            Err(err) => {
                log::error!("{err}");
                return None;
            }
        };

        let artifact = PackageArtifact {
            kind: PackageKind::Installer,
            path,
        };
        if let Err(err) = print_locked(console, &artifact.summary()) {
            log::warn!("failed to print installer summary: {err}");
        }
        Some(artifact)
    }

    /// Run the portable job and, when available, the installer job on
    /// parallel threads sharing `console`.
    ///
    /// # Errors
    ///
    /// Fails when the portable archive cannot be written or a job panics.
    /// Installer failures are not errors.
    pub fn package<W: Write + Send>(&self, console: &Mutex<W>) -> Result<PackageReport> {
        thread::scope(|scope| {
            let portable_job = scope.spawn(|| self.create_portable(console));
            let installer_job = self
                .installer
                .is_some()
                .then(|| scope.spawn(|| self.create_app_installer(console)));

            let portable = portable_job
                .join()
                .map_err(|_| DeployError::WorkerPanicked { job: "portable" });
            let installer = installer_job.map(|job| {
                job.join()
                    .map_err(|_| DeployError::WorkerPanicked { job: "installer" })
            });

            Ok(PackageReport {
                portable: portable??,
                installer: installer.transpose()?.flatten(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandExecutor;
    use crate::installer::MockInstallerGenerator;
    use crate::test_utils::{FakeScanner, failure_output, success_output};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Env {
        _temp: TempDir,
        root: Utf8PathBuf,
    }

    impl Env {
        fn qt(&self) -> QtPaths {
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

        fn layout(&self) -> Layout {
            Layout::new(&self.root.join("src"), &self.root.join("build"), "webcamoid", &self.qt())
        }

        fn config(&self) -> DeployConfig {
            let mut config = DeployConfig::default();
            config.deploy.sysconf_dir = self.root.join("etc");
            config
        }

        fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
            let path = self.root.join(relative);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, contents).expect("write");
            path
        }
    }

    #[fixture]
    fn env() -> Env {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8");
        let env = Env { _temp: temp, root };
        env.write("mingw/qt/qml/QtQuick.2/qmldir", "module QtQuick\n");
        env.write("mingw/qt/plugins/platforms/qwindows.dll", "MZ");
        env.write("mingw/bin/Qt5Gui.dll", "MZ");
        env.write("mingw/bin/libEGL.dll", "MZ");
        env.write("src/StandAlone/share/qml/main.qml", "import QtQuick 2.9\n");
        env.write("etc/os-release", "ID=arch\n");
        env
    }

    /// Executor whose `make install` stages a binary and an import library.
    fn installing_executor(install_dir: Utf8PathBuf) -> MockCommandExecutor {
        let mut executor = MockCommandExecutor::new();
        executor.expect_find_program().returning(|_| None);
        executor
            .expect_run()
            .withf(|inv| inv.args.last().map(String::as_str) == Some("install"))
            .times(1)
            .returning(move |_| -> crate::error::Result<std::process::Output> {
                let bin = install_dir.join("webcamoid/bin");
                std::fs::create_dir_all(&bin)?;
                std::fs::write(bin.join("webcamoid.exe"), b"MZ")?;
                std::fs::write(bin.join("libavkys.a"), b"!<arch>")?;
                Ok(success_output())
            });
        executor
            .expect_run()
            .withf(|inv| inv.program == "git" || inv.program == "wine")
            .returning(|_| Ok(failure_output("not available")));
        executor
    }

    fn scanner(env: &Env) -> FakeScanner {
        FakeScanner::new()
            .with_imports("webcamoid.exe", &["Qt5Gui.dll", "KERNEL32.dll"])
            .with_library("Qt5Gui.dll", env.root.join("mingw/bin/Qt5Gui.dll"))
            .with_library("libEGL.dll", env.root.join("mingw/bin/libEGL.dll"))
            .excluding("KERNEL32.dll")
    }

    fn deploy(
        env: &Env,
        executor: MockCommandExecutor,
        installer: Option<Box<dyn InstallerGenerator>>,
    ) -> Deploy {
        Deploy::from_parts(DeployParts {
            executor: Arc::new(executor),
            config: env.config(),
            layout: env.layout(),
            qt: env.qt(),
            arch: TargetArch::Win64,
            version: "8.8.0".to_owned(),
            make: Utf8PathBuf::from("make"),
            scanner: Box::new(scanner(env)),
            installer,
        })
    }

    #[rstest]
    fn prepare_builds_a_runnable_tree(env: Env) {
        let layout = env.layout();
        let executor = installing_executor(layout.install_dir.clone());
        let mut deploy = deploy(&env, executor, None);

        deploy.prepare().expect("prepare");

        assert!(layout.main_binary().is_file());
        assert!(layout.bin_dir.join("Qt5Gui.dll").is_file());
        assert!(layout.bin_dir.join("libEGL.dll").is_file());
        assert!(layout.qml_dir.join("QtQuick.2/qmldir").is_file());
        assert!(layout.plugins_dir.join("platforms/qwindows.dll").is_file());
        assert!(layout.qt_conf().is_file());
        assert!(layout.launcher().is_file());
        assert!(!layout.bin_dir.join("libavkys.a").exists());
        assert!(layout.pkgs_dir.is_dir());

        let info = std::fs::read_to_string(layout.build_info()).expect("build info");
        assert!(info.starts_with("Commit hash: Unknown\n\nID=arch\n"));
        assert_eq!(deploy.dependencies().len(), 2);
    }

    #[rstest]
    fn package_without_installer_writes_portable_only(env: Env) {
        let deploy = deploy(&env, MockCommandExecutor::new(), None);
        env.write("build/ports/deploy/temp_priv/webcamoid/bin/webcamoid.exe", "MZ");

        let console = Mutex::new(Vec::new());
        let report = deploy.package(&console).expect("package");

        assert!(report.installer.is_none());
        assert!(report.portable.path.is_file());
        let printed = String::from_utf8(console.into_inner().expect("lock")).expect("utf8");
        assert!(printed.starts_with(
            "Created portable package:\n    webcamoid-portable-8.8.0-win64.zip "
        ));
        assert!(!printed.contains("installable"));
    }

    #[rstest]
    fn installer_without_artifact_prints_nothing(env: Env) {
        let mut installer = MockInstallerGenerator::new();
        installer.expect_create().times(1).returning(|| Ok(None));
        let deploy = deploy(&env, MockCommandExecutor::new(), Some(Box::new(installer)));

        let console = Mutex::new(Vec::new());
        assert!(deploy.create_app_installer(&console).is_none());
        assert!(console.into_inner().expect("lock").is_empty());
    }

    #[rstest]
    fn installer_failure_is_not_fatal(env: Env) {
        let mut installer = MockInstallerGenerator::new();
        installer.expect_create().times(1).returning(|| {
            Err(DeployError::InstallerFailed {
                reason: "binarycreator crashed".to_owned(),
            })
        });
        let deploy = deploy(&env, MockCommandExecutor::new(), Some(Box::new(installer)));
        env.write("build/ports/deploy/temp_priv/webcamoid/bin/webcamoid.exe", "MZ");

        let console = Mutex::new(Vec::new());
        let report = deploy.package(&console).expect("portable still succeeds");
        assert!(report.installer.is_none());
    }

    #[rstest]
    fn missing_make_install_target_is_fatal(env: Env) {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .times(1)
            .returning(|_| Ok(failure_output("make: *** No rule to make target 'install'.")));
        let mut deploy = deploy(&env, executor, None);

        let err = deploy.prepare().expect_err("make install fails");
        assert!(matches!(err, DeployError::MakeInstall { .. }));
    }
}
