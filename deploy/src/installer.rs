//! Installer generation with Qt Installer Framework.
//!
//! [`QtIfwGenerator`] lays out an offline IFW repository next to the
//! staged tree (`installer/config` and `installer/packages`) and hands it
//! to `binarycreator`.

use crate::config::InstallerConfig;
use crate::error::{DeployError, Result};
use crate::exec::{CommandExecutor, Invocation, stderr_text};
use crate::layout::{Layout, TargetArch};
use crate::qt::QtIfw;
use crate::staging::{copy_file, copy_tree, ensure_dir, recreate_dir};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// Produces an installer executable from the staged tree.
#[cfg_attr(test, mockall::automock)]
pub trait InstallerGenerator: Send + Sync {
    /// Build the installer.
    ///
    /// Returns `Ok(Some(path))` when an installer was written and `Ok(None)`
    /// when the tool ran but produced nothing.
    ///
    /// # Errors
    ///
    /// Returns an error when the installer inputs cannot be prepared or the
    /// tool fails.
    fn create(&self) -> Result<Option<Utf8PathBuf>>;

    /// Where the installer will be written.
    fn output_path(&self) -> Utf8PathBuf;
}

/// Escape text for inclusion in XML element content or attributes.
///
/// # Examples
///
/// ```
/// use webcamoid_deploy::installer::xml_escape;
///
/// assert_eq!(xml_escape("Tom & \"Jerry\" <3"), "Tom &amp; &quot;Jerry&quot; &lt;3");
/// ```
#[must_use]
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Values substituted into the IFW configuration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerSettings {
    /// Installer metadata from the deploy config.
    pub metadata: InstallerConfig,
    /// Program version shown by the installer.
    pub version: String,
    /// Target architecture.
    pub arch: TargetArch,
    /// Detected Qt IFW installation.
    pub ifw: QtIfw,
    /// Release date, `YYYY-MM-DD`.
    pub release_date: String,
}

impl InstallerSettings {
    /// Default installation directory, e.g. `@ApplicationsDirX64@/webcamoid`.
    #[must_use]
    pub fn target_dir(&self, program_name: &str) -> String {
        format!(
            "{}/{program_name}",
            self.arch.ifw_applications_dir(&self.ifw.version)
        )
    }
}

/// Render `config/config.xml`.
#[must_use]
pub fn config_xml(settings: &InstallerSettings, program_name: &str) -> String {
    let meta = &settings.metadata;
    let title = xml_escape(&meta.title);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Installer>
    <Name>{title}</Name>
    <Version>{version}</Version>
    <Title>{title}</Title>
    <Publisher>{publisher}</Publisher>
    <ProductUrl>{url}</ProductUrl>
    <InstallerWindowIcon>{program}</InstallerWindowIcon>
    <InstallerApplicationIcon>{program}</InstallerApplicationIcon>
    <TargetDir>{target_dir}</TargetDir>
    <StartMenuDir>{title}</StartMenuDir>
    <RunProgram>@TargetDir@/bin/{program}.exe</RunProgram>
    <RunProgramDescription>Launch {title} now!</RunProgramDescription>
</Installer>
"#,
        version = xml_escape(&settings.version),
        publisher = xml_escape(&meta.publisher),
        url = xml_escape(&meta.product_url),
        program = xml_escape(program_name),
        target_dir = xml_escape(&settings.target_dir(program_name)),
    )
}

/// Render `packages/<id>/meta/package.xml`.
#[must_use]
pub fn package_xml(settings: &InstallerSettings, has_license: bool, has_script: bool) -> String {
    let meta = &settings.metadata;
    let mut optional = String::new();
    if has_license {
        optional.push_str(concat!(
            "    <Licenses>\n",
            "        <License name=\"GNU General Public License v3.0\" file=\"COPYING.txt\" />\n",
            "    </Licenses>\n",
        ));
    }
    if has_script {
        optional.push_str("    <Script>installscript.qs</Script>\n");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Package>
    <DisplayName>{title}</DisplayName>
    <Description>{description}</Description>
    <Version>{version}</Version>
    <ReleaseDate>{date}</ReleaseDate>
    <Name>{id}</Name>
{optional}    <Default>true</Default>
    <ForcedInstallation>true</ForcedInstallation>
</Package>
"#,
        title = xml_escape(&meta.title),
        description = xml_escape(&meta.description),
        version = xml_escape(&settings.version),
        date = xml_escape(&settings.release_date),
        id = xml_escape(&meta.package_id),
    )
}

/// [`InstallerGenerator`] driving Qt IFW's `binarycreator`.
pub struct QtIfwGenerator {
    executor: Arc<dyn CommandExecutor>,
    layout: Layout,
    settings: InstallerSettings,
}

impl QtIfwGenerator {
    /// Create a generator for the staged `layout`.
    #[must_use]
    pub const fn new(
        executor: Arc<dyn CommandExecutor>,
        layout: Layout,
        settings: InstallerSettings,
    ) -> Self {
        Self {
            executor,
            layout,
            settings,
        }
    }

    fn write(path: &Utf8Path, contents: &str) -> Result<()> {
        std::fs::write(path, contents).map_err(|source| DeployError::WriteFailed {
            path: path.to_owned(),
            source,
        })
    }

    /// Copy `src` to `dst` when it exists. Returns whether it was copied.
    fn copy_optional(src: &Utf8Path, dst: &Utf8Path) -> Result<bool> {
        if !src.is_file() {
            log::debug!("installer input {src} not found");
            return Ok(false);
        }
        copy_file(src, dst)?;
        Ok(true)
    }

    /// Lay out the IFW configuration and package directories.
    ///
    /// # Errors
    ///
    /// Returns an error when any input cannot be written or copied.
    pub fn prepare_inputs(&self) -> Result<()> {
        let layout = &self.layout;
        let program = &layout.program_name;

        recreate_dir(&layout.installer_config_dir)?;
        recreate_dir(&layout.installer_packages_dir)?;

        Self::write(
            &layout.installer_config_dir.join("config.xml"),
            &config_xml(&self.settings, program),
        )?;
        Self::copy_optional(
            &layout.app_icon(self.settings.metadata.icon_size),
            &layout.installer_config_dir.join(format!("{program}.ico")),
        )?;

        let package_dir = layout
            .installer_packages_dir
            .join(&self.settings.metadata.package_id);
        let meta_dir = package_dir.join("meta");
        let data_dir = package_dir.join("data");
        ensure_dir(&meta_dir)?;
        ensure_dir(&data_dir)?;

        let has_license =
            Self::copy_optional(&layout.license_file(), &meta_dir.join("COPYING.txt"))?;
        let has_script =
            Self::copy_optional(&layout.installer_script(), &meta_dir.join("installscript.qs"))?;
        Self::copy_optional(&layout.changelog(), &meta_dir.join("ChangeLog"))?;
        Self::write(
            &meta_dir.join("package.xml"),
            &package_xml(&self.settings, has_license, has_script),
        )?;

        copy_tree(&layout.root_install_dir, &data_dir)
    }
}

impl InstallerGenerator for QtIfwGenerator {
    fn create(&self) -> Result<Option<Utf8PathBuf>> {
        self.prepare_inputs()?;

        let out_package = self.output_path();
        if let Some(pkgs_dir) = out_package.parent() {
            ensure_dir(pkgs_dir)?;
        }

        let invocation = Invocation::new(self.settings.ifw.binarycreator.as_str())
            .arg("--offline-only")
            .arg("-c")
            .arg(self.layout.installer_config_dir.join("config.xml").as_str())
            .arg("-p")
            .arg(self.layout.installer_packages_dir.as_str())
            .arg(out_package.as_str());

        log::debug!("running {invocation}");
        let output = self
            .executor
            .run(&invocation)
            .map_err(|e| DeployError::InstallerFailed {
                reason: format!("could not run binarycreator: {e}"),
            })?;
        if !output.status.success() {
            return Err(DeployError::InstallerFailed {
                reason: stderr_text(&output),
            });
        }

        Ok(out_package.is_file().then_some(out_package))
    }

    fn output_path(&self) -> Utf8PathBuf {
        self.layout
            .installer_package(&self.settings.version, self.settings.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandExecutor;
    use crate::qt::QtPaths;
    use crate::test_utils::{failure_output, success_output};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    fn settings(ifw_version: &str) -> InstallerSettings {
        InstallerSettings {
            metadata: InstallerConfig::default(),
            version: "8.8.0".to_owned(),
            arch: TargetArch::Win64,
            ifw: QtIfw {
                binarycreator: Utf8PathBuf::from("/opt/ifw/bin/binarycreator"),
                version: ifw_version.to_owned(),
            },
            release_date: "2026-10-16".to_owned(),
        }
    }

    struct Workspace {
        _temp: TempDir,
        layout: Layout,
    }

    #[fixture]
    fn workspace() -> Workspace {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8");
        let qt = QtPaths {
            prefix: "/qt".into(),
            bins: "/qt/bin".into(),
            libs: "/qt/lib".into(),
            archdata: "/qt".into(),
            qml: "/qt/qml".into(),
            plugins: "/qt/plugins".into(),
        };
        let layout = Layout::new(&root.join("src"), &root.join("build"), "webcamoid", &qt);
        std::fs::create_dir_all(&layout.bin_dir).expect("mkdir");
        std::fs::write(layout.main_binary(), b"MZ").expect("write");
        std::fs::create_dir_all(&layout.root_dir).expect("mkdir");
        std::fs::write(layout.license_file(), "GPL").expect("write");
        Workspace { _temp: temp, layout }
    }

    fn ifw_generator(executor: MockCommandExecutor, workspace: &Workspace) -> QtIfwGenerator {
        QtIfwGenerator::new(Arc::new(executor), workspace.layout.clone(), settings("3.2.2"))
    }

    #[rstest]
    #[case::legacy_ifw("2.0.5", "<TargetDir>@ApplicationsDir@/webcamoid</TargetDir>")]
    #[case::modern_ifw("3.2.2", "<TargetDir>@ApplicationsDirX64@/webcamoid</TargetDir>")]
    fn config_xml_target_dir_tracks_ifw_version(#[case] version: &str, #[case] expected: &str) {
        let xml = config_xml(&settings(version), "webcamoid");
        assert!(xml.contains(expected));
        assert!(xml.contains("<RunProgram>@TargetDir@/bin/webcamoid.exe</RunProgram>"));
    }

    #[test]
    fn package_xml_escapes_metadata() {
        let mut with_markup = settings("3.0.0");
        with_markup.metadata.description = "Webcam <effects> & more".to_owned();
        let xml = package_xml(&with_markup, true, false);
        assert!(xml.contains("<Description>Webcam &lt;effects&gt; &amp; more</Description>"));
        assert!(xml.contains("file=\"COPYING.txt\""));
        assert!(!xml.contains("<Script>"));
    }

    #[rstest]
    fn prepare_inputs_copies_staged_tree(workspace: Workspace) {
        let generator = ifw_generator(MockCommandExecutor::new(), &workspace);
        generator.prepare_inputs().expect("inputs");

        let package = workspace
            .layout
            .installer_packages_dir
            .join("com.webcamoidprj.webcamoid");
        assert!(workspace.layout.installer_config_dir.join("config.xml").is_file());
        assert!(package.join("meta/package.xml").is_file());
        assert!(package.join("meta/COPYING.txt").is_file());
        assert!(!package.join("meta/installscript.qs").exists());
        assert!(package.join("data/bin/webcamoid.exe").is_file());
    }

    #[rstest]
    fn create_without_artifact_returns_none(workspace: Workspace) {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|inv| {
                inv.program == "/opt/ifw/bin/binarycreator"
                    && inv.args.first().map(String::as_str) == Some("--offline-only")
            })
            .times(1)
            .returning(|_| Ok(success_output()));

        let generator = ifw_generator(executor, &workspace);
        assert_eq!(generator.create().expect("tool ran"), None);
    }

    #[rstest]
    fn create_returns_written_installer(workspace: Workspace) {
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().times(1).returning(|inv| {
            let out = inv.args.last().cloned().unwrap_or_default();
            std::fs::write(out, b"MZ installer")?;
            Ok(success_output())
        });

        let generator = ifw_generator(executor, &workspace);
        let path = generator.create().expect("tool ran").expect("artifact");
        assert_eq!(path.file_name(), Some("webcamoid-8.8.0-win64.exe"));
        assert_eq!(path, generator.output_path());
    }

    #[rstest]
    fn tool_failure_is_an_error(workspace: Workspace) {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .times(1)
            .returning(|_| Ok(failure_output("Invalid config.xml")));

        let generator = ifw_generator(executor, &workspace);
        let err = generator.create().expect_err("tool failed");
        assert!(matches!(
            err,
            DeployError::InstallerFailed { reason } if reason.contains("Invalid")
        ));
    }
}
