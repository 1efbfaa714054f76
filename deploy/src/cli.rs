//! CLI argument definitions for the Webcamoid Windows deploy tool.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::pipeline::DeployOptions;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;

/// Package a MinGW cross-compiled Webcamoid build for Windows.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "webcamoid-deploy")]
#[command(version, about)]
#[command(long_about = concat!(
    "Package a MinGW cross-compiled Webcamoid build for Windows.\n\n",
    "The tool runs `make install` into a private staging tree, copies the Qt ",
    "plugins, QML modules and DLLs the application needs, writes qt.conf, a ",
    "batch launcher and a build-info record, then produces a portable zip and, ",
    "when the Qt Installer Framework is available, an installer executable.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Deploy from a source tree built in place:\n",
    "    $ webcamoid-deploy --root-dir ~/src/webcamoid\n\n",
    "  Deploy an out-of-tree build as a nightly:\n",
    "    $ webcamoid-deploy -r ~/src/webcamoid -b ~/build/webcamoid --daily\n\n",
    "  Rebuild the packages from an existing staging tree:\n",
    "    $ webcamoid-deploy -r ~/src/webcamoid --package-only",
))]
pub struct Cli {
    /// Source checkout root [default: current directory].
    #[arg(short, long, value_name = "DIR")]
    pub root_dir: Option<Utf8PathBuf>,

    /// Completed build directory [default: the source root].
    #[arg(short, long, value_name = "DIR")]
    pub build_dir: Option<Utf8PathBuf>,

    /// Deploy configuration file [default: <root>/ports/deploy/deploy.toml].
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Version the packages as `daily` instead of the project version.
    #[arg(long)]
    pub daily: bool,

    /// Build the staging tree without packaging it.
    #[arg(long, conflicts_with = "package_only")]
    pub prepare_only: bool,

    /// Package an existing staging tree without rebuilding it.
    #[arg(long, conflicts_with = "prepare_only")]
    pub package_only: bool,

    /// Increase log verbosity.
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Cli {
    /// Resolve the deploy options against `current_dir`.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use clap::Parser;
    /// use webcamoid_deploy::cli::Cli;
    ///
    /// let cli = Cli::parse_from(["webcamoid-deploy", "-r", "webcamoid", "--daily"]);
    /// let options = cli.deploy_options(Utf8Path::new("/src"));
    /// assert_eq!(options.root_dir, "/src/webcamoid");
    /// assert_eq!(options.build_dir, "/src/webcamoid");
    /// assert!(options.daily);
    /// ```
    #[must_use]
    pub fn deploy_options(&self, current_dir: &Utf8Path) -> DeployOptions {
        let root_dir = self
            .root_dir
            .as_ref()
            .map_or_else(|| current_dir.to_owned(), |dir| current_dir.join(dir));
        let build_dir = self
            .build_dir
            .as_ref()
            .map_or_else(|| root_dir.clone(), |dir| current_dir.join(dir));

        DeployOptions {
            config_path: self.config.as_ref().map(|path| current_dir.join(path)),
            daily: self.daily,
            root_dir,
            build_dir,
        }
    }

    /// Default log filter directive for the requested verbosity.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbosity) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }

    /// Whether the staging tree should be rebuilt.
    #[must_use]
    pub const fn should_prepare(&self) -> bool {
        !self.package_only
    }

    /// Whether packages should be produced.
    #[must_use]
    pub const fn should_package(&self) -> bool {
        !self.prepare_only
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
