//! Host package provenance for staged libraries.
//!
//! Each copied dependency is traced back to the host package that owns it
//! so the build-info record can list exact versions. Lookups are
//! best-effort: callers receive a [`LookupError`] describing why no answer
//! exists and decide how to degrade.

use crate::exec::{CommandExecutor, Invocation, stderr_text, stdout_text};
use camino::Utf8Path;
use std::fmt;
use thiserror::Error;

/// A host package name and version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageInfo {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
}

impl PackageInfo {
    fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.trim().to_owned(),
            version: version.trim().to_owned(),
        }
    }
}

impl fmt::Display for PackageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Why a provenance lookup produced no package.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The package manager is not installed.
    #[error("package manager not available")]
    ToolAbsent,
    /// The package manager ran but failed.
    #[error("{tool} failed: {reason}")]
    ToolFailed {
        /// Package manager name.
        tool: &'static str,
        /// Captured stderr or spawn error.
        reason: String,
    },
    /// The package manager answered, but not with an owning package.
    #[error("no owning package reported")]
    NoAnswer,
}

/// One package-manager query strategy.
pub trait ProvenanceLookup: Send + Sync {
    /// Package manager executable name.
    fn tool(&self) -> &'static str;

    /// Find the package owning `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::ToolAbsent`] when the package manager is not
    /// installed, [`LookupError::ToolFailed`] when it fails, and
    /// [`LookupError::NoAnswer`] when its output names no package.
    fn lookup(
        &self,
        executor: &dyn CommandExecutor,
        path: &Utf8Path,
    ) -> Result<PackageInfo, LookupError>;
}

/// Run `tool` with `args` under `LC_ALL=C` and return its stdout.
fn query(
    executor: &dyn CommandExecutor,
    tool: &'static str,
    args: &[&str],
) -> Result<String, LookupError> {
    let program = executor.find_program(tool).ok_or(LookupError::ToolAbsent)?;
    let invocation = Invocation::new(program.as_str())
        .args(args.iter().copied())
        .with_env("LC_ALL", "C");

    let output = executor
        .run(&invocation)
        .map_err(|e| LookupError::ToolFailed {
            tool,
            reason: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(LookupError::ToolFailed {
            tool,
            reason: stderr_text(&output),
        });
    }
    Ok(stdout_text(&output))
}

/// Arch Linux: `pacman -Qo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pacman;

impl ProvenanceLookup for Pacman {
    fn tool(&self) -> &'static str {
        "pacman"
    }

    fn lookup(
        &self,
        executor: &dyn CommandExecutor,
        path: &Utf8Path,
    ) -> Result<PackageInfo, LookupError> {
        let stdout = query(executor, self.tool(), &["-Qo", path.as_str()])?;
        parse_pacman_owner(&stdout).ok_or(LookupError::NoAnswer)
    }
}

/// `<path> is owned by <name> <version>`: the last two tokens.
fn parse_pacman_owner(stdout: &str) -> Option<PackageInfo> {
    let mut tokens = stdout.split_whitespace().rev();
    let version = tokens.next()?;
    let name = tokens.next()?;
    Some(PackageInfo::new(name, version))
}

/// Debian: `dpkg -S` for the owner, then `dpkg -s` for its version.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dpkg;

impl ProvenanceLookup for Dpkg {
    fn tool(&self) -> &'static str {
        "dpkg"
    }

    fn lookup(
        &self,
        executor: &dyn CommandExecutor,
        path: &Utf8Path,
    ) -> Result<PackageInfo, LookupError> {
        let owner = query(executor, self.tool(), &["-S", path.as_str()])?;
        let name = owner
            .split(':')
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(LookupError::NoAnswer)?;

        let status = query(executor, self.tool(), &["-s", name])?;
        status
            .lines()
            .find_map(|line| line.trim().strip_prefix("Version:"))
            .and_then(|rest| rest.split_whitespace().next())
            .map(|version| PackageInfo::new(name, version))
            .ok_or(LookupError::NoAnswer)
    }
}

/// Fedora and friends: `rpm -qf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rpm;

impl ProvenanceLookup for Rpm {
    fn tool(&self) -> &'static str {
        "rpm"
    }

    fn lookup(
        &self,
        executor: &dyn CommandExecutor,
        path: &Utf8Path,
    ) -> Result<PackageInfo, LookupError> {
        let stdout = query(
            executor,
            self.tool(),
            &["-qf", "--queryformat", "%{NAME} %{VERSION}", path.as_str()],
        )?;
        stdout
            .split_once(char::is_whitespace)
            .map(|(name, version)| PackageInfo::new(name, version))
            .filter(|info| !info.name.is_empty() && !info.version.is_empty())
            .ok_or(LookupError::NoAnswer)
    }
}

/// Ordered provenance strategies sharing one executor.
pub struct ProvenanceResolver<'a> {
    executor: &'a dyn CommandExecutor,
    strategies: Vec<Box<dyn ProvenanceLookup>>,
}

impl<'a> ProvenanceResolver<'a> {
    /// pacman, then dpkg, then rpm.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self::with_strategies(executor, vec![Box::new(Pacman), Box::new(Dpkg), Box::new(Rpm)])
    }

    /// Use a custom strategy order.
    #[must_use]
    pub fn with_strategies(
        executor: &'a dyn CommandExecutor,
        strategies: Vec<Box<dyn ProvenanceLookup>>,
    ) -> Self {
        Self {
            executor,
            strategies,
        }
    }

    /// Ask the first strategy whose tool is installed. Its answer is final,
    /// even when it is an error.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::ToolAbsent`] when no strategy's tool is
    /// installed, otherwise the first available strategy's error.
    pub fn lookup(&self, path: &Utf8Path) -> Result<PackageInfo, LookupError> {
        for strategy in &self.strategies {
            match strategy.lookup(self.executor, path) {
                Err(LookupError::ToolAbsent) => continue,
                answer => return answer,
            }
        }
        Err(LookupError::ToolAbsent)
    }

    /// `"name version"` of the package owning `path`, or the empty string
    /// when there is no answer.
    #[must_use]
    pub fn search_package_for(&self, path: &Utf8Path) -> String {
        match self.lookup(path) {
            Ok(info) => info.to_string(),
            Err(err) => {
                log::debug!("no package for {path}: {err}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandExecutor;
    use crate::test_utils::{failure_output, stdout_output};
    use camino::Utf8PathBuf;
    use mockall::Sequence;
    use rstest::rstest;

    const ZLIB: &str = "/usr/x86_64-w64-mingw32/bin/zlib1.dll";

    fn only_tool(executor: &mut MockCommandExecutor, tool: &'static str) {
        executor
            .expect_find_program()
            .returning(move |name| {
                (name == tool).then(|| Utf8PathBuf::from(format!("/usr/bin/{tool}")))
            });
    }

    #[rstest]
    #[case::owned(
        "/usr/x86_64-w64-mingw32/bin/zlib1.dll is owned by mingw-w64-zlib 1.2.13-1",
        Some(("mingw-w64-zlib", "1.2.13-1"))
    )]
    #[case::too_short("error", None)]
    fn pacman_output_takes_last_two_tokens(
        #[case] stdout: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        assert_eq!(
            parse_pacman_owner(stdout),
            expected.map(|(name, version)| PackageInfo::new(name, version))
        );
    }

    #[test]
    fn pacman_lookup_sets_c_locale() {
        let mut executor = MockCommandExecutor::new();
        only_tool(&mut executor, "pacman");
        executor
            .expect_run()
            .withf(|inv| {
                inv.matches("/usr/bin/pacman", &["-Qo", ZLIB])
                    && inv.env.get("LC_ALL").map(String::as_str) == Some("C")
            })
            .times(1)
            .returning(|_| Ok(stdout_output("/x is owned by mingw-w64-zlib 1.2.13-1\n")));

        let resolver = ProvenanceResolver::new(&executor);
        assert_eq!(resolver.search_package_for(Utf8Path::new(ZLIB)), "mingw-w64-zlib 1.2.13-1");
    }

    #[test]
    fn dpkg_lookup_queries_owner_then_status() {
        let mut executor = MockCommandExecutor::new();
        only_tool(&mut executor, "dpkg");
        let mut seq = Sequence::new();
        executor
            .expect_run()
            .withf(|inv| inv.matches("/usr/bin/dpkg", &["-S", ZLIB]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(stdout_output(&format!("mingw-w64-x86-64-dev: {ZLIB}\n"))));
        executor
            .expect_run()
            .withf(|inv| inv.matches("/usr/bin/dpkg", &["-s", "mingw-w64-x86-64-dev"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(stdout_output(
                    "Package: mingw-w64-x86-64-dev\nStatus: install ok installed\nVersion: 10.0.0-3\n",
                ))
            });

        let info = ProvenanceResolver::new(&executor)
            .lookup(Utf8Path::new(ZLIB))
            .expect("dpkg answers");
        assert_eq!(info.to_string(), "mingw-w64-x86-64-dev 10.0.0-3");
    }

    #[test]
    fn rpm_lookup_uses_query_format() {
        let mut executor = MockCommandExecutor::new();
        only_tool(&mut executor, "rpm");
        executor
            .expect_run()
            .withf(|inv| {
                inv.matches(
                    "/usr/bin/rpm",
                    &["-qf", "--queryformat", "%{NAME} %{VERSION}", ZLIB],
                )
            })
            .times(1)
            .returning(|_| Ok(stdout_output("mingw64-zlib 1.2.13")));

        let info = ProvenanceResolver::new(&executor)
            .lookup(Utf8Path::new(ZLIB))
            .expect("rpm answers");
        assert_eq!(info, PackageInfo::new("mingw64-zlib", "1.2.13"));
    }

    #[test]
    fn first_available_tool_is_final() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_find_program()
            .returning(|name| Some(Utf8PathBuf::from(format!("/usr/bin/{name}"))));
        executor
            .expect_run()
            .withf(|inv| inv.program == "/usr/bin/pacman")
            .times(1)
            .returning(|_| Ok(failure_output("error: No package owns /x")));

        let err = ProvenanceResolver::new(&executor)
            .lookup(Utf8Path::new("/x"))
            .expect_err("pacman failure is final");
        assert!(matches!(err, LookupError::ToolFailed { tool: "pacman", .. }));
    }

    #[test]
    fn no_tools_yields_empty_string() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_find_program().returning(|_| None);
        executor.expect_run().never();

        let resolver = ProvenanceResolver::new(&executor);
        assert_eq!(
            resolver.lookup(Utf8Path::new(ZLIB)),
            Err(LookupError::ToolAbsent)
        );
        assert_eq!(resolver.search_package_for(Utf8Path::new(ZLIB)), "");
    }

    #[test]
    fn dpkg_without_version_line_has_no_answer() {
        let mut executor = MockCommandExecutor::new();
        only_tool(&mut executor, "dpkg");
        let mut seq = Sequence::new();
        executor
            .expect_run()
            .withf(|inv| inv.matches("/usr/bin/dpkg", &["-S", "/x"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(stdout_output("zlib1g:amd64: /x\n")));
        executor
            .expect_run()
            .withf(|inv| inv.matches("/usr/bin/dpkg", &["-s", "zlib1g"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(stdout_output("Package: zlib1g\n")));

        let err = ProvenanceResolver::new(&executor)
            .lookup(Utf8Path::new("/x"))
            .expect_err("no version");
        assert_eq!(err, LookupError::NoAnswer);
    }
}
