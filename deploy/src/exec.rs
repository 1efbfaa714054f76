//! External command execution.
//!
//! Every subprocess the deploy pipeline starts (make, qmake, objdump, strip,
//! git, wine, package managers, binarycreator) goes through
//! [`CommandExecutor`]. Invocations carry their own working directory and
//! environment overrides so the pipeline never mutates process-wide state.

use crate::error::{DeployError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fmt;
use std::process::{Command, Output};

/// A single program invocation: argument vector, working directory and
/// environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory; the caller's directory when `None`.
    pub current_dir: Option<Utf8PathBuf>,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    /// Start an invocation of `program` with no arguments.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcamoid_deploy::exec::Invocation;
    ///
    /// let invocation = Invocation::new("git")
    ///     .args(["rev-parse", "HEAD"])
    ///     .in_dir("/src/webcamoid")
    ///     .with_env("LC_ALL", "C");
    /// assert_eq!(invocation.to_string(), "git rev-parse HEAD");
    /// assert_eq!(invocation.env.get("LC_ALL").map(String::as_str), Some("C"));
    /// ```
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program from `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for this invocation only.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns true when the program and arguments match exactly.
    #[must_use]
    pub fn matches(&self, program: &str, args: &[&str]) -> bool {
        self.program == program && self.args.iter().map(String::as_str).eq(args.iter().copied())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    /// Runs the invocation and returns its captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    fn run(&self, invocation: &Invocation) -> Result<Output>;

    /// Looks `name` up on the executor's search path.
    ///
    /// Names containing a path separator are treated as paths and returned
    /// when they point at an existing file.
    fn find_program(&self, name: &str) -> Option<Utf8PathBuf>;
}

/// Executes commands on the host system.
///
/// The search path is captured once from `PATH` when the executor is built.
#[derive(Debug, Clone)]
pub struct SystemCommandExecutor {
    search_path: Vec<Utf8PathBuf>,
}

impl SystemCommandExecutor {
    /// Build an executor that searches the current `PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        let search_path = std::env::var_os("PATH")
            .map(|path| {
                std::env::split_paths(&path)
                    .filter_map(|dir| Utf8PathBuf::try_from(dir).ok())
                    .collect()
            })
            .unwrap_or_default();
        Self { search_path }
    }
}

impl Default for SystemCommandExecutor {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, invocation: &Invocation) -> Result<Output> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).envs(&invocation.env);
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir.as_std_path());
        }
        command.output().map_err(DeployError::from)
    }

    fn find_program(&self, name: &str) -> Option<Utf8PathBuf> {
        find_in_dirs(name, &self.search_path)
    }
}

/// Locate an executable file called `name` in `dirs`.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use webcamoid_deploy::exec::find_in_dirs;
///
/// let dirs = vec![Utf8PathBuf::from("/definitely/not/here")];
/// assert!(find_in_dirs("make", &dirs).is_none());
/// ```
#[must_use]
pub fn find_in_dirs(name: &str, dirs: &[Utf8PathBuf]) -> Option<Utf8PathBuf> {
    if name.contains('/') {
        let path = Utf8Path::new(name);
        return is_executable_file(path).then(|| path.to_owned());
    }

    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable_file(candidate))
}

#[cfg(unix)]
fn is_executable_file(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Utf8Path) -> bool {
    path.is_file()
}

/// Returns the trimmed, lossily decoded stdout of a command.
#[must_use]
pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

/// Returns the trimmed, lossily decoded stderr of a command.
#[must_use]
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_owned()
}

/// Runs `invocation` and returns its stdout when it exits successfully.
///
/// Spawn failures and non-zero exits both yield `None`; the reason is
/// logged at debug level.
pub fn run_for_stdout(executor: &dyn CommandExecutor, invocation: &Invocation) -> Option<String> {
    match executor.run(invocation) {
        Ok(output) if output.status.success() => Some(stdout_text(&output)),
        Ok(output) => {
            log::debug!(
                "`{invocation}` exited with {}: {}",
                output.status,
                stderr_text(&output)
            );
            None
        }
        Err(err) => {
            log::debug!("`{invocation}` could not be started: {err}");
            None
        }
    }
}
