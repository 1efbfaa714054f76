//! Shared test utilities for the deploy crate.

use crate::error::{DeployError, Result};
use crate::exec::{CommandExecutor, Invocation};
use crate::pecoff::DependencyScanner;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::process::{ExitStatus, Output};
use std::sync::Mutex;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    stdout_output("")
}

/// Creates a successful command `Output` with the given stdout.
#[must_use]
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program to execute (e.g., "git").
    pub program: String,
    /// The arguments to pass to the program.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expect `program` with `args`, answering with `result`.
    pub fn new<I, S>(program: &str, args: I, result: Result<Output>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
            result,
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
/// Every program lookup reports the program as absent.
#[derive(Debug, Default)]
pub struct StubExecutor {
    expected: Mutex<VecDeque<ExpectedCall>>,
    seen: Mutex<Vec<Invocation>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: Mutex::new(expected.into()),
            ..Self::default()
        }
    }

    /// Returns every invocation received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().expect("stub lock poisoned").clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.lock().expect("stub lock poisoned").is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, invocation: &Invocation) -> Result<Output> {
        self.seen
            .lock()
            .map_err(|_| mismatch("invocation log poisoned"))?
            .push(invocation.clone());

        let call = self
            .expected
            .lock()
            .map_err(|_| mismatch("expectation queue poisoned"))?
            .pop_front()
            .ok_or_else(|| mismatch(&format!("unexpected command invocation: {invocation}")))?;

        let expected_args: Vec<&str> = call.args.iter().map(String::as_str).collect();
        if !invocation.matches(&call.program, &expected_args) {
            return Err(mismatch(&format!(
                "expected `{} {}`, got `{invocation}`",
                call.program,
                call.args.join(" ")
            )));
        }

        call.result
    }

    fn find_program(&self, _name: &str) -> Option<Utf8PathBuf> {
        None
    }
}

fn mismatch(message: &str) -> DeployError {
    DeployError::StubMismatch {
        message: message.to_owned(),
    }
}

/// A [`DependencyScanner`] answering from in-memory tables.
///
/// Import tables are keyed by binary file name and library locations by
/// DLL name, both compared without regard to ASCII case. Binaries with no
/// registered imports import nothing.
#[derive(Debug, Default, Clone)]
pub struct FakeScanner {
    imports: BTreeMap<String, Vec<String>>,
    libraries: BTreeMap<String, Utf8PathBuf>,
    excluded: BTreeSet<String>,
}

impl FakeScanner {
    /// Creates a scanner that knows no binaries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the DLLs imported by the binary called `file_name`.
    #[must_use]
    pub fn with_imports(mut self, file_name: &str, imports: &[&str]) -> Self {
        self.imports.insert(
            file_name.to_ascii_lowercase(),
            imports.iter().map(|name| (*name).to_owned()).collect(),
        );
        self
    }

    /// Registers where the DLL called `name` lives on the host.
    #[must_use]
    pub fn with_library(mut self, name: &str, path: impl Into<Utf8PathBuf>) -> Self {
        self.libraries.insert(name.to_ascii_lowercase(), path.into());
        self
    }

    /// Marks `name` as excluded from resolution.
    #[must_use]
    pub fn excluding(mut self, name: &str) -> Self {
        self.excluded.insert(name.to_ascii_lowercase());
        self
    }
}

impl DependencyScanner for FakeScanner {
    fn imports(&self, binary: &Utf8Path) -> Result<Vec<String>> {
        Ok(binary
            .file_name()
            .and_then(|name| self.imports.get(&name.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_default())
    }

    fn locate(&self, name: &str) -> Option<Utf8PathBuf> {
        self.libraries.get(&name.to_ascii_lowercase()).cloned()
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(&name.to_ascii_lowercase())
    }
}
