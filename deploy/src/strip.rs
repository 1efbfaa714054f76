//! Symbol stripping for staged PE binaries.

use crate::error::Result;
use crate::exec::{CommandExecutor, Invocation, stderr_text};
use crate::pecoff::pe_files;
use camino::{Utf8Path, Utf8PathBuf};

/// Runs the MinGW `strip` over staged binaries.
pub struct SymbolStripper<'a> {
    executor: &'a dyn CommandExecutor,
    strip: Option<Utf8PathBuf>,
}

impl<'a> SymbolStripper<'a> {
    /// Use `strip` when given, else look up `<triplet>-strip` on the
    /// executor's search path.
    #[must_use]
    pub fn detect(
        executor: &'a dyn CommandExecutor,
        configured: Option<&Utf8Path>,
        triplet: &str,
    ) -> Self {
        let strip = configured
            .map(Utf8Path::to_owned)
            .or_else(|| executor.find_program(&format!("{triplet}-strip")));
        Self { executor, strip }
    }

    /// The strip binary in use, if any.
    #[must_use]
    pub fn tool(&self) -> Option<&Utf8Path> {
        self.strip.as_deref()
    }

    /// Strip every `.exe` and `.dll` under `dir`. Returns the number of
    /// files stripped.
    ///
    /// A missing tool skips stripping with a warning. Files that fail to
    /// strip are logged and the rest continue.
    ///
    /// # Errors
    ///
    /// Returns an error only when `dir` cannot be walked.
    pub fn strip_symbols(&self, dir: &Utf8Path) -> Result<usize> {
        let Some(strip) = &self.strip else {
            log::warn!("strip not found; binaries keep their symbols");
            return Ok(0);
        };

        let mut stripped = 0;
        for binary in pe_files(dir)? {
            let invocation = Invocation::new(strip.as_str())
                .arg("--strip-unneeded")
                .arg(binary.as_str());
            match self.executor.run(&invocation) {
                Ok(output) if output.status.success() => stripped += 1,
                Ok(output) => log::warn!("failed to strip {binary}: {}", stderr_text(&output)),
                Err(err) => log::warn!("failed to strip {binary}: {err}"),
            }
        }
        Ok(stripped)
    }
}
