//! Console summaries of finished packages.

use crate::error::Result;
use camino::Utf8Path;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::sync::Mutex;

const UNITS: [&str; 3] = ["MiB", "GiB", "TiB"];

/// Format a byte count for humans.
///
/// Sizes below 1024 are printed in bytes; larger sizes use the biggest
/// binary unit not exceeding them, up to TiB, with two decimals.
///
/// # Examples
///
/// ```
/// use webcamoid_deploy::summary::human_size;
///
/// assert_eq!(human_size(0), "0 B");
/// assert_eq!(human_size(1023), "1023 B");
/// assert_eq!(human_size(1024), "1.00 KiB");
/// assert_eq!(human_size(1536 * 1024), "1.50 MiB");
/// ```
#[must_use]
pub fn human_size(size: u64) -> String {
    if size < 1024 {
        return format!("{size} B");
    }

    let mut divisor: u64 = 1024;
    let mut unit = "KiB";
    for next in UNITS {
        match divisor.checked_mul(1024) {
            Some(bigger) if size >= bigger => {
                divisor = bigger;
                unit = next;
            }
            _ => break,
        }
    }

    format!("{:.2} {unit}", scaled(size, divisor))
}

#[expect(
    clippy::cast_precision_loss,
    clippy::float_arithmetic,
    reason = "display rounds to two decimals"
)]
fn scaled(size: u64, divisor: u64) -> f64 {
    size as f64 / divisor as f64
}

/// Lower-case hex SHA-256 of the file at `path`.
///
/// # Errors
///
/// Returns [`crate::error::DeployError::Io`] when the file cannot be read.
pub fn compute_sha256(path: &Utf8Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Size and checksum lines for the package at `path`, or a `FAILED` line
/// when it does not exist.
#[must_use]
pub fn package_info(path: &Utf8Path) -> String {
    let name = path.file_name().unwrap_or(path.as_str());
    let details = fs::metadata(path)
        .ok()
        .filter(fs::Metadata::is_file)
        .and_then(|meta| compute_sha256(path).ok().map(|hash| (meta.len(), hash)));

    match details {
        Some((size, hash)) => {
            format!("    {name} {}\n    sha256sum: {hash}\n", human_size(size))
        }
        None => format!("    {name} FAILED\n"),
    }
}

/// Write `text` to the shared console in one locked write.
///
/// # Errors
///
/// Returns [`crate::error::DeployError::Io`] when writing fails. A poisoned
/// lock is recovered: the guarded writer holds no invariant.
pub fn print_locked<W: Write>(console: &Mutex<W>, text: &str) -> Result<()> {
    let mut out = console
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}
