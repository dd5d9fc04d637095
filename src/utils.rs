//! Utility functions for common operations
//!
//! Size formatting, progress bar construction and atomic file writes shared
//! by the Drive driver, the local `squeeze` command and the token cache.

use crate::constants::{BYTES_PER_MB, PROGRESS_BAR_WIDTH};
use crate::error::{Result, SqueezeError};
use crate::logger;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const PROGRESS_SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";

/// Convert a `--max-size` value in megabytes into a byte budget.
///
/// Uses binary megabytes (1 MB = 1024 * 1024 bytes). Non-positive or
/// non-finite values are rejected.
pub fn mb_to_bytes(megabytes: f64) -> Result<u64> {
    if !megabytes.is_finite() || megabytes <= 0.0 {
        return Err(SqueezeError::InvalidOption(format!(
            "max size must be a positive number of megabytes, got {}",
            megabytes
        )));
    }
    let bytes = (megabytes * BYTES_PER_MB).floor() as u64;
    if bytes == 0 {
        return Err(SqueezeError::InvalidTarget(0));
    }
    Ok(bytes)
}

/// Create a progress spinner with consistent styling
///
/// Hidden in quiet and verbose mode.
pub fn create_progress_spinner(message: &str) -> ProgressBar {
    if logger::is_quiet() || logger::is_verbose() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(PROGRESS_SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb
}

/// Create the per-file progress bar used by the folder driver.
///
/// A hidden bar is returned in quiet mode so callers never branch on it.
pub fn create_progress_bar(len: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let template = format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:{}.cyan/blue}}] {{pos}}/{{len}} {{msg}}",
        PROGRESS_BAR_WIDTH
    );
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers never observe a half-written file.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| SqueezeError::Io(e.error))?;
    Ok(())
}

/// Format file size in human-readable format
///
/// # Arguments
/// * `bytes` - Size in bytes
///
/// # Returns
/// * Human-readable size string (e.g., "1.2 MB", "512 KB")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Calculate compression ratio as a percentage
///
/// Positive means reduction, negative means the output grew.
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
}
