use crate::constants::{MAX_FILE_SIZE, MAX_IMAGE_DIMENSION};
use crate::error::{Result, SqueezeError};
use std::fs;
use std::path::Path;

/// Validate a local input file for the `squeeze` command
pub fn validate_input_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SqueezeError::FileNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(SqueezeError::InvalidOption(format!(
            "input path is not a file: {}",
            path.display()
        )));
    }

    let metadata =
        fs::metadata(path).map_err(|_| SqueezeError::FileNotFound(path.to_path_buf()))?;
    validate_file_size(metadata.len())
}

/// Refuse to overwrite the input in place from the `squeeze` command.
pub fn validate_output_path(input: &Path, output: &Path) -> Result<()> {
    let same = match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same {
        return Err(SqueezeError::InvalidOption(
            "output path must differ from input path".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_file_size(size: u64) -> Result<()> {
    if size > MAX_FILE_SIZE {
        return Err(SqueezeError::FileTooLarge(size, MAX_FILE_SIZE));
    }
    Ok(())
}

/// Guard against decompression bombs before allocating pixels
pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 || width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(SqueezeError::InvalidDimensions(
            width,
            height,
            MAX_IMAGE_DIMENSION,
        ));
    }
    Ok(())
}
