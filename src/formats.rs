//! Image format utilities and type-safe format handling
//!
//! Sources are recognised by their magic bytes, never by name, since Drive
//! file names and mime types are user-controlled.

use crate::error::{Result, SqueezeError};
use image::ImageFormat;
use std::fmt;
use std::path::Path;

/// Formats the compressor accepts as input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    WebP,
}

impl SourceFormat {
    /// Sniff the format of encoded image bytes.
    ///
    /// Recognised images without a lossy quality knob (GIF, BMP, TIFF, ...)
    /// are reported as `UnsupportedFormat`; anything unrecognisable is a
    /// `Decode` error.
    pub fn detect(data: &[u8]) -> Result<Self> {
        match image::guess_format(data) {
            Ok(ImageFormat::Jpeg) => Ok(SourceFormat::Jpeg),
            Ok(ImageFormat::Png) => Ok(SourceFormat::Png),
            Ok(ImageFormat::WebP) => Ok(SourceFormat::WebP),
            Ok(other) => Err(SqueezeError::UnsupportedFormat(format!(
                "{:?} has no quality parameter",
                other
            ))),
            Err(_) => Err(SqueezeError::Decode(
                "unrecognized image data".to_string(),
            )),
        }
    }

    /// Map a Drive mime type onto a source format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(SourceFormat::Jpeg),
            "image/png" => Some(SourceFormat::Png),
            "image/webp" => Some(SourceFormat::WebP),
            _ => None,
        }
    }

    pub fn to_image_format(&self) -> ImageFormat {
        match self {
            SourceFormat::Jpeg => ImageFormat::Jpeg,
            SourceFormat::Png => ImageFormat::Png,
            SourceFormat::WebP => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceFormat::Jpeg => "JPEG",
            SourceFormat::Png => "PNG",
            SourceFormat::WebP => "WebP",
        };
        write!(f, "{}", name)
    }
}

/// Formats a compression result can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossy re-encode, the only format with a quality parameter
    Jpeg,
    /// Lossless recompression of a PNG source
    Png,
    /// Only ever a passthrough of a WebP source
    WebP,
}

impl From<SourceFormat> for OutputFormat {
    fn from(source: SourceFormat) -> Self {
        match source {
            SourceFormat::Jpeg => OutputFormat::Jpeg,
            SourceFormat::Png => OutputFormat::Png,
            SourceFormat::WebP => OutputFormat::WebP,
        }
    }
}

impl OutputFormat {
    /// Returns the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Whether a file name already carries an extension for this format
    pub fn matches_name(&self, name: &str) -> bool {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());
        match (self, ext.as_deref()) {
            (OutputFormat::Jpeg, Some("jpg" | "jpeg")) => true,
            (OutputFormat::Png, Some("png")) => true,
            (OutputFormat::WebP, Some("webp")) => true,
            _ => false,
        }
    }

    /// Rename `name` so its extension matches this format.
    pub fn file_name_for(&self, name: &str) -> String {
        if self.matches_name(name) {
            return name.to_string();
        }
        let path = Path::new(name);
        let stem = match path.extension() {
            Some(_) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name),
            None => name,
        };
        format!("{}.{}", stem, self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WebP",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_magic_bytes() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(SourceFormat::detect(&jpeg).unwrap(), SourceFormat::Jpeg);

        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(SourceFormat::detect(&png).unwrap(), SourceFormat::Png);
    }

    #[test]
    fn test_detect_unsupported_formats() {
        let result = SourceFormat::detect(b"GIF89a\x01\x00\x01\x00");
        assert!(matches!(result, Err(SqueezeError::UnsupportedFormat(_))));

        let result = SourceFormat::detect(b"BM\x00\x00\x00\x00\x00\x00");
        assert!(matches!(result, Err(SqueezeError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_detect_garbage_is_decode_error() {
        let result = SourceFormat::detect(b"definitely not an image");
        assert!(matches!(result, Err(SqueezeError::Decode(_))));
    }

    #[test]
    fn test_from_mime_type() {
        assert_eq!(
            SourceFormat::from_mime_type("image/jpeg"),
            Some(SourceFormat::Jpeg)
        );
        assert_eq!(
            SourceFormat::from_mime_type("IMAGE/PNG"),
            Some(SourceFormat::Png)
        );
        assert_eq!(SourceFormat::from_mime_type("image/gif"), None);
        assert_eq!(SourceFormat::from_mime_type("text/plain"), None);
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(format!("{}", OutputFormat::Jpeg), "JPEG");
        assert_eq!(
            OutputFormat::from(SourceFormat::WebP).mime_type(),
            "image/webp"
        );
    }

    #[test]
    fn test_file_name_for() {
        assert_eq!(OutputFormat::Jpeg.file_name_for("photo.JPEG"), "photo.JPEG");
        assert_eq!(OutputFormat::Jpeg.file_name_for("scan.png"), "scan.jpg");
        assert_eq!(
            OutputFormat::Jpeg.file_name_for("holiday.2024.webp"),
            "holiday.2024.jpg"
        );
        assert_eq!(OutputFormat::Jpeg.file_name_for("noext"), "noext.jpg");
        assert_eq!(OutputFormat::Png.file_name_for("icon.png"), "icon.png");
    }
}
