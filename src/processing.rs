use crate::constants::{
    DEFAULT_MAX_DOWNSCALES, DEFAULT_MIN_QUALITY, DEFAULT_QUALITY_STEP, DEFAULT_RAISE_STEP,
    DEFAULT_SCALE_FACTOR, DEFAULT_START_QUALITY, LIBDEFLATER_LEVEL, MAX_QUALITY, MIN_QUALITY,
    OXIPNG_PRESET,
};
use crate::error::{Result, SqueezeError};
use crate::formats::{OutputFormat, SourceFormat};
use crate::utils::{
    calculate_compression_ratio, create_progress_spinner, format_file_size, write_atomically,
};
use crate::validation::{validate_dimensions, validate_input_path, validate_output_path};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use oxipng::{Deflaters, Options, StripChunks};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

/// Tuning knobs for the quality search.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOptions {
    /// First quality tried, and the ceiling for upward probing
    pub start_quality: u8,
    /// Lowest quality tried before downscaling
    pub min_quality: u8,
    /// Decrement applied after an attempt overshoots the budget
    pub quality_step: u8,
    /// Increment used to probe back up after a fit; zero disables probing
    pub raise_step: u8,
    /// Pixel scale applied per downscale round, in (0, 1)
    pub scale_factor: f32,
    pub max_downscales: u32,
    /// Try a lossless oxipng pass on PNG sources before re-encoding as JPEG
    pub optimize_png: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            start_quality: DEFAULT_START_QUALITY,
            min_quality: DEFAULT_MIN_QUALITY,
            quality_step: DEFAULT_QUALITY_STEP,
            raise_step: DEFAULT_RAISE_STEP,
            scale_factor: DEFAULT_SCALE_FACTOR,
            max_downscales: DEFAULT_MAX_DOWNSCALES,
            optimize_png: true,
        }
    }
}

impl CompressionOptions {
    /// Build options from optional overrides, falling back to the defaults.
    pub fn new(
        start_quality: Option<u8>,
        min_quality: Option<u8>,
        quality_step: Option<u8>,
        raise_step: Option<u8>,
        scale_factor: Option<f32>,
        max_downscales: Option<u32>,
        optimize_png: bool,
    ) -> Result<Self> {
        let defaults = Self::default();
        let options = Self {
            start_quality: start_quality.unwrap_or(defaults.start_quality),
            min_quality: min_quality.unwrap_or(defaults.min_quality),
            quality_step: quality_step.unwrap_or(defaults.quality_step),
            raise_step: raise_step.unwrap_or(defaults.raise_step),
            scale_factor: scale_factor.unwrap_or(defaults.scale_factor),
            max_downscales: max_downscales.unwrap_or(defaults.max_downscales),
            optimize_png,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        for quality in [self.start_quality, self.min_quality] {
            if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
                return Err(SqueezeError::InvalidQuality(quality));
            }
        }
        if self.min_quality > self.start_quality {
            return Err(SqueezeError::InvalidOption(format!(
                "min quality {} is above start quality {}",
                self.min_quality, self.start_quality
            )));
        }
        if self.quality_step == 0 {
            return Err(SqueezeError::InvalidOption(
                "quality step must be at least 1".to_string(),
            ));
        }
        if !(self.scale_factor > 0.0 && self.scale_factor < 1.0) {
            return Err(SqueezeError::InvalidOption(format!(
                "scale factor must be between 0 and 1 (exclusive), got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }
}

/// Encoded image bytes together with their pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Outcome of [`compress`].
///
/// `achieved_size_bytes` always equals `image.size_bytes()`. When the budget could
/// not be met, `met_goal` is false and the smallest attempt is returned.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub image: EncodedImage,
    pub achieved_size_bytes: u64,
    pub quality_used: u8,
    pub met_goal: bool,
    pub format: OutputFormat,
    /// Number of downscale rounds applied to reach this result
    pub downscales: u32,
    /// The input already fit and was returned untouched
    pub passthrough: bool,
}

struct Attempt {
    image: EncodedImage,
    quality: u8,
    format: OutputFormat,
    downscales: u32,
}

impl Attempt {
    fn size(&self) -> u64 {
        self.image.size_bytes()
    }

    fn finish(self, target_bytes: u64) -> CompressionResult {
        let achieved_size_bytes = self.image.size_bytes();
        CompressionResult {
            met_goal: achieved_size_bytes <= target_bytes,
            achieved_size_bytes,
            quality_used: self.quality,
            format: self.format,
            downscales: self.downscales,
            passthrough: false,
            image: self.image,
        }
    }
}

enum Sweep {
    /// Highest quality found that fits the budget
    Fit(Attempt),
    /// Nothing fit; the smallest attempt of the sweep
    Overshoot(Attempt),
}

/// Compress encoded image bytes to fit within `target_bytes`.
///
/// Runs a bounded quality search (JPEG output), probing back up after the
/// first fit, and downscales the pixels when even `min_quality` overshoots.
/// Inputs already within budget are returned untouched.
///
/// # Errors
/// * `InvalidTarget` / `InvalidQuality` / `InvalidOption` for bad parameters
/// * `UnsupportedFormat` for images without a quality parameter (GIF, BMP, ...)
/// * `Decode` when the bytes are not a valid JPEG, PNG or WebP image
pub fn compress(
    data: &[u8],
    target_bytes: u64,
    options: &CompressionOptions,
) -> Result<CompressionResult> {
    if target_bytes == 0 {
        return Err(SqueezeError::InvalidTarget(target_bytes));
    }
    options.validate()?;

    let source = SourceFormat::detect(data)?;
    let (width, height) = ImageReader::with_format(Cursor::new(data), source.to_image_format())
        .into_dimensions()
        .map_err(|e| SqueezeError::Decode(e.to_string()))?;
    validate_dimensions(width, height)?;

    if data.len() as u64 <= target_bytes {
        debug!("input already within {} bytes, passing through", target_bytes);
        return Ok(CompressionResult {
            image: EncodedImage {
                bytes: data.to_vec(),
                width,
                height,
            },
            achieved_size_bytes: data.len() as u64,
            quality_used: MAX_QUALITY,
            met_goal: true,
            format: source.into(),
            downscales: 0,
            passthrough: true,
        });
    }

    if source == SourceFormat::Png && options.optimize_png {
        match optimize_png(data) {
            Ok(bytes) if bytes.len() as u64 <= target_bytes => {
                debug!("lossless PNG optimization fits: {} bytes", bytes.len());
                let attempt = Attempt {
                    image: EncodedImage {
                        bytes,
                        width,
                        height,
                    },
                    quality: MAX_QUALITY,
                    format: OutputFormat::Png,
                    downscales: 0,
                };
                return Ok(attempt.finish(target_bytes));
            }
            Ok(bytes) => debug!(
                "lossless PNG optimization reached {} bytes, re-encoding as JPEG",
                bytes.len()
            ),
            Err(e) => warn!("PNG optimization failed, re-encoding as JPEG: {}", e),
        }
    }

    let decoded = image::load_from_memory_with_format(data, source.to_image_format())
        .map_err(|e| SqueezeError::Decode(e.to_string()))?;
    let mut pixels = decoded.to_rgb8();
    drop(decoded);

    let mut smallest = match sweep_quality(&pixels, target_bytes, options, 0)? {
        Sweep::Fit(attempt) => return Ok(attempt.finish(target_bytes)),
        Sweep::Overshoot(attempt) => attempt,
    };

    for round in 1..=options.max_downscales {
        let scaled = downscale(&pixels, options.scale_factor);
        if scaled.dimensions() == pixels.dimensions() {
            break;
        }
        pixels = scaled;
        debug!(
            "downscale round {}: {}x{}",
            round,
            pixels.width(),
            pixels.height()
        );

        match sweep_quality(&pixels, target_bytes, options, round)? {
            Sweep::Fit(attempt) => return Ok(attempt.finish(target_bytes)),
            Sweep::Overshoot(attempt) => {
                if attempt.size() < smallest.size() {
                    smallest = attempt;
                }
            }
        }
    }

    Ok(smallest.finish(target_bytes))
}

fn sweep_quality(
    pixels: &RgbImage,
    target_bytes: u64,
    options: &CompressionOptions,
    downscales: u32,
) -> Result<Sweep> {
    let mut quality = options.start_quality;
    let mut lowest_overshoot: Option<u8> = None;
    let mut smallest: Option<Attempt> = None;

    loop {
        let attempt = encode_attempt(pixels, quality, downscales)?;
        debug!("quality {} -> {} bytes", quality, attempt.size());

        if attempt.size() <= target_bytes {
            let best = match lowest_overshoot {
                Some(ceiling) => probe_upwards(pixels, target_bytes, options, attempt, ceiling)?,
                None => attempt,
            };
            return Ok(Sweep::Fit(best));
        }

        lowest_overshoot = Some(quality);
        let keep = match smallest.take() {
            Some(previous) if previous.size() <= attempt.size() => previous,
            _ => attempt,
        };

        if quality <= options.min_quality {
            return Ok(Sweep::Overshoot(keep));
        }
        smallest = Some(keep);
        quality = quality
            .saturating_sub(options.quality_step)
            .max(options.min_quality);
    }
}

/// Climb from a fitting attempt towards `ceiling` (a quality known to
/// overshoot), keeping the last attempt that still fits.
fn probe_upwards(
    pixels: &RgbImage,
    target_bytes: u64,
    options: &CompressionOptions,
    fit: Attempt,
    ceiling: u8,
) -> Result<Attempt> {
    let mut best = fit;
    if options.raise_step == 0 {
        return Ok(best);
    }

    let mut quality = best.quality.saturating_add(options.raise_step);
    while quality < ceiling {
        let attempt = encode_attempt(pixels, quality, best.downscales)?;
        debug!("probing quality {} -> {} bytes", quality, attempt.size());
        if attempt.size() > target_bytes {
            break;
        }
        best = attempt;
        quality = quality.saturating_add(options.raise_step);
    }
    Ok(best)
}

fn encode_attempt(pixels: &RgbImage, quality: u8, downscales: u32) -> Result<Attempt> {
    let bytes = encode_jpeg(pixels, quality)?;
    Ok(Attempt {
        image: EncodedImage {
            bytes,
            width: pixels.width(),
            height: pixels.height(),
        },
        quality,
        format: OutputFormat::Jpeg,
        downscales,
    })
}

/// Encode RGB pixels as a baseline JPEG at the given quality.
pub fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode_image(pixels)?;
    }
    Ok(buf)
}

/// Shrink both dimensions by `factor`, never below one pixel.
pub fn downscale(pixels: &RgbImage, factor: f32) -> RgbImage {
    let width = ((pixels.width() as f32 * factor).round() as u32).max(1);
    let height = ((pixels.height() as f32 * factor).round() as u32).max(1);
    image::imageops::resize(pixels, width, height, FilterType::Lanczos3)
}

/// Lossless PNG recompression with oxipng.
pub fn optimize_png(data: &[u8]) -> Result<Vec<u8>> {
    let mut options = Options::from_preset(OXIPNG_PRESET);
    options.deflate = Deflaters::Libdeflater {
        compression: LIBDEFLATER_LEVEL,
    };
    options.strip = StripChunks::Safe;

    oxipng::optimize_from_memory(data, &options)
        .map_err(|e| SqueezeError::PngOptimization(e.to_string()))
}

/// Compress a local image file to fit `target_bytes` and write the result.
pub fn squeeze_file(
    input: &Path,
    output: &Path,
    target_bytes: u64,
    options: &CompressionOptions,
) -> Result<CompressionResult> {
    crate::status!("🗜️  Compressing image: {:?}", input);
    crate::status!("📁 Output: {:?}", output);

    validate_input_path(input)?;
    validate_output_path(input, output)?;

    let data = fs::read(input)?;
    let original_size = data.len() as u64;
    crate::status!(
        "📊 Original size: {} bytes ({}), target: {}",
        original_size,
        format_file_size(original_size),
        format_file_size(target_bytes)
    );

    let pb = create_progress_spinner("Searching for a quality that fits...");
    let result = compress(&data, target_bytes, options);
    pb.finish_and_clear();
    let result = result?;

    write_atomically(output, &result.image.bytes)?;

    if !result.format.matches_name(&output.to_string_lossy()) {
        warn!(
            "output is {} but {:?} has a different extension",
            result.format, output
        );
    }

    if result.passthrough {
        crate::status!("✅ Already within target, copied unchanged");
    } else {
        crate::status!(
            "📈 Compressed size: {} bytes ({}) at quality {} ({}x{})",
            result.achieved_size_bytes,
            format_file_size(result.achieved_size_bytes),
            result.quality_used,
            result.image.width,
            result.image.height
        );
        crate::status!(
            "🎯 Compression ratio: {:.1}%",
            calculate_compression_ratio(original_size, result.achieved_size_bytes)
        );
        if result.met_goal {
            crate::status!("✅ Fits within target");
        } else {
            crate::status!("⚠️  Could not reach target, wrote the smallest attempt");
        }
    }

    Ok(result)
}
