use crate::constants::{COMPRESSED_NAME_PREFIX, FOLDER_MIME_TYPE};
use crate::error::{Result, SqueezeError};
use crate::formats::SourceFormat;
use crate::processing::{compress, CompressionOptions};
use crate::store::{FileDescriptor, FolderListing, RemoteStore};
use crate::utils::{calculate_compression_ratio, create_progress_bar, format_file_size};
use crate::validation::validate_file_size;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Settings for one pass over a folder.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target_bytes: u64,
    pub compression: CompressionOptions,
    /// Compress but never upload
    pub dry_run: bool,
    /// Upload as a new `compressed_<name>` file instead of replacing
    pub keep_original: bool,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn new(target_bytes: u64, compression: CompressionOptions) -> Result<Self> {
        if target_bytes == 0 {
            return Err(SqueezeError::InvalidTarget(target_bytes));
        }
        compression.validate()?;
        Ok(Self {
            target_bytes,
            compression,
            dry_run: false,
            keep_original: false,
            show_progress: true,
        })
    }
}

/// What happened to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Content replaced in place, possibly renamed to match the new format
    Replaced {
        original_bytes: u64,
        compressed_bytes: u64,
        quality: u8,
        renamed_to: Option<String>,
    },
    /// Uploaded beside the original
    Copied {
        file_id: String,
        name: String,
        original_bytes: u64,
        compressed_bytes: u64,
        quality: u8,
    },
    /// Would have been uploaded
    DryRun {
        original_bytes: u64,
        compressed_bytes: u64,
        quality: u8,
        met_goal: bool,
    },
    AlreadyUnderTarget { size_bytes: u64 },
    /// Target missed and nothing smaller than the original was found
    NoGain { original_bytes: u64, best_bytes: u64 },
    Skipped { reason: String },
    Failed { error: String },
}

impl FileOutcome {
    fn sizes(&self) -> Option<(u64, u64)> {
        match self {
            FileOutcome::Replaced {
                original_bytes,
                compressed_bytes,
                ..
            }
            | FileOutcome::Copied {
                original_bytes,
                compressed_bytes,
                ..
            }
            | FileOutcome::DryRun {
                original_bytes,
                compressed_bytes,
                ..
            } => Some((*original_bytes, *compressed_bytes)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub file: FileDescriptor,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub folder_name: String,
    pub total_files: usize,
    pub image_files: usize,
    pub mime_counts: BTreeMap<String, usize>,
    pub reports: Vec<FileReport>,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Replaced { .. } | FileOutcome::Copied { .. }))
    }

    pub fn dry_runs(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::DryRun { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                FileOutcome::AlreadyUnderTarget { .. } | FileOutcome::NoGain { .. }
            )
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    fn record(&mut self, file: FileDescriptor, outcome: FileOutcome) {
        if let Some((before, after)) = outcome.sizes() {
            self.bytes_before += before;
            self.bytes_after += after;
        }
        self.reports.push(FileReport { file, outcome });
    }

    pub fn print(&self) {
        crate::status!("\n📊 Folder Compression Summary:");
        crate::status!("  📁 Images processed: {}", self.reports.len());
        crate::status!("  ✅ Compressed and uploaded: {}", self.uploaded());
        if self.dry_runs() > 0 {
            crate::status!("  🧪 Dry run, not uploaded: {}", self.dry_runs());
        }
        crate::status!("  💤 Left unchanged: {}", self.unchanged());
        if self.bytes_before > 0 {
            crate::status!(
                "  📊 Size of compressed images: {} -> {}",
                format_file_size(self.bytes_before),
                format_file_size(self.bytes_after)
            );
            crate::status!(
                "  🎯 Overall compression ratio: {:.1}%",
                calculate_compression_ratio(self.bytes_before, self.bytes_after)
            );
        }
        crate::status!("  ⏱️  Total time: {:.2?}", self.elapsed);

        let problems: Vec<&FileReport> = self
            .reports
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    FileOutcome::Skipped { .. } | FileOutcome::Failed { .. }
                )
            })
            .collect();
        if !problems.is_empty() {
            crate::status!(
                "  ⚠️  Skipped files: {}, failed files: {}",
                self.skipped(),
                self.failed()
            );
            for report in problems {
                match &report.outcome {
                    FileOutcome::Skipped { reason } => {
                        crate::status!("    - {} (skipped: {})", report.file.name, reason)
                    }
                    FileOutcome::Failed { error } => {
                        crate::status!("    - {} (failed: {})", report.file.name, error)
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Compress every image in a remote folder.
///
/// Per-file problems are recorded in the summary and never abort the run.
/// Only setup failures (folder lookup, listing) and authentication errors
/// are returned as `Err`.
pub fn process_folder<S: RemoteStore + ?Sized>(
    store: &S,
    folder_id: &str,
    options: &RunOptions,
) -> Result<RunSummary> {
    let start_time = Instant::now();

    let folder_name = store.folder_name(folder_id)?;
    crate::status!("📁 Found folder: {}", folder_name);
    crate::status!("🔍 Scanning folder contents...");

    let files = FolderListing::new(store, folder_id).collect::<Result<Vec<_>>>()?;

    let mut summary = RunSummary {
        folder_name,
        total_files: files.len(),
        ..RunSummary::default()
    };

    if files.is_empty() {
        crate::status!("⚠️  The folder is empty.");
        summary.elapsed = start_time.elapsed();
        return Ok(summary);
    }

    for file in &files {
        *summary.mime_counts.entry(file.mime_type.clone()).or_insert(0) += 1;
    }
    let images: Vec<FileDescriptor> = files
        .into_iter()
        .filter(|f| f.is_image() && f.mime_type != FOLDER_MIME_TYPE)
        .collect();
    summary.image_files = images.len();

    crate::status!("📊 Total files: {}", summary.total_files);
    crate::status!("🖼️  Image files: {}", summary.image_files);
    crate::status!("📋 File types found:");
    for (mime, count) in &summary.mime_counts {
        crate::status!("  - {}: {} files", mime, count);
    }

    if images.is_empty() {
        crate::status!("⚠️  No image files found to compress.");
        summary.elapsed = start_time.elapsed();
        return Ok(summary);
    }

    crate::status!(
        "🗜️  Compressing images to at most {}{}",
        format_file_size(options.target_bytes),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let pb = create_progress_bar(images.len() as u64, !options.show_progress);
    for file in images {
        pb.set_message(file.name.clone());

        let outcome = match process_file(store, folder_id, &file, options) {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => {
                pb.abandon_with_message(format!("❌ aborted at {}", file.name));
                return Err(e);
            }
            Err(e) if e.is_skip() => FileOutcome::Skipped {
                reason: e.to_string(),
            },
            Err(e) => FileOutcome::Failed {
                error: e.to_string(),
            },
        };

        pb.suspend(|| log_outcome(&file, &outcome));
        summary.record(file, outcome);
        pb.inc(1);
    }
    pb.finish_with_message("✅ Folder compression complete");

    summary.elapsed = start_time.elapsed();
    summary.print();
    Ok(summary)
}

fn process_file<S: RemoteStore + ?Sized>(
    store: &S,
    folder_id: &str,
    file: &FileDescriptor,
    options: &RunOptions,
) -> Result<FileOutcome> {
    validate_file_size(file.size_bytes)?;
    if SourceFormat::from_mime_type(&file.mime_type).is_none() {
        return Err(SqueezeError::UnsupportedFormat(file.mime_type.clone()));
    }
    if file.size_bytes > 0 && file.size_bytes <= options.target_bytes {
        return Ok(FileOutcome::AlreadyUnderTarget {
            size_bytes: file.size_bytes,
        });
    }

    let data = store.download(&file.id)?;
    let original_bytes = data.len() as u64;
    validate_file_size(original_bytes)?;
    if original_bytes <= options.target_bytes {
        return Ok(FileOutcome::AlreadyUnderTarget {
            size_bytes: original_bytes,
        });
    }

    let result = compress(&data, options.target_bytes, &options.compression)?;
    drop(data);

    if !result.met_goal && result.achieved_size_bytes >= original_bytes {
        return Ok(FileOutcome::NoGain {
            original_bytes,
            best_bytes: result.achieved_size_bytes,
        });
    }

    let compressed_bytes = result.achieved_size_bytes;
    let quality = result.quality_used;

    if options.dry_run {
        return Ok(FileOutcome::DryRun {
            original_bytes,
            compressed_bytes,
            quality,
            met_goal: result.met_goal,
        });
    }

    let mime_type = result.format.mime_type();
    if options.keep_original {
        let name = format!(
            "{}{}",
            COMPRESSED_NAME_PREFIX,
            result.format.file_name_for(&file.name)
        );
        let file_id = store.create(folder_id, &name, &result.image.bytes, mime_type)?;
        return Ok(FileOutcome::Copied {
            file_id,
            name,
            original_bytes,
            compressed_bytes,
            quality,
        });
    }

    let renamed_to = if result.format.matches_name(&file.name) {
        None
    } else {
        Some(result.format.file_name_for(&file.name))
    };
    store.update(
        &file.id,
        &result.image.bytes,
        mime_type,
        renamed_to.as_deref(),
    )?;
    Ok(FileOutcome::Replaced {
        original_bytes,
        compressed_bytes,
        quality,
        renamed_to,
    })
}

fn log_outcome(file: &FileDescriptor, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Replaced {
            original_bytes,
            compressed_bytes,
            quality,
            renamed_to,
        } => {
            info!(
                "✅ {}: {} -> {} (quality {})",
                file.name,
                format_file_size(*original_bytes),
                format_file_size(*compressed_bytes),
                quality
            );
            if let Some(name) = renamed_to {
                info!("   renamed to {}", name);
            }
        }
        FileOutcome::Copied {
            name,
            original_bytes,
            compressed_bytes,
            ..
        } => info!(
            "✅ {}: uploaded {} ({} -> {})",
            file.name,
            name,
            format_file_size(*original_bytes),
            format_file_size(*compressed_bytes)
        ),
        FileOutcome::DryRun {
            original_bytes,
            compressed_bytes,
            quality,
            met_goal,
        } => info!(
            "🧪 {}: would upload {} -> {} (quality {}{})",
            file.name,
            format_file_size(*original_bytes),
            format_file_size(*compressed_bytes),
            quality,
            if *met_goal { "" } else { ", target missed" }
        ),
        FileOutcome::AlreadyUnderTarget { size_bytes } => info!(
            "💤 {}: already {}, leaving as is",
            file.name,
            format_file_size(*size_bytes)
        ),
        FileOutcome::NoGain {
            original_bytes,
            best_bytes,
        } => warn!(
            "{}: best attempt {} is not smaller than the original {}, leaving it untouched",
            file.name,
            format_file_size(*best_bytes),
            format_file_size(*original_bytes)
        ),
        FileOutcome::Skipped { reason } => warn!("{}: skipped ({})", file.name, reason),
        FileOutcome::Failed { error } => warn!("{}: failed ({})", file.name, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: FileOutcome) -> FileReport {
        FileReport {
            file: FileDescriptor {
                id: "id".to_string(),
                name: "a.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                size_bytes: 100,
            },
            outcome,
        }
    }

    #[test]
    fn test_run_options_validation() {
        let options = RunOptions::new(1024, CompressionOptions::default()).unwrap();
        assert!(!options.dry_run);
        assert!(!options.keep_original);

        let result = RunOptions::new(0, CompressionOptions::default());
        assert!(matches!(result, Err(SqueezeError::InvalidTarget(0))));

        let mut bad = CompressionOptions::default();
        bad.min_quality = 0;
        assert!(RunOptions::new(1024, bad).is_err());
    }

    #[test]
    fn test_summary_counts_and_totals() {
        let mut summary = RunSummary::default();
        for outcome in [
            FileOutcome::Replaced {
                original_bytes: 1000,
                compressed_bytes: 400,
                quality: 70,
                renamed_to: None,
            },
            FileOutcome::AlreadyUnderTarget { size_bytes: 50 },
            FileOutcome::NoGain {
                original_bytes: 10,
                best_bytes: 12,
            },
            FileOutcome::Skipped {
                reason: "gif".to_string(),
            },
            FileOutcome::Failed {
                error: "timeout".to_string(),
            },
            FileOutcome::DryRun {
                original_bytes: 500,
                compressed_bytes: 100,
                quality: 40,
                met_goal: true,
            },
        ] {
            let r = report(outcome);
            summary.record(r.file, r.outcome);
        }

        assert_eq!(summary.uploaded(), 1);
        assert_eq!(summary.dry_runs(), 1);
        assert_eq!(summary.unchanged(), 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.bytes_before, 1500);
        assert_eq!(summary.bytes_after, 500);
    }
}
