use crate::constants::{
    DEFAULT_CREDENTIALS_PATH, DEFAULT_MAX_SIZE_MB, DEFAULT_TOKEN_PATH, MAX_QUALITY, MIN_QUALITY,
};
use crate::error::Result;
use crate::processing::CompressionOptions;
use crate::utils::mb_to_bytes;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "drive-squeeze",
    about = "Compress the images in a Google Drive folder to fit a target size",
    long_about = "drive-squeeze lists the images in a Google Drive folder, re-encodes each one that is \
                  larger than the target size with the highest JPEG quality that still fits, \
                  and uploads the result back to the same place. Images that cannot get smaller \
                  are left untouched.",
    version,
    after_help = "EXAMPLES:\n  \
    drive-squeeze run 1AbCdEfGhIjKlMnOp --max-size 0.5\n  \
    drive-squeeze run 1AbCdEfGhIjKlMnOp --keep-original --dry-run\n  \
    drive-squeeze auth --credentials ~/secrets/credentials.json\n  \
    drive-squeeze squeeze photo.jpg photo-small.jpg --max-size 0.3"
)]
pub struct Args {
    #[arg(
        long,
        global = true,
        env = "DRIVE_SQUEEZE_CREDENTIALS",
        default_value = DEFAULT_CREDENTIALS_PATH,
        help = "OAuth client secrets file"
    )]
    pub credentials: PathBuf,

    #[arg(
        long,
        global = true,
        env = "DRIVE_SQUEEZE_TOKEN",
        default_value = DEFAULT_TOKEN_PATH,
        help = "Token cache file"
    )]
    pub token_cache: PathBuf,

    #[arg(short, long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short, long, global = true, help = "Print every quality attempt")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Compress every image in a Drive folder",
        long_about = "Authenticate, list the folder, and compress each image over the target size. \
                      Unsupported or corrupt files are skipped and reported; the run always \
                      finishes unless authentication or the folder lookup fails."
    )]
    Run {
        #[arg(help = "Google Drive folder ID")]
        folder_id: String,

        #[command(flatten)]
        tuning: TuningArgs,

        #[arg(
            long,
            help = "Upload as compressed_<name> instead of replacing the original"
        )]
        keep_original: bool,

        #[arg(long, help = "Compress but do not upload anything")]
        dry_run: bool,
    },

    #[command(
        about = "Run the OAuth consent flow and refresh the token cache",
        long_about = "Forces a fresh browser consent, replacing any cached token. \
                      Use this when switching accounts or after revoking access."
    )]
    Auth,

    #[command(
        about = "Compress a local image file to fit a target size",
        long_about = "Runs the same quality search as `run` on a local file and writes the \
                      result to OUTPUT. Nothing is uploaded."
    )]
    Squeeze {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(help = "Output image file path")]
        output: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TuningArgs {
    #[arg(
        short = 'm',
        long,
        default_value_t = DEFAULT_MAX_SIZE_MB,
        help = "Maximum size in MB for compressed images (default: 1.0)",
        long_help = "Target size in megabytes (1 MB = 1048576 bytes). Images already at or \
                     under this size are left alone."
    )]
    pub max_size: f64,

    #[arg(
        long,
        value_parser = clap::value_parser!(u8).range(MIN_QUALITY as i64..=MAX_QUALITY as i64),
        help = "Lowest JPEG quality to try before downscaling (default: 5)"
    )]
    pub min_quality: Option<u8>,

    #[arg(
        long,
        value_parser = clap::value_parser!(u8).range(MIN_QUALITY as i64..=MAX_QUALITY as i64),
        help = "First JPEG quality to try (default: 85)"
    )]
    pub start_quality: Option<u8>,

    #[arg(long, help = "Quality decrement after an oversized attempt (default: 10)")]
    pub quality_step: Option<u8>,

    #[arg(
        long,
        help = "Quality increment used to probe back up after a fit, 0 disables (default: 5)"
    )]
    pub raise_step: Option<u8>,

    #[arg(long, help = "Pixel scale per downscale round (default: 0.9)")]
    pub scale_factor: Option<f32>,

    #[arg(long, help = "Maximum downscale rounds (default: 5)")]
    pub max_downscales: Option<u32>,

    #[arg(long, help = "Skip the lossless PNG pass and always re-encode as JPEG")]
    pub no_png_optimize: bool,
}

impl TuningArgs {
    pub fn target_bytes(&self) -> Result<u64> {
        mb_to_bytes(self.max_size)
    }

    pub fn compression_options(&self) -> Result<CompressionOptions> {
        CompressionOptions::new(
            self.start_quality,
            self.min_quality,
            self.quality_step,
            self.raise_step,
            self.scale_factor,
            self.max_downscales,
            !self.no_png_optimize,
        )
    }
}
