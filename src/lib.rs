pub mod auth;
pub mod batch;
pub mod cli;
pub mod constants;
pub mod drive;
pub mod error;
pub mod formats;
pub mod logger;
pub mod processing;
pub mod store;
pub mod utils;
pub mod validation;

pub use batch::{process_folder, FileOutcome, FileReport, RunOptions, RunSummary};
pub use error::{Result, SqueezeError};
pub use formats::{OutputFormat, SourceFormat};
pub use processing::{
    compress, encode_jpeg, squeeze_file, CompressionOptions, CompressionResult, EncodedImage,
};
pub use store::{FileDescriptor, FilePage, FolderListing, RemoteStore};
