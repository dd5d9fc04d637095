pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

// Quality search defaults
pub const DEFAULT_START_QUALITY: u8 = 85;
pub const DEFAULT_MIN_QUALITY: u8 = 5;
pub const DEFAULT_QUALITY_STEP: u8 = 10;
pub const DEFAULT_RAISE_STEP: u8 = 5;
pub const DEFAULT_SCALE_FACTOR: f32 = 0.9;
pub const DEFAULT_MAX_DOWNSCALES: u32 = 5;
pub const DEFAULT_MAX_SIZE_MB: f64 = 1.0;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub const OXIPNG_PRESET: u8 = 2;
pub const LIBDEFLATER_LEVEL: u8 = 12;

/// Largest file the driver will download (200MB)
pub const MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 20_000;

pub const PROGRESS_BAR_WIDTH: usize = 40;

// Google Drive v3
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const DRIVE_PAGE_SIZE: u32 = 1000;
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
pub const DEFAULT_TOKEN_PATH: &str = "token.json";

/// Tokens this close to expiry are refreshed before use
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

pub const COMPRESSED_NAME_PREFIX: &str = "compressed_";

