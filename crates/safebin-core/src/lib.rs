//! safebin-core: shared configuration, constants, and error types.

pub mod config;
pub mod error;

pub use config::ServiceConfig;
pub use error::{SafebinError, SafebinResult};

use std::time::Duration;

/// One mebibyte, the unit of the configured size limit.
pub const MEGABYTE: u64 = 1 << 20;

/// Smallest chunk size a client is expected to send on the resumable path.
pub const MIN_CHUNK_SIZE: u64 = 1 << 20;

/// Request body ceiling for chunk and finish requests.
pub const MAX_REQUEST_OVERHEAD: u64 = 10 << 20;

/// Headroom added to the configured chunk count for off-by-one client math.
pub const CHUNK_SAFETY_MARGIN: u64 = 2;

/// Interval between cleanup passes.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Age after which abandoned entries under `tmp/` are removed.
pub const TEMP_EXPIRY: Duration = Duration::from_secs(4 * 60 * 60);

/// Floor of the retention curve.
pub const MIN_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Ceiling of the retention curve, reached by zero-size uploads.
pub const MAX_RETENTION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How long the daemon waits for background tasks on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub const DB_DIR_NAME: &str = "db";
pub const DB_FILE_NAME: &str = "safebin.db";
pub const TEMP_DIR_NAME: &str = "tmp";
