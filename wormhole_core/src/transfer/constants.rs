use std::time::Duration;

/// Records older than this are removed by the sweeper (1 hour)
pub const TRANSFER_TTL: Duration = Duration::from_secs(60 * 60);

/// How often the sweeper scans the registry (5 minutes)
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound for draining connections and tasks on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length of a sanitized filename, in bytes
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Name used when a filename sanitizes to nothing
pub const FALLBACK_FILENAME: &str = "unnamed";

/// Archive name for multi-file uploads that are not a single folder
pub const DEFAULT_ARCHIVE_NAME: &str = "files.zip";

/// Deadline for a single WebSocket write before the subscriber is dropped
pub const WS_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffer size for copying uploads and downloads (64KB)
pub const BUFFER_SIZE: usize = 64 * 1024;
