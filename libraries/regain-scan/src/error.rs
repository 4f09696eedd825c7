//! Error types for scanning and orchestration.

use thiserror::Error;

/// Result type for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors that can abort a track or album scan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Tag reconciliation failed for a file.
    #[error(transparent)]
    Tag(#[from] regain_tags::TagError),

    /// The measurement process could not be launched.
    #[error("failed to launch {command}: {source}")]
    Launch {
        /// The binary that was invoked.
        command: String,
        /// The underlying spawn failure.
        source: std::io::Error,
    },

    /// The measurement process exited with a failure status.
    #[error("loudness measurement failed ({status}):\n{stderr}")]
    Measurement {
        /// Process exit status.
        status: std::process::ExitStatus,
        /// Captured diagnostic output.
        stderr: String,
    },

    /// An album measurement was requested with no included tracks.
    #[error("album measurement requires at least one included track")]
    EmptyAlbum,

    /// A blocking tag operation panicked or was cancelled.
    #[error("background tag task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
