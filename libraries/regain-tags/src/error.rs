//! Error types for tag reconciliation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for tag operations.
pub type Result<T> = std::result::Result<T, TagError>;

/// Errors that can occur while reading or writing gain tags.
///
/// Only structural failures surface here. A gain value that fails to parse
/// is not an error: the corresponding field is simply left absent, and an
/// out-of-range value is clamped with a logged warning.
#[derive(Error, Debug)]
pub enum TagError {
    /// The file has no tag storage this crate knows how to reconcile.
    #[error("unable to determine tag format for file: {}", .0.display())]
    UnknownContainer(PathBuf),

    /// lofty failed to read or write the container.
    #[error("tag container error: {0}")]
    Container(#[from] lofty::error::LoftyError),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
