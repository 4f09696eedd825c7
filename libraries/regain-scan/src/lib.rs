//! Loudness scanning and scan orchestration for regain
//!
//! - **[`GainScanner`]**: drives an external ffmpeg process to measure
//!   integrated loudness and sample peak, for one file or for the
//!   concatenation of an album's files
//! - **[`JobSlots`]**: the process-wide permit pool that bounds how many
//!   container reads, measurements and container writes run at once
//! - **[`Track`] / [`Album`]**: the scan protocol — read existing tags,
//!   remeasure when values are missing or forced, write back unless
//!   previewing, report
//!
//! Tag I/O is blocking and runs on the blocking thread pool; measurements
//! suspend on the subprocess. Every one of those operations holds one job
//! slot for its duration.

#![forbid(unsafe_code)]

mod album;
mod error;
mod ffmpeg;
mod slots;
mod track;

pub use album::{Album, AlbumTrack};
pub use error::{Result, ScanError};
pub use ffmpeg::GainScanner;
pub use slots::JobSlots;
pub use track::Track;
