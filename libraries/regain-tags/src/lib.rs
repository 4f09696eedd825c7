//! Gain tag reconciliation for regain
//!
//! This crate owns everything between a [`regain_core::GainInfo`] and the
//! bytes a container actually stores:
//!
//! - **`convert`**: pure unit conversions between the measurement domain
//!   (LUFS / dBFS) and each scheme's stored representation, including
//!   clamping
//! - **`reconcile`**: pure merge/render logic over plain tag snapshots, one
//!   variant per container family
//! - **`container`**: the lofty-backed adapter that snapshots a file's raw
//!   tag storage and applies a rendered replacement set
//! - **[`GainTagger`]**: the per-file facade the scanner drives; its
//!   operations are blocking and meant to run under `spawn_blocking`
//!
//! The split keeps every precedence, staleness and conversion rule testable
//! without touching the filesystem.

#![forbid(unsafe_code)]

pub mod container;
pub mod convert;
mod error;
pub mod reconcile;
mod tagger;

pub use error::{Result, TagError};
pub use reconcile::ReadOutcome;
pub use tagger::GainTagger;
