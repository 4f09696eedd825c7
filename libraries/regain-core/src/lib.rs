//! regain core
//!
//! Shared types for the regain scanner and tagger:
//! - **`GainInfo`**: a loudness/peak measurement for a track, optionally
//!   paired with album-level values
//! - **`TagPolicy`**: which tag scheme(s) to emit per container family
//! - Reference loudness constants shared by every conversion
//!
//! Measurements are carried in the unit domain the analysis produces:
//! integrated loudness in LUFS and sample peak in dBFS. Conversion into the
//! representations the individual tag schemes store happens at the tag layer,
//! never here.

#![forbid(unsafe_code)]

mod gain;
mod policy;

pub use gain::{same_value, GainInfo};
pub use policy::{Id3TagMode, OpusTagMode, TagPolicy};

/// ReplayGain 2.0 reference loudness level (-18 LUFS).
pub const REPLAYGAIN_REFERENCE_LUFS: f64 = -18.0;

/// EBU R128 reference level (-23 LUFS), used by the Opus R128 gain tags.
pub const R128_REFERENCE_LUFS: f64 = -23.0;
