//! Pure merge/render logic over plain tag snapshots.
//!
//! Each container family has a snapshot type that carries only the raw
//! gain-relevant records the container stores, a `merge_*` function that
//! folds a snapshot into one [`GainInfo`] plus staleness flags, and a
//! `render_*` function that produces the replacement record set for a
//! [`GainInfo`] under the configured policy.
//!
//! The write contract is shared by every family: all previously known gain
//! records are deleted unconditionally and the rendered set replaces them,
//! so switching policies never leaves a stale scheme behind. Deletion is
//! the adapter's job ([`crate::container`]); everything here is pure.

use regain_core::{GainInfo, Id3TagMode, OpusTagMode, REPLAYGAIN_REFERENCE_LUFS};

use crate::convert;

/// Canonical ReplayGain text-scheme keys.
pub const TRACK_GAIN_KEY: &str = "REPLAYGAIN_TRACK_GAIN";
/// Canonical track peak key.
pub const TRACK_PEAK_KEY: &str = "REPLAYGAIN_TRACK_PEAK";
/// Canonical album gain key.
pub const ALBUM_GAIN_KEY: &str = "REPLAYGAIN_ALBUM_GAIN";
/// Canonical album peak key.
pub const ALBUM_PEAK_KEY: &str = "REPLAYGAIN_ALBUM_PEAK";
/// Legacy reference-loudness key; deleted on write, never written.
pub const REFERENCE_LOUDNESS_KEY: &str = "REPLAYGAIN_REFERENCE_LOUDNESS";
/// Opus fixed-point track gain key.
pub const R128_TRACK_GAIN_KEY: &str = "R128_TRACK_GAIN";
/// Opus fixed-point album gain key.
pub const R128_ALBUM_GAIN_KEY: &str = "R128_ALBUM_GAIN";

/// MP4 freeform namespace used by iTunes-compatible taggers.
pub const ITUNES_MEAN: &str = "com.apple.iTunes";
/// MP4 freeform namespace some ReplayGain taggers use instead.
pub const REPLAYGAIN_MEAN: &str = "org.hydrogenaudio.replaygain";

/// One `TXXX` user-text frame.
#[derive(Debug, Clone, PartialEq)]
pub struct UserText {
    /// Frame description (the tag key, any case).
    pub description: String,
    /// Frame content.
    pub content: String,
}

/// One RVA2 relative-volume frame, master channel only.
///
/// `peak` is linear amplitude on a full-scale-1.0 axis; `0.0` means the
/// frame carries no peak information.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeFrame {
    /// Frame identification (`"track"` or `"album"` for gain frames).
    pub identification: String,
    /// Volume adjustment in dB.
    pub gain_db: f64,
    /// Peak as linear amplitude, `0.0` when absent.
    pub peak: f64,
}

/// Gain-relevant contents of an ID3v2 tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Id3Snapshot {
    /// All `TXXX` frames on the tag.
    pub user_texts: Vec<UserText>,
    /// All master-channel RVA2 frames on the tag.
    pub volume_frames: Vec<VolumeFrame>,
}

/// Key/value comment storage (Vorbis comments and the generic fallback).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentSnapshot {
    /// Comment fields in container order.
    pub comments: Vec<(String, String)>,
}

impl CommentSnapshot {
    /// First value stored under `key`, compared case-insensitively (comment
    /// field names are case-insensitive ASCII).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Append a field.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.comments.push((key.into(), value.into()));
    }
}

/// One MP4 freeform atom with a UTF-8 payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeformItem {
    /// Freeform namespace (`mean`).
    pub mean: String,
    /// Atom name within the namespace.
    pub name: String,
    /// Decoded UTF-8 payload.
    pub value: String,
}

/// Gain-relevant contents of an MP4 `ilst` tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeformSnapshot {
    /// All freeform atoms carrying UTF-8 data.
    pub items: Vec<FreeformItem>,
}

/// Result of merging a snapshot: the reconciled values plus whether the
/// on-disk tags should be rewritten for staleness/policy reasons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome {
    /// Reconciled gain values.
    pub gain: GainInfo,
    /// Track-scope tags disagree with policy or format conventions.
    pub needs_track_rewrite: bool,
    /// Album-scope tags disagree with policy or format conventions.
    pub needs_album_rewrite: bool,
}

fn flagged(gain: GainInfo, need_update: bool) -> ReadOutcome {
    ReadOutcome {
        gain,
        needs_track_rewrite: need_update,
        needs_album_rewrite: need_update,
    }
}

/// Merge an ID3v2 snapshot.
///
/// The text scheme is read first and wins; RVA2 frames only fill scopes the
/// text scheme left incomplete. A rewrite is flagged when a key's case needs
/// normalizing or when either scheme's presence disagrees with `mode`.
pub fn merge_id3(snap: &Id3Snapshot, mode: Id3TagMode) -> ReadOutcome {
    let mut gain = GainInfo::default();
    let mut need_update = false;
    let mut have_replaygain = false;
    let mut have_rva2 = false;

    for frame in &snap.user_texts {
        let canonical = match frame.description.to_ascii_lowercase().as_str() {
            "replaygain_track_gain" => {
                if gain.loudness.is_none() {
                    gain.loudness = convert::parse_gain_text(&frame.content);
                }
                TRACK_GAIN_KEY
            }
            "replaygain_track_peak" => {
                if gain.peak.is_none() {
                    gain.peak = convert::parse_peak_text(&frame.content);
                }
                TRACK_PEAK_KEY
            }
            "replaygain_album_gain" => {
                if gain.album_loudness.is_none() {
                    gain.album_loudness = convert::parse_gain_text(&frame.content);
                }
                ALBUM_GAIN_KEY
            }
            "replaygain_album_peak" => {
                if gain.album_peak.is_none() {
                    gain.album_peak = convert::parse_peak_text(&frame.content);
                }
                ALBUM_PEAK_KEY
            }
            _ => continue,
        };
        have_replaygain = true;
        if frame.description != canonical {
            need_update = true;
        }
    }

    if let Some(frame) = snap.volume_frames.iter().find(|f| f.identification == "track") {
        if gain.loudness.is_none() || gain.peak.is_none() {
            gain.loudness = Some(REPLAYGAIN_REFERENCE_LUFS - frame.gain_db);
            gain.peak = convert::rva2_peak_to_dbfs(frame.peak);
        }
        have_rva2 = true;
    }
    if let Some(frame) = snap.volume_frames.iter().find(|f| f.identification == "album") {
        if gain.album_loudness.is_none() || gain.album_peak.is_none() {
            gain.album_loudness = Some(REPLAYGAIN_REFERENCE_LUFS - frame.gain_db);
            gain.album_peak = convert::rva2_peak_to_dbfs(frame.peak);
        }
        have_rva2 = true;
    }

    if have_rva2 != mode.writes_rva2() {
        need_update = true;
    }
    if have_replaygain != mode.writes_replaygain() {
        need_update = true;
    }

    flagged(gain, need_update)
}

/// Merge an Opus comment snapshot.
///
/// R128 keys are evaluated before the ReplayGain keys; the first successful
/// parse per field wins. Under the pure-R128 policy a present loudness with
/// an absent peak is backfilled with a NaN sentinel, since R128 has no peak
/// concept and the tags are nonetheless complete.
pub fn merge_opus(snap: &CommentSnapshot, mode: OpusTagMode) -> ReadOutcome {
    let mut gain = GainInfo::default();
    let mut have_r128 = false;
    let mut have_replaygain = false;

    if let Some(value) = snap.get(R128_TRACK_GAIN_KEY) {
        if gain.loudness.is_none() {
            gain.loudness = convert::parse_opus_gain(value);
        }
        have_r128 = true;
    }
    if let Some(value) = snap.get(R128_ALBUM_GAIN_KEY) {
        if gain.album_loudness.is_none() {
            gain.album_loudness = convert::parse_opus_gain(value);
        }
        have_r128 = true;
    }

    if let Some(value) = snap.get(TRACK_GAIN_KEY) {
        if gain.loudness.is_none() {
            gain.loudness = convert::parse_gain_text(value);
        }
        have_replaygain = true;
    }
    if let Some(value) = snap.get(TRACK_PEAK_KEY) {
        if gain.peak.is_none() {
            gain.peak = convert::parse_peak_text(value);
        }
        have_replaygain = true;
    }
    if let Some(value) = snap.get(ALBUM_GAIN_KEY) {
        if gain.album_loudness.is_none() {
            gain.album_loudness = convert::parse_gain_text(value);
        }
        have_replaygain = true;
    }
    if let Some(value) = snap.get(ALBUM_PEAK_KEY) {
        if gain.album_peak.is_none() {
            gain.album_peak = convert::parse_peak_text(value);
        }
        have_replaygain = true;
    }

    if have_r128 && mode == OpusTagMode::R128 {
        if gain.loudness.is_some() && gain.peak.is_none() {
            gain.peak = Some(f64::NAN);
        }
        if gain.album_loudness.is_some() && gain.album_peak.is_none() {
            gain.album_peak = Some(f64::NAN);
        }
    }

    let mut need_update = false;
    if have_r128 != mode.writes_r128() {
        need_update = true;
    }
    if have_replaygain != mode.writes_replaygain() {
        need_update = true;
    }

    flagged(gain, need_update)
}

/// Merge an MP4 freeform snapshot.
///
/// Only atoms under the iTunes or hydrogenaudio namespaces are considered;
/// names match case-insensitively. MP4 has a single scheme, so no staleness
/// flags are derived here.
pub fn merge_mp4(snap: &FreeformSnapshot) -> ReadOutcome {
    let mut gain = GainInfo::default();

    for item in &snap.items {
        if item.mean != ITUNES_MEAN && item.mean != REPLAYGAIN_MEAN {
            continue;
        }
        match item.name.to_ascii_lowercase().as_str() {
            "replaygain_track_gain" => {
                if gain.loudness.is_none() {
                    gain.loudness = convert::parse_gain_text(&item.value);
                }
            }
            "replaygain_track_peak" => {
                if gain.peak.is_none() {
                    gain.peak = convert::parse_peak_text(&item.value);
                }
            }
            "replaygain_album_gain" => {
                if gain.album_loudness.is_none() {
                    gain.album_loudness = convert::parse_gain_text(&item.value);
                }
            }
            "replaygain_album_peak" => {
                if gain.album_peak.is_none() {
                    gain.album_peak = convert::parse_peak_text(&item.value);
                }
            }
            _ => {}
        }
    }

    flagged(gain, false)
}

/// Merge a generic comment snapshot (FLAC, Vorbis, APE, ...).
pub fn merge_generic(snap: &CommentSnapshot) -> ReadOutcome {
    let mut gain = GainInfo::default();

    if let Some(value) = snap.get(TRACK_GAIN_KEY) {
        gain.loudness = convert::parse_gain_text(value);
    }
    if let Some(value) = snap.get(TRACK_PEAK_KEY) {
        gain.peak = convert::parse_peak_text(value);
    }
    if let Some(value) = snap.get(ALBUM_GAIN_KEY) {
        gain.album_loudness = convert::parse_gain_text(value);
    }
    if let Some(value) = snap.get(ALBUM_PEAK_KEY) {
        gain.album_peak = convert::parse_peak_text(value);
    }

    flagged(gain, false)
}

/// A numeric field that can actually be rendered: present and not the NaN
/// valid-but-unknown sentinel.
fn renderable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Render the ID3v2 replacement set for `gain` under `mode`.
///
/// An RVA2 frame is only produced when both the gain and the peak of its
/// scope are present, since the frame stores them together.
pub fn render_id3(gain: &GainInfo, mode: Id3TagMode, file: &str) -> Id3Snapshot {
    let mut snap = Id3Snapshot::default();

    if mode.writes_replaygain() {
        if let Some(loudness) = renderable(gain.loudness) {
            snap.user_texts.push(UserText {
                description: TRACK_GAIN_KEY.to_string(),
                content: convert::format_gain_text(loudness),
            });
        }
        if let Some(peak) = renderable(gain.peak) {
            snap.user_texts.push(UserText {
                description: TRACK_PEAK_KEY.to_string(),
                content: convert::format_peak_text(peak),
            });
        }
        if let Some(loudness) = renderable(gain.album_loudness) {
            snap.user_texts.push(UserText {
                description: ALBUM_GAIN_KEY.to_string(),
                content: convert::format_gain_text(loudness),
            });
        }
        if let Some(peak) = renderable(gain.album_peak) {
            snap.user_texts.push(UserText {
                description: ALBUM_PEAK_KEY.to_string(),
                content: convert::format_peak_text(peak),
            });
        }
    }

    if mode.writes_rva2() {
        if let (Some(loudness), Some(peak)) = (renderable(gain.loudness), renderable(gain.peak)) {
            snap.volume_frames.push(VolumeFrame {
                identification: "track".to_string(),
                gain_db: REPLAYGAIN_REFERENCE_LUFS - loudness,
                peak: convert::rva2_peak_from_dbfs(peak, file, "track"),
            });
        }
        if let (Some(loudness), Some(peak)) =
            (renderable(gain.album_loudness), renderable(gain.album_peak))
        {
            snap.volume_frames.push(VolumeFrame {
                identification: "album".to_string(),
                gain_db: REPLAYGAIN_REFERENCE_LUFS - loudness,
                peak: convert::rva2_peak_from_dbfs(peak, file, "album"),
            });
        }
    }

    snap
}

/// Render the Opus comment replacement set for `gain` under `mode`.
pub fn render_opus(gain: &GainInfo, mode: OpusTagMode, file: &str) -> CommentSnapshot {
    let mut snap = CommentSnapshot::default();

    if mode.writes_r128() {
        if let Some(loudness) = renderable(gain.loudness) {
            snap.push(
                R128_TRACK_GAIN_KEY,
                convert::format_opus_gain(loudness, file, "track"),
            );
        }
        if let Some(loudness) = renderable(gain.album_loudness) {
            snap.push(
                R128_ALBUM_GAIN_KEY,
                convert::format_opus_gain(loudness, file, "album"),
            );
        }
    }

    if mode.writes_replaygain() {
        if let Some(loudness) = renderable(gain.loudness) {
            snap.push(TRACK_GAIN_KEY, convert::format_gain_text(loudness));
        }
        if let Some(peak) = renderable(gain.peak) {
            snap.push(TRACK_PEAK_KEY, convert::format_peak_text(peak));
        }
        if let Some(loudness) = renderable(gain.album_loudness) {
            snap.push(ALBUM_GAIN_KEY, convert::format_gain_text(loudness));
        }
        if let Some(peak) = renderable(gain.album_peak) {
            snap.push(ALBUM_PEAK_KEY, convert::format_peak_text(peak));
        }
    }

    snap
}

/// Render the MP4 freeform replacement set for `gain`.
///
/// Always written under the iTunes namespace with fixed-case names; this is
/// what foobar2000 writes and rockbox reads.
pub fn render_mp4(gain: &GainInfo) -> FreeformSnapshot {
    let mut snap = FreeformSnapshot::default();
    let mut push = |name: &str, value: String| {
        snap.items.push(FreeformItem {
            mean: ITUNES_MEAN.to_string(),
            name: name.to_string(),
            value,
        });
    };

    if let Some(loudness) = renderable(gain.loudness) {
        push(TRACK_GAIN_KEY, convert::format_gain_text(loudness));
    }
    if let Some(peak) = renderable(gain.peak) {
        push(TRACK_PEAK_KEY, convert::format_peak_text(peak));
    }
    if let Some(loudness) = renderable(gain.album_loudness) {
        push(ALBUM_GAIN_KEY, convert::format_gain_text(loudness));
    }
    if let Some(peak) = renderable(gain.album_peak) {
        push(ALBUM_PEAK_KEY, convert::format_peak_text(peak));
    }

    snap
}

/// Render the generic comment replacement set for `gain`.
pub fn render_generic(gain: &GainInfo) -> CommentSnapshot {
    let mut snap = CommentSnapshot::default();

    if let Some(loudness) = renderable(gain.loudness) {
        snap.push(TRACK_GAIN_KEY, convert::format_gain_text(loudness));
    }
    if let Some(peak) = renderable(gain.peak) {
        snap.push(TRACK_PEAK_KEY, convert::format_peak_text(peak));
    }
    if let Some(loudness) = renderable(gain.album_loudness) {
        snap.push(ALBUM_GAIN_KEY, convert::format_gain_text(loudness));
    }
    if let Some(peak) = renderable(gain.album_peak) {
        snap.push(ALBUM_PEAK_KEY, convert::format_peak_text(peak));
    }

    snap
}
