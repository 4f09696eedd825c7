//! lofty-backed adapter between tag containers and reconcile snapshots.
//!
//! The container family is decided once, when the file is opened, and
//! carried as a closed union. Snapshot functions lift the raw gain-relevant
//! records into the plain types `reconcile` works on; apply functions delete
//! every known gain record and install a rendered replacement set. Nothing
//! here interprets values.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use lofty::id3::v2::{
    ChannelInformation, ChannelType, ExtendedTextFrame, Frame, FrameFlags, FrameValue, Id3v2Tag,
    RelativeVolumeAdjustmentFrame,
};
use lofty::mp4::{Atom, AtomData, AtomIdent, Ilst, Mp4File};
use lofty::mpeg::MpegFile;
use lofty::ogg::{OpusFile, VorbisComments};
use lofty::{AudioFile, FileType, ItemKey, ParseOptions, Probe, TagExt, TaggedFileExt, TextEncoding};

use crate::reconcile::{
    CommentSnapshot, FreeformItem, FreeformSnapshot, Id3Snapshot, UserText, VolumeFrame,
    ALBUM_GAIN_KEY, ALBUM_PEAK_KEY, ITUNES_MEAN, R128_ALBUM_GAIN_KEY, R128_TRACK_GAIN_KEY,
    REFERENCE_LOUDNESS_KEY, REPLAYGAIN_MEAN, TRACK_GAIN_KEY, TRACK_PEAK_KEY,
};
use crate::{Result, TagError};

/// TXXX descriptions owned by this tool, lowercase for case-insensitive
/// matching. All of them are deleted before a write.
const GAIN_DESCRIPTIONS: [&str; 5] = [
    "replaygain_track_gain",
    "replaygain_track_peak",
    "replaygain_album_gain",
    "replaygain_album_peak",
    "replaygain_reference_loudness",
];

/// Comment keys deleted before a write on comment-style containers.
const GAIN_COMMENT_KEYS: [&str; 7] = [
    TRACK_GAIN_KEY,
    TRACK_PEAK_KEY,
    ALBUM_GAIN_KEY,
    ALBUM_PEAK_KEY,
    REFERENCE_LOUDNESS_KEY,
    R128_TRACK_GAIN_KEY,
    R128_ALBUM_GAIN_KEY,
];

/// A file's tag storage, typed by container family.
pub enum TagContainer {
    /// ID3v2 tags (MP3).
    Id3(Id3v2Tag),
    /// Vorbis comments on an Opus stream.
    Opus(VorbisComments),
    /// MP4 `ilst` metadata.
    Mp4(Ilst),
    /// Anything else lofty can tag (FLAC, Vorbis, APE, ...).
    Generic(lofty::Tag),
}

impl TagContainer {
    /// Probe `path` and load its tag storage.
    ///
    /// A file lofty cannot identify, or that supports no tag storage at all,
    /// is a fatal [`TagError::UnknownContainer`]. A supported file without
    /// existing tags gets an empty tag of its primary type, like an untagged
    /// MP3 gets a fresh ID3v2 tag.
    pub fn open(path: &Path) -> Result<Self> {
        let probe = Probe::open(path)?.guess_file_type()?;
        let file_type = probe
            .file_type()
            .ok_or_else(|| TagError::UnknownContainer(path.to_path_buf()))?;

        match file_type {
            FileType::Mpeg => {
                let mut file = File::open(path)?;
                let mpeg = MpegFile::read_from(&mut file, ParseOptions::new())?;
                Ok(Self::Id3(mpeg.id3v2().cloned().unwrap_or_default()))
            }
            FileType::Opus => {
                let mut file = File::open(path)?;
                let opus = OpusFile::read_from(&mut file, ParseOptions::new())?;
                Ok(Self::Opus(opus.vorbis_comments().clone()))
            }
            FileType::Mp4 => {
                let mut file = File::open(path)?;
                let mp4 = Mp4File::read_from(&mut file, ParseOptions::new())?;
                Ok(Self::Mp4(mp4.ilst().cloned().unwrap_or_default()))
            }
            _ => {
                let tagged = probe.read()?;
                let tag_type = tagged.primary_tag_type();
                let tag = tagged
                    .primary_tag()
                    .or_else(|| tagged.first_tag())
                    .cloned()
                    .unwrap_or_else(|| lofty::Tag::new(tag_type));
                Ok(Self::Generic(tag))
            }
        }
    }

    /// Persist the container's tag back to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        match self {
            Self::Id3(tag) => tag.save_to_path(path)?,
            Self::Opus(tag) => tag.save_to_path(path)?,
            Self::Mp4(tag) => tag.save_to_path(path)?,
            Self::Generic(tag) => tag.save_to_path(path)?,
        }
        Ok(())
    }
}

fn decode_rva2_peak(info: &ChannelInformation) -> f64 {
    match (info.bits_representing_peak, info.peak_volume.as_ref()) {
        (16, Some(bytes)) if bytes.len() >= 2 => {
            f64::from(u16::from_be_bytes([bytes[0], bytes[1]])) / 32768.0
        }
        _ => 0.0,
    }
}

/// Snapshot the gain-relevant frames of an ID3v2 tag.
///
/// Only master-volume channel data is lifted from RVA2 frames; peaks stored
/// at widths other than 16 bits read as absent.
pub fn snapshot_id3(tag: &Id3v2Tag) -> Id3Snapshot {
    let mut snap = Id3Snapshot::default();
    for frame in tag {
        match frame.content() {
            FrameValue::UserText(user) => snap.user_texts.push(UserText {
                description: user.description.clone(),
                content: user.content.clone(),
            }),
            FrameValue::RelativeVolumeAdjustment(rva) => {
                if let Some(info) = rva.channels.get(&ChannelType::MasterVolume) {
                    snap.volume_frames.push(VolumeFrame {
                        identification: rva.identification.clone(),
                        gain_db: f64::from(info.volume_adjustment) / 512.0,
                        peak: decode_rva2_peak(info),
                    });
                }
            }
            _ => {}
        }
    }
    snap
}

/// Snapshot a Vorbis comment block.
pub fn snapshot_comments(tag: &VorbisComments) -> CommentSnapshot {
    CommentSnapshot {
        comments: tag
            .items()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    }
}

/// Snapshot the freeform atoms of an MP4 `ilst`.
///
/// Only the first data entry of each atom is considered, and only when it is
/// UTF-8; binary payloads are invisible to reconciliation and survive writes.
pub fn snapshot_ilst(tag: &Ilst) -> FreeformSnapshot {
    let mut snap = FreeformSnapshot::default();
    for atom in tag {
        if let AtomIdent::Freeform { mean, name } = atom.ident() {
            if let Some(AtomData::UTF8(value)) = atom.data().next() {
                snap.items.push(FreeformItem {
                    mean: mean.to_string(),
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
        }
    }
    snap
}

/// Snapshot the ReplayGain items of a generic tag.
pub fn snapshot_generic(tag: &lofty::Tag) -> CommentSnapshot {
    let mut snap = CommentSnapshot::default();
    let keys = [
        (TRACK_GAIN_KEY, ItemKey::ReplayGainTrackGain),
        (TRACK_PEAK_KEY, ItemKey::ReplayGainTrackPeak),
        (ALBUM_GAIN_KEY, ItemKey::ReplayGainAlbumGain),
        (ALBUM_PEAK_KEY, ItemKey::ReplayGainAlbumPeak),
    ];
    for (key, item_key) in keys {
        if let Some(value) = tag.get_string(&item_key) {
            snap.push(key, value);
        }
    }
    snap
}

/// Replace all gain frames on an ID3v2 tag.
///
/// TXXX descriptions are matched case-insensitively, so keys that only
/// differed in case are normalized by the delete-then-write cycle. Unrelated
/// frames are preserved untouched.
pub fn apply_id3(tag: &mut Id3v2Tag, replacement: &Id3Snapshot) -> Result<()> {
    let old = std::mem::take(tag);
    for frame in old {
        let keep = match frame.content() {
            FrameValue::UserText(user) => {
                !GAIN_DESCRIPTIONS.contains(&user.description.to_ascii_lowercase().as_str())
            }
            FrameValue::RelativeVolumeAdjustment(rva) => {
                !matches!(rva.identification.as_str(), "track" | "album")
            }
            _ => true,
        };
        if keep {
            let _ = tag.insert(frame);
        }
    }

    for user in &replacement.user_texts {
        let frame = Frame::new(
            "TXXX",
            FrameValue::UserText(ExtendedTextFrame {
                encoding: TextEncoding::Latin1,
                description: user.description.clone(),
                content: user.content.clone(),
            }),
            FrameFlags::default(),
        )?;
        let _ = tag.insert(frame);
    }

    for volume in &replacement.volume_frames {
        let peak_units = (volume.peak * 32768.0).round() as u16;
        let channel = ChannelInformation {
            channel_type: ChannelType::MasterVolume,
            volume_adjustment: (volume.gain_db * 512.0).round() as i16,
            bits_representing_peak: 16,
            peak_volume: Some(peak_units.to_be_bytes().to_vec()),
        };
        let frame = Frame::new(
            "RVA2",
            FrameValue::RelativeVolumeAdjustment(RelativeVolumeAdjustmentFrame {
                identification: volume.identification.clone(),
                channels: HashMap::from([(ChannelType::MasterVolume, channel)]),
            }),
            FrameFlags::default(),
        )?;
        let _ = tag.insert(frame);
    }

    Ok(())
}

/// Replace all gain comments on a Vorbis comment block.
pub fn apply_opus(tag: &mut VorbisComments, replacement: &CommentSnapshot) {
    for key in GAIN_COMMENT_KEYS {
        tag.remove(key).for_each(drop);
    }
    for (key, value) in &replacement.comments {
        tag.push(key.clone(), value.clone());
    }
}

/// Replace all gain freeform atoms on an MP4 `ilst`.
///
/// Atoms are deleted when their mean is one of the two gain namespaces, the
/// name matches a gain key case-insensitively, and the payload is UTF-8.
pub fn apply_ilst(tag: &mut Ilst, replacement: &FreeformSnapshot) {
    let old = std::mem::take(tag);
    for atom in old {
        let keep = match atom.ident() {
            AtomIdent::Freeform { mean, name } => {
                let gain_namespace = mean.as_ref() == ITUNES_MEAN || mean.as_ref() == REPLAYGAIN_MEAN;
                let gain_name = matches!(
                    name.to_ascii_lowercase().as_str(),
                    "replaygain_track_gain"
                        | "replaygain_track_peak"
                        | "replaygain_album_gain"
                        | "replaygain_album_peak"
                );
                let utf8 = matches!(atom.data().next(), Some(AtomData::UTF8(_)));
                !(gain_namespace && gain_name && utf8)
            }
            _ => true,
        };
        if keep {
            tag.insert(atom);
        }
    }

    for item in &replacement.items {
        tag.insert(Atom::new(
            AtomIdent::Freeform {
                mean: Cow::Owned(item.mean.clone()),
                name: Cow::Owned(item.name.clone()),
            },
            AtomData::UTF8(item.value.clone()),
        ));
    }
}

/// Replace all gain items on a generic tag.
pub fn apply_generic(tag: &mut lofty::Tag, replacement: &CommentSnapshot) {
    for item_key in [
        ItemKey::ReplayGainTrackGain,
        ItemKey::ReplayGainTrackPeak,
        ItemKey::ReplayGainAlbumGain,
        ItemKey::ReplayGainAlbumPeak,
    ] {
        tag.remove_key(&item_key);
    }
    // Legacy and foreign keys these containers should never carry after a
    // rewrite
    for key in [
        REFERENCE_LOUDNESS_KEY,
        R128_TRACK_GAIN_KEY,
        R128_ALBUM_GAIN_KEY,
    ] {
        tag.remove_key(&ItemKey::Unknown(key.to_string()));
    }

    for (key, value) in &replacement.comments {
        tag.insert_text(generic_item_key(key), value.clone());
    }
}

fn generic_item_key(key: &str) -> ItemKey {
    match key {
        TRACK_GAIN_KEY => ItemKey::ReplayGainTrackGain,
        TRACK_PEAK_KEY => ItemKey::ReplayGainTrackPeak,
        ALBUM_GAIN_KEY => ItemKey::ReplayGainAlbumGain,
        ALBUM_PEAK_KEY => ItemKey::ReplayGainAlbumPeak,
        other => ItemKey::Unknown(other.to_string()),
    }
}
