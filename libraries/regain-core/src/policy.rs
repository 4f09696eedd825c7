//! Tagging policy: which gain-tag scheme(s) to emit per container family.

/// Tag scheme selection for Opus-in-Ogg files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpusTagMode {
    /// Write `R128_TRACK_GAIN` / `R128_ALBUM_GAIN` as specified by the Ogg
    /// Opus encapsulation document, relative to the -23 LUFS EBU R128
    /// reference. Standards compliant, limited application support.
    R128,

    /// Write `REPLAYGAIN_*` comments like FLAC and Vorbis use, relative to
    /// the -18 LUFS ReplayGain 2.0 reference. Against the spirit of the
    /// encapsulation spec, but most players share their ReplayGain parsing
    /// across all Ogg-family formats.
    ReplayGain,

    /// Write both sets of tags. Both are derived from the same measurement,
    /// so whichever one a player picks yields the same playback gain.
    #[default]
    Compatible,
}

impl OpusTagMode {
    /// True when this mode emits the R128 fixed-point tags.
    pub fn writes_r128(self) -> bool {
        matches!(self, Self::R128 | Self::Compatible)
    }

    /// True when this mode emits the ReplayGain text tags.
    pub fn writes_replaygain(self) -> bool {
        matches!(self, Self::ReplayGain | Self::Compatible)
    }
}

/// Tag scheme selection for ID3-tagged files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Id3TagMode {
    /// Write `TXXX:REPLAYGAIN_*` frames per the ReplayGain 2.0 spec.
    ReplayGain,

    /// Write ID3v2.4 RVA2 relative-volume frames.
    Rva2,

    /// Write both frame kinds.
    #[default]
    Compatible,
}

impl Id3TagMode {
    /// True when this mode emits the `TXXX:REPLAYGAIN_*` frames.
    pub fn writes_replaygain(self) -> bool {
        matches!(self, Self::ReplayGain | Self::Compatible)
    }

    /// True when this mode emits RVA2 frames.
    pub fn writes_rva2(self) -> bool {
        matches!(self, Self::Rva2 | Self::Compatible)
    }
}

/// Process-wide tagging policy.
///
/// Built once before any scan starts and passed by value into every tagger;
/// nothing mutates it afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagPolicy {
    /// Scheme selection for Opus files.
    pub opus: OpusTagMode,
    /// Scheme selection for ID3-tagged files.
    pub id3: Id3TagMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_compatible_for_both_families() {
        let policy = TagPolicy::default();
        assert_eq!(policy.opus, OpusTagMode::Compatible);
        assert_eq!(policy.id3, Id3TagMode::Compatible);
    }

    #[test]
    fn compatible_modes_write_both_schemes() {
        assert!(OpusTagMode::Compatible.writes_r128());
        assert!(OpusTagMode::Compatible.writes_replaygain());
        assert!(!OpusTagMode::R128.writes_replaygain());
        assert!(!OpusTagMode::ReplayGain.writes_r128());
        assert!(Id3TagMode::Compatible.writes_rva2());
        assert!(!Id3TagMode::ReplayGain.writes_rva2());
        assert!(!Id3TagMode::Rva2.writes_replaygain());
    }
}
