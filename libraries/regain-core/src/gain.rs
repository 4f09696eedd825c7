//! Gain measurement value type.

use std::fmt;

/// A loudness/peak measurement for one audio file.
///
/// Every field is optional: `None` means "not measured / not tagged", which
/// is semantically distinct from any numeric value. A NaN peak is a third
/// state — "a tag scheme that has no peak concept vouched for this file" —
/// and compares equal to itself (see [`same_value`]).
#[derive(Debug, Clone, Default)]
pub struct GainInfo {
    /// Integrated loudness of the track in LUFS.
    pub loudness: Option<f64>,
    /// Sample peak of the track in dBFS.
    pub peak: Option<f64>,
    /// Integrated loudness of the owning album in LUFS.
    pub album_loudness: Option<f64>,
    /// Sample peak of the owning album in dBFS.
    pub album_peak: Option<f64>,
}

/// Field-wise comparison that treats NaN markers as equal to each other.
///
/// Plain `Option<f64>` equality would report `Some(NaN) != Some(NaN)`, which
/// turns a valid-but-unknown peak into a perpetual "values disagree" signal.
pub fn same_value(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => false,
    }
}

impl PartialEq for GainInfo {
    fn eq(&self, other: &Self) -> bool {
        same_value(self.loudness, other.loudness)
            && same_value(self.peak, other.peak)
            && same_value(self.album_loudness, other.album_loudness)
            && same_value(self.album_peak, other.album_peak)
    }
}

impl GainInfo {
    /// True when both track-level fields are present.
    pub fn has_track_values(&self) -> bool {
        self.loudness.is_some() && self.peak.is_some()
    }

    /// True when either album-level field is present.
    pub fn has_album_values(&self) -> bool {
        self.album_loudness.is_some() || self.album_peak.is_some()
    }
}

fn fmt_field(f: &mut fmt::Formatter<'_>, label: &str, value: Option<f64>, unit: &str) -> fmt::Result {
    match value {
        Some(v) => write!(f, "{label}: {v:.2} {unit}"),
        None => write!(f, "{label}: None"),
    }
}

impl fmt::Display for GainInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Track: ")?;
        fmt_field(f, "I", self.loudness, "LUFS")?;
        write!(f, ", ")?;
        fmt_field(f, "Peak", self.peak, "dBFS")?;
        write!(f, "; Album: ")?;
        fmt_field(f, "I", self.album_loudness, "LUFS")?;
        write!(f, ", ")?;
        fmt_field(f, "Peak", self.album_peak, "dBFS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_compare_equal() {
        assert_eq!(GainInfo::default(), GainInfo::default());
    }

    #[test]
    fn absence_differs_from_zero() {
        let zeroed = GainInfo {
            loudness: Some(0.0),
            ..GainInfo::default()
        };
        assert_ne!(zeroed, GainInfo::default());
    }

    #[test]
    fn nan_peak_markers_compare_equal() {
        let a = GainInfo {
            loudness: Some(-23.0),
            peak: Some(f64::NAN),
            ..GainInfo::default()
        };
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn nan_peak_differs_from_absent_peak() {
        let tagged = GainInfo {
            peak: Some(f64::NAN),
            ..GainInfo::default()
        };
        assert_ne!(tagged, GainInfo::default());
        assert!(!same_value(Some(f64::NAN), None));
    }

    #[test]
    fn display_includes_all_four_fields() {
        let gain = GainInfo {
            loudness: Some(-9.5),
            peak: Some(-0.25),
            album_loudness: None,
            album_peak: None,
        };
        assert_eq!(
            gain.to_string(),
            "Track: I: -9.50 LUFS, Peak: -0.25 dBFS; Album: I: None, Peak: None"
        );
    }

    #[test]
    fn has_track_values_requires_both_fields() {
        let mut gain = GainInfo::default();
        assert!(!gain.has_track_values());
        gain.loudness = Some(-18.0);
        assert!(!gain.has_track_values());
        gain.peak = Some(-1.0);
        assert!(gain.has_track_values());
    }
}
