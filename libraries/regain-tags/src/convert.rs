//! Unit conversions between the measurement domain and stored tag values.
//!
//! Measurements are integrated loudness in LUFS and sample peak in dBFS.
//! Each scheme stores something else:
//!
//! - ReplayGain text tags store a gain in dB relative to -18 LUFS, and a
//!   peak as linear amplitude
//! - Opus R128 tags store a gain in 1/256 dB units relative to -23 LUFS,
//!   as a signed 16-bit integer
//! - RVA2 frames store a gain in dB and a peak as a fraction of a 16-bit
//!   linear scale (denominator 32768)
//!
//! All conversions are pure. Values that do not fit their stored range are
//! clamped with a warning; rounding is half-to-even for the RVA2 peak (the
//! on-disk convention this tool round-trips against) and half-away-from-zero
//! everywhere else.

use regain_core::{R128_REFERENCE_LUFS, REPLAYGAIN_REFERENCE_LUFS};
use tracing::warn;

/// Extract the leading signed decimal number from a tag value, ignoring any
/// trailing unit label (`"-4.17 dB"` parses as `-4.17`).
fn decimal_prefix(value: &str) -> Option<f64> {
    let s = value.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    if bytes.get(end) == Some(&b'.') {
        let mut frac = end + 1;
        while bytes.get(frac).is_some_and(u8::is_ascii_digit) {
            frac += 1;
        }
        if frac > end + 1 {
            end = frac;
        }
    }
    s[..end].parse().ok()
}

/// Extract the leading signed integer from a tag value.
fn integer_prefix(value: &str) -> Option<i64> {
    let s = value.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

/// Parse a ReplayGain gain string back into loudness (LUFS).
pub fn parse_gain_text(value: &str) -> Option<f64> {
    decimal_prefix(value).map(|gain| REPLAYGAIN_REFERENCE_LUFS - gain)
}

/// Format loudness (LUFS) as a ReplayGain gain string.
pub fn format_gain_text(loudness: f64) -> String {
    format!("{:.2} dB", REPLAYGAIN_REFERENCE_LUFS - loudness)
}

/// Parse a ReplayGain peak string (linear amplitude) into dBFS.
///
/// A zero or negative stored amplitude has no dB representation and reads
/// as absent.
pub fn parse_peak_text(value: &str) -> Option<f64> {
    let amplitude = decimal_prefix(value)?;
    if amplitude <= 0.0 {
        return None;
    }
    Some(20.0 * amplitude.log10())
}

/// Format a peak (dBFS) as a ReplayGain linear-amplitude string.
pub fn format_peak_text(peak: f64) -> String {
    format!("{:.6}", 10.0_f64.powf(peak / 20.0))
}

/// Parse an Opus R128 fixed-point gain value back into loudness (LUFS).
pub fn parse_opus_gain(value: &str) -> Option<f64> {
    integer_prefix(value).map(|units| R128_REFERENCE_LUFS - units as f64 / 256.0)
}

/// Format loudness (LUFS) as an Opus R128 fixed-point gain value.
///
/// The stored value is `(ref - loudness) * 256` rounded, clamped to the
/// signed 16-bit range. Clamping logs one warning naming the file and the
/// scope ("track"/"album") with both dB-equivalent values.
pub fn format_opus_gain(loudness: f64, file: &str, context: &str) -> String {
    let raw = ((R128_REFERENCE_LUFS - loudness) * 256.0).round() as i64;
    let clamped = raw.clamp(i64::from(i16::MIN), i64::from(i16::MAX));
    if raw != clamped {
        warn!(
            "{file}: clipping Opus R128 {context} gain adjustment {:.2} dB to {:.2} dB",
            raw as f64 / 256.0,
            clamped as f64 / 256.0,
        );
    }
    clamped.to_string()
}

/// Quantize a linear peak amplitude (in 1/32768 units) to a whole unit count,
/// rounding halves to even. Separated out so the tie behavior is testable
/// without floating-point noise from the dB conversion.
fn quantize_peak_units(units: f64) -> f64 {
    units.round_ties_even()
}

/// Convert a peak (dBFS) to the RVA2 stored representation: a fraction of a
/// 16-bit linear scale, at most `65535 / 32768`.
///
/// Clamping logs one warning naming the file and scope, mirroring the Opus
/// gain clamp.
pub fn rva2_peak_from_dbfs(peak: f64, file: &str, context: &str) -> f64 {
    let units = quantize_peak_units(10.0_f64.powf(peak / 20.0) * 32768.0);
    if units > 65535.0 {
        warn!(
            "{file}: clipping RVA2 {context} peak {:.2} to {:.2}",
            units / 32768.0,
            65535.0 / 32768.0,
        );
        return 65535.0 / 32768.0;
    }
    units / 32768.0
}

/// Convert an RVA2 stored peak (linear, 1.0 = full scale) back to dBFS.
///
/// A zero peak (RVA2 frames without peak data) has no dB representation and
/// reads as absent.
pub fn rva2_peak_to_dbfs(peak_linear: f64) -> Option<f64> {
    if peak_linear <= 0.0 {
        return None;
    }
    Some(20.0 * peak_linear.log10())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn gain_text_parses_with_and_without_unit() {
        assert_eq!(parse_gain_text("-4.50 dB"), Some(-18.0 + 4.5));
        assert_eq!(parse_gain_text("  +2.00dB"), Some(-20.0));
        assert_eq!(parse_gain_text("3"), Some(-21.0));
        assert_eq!(parse_gain_text("junk"), None);
        assert_eq!(parse_gain_text(""), None);
        assert_eq!(parse_gain_text("-"), None);
    }

    #[test]
    fn gain_text_formats_relative_to_reference() {
        assert_eq!(format_gain_text(-23.0), "5.00 dB");
        assert_eq!(format_gain_text(-9.25), "-8.75 dB");
    }

    #[test]
    fn peak_text_roundtrip_holds_at_six_decimals() {
        for peak in [-0.1, -1.5, -6.0, -30.0] {
            let parsed = parse_peak_text(&format_peak_text(peak)).unwrap();
            assert!((parsed - peak).abs() < 1e-3, "peak {peak} -> {parsed}");
        }
    }

    #[test]
    fn nonpositive_peak_amplitude_reads_as_absent() {
        assert_eq!(parse_peak_text("0.000000"), None);
        assert_eq!(parse_peak_text("-1.0"), None);
    }

    #[test]
    fn opus_gain_roundtrip_within_fixed_point_step() {
        for loudness in [-23.0, -18.0, -7.3, -30.25] {
            let stored = format_opus_gain(loudness, "a.opus", "track");
            let parsed = parse_opus_gain(&stored).unwrap();
            assert!(
                (parsed - loudness).abs() <= 1.0 / 512.0 + 1e-9,
                "loudness {loudness} -> {stored} -> {parsed}"
            );
        }
    }

    #[test]
    fn opus_gain_clamps_to_signed_16_bit_range() {
        // (−23 − loudness)·256 over 32767 means loudness below ≈ −151 LUFS
        assert_eq!(format_opus_gain(-200.0, "a.opus", "track"), "32767");
        assert_eq!(format_opus_gain(150.0, "a.opus", "album"), "-32768");
    }

    #[test]
    fn opus_gain_parse_ignores_suffix() {
        assert_eq!(parse_opus_gain("1280"), Some(-28.0));
        assert_eq!(parse_opus_gain("-256 units"), Some(-22.0));
        assert_eq!(parse_opus_gain("x1"), None);
    }

    #[test]
    fn peak_units_round_half_to_even() {
        assert_eq!(quantize_peak_units(2.5), 2.0);
        assert_eq!(quantize_peak_units(3.5), 4.0);
        assert_eq!(quantize_peak_units(-0.5), 0.0);
        assert_eq!(quantize_peak_units(2.4), 2.0);
    }

    #[test]
    fn rva2_peak_clamps_at_16_bit_ceiling() {
        // +7 dBFS is ~2.24 linear, well past 65535/32768
        let clamped = rva2_peak_from_dbfs(7.0, "a.mp3", "track");
        assert_eq!(clamped, 65535.0 / 32768.0);
    }

    #[test]
    fn rva2_peak_roundtrip() {
        for peak in [-0.5, -3.0, -12.0] {
            let stored = rva2_peak_from_dbfs(peak, "a.mp3", "track");
            let back = rva2_peak_to_dbfs(stored).unwrap();
            // one 1/32768 step of linear resolution
            assert!((back - peak).abs() < 0.01, "peak {peak} -> {back}");
        }
    }

    #[test]
    fn rva2_zero_peak_reads_as_absent() {
        assert_eq!(rva2_peak_to_dbfs(0.0), None);
    }

    proptest! {
        #[test]
        fn gain_text_roundtrip(loudness in -60.0_f64..20.0) {
            let parsed = parse_gain_text(&format_gain_text(loudness)).unwrap();
            prop_assert!((parsed - loudness).abs() <= 0.01);
        }

        #[test]
        fn peak_text_roundtrip(peak in -40.0_f64..10.0) {
            let parsed = parse_peak_text(&format_peak_text(peak)).unwrap();
            prop_assert!((parsed - peak).abs() <= 0.01);
        }

        #[test]
        fn opus_gain_roundtrip(loudness in -80.0_f64..0.0) {
            let stored = format_opus_gain(loudness, "p.opus", "track");
            let parsed = parse_opus_gain(&stored).unwrap();
            prop_assert!((parsed - loudness).abs() <= 1.0 / 512.0 + 1e-9);
        }
    }
}
