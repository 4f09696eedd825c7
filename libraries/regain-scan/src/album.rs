//! Album scan protocol: aggregate measurement and fan-out.

use std::path::PathBuf;

use futures_util::future::try_join_all;
use regain_core::{same_value, GainInfo};
use tracing::debug;

use crate::error::Result;
use crate::ffmpeg::GainScanner;
use crate::slots::JobSlots;
use crate::track::{needs_measurement, Track};

/// An album member: a track plus whether its audio is excluded from the
/// album-level measurement. Excluded members still receive the album's
/// aggregate tags.
pub struct AlbumTrack {
    /// The underlying track.
    pub track: Track,
    /// Skip this member's audio when measuring the album.
    pub excluded: bool,
}

impl AlbumTrack {
    /// Wrap a track as an album member.
    pub fn new(track: Track, excluded: bool) -> Self {
        Self { track, excluded }
    }
}

/// An ordered set of tracks tagged with one shared album gain.
///
/// Album loudness is measured over the concatenation of the included
/// members' audio; album peak is the maximum of the included members' own
/// peaks. After a successful scan every member carries the same album
/// values.
pub struct Album {
    tracks: Vec<AlbumTrack>,
    scanner: GainScanner,
    slots: JobSlots,
    gain: GainInfo,
}

impl Album {
    /// Create an album over `tracks`.
    pub fn new(tracks: Vec<AlbumTrack>, scanner: GainScanner, slots: JobSlots) -> Self {
        Self {
            tracks,
            scanner,
            slots,
            gain: GainInfo::default(),
        }
    }

    /// Album members in order.
    pub fn tracks(&self) -> &[AlbumTrack] {
        &self.tracks
    }

    async fn read_tags(&mut self) -> Result<()> {
        try_join_all(self.tracks.iter_mut().map(|member| member.track.read_tags())).await?;
        Ok(())
    }

    /// Decide whether the album needs remeasuring, adopting the first-seen
    /// album values as the candidate aggregate along the way.
    ///
    /// A rescan is needed when any member lacks track values, when members
    /// disagree on the album values (NaN markers compare equal), or when no
    /// complete aggregate exists at all.
    fn assess(&mut self, force: bool) -> bool {
        let mut rescan = force;
        for member in &self.tracks {
            let gain = &member.track.gain;
            if needs_measurement(gain, false) {
                rescan = true;
            }
            if self.gain.album_loudness.is_none() {
                self.gain.album_loudness = gain.album_loudness;
            }
            if !same_value(self.gain.album_loudness, gain.album_loudness) {
                rescan = true;
            }
            if self.gain.album_peak.is_none() {
                self.gain.album_peak = gain.album_peak;
            }
            if !same_value(self.gain.album_peak, gain.album_peak) {
                rescan = true;
            }
        }
        if self.gain.album_loudness.is_none() || self.gain.album_peak.is_none() {
            rescan = true;
        }
        rescan
    }

    /// Measure the album aggregate and every member concurrently, then
    /// distribute the results.
    async fn measure(&mut self) -> Result<()> {
        let included: Vec<PathBuf> = self
            .tracks
            .iter()
            .filter(|member| !member.excluded)
            .map(|member| member.track.path().to_path_buf())
            .collect();

        let scanner = self.scanner.clone();
        let slots = self.slots.clone();
        let aggregate = async move {
            let _slot = slots.acquire().await;
            scanner.measure_album(&included).await
        };
        let members = try_join_all(self.tracks.iter_mut().map(|member| member.track.measure()));

        let (aggregate, _) = tokio::try_join!(aggregate, members)?;
        self.gain = aggregate;
        self.distribute();
        Ok(())
    }

    /// Replace the aggregate peak with the maximum of the included members'
    /// own peaks and fan the album values out to every member.
    ///
    /// The concatenation measurement's peak is discarded: the per-track
    /// maximum is what a player needs for clipping prevention, and the
    /// excluded members must not raise it.
    fn distribute(&mut self) {
        self.gain.album_peak = self
            .tracks
            .iter()
            .filter(|member| !member.excluded)
            .filter_map(|member| member.track.gain.peak)
            .fold(None, |max, peak| {
                Some(match max {
                    None => peak,
                    Some(current) => current.max(peak),
                })
            });

        debug!("album aggregate: {}", self.gain);

        for member in &mut self.tracks {
            member.track.gain.album_loudness = self.gain.album_loudness;
            member.track.gain.album_peak = self.gain.album_peak;
        }
    }

    async fn write_tags(&self) -> Result<()> {
        try_join_all(self.tracks.iter().map(|member| member.track.write_tags())).await?;
        Ok(())
    }

    /// Run the full scan protocol for the album.
    pub async fn scan(&mut self, force: bool, preview: bool) -> Result<()> {
        self.read_tags().await?;

        let rescan = self.assess(force);
        let mut save = self
            .tracks
            .iter()
            .any(|member| member.track.needs_album_rewrite);

        if rescan {
            self.measure().await?;
            save = true;
        }

        if save && !preview {
            self.write_tags().await?;
        }

        println!("{}", self.report(rescan, save, preview));
        Ok(())
    }

    fn report(&self, rescanned: bool, save: bool, preview: bool) -> String {
        let mut out = String::new();
        for member in &self.tracks {
            out.push_str(&format!(
                "\n{}\n{}",
                member.track.path().display(),
                member.track.gain
            ));
        }
        if rescanned {
            out.push_str("\nRescanned loudness");
        }
        if save {
            out.push_str(if preview {
                "\nNeeds tag update"
            } else {
                "\nUpdated tags"
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regain_core::TagPolicy;

    fn member(path: &str, gain: GainInfo, excluded: bool) -> AlbumTrack {
        let mut track = Track::new(
            path,
            TagPolicy::default(),
            GainScanner::new("ffmpeg"),
            JobSlots::new(1),
        );
        track.gain = gain;
        AlbumTrack::new(track, excluded)
    }

    fn album(tracks: Vec<AlbumTrack>) -> Album {
        Album::new(tracks, GainScanner::new("ffmpeg"), JobSlots::new(1))
    }

    fn tagged(loudness: f64, peak: f64, album_loudness: f64, album_peak: f64) -> GainInfo {
        GainInfo {
            loudness: Some(loudness),
            peak: Some(peak),
            album_loudness: Some(album_loudness),
            album_peak: Some(album_peak),
        }
    }

    #[test]
    fn consistent_album_tags_need_no_rescan() {
        let mut album = album(vec![
            member("a.flac", tagged(-10.0, -1.0, -11.0, -0.5), false),
            member("b.flac", tagged(-12.0, -0.5, -11.0, -0.5), false),
        ]);
        assert!(!album.assess(false));
        assert!(album.assess(true));
    }

    #[test]
    fn missing_member_values_force_rescan() {
        let mut incomplete = album(vec![
            member("a.flac", tagged(-10.0, -1.0, -11.0, -0.5), false),
            member(
                "b.flac",
                GainInfo {
                    album_loudness: Some(-11.0),
                    album_peak: Some(-0.5),
                    ..GainInfo::default()
                },
                false,
            ),
        ]);
        assert!(incomplete.assess(false));
    }

    #[test]
    fn disagreeing_album_values_force_rescan() {
        let mut disagreeing = album(vec![
            member("a.flac", tagged(-10.0, -1.0, -11.0, -0.5), false),
            member("b.flac", tagged(-12.0, -0.5, -13.0, -0.5), false),
        ]);
        assert!(disagreeing.assess(false));
    }

    #[test]
    fn absent_aggregate_forces_rescan() {
        let mut untagged = album(vec![member(
            "a.flac",
            GainInfo {
                loudness: Some(-10.0),
                peak: Some(-1.0),
                ..GainInfo::default()
            },
            false,
        )]);
        assert!(untagged.assess(false));
    }

    #[test]
    fn nan_album_peaks_compare_equal_across_members() {
        // two R128-only opus members read with NaN peak markers; that must
        // not read as disagreement
        let mut album = album(vec![
            member(
                "a.opus",
                GainInfo {
                    loudness: Some(-23.0),
                    peak: Some(f64::NAN),
                    album_loudness: Some(-22.0),
                    album_peak: Some(f64::NAN),
                },
                false,
            ),
            member(
                "b.opus",
                GainInfo {
                    loudness: Some(-21.0),
                    peak: Some(f64::NAN),
                    album_loudness: Some(-22.0),
                    album_peak: Some(f64::NAN),
                },
                false,
            ),
        ]);
        assert!(!album.assess(false));
    }

    #[test]
    fn distribute_takes_max_peak_over_included_members_only() {
        let mut album = album(vec![
            member(
                "a.flac",
                GainInfo {
                    loudness: Some(-10.0),
                    peak: Some(-3.0),
                    ..GainInfo::default()
                },
                false,
            ),
            member(
                "b.flac",
                GainInfo {
                    loudness: Some(-9.0),
                    peak: Some(-1.5),
                    ..GainInfo::default()
                },
                false,
            ),
            member(
                "c.flac",
                GainInfo {
                    loudness: Some(-14.0),
                    peak: Some(-6.0),
                    ..GainInfo::default()
                },
                false,
            ),
            member(
                "hidden.flac",
                GainInfo {
                    loudness: Some(-5.0),
                    peak: Some(-0.1),
                    ..GainInfo::default()
                },
                true,
            ),
        ]);
        album.gain.album_loudness = Some(-10.5);

        album.distribute();

        assert_eq!(album.gain.album_peak, Some(-1.5));
        for member in album.tracks() {
            assert_eq!(member.track.gain.album_peak, Some(-1.5));
            assert_eq!(member.track.gain.album_loudness, Some(-10.5));
        }
    }

    #[test]
    fn report_lists_every_member() {
        let album = album(vec![
            member("a.flac", tagged(-10.0, -1.0, -11.0, -0.5), false),
            member("b.flac", tagged(-12.0, -0.5, -11.0, -0.5), true),
        ]);
        let report = album.report(true, true, true);
        assert!(report.contains("a.flac"));
        assert!(report.contains("b.flac"));
        assert!(report.contains("Rescanned loudness"));
        assert!(report.contains("Needs tag update"));
    }
}
