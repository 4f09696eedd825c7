//! Single-track scan protocol.

use std::path::{Path, PathBuf};

use regain_core::{GainInfo, TagPolicy};
use regain_tags::GainTagger;
use tokio::task;
use tracing::debug;

use crate::error::Result;
use crate::ffmpeg::GainScanner;
use crate::slots::JobSlots;

/// One audio file moving through read → measure → write.
///
/// Reads and writes hold a job slot and run on the blocking pool since tag
/// I/O is synchronous; measurements hold a slot while the subprocess runs.
/// The three phases of one track are strictly sequential.
pub struct Track {
    path: PathBuf,
    tagger: GainTagger,
    scanner: GainScanner,
    slots: JobSlots,
    pub(crate) gain: GainInfo,
    pub(crate) needs_track_rewrite: bool,
    pub(crate) needs_album_rewrite: bool,
}

/// Whether a measurement is required: values missing or a rescan forced.
pub(crate) fn needs_measurement(gain: &GainInfo, force: bool) -> bool {
    force || gain.loudness.is_none() || gain.peak.is_none()
}

impl Track {
    /// Create a track for `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        policy: TagPolicy,
        scanner: GainScanner,
        slots: JobSlots,
    ) -> Self {
        let path = path.into();
        Self {
            tagger: GainTagger::new(&path, policy),
            path,
            scanner,
            slots,
            gain: GainInfo::default(),
            needs_track_rewrite: false,
            needs_album_rewrite: false,
        }
    }

    /// The file this track refers to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current reconciled/measured values.
    pub fn gain(&self) -> &GainInfo {
        &self.gain
    }

    /// Load existing tags into this track's state.
    pub(crate) async fn read_tags(&mut self) -> Result<()> {
        let _slot = self.slots.acquire().await;
        let tagger = self.tagger.clone();
        let outcome = task::spawn_blocking(move || tagger.read_gain()).await??;
        self.gain = outcome.gain;
        self.needs_track_rewrite = outcome.needs_track_rewrite;
        self.needs_album_rewrite = outcome.needs_album_rewrite;
        Ok(())
    }

    /// Measure this file, overwriting the track-level values.
    pub(crate) async fn measure(&mut self) -> Result<()> {
        let _slot = self.slots.acquire().await;
        let measured = self.scanner.measure_track(&self.path).await?;
        self.gain.loudness = measured.loudness;
        self.gain.peak = measured.peak;
        debug!("{}: measured {}", self.path.display(), self.gain);
        Ok(())
    }

    /// Write the current values back to the file.
    pub(crate) async fn write_tags(&self) -> Result<()> {
        let _slot = self.slots.acquire().await;
        let tagger = self.tagger.clone();
        let gain = self.gain.clone();
        task::spawn_blocking(move || tagger.write_gain(&gain)).await??;
        Ok(())
    }

    /// Run the full scan protocol for this track.
    ///
    /// `force` remeasures even when tags look complete; `preview` reports
    /// what would change without writing.
    pub async fn scan(&mut self, force: bool, preview: bool) -> Result<()> {
        self.read_tags().await?;

        let rescan = needs_measurement(&self.gain, force);
        let mut save = self.needs_track_rewrite;

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
        let mut out = format!("\n{}\n{}", self.path.display(), self.gain);
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

    fn test_track(path: &str) -> Track {
        Track::new(
            path,
            TagPolicy::default(),
            GainScanner::new("ffmpeg"),
            JobSlots::new(1),
        )
    }

    #[test]
    fn complete_tags_need_no_measurement() {
        let gain = GainInfo {
            loudness: Some(-12.0),
            peak: Some(-0.5),
            album_loudness: None,
            album_peak: None,
        };
        assert!(!needs_measurement(&gain, false));
        assert!(needs_measurement(&gain, true));
    }

    #[test]
    fn missing_either_field_needs_measurement() {
        let no_peak = GainInfo {
            loudness: Some(-12.0),
            ..GainInfo::default()
        };
        let no_loudness = GainInfo {
            peak: Some(-0.5),
            ..GainInfo::default()
        };
        assert!(needs_measurement(&no_peak, false));
        assert!(needs_measurement(&no_loudness, false));
        assert!(needs_measurement(&GainInfo::default(), false));
    }

    #[test]
    fn nan_peak_counts_as_present() {
        // an R128-only opus file under the pure R128 policy reads with a NaN
        // peak marker and must not be remeasured
        let gain = GainInfo {
            loudness: Some(-23.0),
            peak: Some(f64::NAN),
            album_loudness: None,
            album_peak: None,
        };
        assert!(!needs_measurement(&gain, false));
    }

    #[test]
    fn report_lines_reflect_what_happened() {
        let mut track = test_track("music/song.flac");
        track.gain.loudness = Some(-10.0);
        track.gain.peak = Some(-1.0);

        let untouched = track.report(false, false, false);
        assert!(untouched.starts_with("\nmusic/song.flac\nTrack: I: -10.00 LUFS"));
        assert!(!untouched.contains("Updated tags"));

        let updated = track.report(true, true, false);
        assert!(updated.contains("Rescanned loudness"));
        assert!(updated.contains("Updated tags"));

        let previewed = track.report(false, true, true);
        assert!(previewed.contains("Needs tag update"));
        assert!(!previewed.contains("Updated tags"));
    }
}
