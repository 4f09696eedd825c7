//! ffmpeg-based loudness measurement.
//!
//! The measurement contract is ffmpeg's `ebur128` filter with verbose frame
//! logging: the filter prints running summaries to stderr, and the final
//! summary's `I:` (integrated loudness, LUFS) and `Peak:` (sample peak,
//! dBFS) lines carry the values for the whole input. Later summaries
//! supersede earlier ones, so parsing keeps the last match of each pattern.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use regain_core::GainInfo;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, ScanError};

fn loudness_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s+I:\s+(-?\d+\.\d+) LUFS$").expect("hard-coded pattern"))
}

fn peak_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s+Peak:\s+(-?\d+\.\d+) dBFS$").expect("hard-coded pattern"))
}

/// Parse an ebur128 report, taking the last match of each line pattern.
fn parse_report(stderr: &str) -> GainInfo {
    let mut result = GainInfo::default();
    if let Some(captures) = loudness_line().captures_iter(stderr).last() {
        result.loudness = captures[1].parse().ok();
    }
    if let Some(captures) = peak_line().captures_iter(stderr).last() {
        result.peak = captures[1].parse().ok();
    }
    result
}

/// Measures loudness and peak by running ffmpeg over decoded audio.
#[derive(Debug, Clone)]
pub struct GainScanner {
    ffmpeg: PathBuf,
}

impl GainScanner {
    /// Create a scanner invoking the given ffmpeg binary.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    async fn run_ebur128(&self, filter_args: Vec<OsString>) -> Result<GainInfo> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-nostats", "-nostdin", "-hide_banner", "-vn", "-loglevel", "info"])
            .args(filter_args)
            .args(["-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!("running measurement: {:?}", command.as_std());

        let output = command.output().await.map_err(|source| ScanError::Launch {
            command: self.ffmpeg.display().to_string(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ScanError::Measurement {
                status: output.status,
                stderr,
            });
        }

        Ok(parse_report(&stderr))
    }

    /// Measure one file. Returns a `GainInfo` with only the track fields
    /// populated.
    pub async fn measure_track(&self, path: &Path) -> Result<GainInfo> {
        let mut args: Vec<OsString> = Vec::new();
        args.push("-i".into());
        args.push(input_arg(path));
        args.push("-filter_complex".into());
        args.push("ebur128=framelog=verbose:peak=true[out]".into());
        args.push("-map".into());
        args.push("[out]".into());
        self.run_ebur128(args).await
    }

    /// Measure the concatenation of `paths` as one virtual signal. Returns a
    /// `GainInfo` with only the album fields populated; the concatenation's
    /// own peak is not meaningful for tagging and is dropped by the caller's
    /// aggregation.
    pub async fn measure_album(&self, paths: &[PathBuf]) -> Result<GainInfo> {
        if paths.is_empty() {
            return Err(ScanError::EmptyAlbum);
        }

        let mut args: Vec<OsString> = Vec::new();
        for path in paths {
            args.push("-i".into());
            args.push(input_arg(path));
        }
        args.push("-filter_complex".into());
        args.push(
            format!(
                "concat=n={}:v=0:a=1,ebur128=framelog=verbose[out]",
                paths.len()
            )
            .into(),
        );
        args.push("-map".into());
        args.push("[out]".into());

        let measured = self.run_ebur128(args).await?;
        Ok(GainInfo {
            loudness: None,
            peak: None,
            album_loudness: measured.loudness,
            album_peak: measured.peak,
        })
    }
}

/// Prefix the path with the `file:` protocol so filenames containing `:` are
/// not mistaken for protocol URLs.
fn input_arg(path: &Path) -> OsString {
    let mut arg = OsString::from("file:");
    arg.push(path.as_os_str());
    arg
}
