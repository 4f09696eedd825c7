//! regain - ReplayGain scanner and tagger.
//!
//! Groups the command line into individual tracks and albums, then scans
//! them all concurrently under one shared job-slot pool. Input grouping is
//! positional: each `--album` occurrence opens a new album, and `--exclude`
//! attaches to the album opened most recently before it (or, before any
//! album, to the implicit album formed from bare arguments).

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser, ValueEnum};
use futures_util::stream::{FuturesUnordered, StreamExt};
use regain_core::{Id3TagMode, OpusTagMode, TagPolicy};
use regain_scan::{Album, AlbumTrack, GainScanner, JobSlots, Track};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "regain",
    version,
    about = "Add ReplayGain tags to audio files using the EBU R128 algorithm",
    after_help = "If neither --track nor --album is given, the mode depends on the number of \
                  bare file arguments: a single file is processed in track mode, several files \
                  are processed together as one album."
)]
struct Cli {
    /// Only calculate and display the gain values; do not save tags
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Recalculate gain values even if valid tags are already present
    #[arg(short, long)]
    force: bool,

    /// Print a bunch of extra debugging output
    #[arg(long)]
    debug: bool,

    /// Number of operations to run in parallel (default: CPU count)
    #[arg(short, long, default_value_t = num_cpus::get(), value_name = "N")]
    jobs: usize,

    /// ffmpeg binary used for loudness measurement
    #[arg(long, default_value = "ffmpeg", value_name = "PATH")]
    ffmpeg: PathBuf,

    /// Which tag scheme(s) to write on Opus files
    #[arg(long, value_enum, default_value = "compatible", value_name = "SCHEME")]
    opus_tags: OpusTags,

    /// Which tag scheme(s) to write on ID3-tagged files
    #[arg(long, value_enum, default_value = "compatible", value_name = "SCHEME")]
    id3_tags: Id3Tags,

    /// Treat the following audio files as individual tracks
    #[arg(short, long, num_args = 1.., value_name = "FILE")]
    track: Vec<PathBuf>,

    /// Treat the following audio files as part of the same album; each
    /// --album occurrence starts a new album
    #[arg(short, long, num_args = 1.., value_name = "FILE", value_parser = clap::value_parser!(PathBuf))]
    album: Vec<Vec<PathBuf>>,

    /// Tag the following files as part of the current album without using
    /// their audio for the album gain value
    #[arg(short, long, num_args = 1.., value_name = "FILE", value_parser = clap::value_parser!(PathBuf))]
    exclude: Vec<Vec<PathBuf>>,

    /// Bare files; processed as one track or one implicit album
    #[arg(value_name = "FILE", hide = true)]
    files: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OpusTags {
    /// R128_* tags per the Ogg Opus encapsulation spec
    R128,
    /// REPLAYGAIN_* tags like FLAC and Vorbis
    Replaygain,
    /// Both sets of tags
    Compatible,
}

impl From<OpusTags> for OpusTagMode {
    fn from(value: OpusTags) -> Self {
        match value {
            OpusTags::R128 => Self::R128,
            OpusTags::Replaygain => Self::ReplayGain,
            OpusTags::Compatible => Self::Compatible,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Id3Tags {
    /// TXXX:REPLAYGAIN_* frames per the ReplayGain 2.0 spec
    Replaygain,
    /// ID3v2.4 RVA2 relative-volume frames
    Rva2,
    /// Both frame kinds
    Compatible,
}

impl From<Id3Tags> for Id3TagMode {
    fn from(value: Id3Tags) -> Self {
        match value {
            Id3Tags::Replaygain => Self::ReplayGain,
            Id3Tags::Rva2 => Self::Rva2,
            Id3Tags::Compatible => Self::Compatible,
        }
    }
}

/// One album as resolved from the command line.
#[derive(Debug, Default, PartialEq)]
struct AlbumSpec {
    tracks: Vec<PathBuf>,
    excludes: Vec<PathBuf>,
}

/// Pair each occurrence's values with the argv index of its first value, so
/// `--exclude` occurrences can be matched to the album opened before them.
fn occurrence_groups(
    values: Vec<Vec<PathBuf>>,
    indices: Vec<usize>,
) -> Vec<(usize, Vec<PathBuf>)> {
    let mut groups = Vec::with_capacity(values.len());
    let mut cursor = 0;
    for group in values {
        let start = indices.get(cursor).copied().unwrap_or(usize::MAX);
        cursor += group.len();
        groups.push((start, group));
    }
    groups
}

/// Resolve explicit and bare arguments into track and album work lists.
///
/// Excludes seen before any album accumulate as pending. Bare files form an
/// implicit album when there is more than one of them or any pending
/// exclude; exactly one bare file with no pending excludes is a track.
fn group_inputs(
    mut tracks: Vec<PathBuf>,
    bare: Vec<PathBuf>,
    albums: Vec<(usize, Vec<PathBuf>)>,
    excludes: Vec<(usize, Vec<PathBuf>)>,
) -> (Vec<PathBuf>, Vec<AlbumSpec>) {
    let album_starts: Vec<usize> = albums.iter().map(|(start, _)| *start).collect();
    let mut specs: Vec<AlbumSpec> = albums
        .into_iter()
        .map(|(_, tracks)| AlbumSpec {
            tracks,
            excludes: Vec::new(),
        })
        .collect();

    let mut pending: Vec<PathBuf> = Vec::new();
    for (exclude_start, files) in excludes {
        match album_starts
            .iter()
            .rposition(|album_start| *album_start < exclude_start)
        {
            Some(index) => specs[index].excludes.extend(files),
            None => pending.extend(files),
        }
    }

    if bare.len() + pending.len() > 1 || !pending.is_empty() {
        specs.insert(
            0,
            AlbumSpec {
                tracks: bare,
                excludes: pending,
            },
        );
    } else if bare.len() == 1 {
        tracks.extend(bare);
    }

    (tracks, specs)
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut command = Cli::command();
    let matches = command.clone().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    init_tracing(cli.debug);
    tracing::debug!("command line arguments: {cli:?}");

    let collect_indices = |id: &str| -> Vec<usize> {
        matches
            .indices_of(id)
            .map(|indices| indices.collect())
            .unwrap_or_default()
    };
    let albums = occurrence_groups(cli.album, collect_indices("album"));
    let excludes = occurrence_groups(cli.exclude, collect_indices("exclude"));
    let (tracks, albums) = group_inputs(cli.track, cli.files, albums, excludes);

    if tracks.is_empty() && albums.is_empty() {
        eprintln!("{}", command.render_usage());
        std::process::exit(2);
    }

    let policy = TagPolicy {
        opus: cli.opus_tags.into(),
        id3: cli.id3_tags.into(),
    };
    let slots = JobSlots::new(cli.jobs);
    let scanner = GainScanner::new(&cli.ffmpeg);
    let (force, preview) = (cli.force, cli.dry_run);

    let mut scans = FuturesUnordered::new();
    for spec in albums {
        let new_member = |path: PathBuf, excluded: bool| {
            AlbumTrack::new(
                Track::new(path, policy, scanner.clone(), slots.clone()),
                excluded,
            )
        };
        let members: Vec<AlbumTrack> = spec
            .tracks
            .into_iter()
            .map(|path| new_member(path, false))
            .chain(spec.excludes.into_iter().map(|path| new_member(path, true)))
            .collect();
        let mut album = Album::new(members, scanner.clone(), slots.clone());
        scans.push(tokio::spawn(
            async move { album.scan(force, preview).await },
        ));
    }
    for path in tracks {
        let mut track = Track::new(path, policy, scanner.clone(), slots.clone());
        scans.push(tokio::spawn(
            async move { track.scan(force, preview).await },
        ));
    }

    // Fail the batch on the first failure; already-running scans finish on
    // their own but the process exits after the join loop unwinds.
    while let Some(joined) = scans.next().await {
        joined??;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn single_bare_file_is_a_track() {
        let (tracks, albums) = group_inputs(Vec::new(), paths(&["one.flac"]), vec![], vec![]);
        assert_eq!(tracks, paths(&["one.flac"]));
        assert!(albums.is_empty());
    }

    #[test]
    fn multiple_bare_files_form_an_implicit_album() {
        let (tracks, albums) =
            group_inputs(Vec::new(), paths(&["a.flac", "b.flac"]), vec![], vec![]);
        assert!(tracks.is_empty());
        assert_eq!(
            albums,
            vec![AlbumSpec {
                tracks: paths(&["a.flac", "b.flac"]),
                excludes: Vec::new(),
            }]
        );
    }

    #[test]
    fn pending_exclude_turns_bare_files_into_an_album() {
        let (tracks, albums) = group_inputs(
            Vec::new(),
            paths(&["a.flac"]),
            vec![],
            vec![(1, paths(&["skit.flac"]))],
        );
        assert!(tracks.is_empty());
        assert_eq!(
            albums,
            vec![AlbumSpec {
                tracks: paths(&["a.flac"]),
                excludes: paths(&["skit.flac"]),
            }]
        );
    }

    #[test]
    fn excludes_attach_to_the_most_recent_album() {
        // regain -a a1 a2 -e x1 -a b1 -e x2
        let (tracks, albums) = group_inputs(
            Vec::new(),
            Vec::new(),
            vec![(1, paths(&["a1", "a2"])), (5, paths(&["b1"]))],
            vec![(4, paths(&["x1"])), (7, paths(&["x2"]))],
        );
        assert!(tracks.is_empty());
        assert_eq!(
            albums,
            vec![
                AlbumSpec {
                    tracks: paths(&["a1", "a2"]),
                    excludes: paths(&["x1"]),
                },
                AlbumSpec {
                    tracks: paths(&["b1"]),
                    excludes: paths(&["x2"]),
                },
            ]
        );
    }

    #[test]
    fn explicit_tracks_and_albums_coexist_with_bare_files() {
        let (tracks, albums) = group_inputs(
            paths(&["t1.flac"]),
            paths(&["bare.flac"]),
            vec![(3, paths(&["a1", "a2"]))],
            vec![],
        );
        assert_eq!(tracks, paths(&["t1.flac", "bare.flac"]));
        assert_eq!(albums.len(), 1);
    }

    #[test]
    fn occurrence_groups_pair_starts_with_values() {
        let groups = occurrence_groups(
            vec![paths(&["a", "b"]), paths(&["c"])],
            vec![1, 2, 5],
        );
        assert_eq!(groups[0].0, 1);
        assert_eq!(groups[0].1, paths(&["a", "b"]));
        assert_eq!(groups[1].0, 5);
        assert_eq!(groups[1].1, paths(&["c"]));
    }
}
