//! Per-file tagging facade.

use std::path::{Path, PathBuf};

use regain_core::{GainInfo, TagPolicy};
use tracing::debug;

use crate::container::{self, TagContainer};
use crate::reconcile::{self, ReadOutcome};
use crate::Result;

/// Reads and writes the gain tags of one file.
///
/// The container family is probed on every operation, so a tagger is just a
/// path plus the policy — cheap to clone and safe to move into
/// `spawn_blocking`. Both operations are blocking.
#[derive(Debug, Clone)]
pub struct GainTagger {
    path: PathBuf,
    policy: TagPolicy,
}

impl GainTagger {
    /// Create a tagger for `path` under `policy`.
    pub fn new(path: impl Into<PathBuf>, policy: TagPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    /// The file this tagger operates on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and reconcile all gain metadata on the file.
    pub fn read_gain(&self) -> Result<ReadOutcome> {
        let container = TagContainer::open(&self.path)?;
        let mut outcome = match &container {
            TagContainer::Id3(tag) => {
                reconcile::merge_id3(&container::snapshot_id3(tag), self.policy.id3)
            }
            TagContainer::Opus(tag) => {
                reconcile::merge_opus(&container::snapshot_comments(tag), self.policy.opus)
            }
            TagContainer::Mp4(tag) => reconcile::merge_mp4(&container::snapshot_ilst(tag)),
            TagContainer::Generic(tag) => {
                reconcile::merge_generic(&container::snapshot_generic(tag))
            }
        };

        // Album tags mean this file takes part in album bookkeeping even
        // when its own track tags are current.
        if outcome.gain.has_album_values() {
            outcome.needs_track_rewrite = true;
        }

        debug!("{}: read {}", self.path.display(), outcome.gain);
        Ok(outcome)
    }

    /// Delete all known gain metadata on the file and write `gain` back
    /// under the configured policy.
    pub fn write_gain(&self, gain: &GainInfo) -> Result<()> {
        let file = self.path.display().to_string();
        let mut container = TagContainer::open(&self.path)?;

        match &mut container {
            TagContainer::Id3(tag) => {
                container::apply_id3(tag, &reconcile::render_id3(gain, self.policy.id3, &file))?;
            }
            TagContainer::Opus(tag) => {
                container::apply_opus(tag, &reconcile::render_opus(gain, self.policy.opus, &file));
            }
            TagContainer::Mp4(tag) => {
                container::apply_ilst(tag, &reconcile::render_mp4(gain));
            }
            TagContainer::Generic(tag) => {
                container::apply_generic(tag, &reconcile::render_generic(gain));
            }
        }

        debug!("{file}: writing {gain}");
        container.save(&self.path)
    }
}
