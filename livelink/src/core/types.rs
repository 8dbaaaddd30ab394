//! Shared domain types for pairing and auditing.
//!
//! These types are plain data: they carry no I/O and serialize to the stable
//! formats the server and the ledger CSV expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media category reported by the server in the asset `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    #[serde(other)]
    Other,
}

/// Remote asset record as returned by listing and get-by-id calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub original_file_name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub file_created_at: DateTime<Utc>,
    /// Companion video id; `None` means the asset is unlinked.
    #[serde(default)]
    pub live_photo_video_id: Option<String>,
}

impl Asset {
    pub fn is_linked(&self) -> bool {
        self.live_photo_video_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// Proposed photo/video association produced by the pairing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePair {
    pub photo_asset_id: String,
    pub video_asset_id: String,
    pub photo_filename: String,
    pub video_filename: String,
    pub photo_created_at: DateTime<Utc>,
    pub video_created_at: DateTime<Utc>,
}

impl CandidatePair {
    pub fn from_assets(photo: &Asset, video: &Asset) -> Self {
        Self {
            photo_asset_id: photo.id.clone(),
            video_asset_id: video.id.clone(),
            photo_filename: photo.original_file_name.clone(),
            video_filename: video.original_file_name.clone(),
            photo_created_at: photo.file_created_at,
            video_created_at: video.file_created_at,
        }
    }
}

/// Result recorded for one ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The link mutation succeeded.
    Linked,
    /// The unlink mutation succeeded.
    Unlinked,
    /// Dry-run record; nothing was sent to the server.
    Planned,
    /// The mutation was attempted and failed.
    Failed,
}

/// One row of the audit ledger CSV.
///
/// Column order is a compatibility contract between `link` (writer) and
/// `unlink` (reader); do not reorder fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub photo_asset_id: String,
    pub video_asset_id: String,
    pub photo_filename: String,
    pub video_filename: String,
    pub operated_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl LedgerRecord {
    pub fn for_pair(pair: &CandidatePair, outcome: Outcome, operated_at: DateTime<Utc>) -> Self {
        Self {
            photo_asset_id: pair.photo_asset_id.clone(),
            video_asset_id: pair.video_asset_id.clone(),
            photo_filename: pair.photo_filename.clone(),
            video_filename: pair.video_filename.clone(),
            operated_at,
            outcome,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.outcome = Outcome::Failed;
        self.error = Some(error.into());
        self
    }
}

/// How far a run is allowed to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Discover and report only; no mutation endpoint is called.
    DryRun,
    /// Execute exactly one candidate as a smoke test.
    TestRun,
    /// Execute every candidate.
    FullRun,
}

impl RunMode {
    pub fn from_flags(dry_run: bool, test_run: bool) -> Self {
        if dry_run {
            RunMode::DryRun
        } else if test_run {
            RunMode::TestRun
        } else {
            RunMode::FullRun
        }
    }
}
