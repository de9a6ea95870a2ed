//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Catalog-assigned identifier of a leaf media item (track or episode)
///
/// Not unique across the lifetime of the process: the same id may be resubmitted
/// after a failure or cancellation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl MediaId {
    /// Create a new MediaId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MediaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MediaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of leaf media a job downloads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A music track
    Track,
    /// A podcast episode
    Episode,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Track => f.write_str("track"),
            MediaKind::Episode => f.write_str("episode"),
        }
    }
}

/// Playlist naming context carried by jobs expanded from a playlist
///
/// Only used for file name template substitution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistContext {
    /// Playlist name
    #[serde(rename = "playlist_name")]
    pub name: String,
    /// Playlist owner display name
    #[serde(rename = "playlist_owner")]
    pub owner: String,
    /// Playlist description
    #[serde(rename = "playlist_desc")]
    pub description: String,
}

/// A single leaf media item's download request
///
/// Serializes with the queue entry field names used by front-ends
/// (`media_type`, `extra_paths`, `force_album_format`, ...). A JobSpec is never
/// mutated after it is queued; retries re-queue a clone of the original.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Track or episode
    #[serde(rename = "media_type")]
    pub media_kind: MediaKind,

    /// Catalog id of the media item
    pub media_id: MediaId,

    /// Output base directory (None = configured download root)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_base_path: Option<PathBuf>,

    /// Extra path segment inserted below the base directory
    #[serde(rename = "extra_paths", default)]
    pub extra_subpath: String,

    /// Treat `extra_subpath` as the output root instead of a sub-directory
    #[serde(rename = "extra_path_as_root", default)]
    pub extra_path_is_root: bool,

    /// Insert the album directory segment (when the extra path is not the root)
    #[serde(rename = "force_album_format", default)]
    pub force_album_layout: bool,

    /// Insert the album directory segment below an extra path used as root
    #[serde(rename = "force_album_after_extra_path_as_root", default)]
    pub force_album_after_root: bool,

    /// Playlist naming context, if the job came from a playlist
    #[serde(flatten)]
    pub playlist: Option<PlaylistContext>,
}

impl JobSpec {
    /// Create a job for a single track with default path options
    pub fn track(media_id: impl Into<MediaId>) -> Self {
        Self::new(MediaKind::Track, media_id)
    }

    /// Create a job for a single podcast episode with default path options
    pub fn episode(media_id: impl Into<MediaId>) -> Self {
        Self::new(MediaKind::Episode, media_id)
    }

    fn new(media_kind: MediaKind, media_id: impl Into<MediaId>) -> Self {
        Self {
            media_kind,
            media_id: media_id.into(),
            output_base_path: None,
            extra_subpath: String::new(),
            extra_path_is_root: false,
            force_album_layout: false,
            force_album_after_root: false,
            playlist: None,
        }
    }

    /// Copy the path composition options of an expansion context onto this job
    pub(crate) fn with_layout(mut self, layout: &PathLayout) -> Self {
        self.output_base_path = layout.output_base_path.clone();
        self.extra_subpath = layout.extra_subpath.clone();
        self.extra_path_is_root = layout.extra_path_is_root;
        self.force_album_layout = layout.force_album_layout;
        self.force_album_after_root = layout.force_album_after_root;
        self
    }

    /// Attach playlist naming context
    pub fn with_playlist(mut self, playlist: PlaylistContext) -> Self {
        self.playlist = Some(playlist);
        self
    }
}

/// Path composition options shared by every job expanded from one reference
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathLayout {
    /// Output base directory (None = configured download root)
    #[serde(default)]
    pub output_base_path: Option<PathBuf>,
    /// Extra path segment below the base directory
    #[serde(default)]
    pub extra_subpath: String,
    /// Use `extra_subpath` as the output root
    #[serde(default)]
    pub extra_path_is_root: bool,
    /// Insert the album directory segment
    #[serde(default)]
    pub force_album_layout: bool,
    /// Insert the album directory segment below a root extra path
    #[serde(default)]
    pub force_album_after_root: bool,
}

/// Stream quality requested from the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamQuality {
    /// Standard quality (non-premium accounts)
    High,
    /// Premium quality
    VeryHigh,
}

impl StreamQuality {
    /// Target bitrate used when converting a stream of this quality
    pub fn bitrate(&self) -> &'static str {
        match self {
            StreamQuality::High => "160k",
            StreamQuality::VeryHigh => "320k",
        }
    }
}

/// Human-readable state of a job as shown by front-ends
///
/// `Display` renders the exact status text published in progress events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Queued, not yet picked up by a worker
    Waiting,
    /// A download attempt is running
    Downloading,
    /// Transcoding the raw container
    Converting,
    /// Writing tags
    WritingMetadata,
    /// Attaching cover art
    SettingThumbnail,
    /// Fetching and storing lyrics
    GettingLyrics,
    /// Finished successfully
    Downloaded,
    /// Output file was already present; nothing transferred
    AlreadyExists,
    /// The catalog reports the item cannot be played
    Unavailable,
    /// Cancelled by the user
    Cancelled,
    /// Every attempt failed; the job can be resubmitted
    Failed,
    /// Metadata fetch failed for this attempt
    GetMetadataFailed,
    /// The transport could not decode the stream; will retry
    DecodeError,
    /// A network read timed out; will retry
    TimedOut,
    /// The stream ended short of the expected size; will retry
    PartialDownload,
    /// Waiting before the next attempt, seconds remaining
    RetryingIn(u64),
    /// About to run attempt number n
    Retry(u32),
}

impl DownloadStatus {
    /// Whether the job finished successfully (output file present)
    pub fn is_completed(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded | DownloadStatus::AlreadyExists)
    }

    /// Whether no worker will touch the job again without a resubmission
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Downloaded
                | DownloadStatus::AlreadyExists
                | DownloadStatus::Unavailable
                | DownloadStatus::Cancelled
                | DownloadStatus::Failed
        )
    }

    /// Whether a "clear completed" action removes entries in this state
    pub fn is_clearable(&self) -> bool {
        self.is_terminal() && !matches!(self, DownloadStatus::Failed)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::Waiting => f.write_str("Waiting"),
            DownloadStatus::Downloading => f.write_str("Downloading"),
            DownloadStatus::Converting => f.write_str("Converting"),
            DownloadStatus::WritingMetadata => f.write_str("Writing metadata"),
            DownloadStatus::SettingThumbnail => f.write_str("Setting thumbnail"),
            DownloadStatus::GettingLyrics => f.write_str("Getting Lyrics"),
            DownloadStatus::Downloaded => f.write_str("Downloaded"),
            DownloadStatus::AlreadyExists => f.write_str("Already exists"),
            DownloadStatus::Unavailable => f.write_str("Unavailable"),
            DownloadStatus::Cancelled => f.write_str("Cancelled"),
            DownloadStatus::Failed => f.write_str("Failed"),
            DownloadStatus::GetMetadataFailed => f.write_str("Get metadata failed"),
            DownloadStatus::DecodeError => f.write_str("Decode error. Will retry"),
            DownloadStatus::TimedOut => f.write_str("Timeout. Will retry"),
            DownloadStatus::PartialDownload => f.write_str("PD error. Will retry"),
            DownloadStatus::RetryingIn(secs) => write!(f, "Retrying in {secs} sec"),
            DownloadStatus::Retry(attempt) => write!(f, "RETRY {attempt}"),
        }
    }
}

/// Last known state of a job, as kept in the status registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    /// Track or episode
    pub media_kind: MediaKind,
    /// Current status
    pub status: DownloadStatus,
    /// Last reported progress `(done, total)`
    pub progress: Option<(u64, u64)>,
    /// Output file, once known
    pub output_path: Option<PathBuf>,
    /// Display name used in playlists, once known
    pub display_name: Option<String>,
    /// When the entry last changed
    pub updated_at: DateTime<Utc>,
}

impl StatusView {
    /// Fresh entry for a newly queued job
    pub fn waiting(media_kind: MediaKind) -> Self {
        Self {
            media_kind,
            status: DownloadStatus::Waiting,
            progress: None,
            output_path: None,
            display_name: None,
            updated_at: Utc::now(),
        }
    }
}

/// A media item that finished successfully, as used for playlist generation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedMedia {
    /// Absolute output path
    pub output_path: PathBuf,
    /// Display name written to playlist entries
    pub display_name: String,
}

/// Post-processing stage, reported when a stage fails
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessStage {
    /// Transcoding
    Convert,
    /// Tag writing
    Tag,
    /// Cover art
    Thumbnail,
    /// Lyrics
    Lyrics,
}

/// Event emitted by the engine
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was admitted to the queue (new or resubmitted)
    Queued {
        /// Media id
        media_id: MediaId,
        /// Track or episode
        media_kind: MediaKind,
    },

    /// Status and/or progress update for a job
    Progress {
        /// Media id
        media_id: MediaId,
        /// New status, if it changed
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<DownloadStatus>,
        /// Progress `(done, total)`
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<(u64, u64)>,
        /// Output file, reported with terminal success states
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<PathBuf>,
        /// Display name, reported with terminal success states
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// A root item reference could not be resolved; nothing was queued
    ExpansionFailed {
        /// The reference as submitted
        reference: String,
        /// Error message
        error: String,
    },

    /// A post-processing stage failed; the downloaded file is kept
    PostProcessFailed {
        /// Media id
        media_id: MediaId,
        /// Failed stage
        stage: PostProcessStage,
        /// Error message
        error: String,
    },

    /// A playlist file was written for a completed collection
    PlaylistWritten {
        /// Playlist file path
        path: PathBuf,
        /// Number of entries written
        entries: usize,
    },

    /// A session was re-authenticated and replaced in the pool
    SessionReinitialized {
        /// Session uuid
        session: String,
    },

    /// A worker bound to a session started
    WorkerStarted {
        /// Session uuid
        session: String,
    },

    /// A worker bound to a session stopped
    WorkerStopped {
        /// Session uuid
        session: String,
    },

    /// Downloader is shutting down
    Shutdown,
}
