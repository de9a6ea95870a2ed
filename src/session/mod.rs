//! Authenticated sessions and their supervision
//!
//! A [`Session`] is an opaque, externally supplied capability bound to one account: it
//! fetches media metadata and opens byte streams. Sessions are created by an
//! [`Authenticator`], stored in the [`SessionPool`] and bound 1:1 to download workers
//! by the [`SessionSupervisor`].

mod pool;
mod supervisor;

pub use pool::SessionPool;
pub use supervisor::SessionSupervisor;

use crate::error::Result;
use crate::types::{MediaId, MediaKind, StreamQuality};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Full metadata of a track
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Catalog id
    pub id: String,
    /// Track title
    pub name: String,
    /// Track artists, primary artist first
    pub artists: Vec<String>,
    /// Album title
    pub album_name: String,
    /// Album artists
    pub album_artists: Vec<String>,
    /// Release year
    pub release_year: String,
    /// Disc number (1-based)
    pub disc_number: u32,
    /// Track number on its disc (1-based)
    pub track_number: u32,
    /// Number of tracks on the album
    pub total_tracks: u32,
    /// Number of discs
    pub total_discs: u32,
    /// Genres
    #[serde(default)]
    pub genres: Vec<String>,
    /// Record label
    #[serde(default)]
    pub label: String,
    /// Explicit content flag
    #[serde(default)]
    pub explicit: bool,
    /// Whether the catalog allows playback in the session's region
    pub is_playable: bool,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
    /// Cover image URL
    #[serde(default)]
    pub cover_url: Option<String>,
}

/// Full metadata of a podcast episode
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    /// Catalog id
    pub id: String,
    /// Episode title
    pub name: String,
    /// Show (podcast) name
    pub show_name: String,
    /// Release date as reported
    #[serde(default)]
    pub release_date: String,
    /// Episode description
    #[serde(default)]
    pub description: String,
    /// Language code
    #[serde(default)]
    pub language: String,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
    /// Whether the catalog allows playback in the session's region
    pub is_playable: bool,
    /// Cover image URL
    #[serde(default)]
    pub cover_url: Option<String>,
}

/// A byte-producing media transport opened by a session
#[async_trait]
pub trait MediaStream: Send {
    /// Total size of the stream in bytes, as announced by the transport
    fn total_size(&self) -> u64;

    /// Read up to `max_len` bytes
    ///
    /// An empty result means the transport has nothing more to deliver; the caller
    /// decides whether that is a clean end or a truncated stream.
    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>>;
}

/// An authenticated capability bound to one account
///
/// Implementations report DNS/connection failures as
/// [`Error::Connectivity`](crate::Error::Connectivity) so the worker re-authenticates,
/// and transport hiccups as [`Error::Timeout`](crate::Error::Timeout) or
/// [`Error::Decode`](crate::Error::Decode) so the attempt is retried after a wait.
#[async_trait]
pub trait Session: Send + Sync {
    /// Stable identifier used to bind exactly one worker
    fn uuid(&self) -> &str;

    /// Premium accounts get the higher stream quality
    fn is_premium(&self) -> bool;

    /// Fetch full metadata of a track
    async fn track_metadata(&self, media_id: &MediaId) -> Result<TrackMetadata>;

    /// Fetch full metadata of a podcast episode
    async fn episode_metadata(&self, media_id: &MediaId) -> Result<EpisodeMetadata>;

    /// Open the audio transport for a media item
    async fn open_stream(
        &self,
        kind: MediaKind,
        media_id: &MediaId,
        quality: StreamQuality,
    ) -> Result<Box<dyn MediaStream>>;

    /// Fetch lyrics in LRC form, `None` when the track has none
    ///
    /// With `synced_only`, unsynced lyrics are treated as absent.
    async fn lyrics(&self, media_id: &MediaId, synced_only: bool) -> Result<Option<String>> {
        let _ = (media_id, synced_only);
        Ok(None)
    }
}

/// Creates (or re-creates) the session for an account uuid
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Perform a login for `uuid` and return the fresh session
    async fn authenticate(&self, uuid: &str) -> Result<Arc<dyn Session>>;
}
