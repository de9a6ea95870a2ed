//! Read-only catalog capability used to resolve collection references
//!
//! The catalog's wire protocol is out of scope; embedders implement [`Catalog`] on top
//! of their HTTP client of choice. Implementations should report transient failures as
//! [`Error::Connectivity`](crate::Error::Connectivity) or
//! [`Error::Timeout`](crate::Error::Timeout) so expansion retries them, and "not found"
//! style failures as [`Error::Catalog`](crate::Error::Catalog).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Album metadata needed to expand an album and render its directory name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumInfo {
    /// Catalog id
    pub id: String,
    /// Album title
    pub name: String,
    /// Album artists, primary artist first
    pub artists: Vec<String>,
    /// Release year (as reported, usually four digits)
    pub release_year: String,
    /// Number of tracks
    pub total_tracks: u32,
    /// Genres, most specific first
    #[serde(default)]
    pub genres: Vec<String>,
    /// Record label
    #[serde(default)]
    pub label: String,
}

/// Playlist metadata and its member list
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    /// Catalog id
    pub id: String,
    /// Playlist name
    pub name: String,
    /// Display name of the owner
    pub owner: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Member track ids in playlist order; `None` for regionally unavailable or
    /// locally removed entries
    pub track_ids: Vec<Option<String>>,
}

/// Catalog lookups used by the item expander
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Album metadata
    async fn album(&self, album_id: &str) -> Result<AlbumInfo>;

    /// Track ids of an album, in disc/track order
    async fn album_tracks(&self, album_id: &str) -> Result<Vec<String>>;

    /// Album ids of an artist's discography
    async fn artist_albums(&self, artist_id: &str) -> Result<Vec<String>>;

    /// Playlist metadata including its member list
    async fn playlist(&self, playlist_id: &str) -> Result<PlaylistInfo>;

    /// Episode ids of a show, newest first
    async fn show_episodes(&self, show_id: &str) -> Result<Vec<String>>;
}
