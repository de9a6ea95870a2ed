//! Common test utilities for media-dl integration tests
//!
//! An in-memory library implementing the public [`Session`], [`Authenticator`] and
//! [`Catalog`] traits, plus wait helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use media_dl::{
    AlbumInfo, Authenticator, Catalog, Config, DownloadStatus, EpisodeMetadata, Error,
    MediaDownloader, MediaId, MediaKind, MediaStream, PlaylistInfo, Result, Session,
    StreamQuality, TrackMetadata,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Tracks, albums and playlists shared by every session and the catalog
#[derive(Default)]
pub struct Library {
    tracks: Mutex<HashMap<String, (TrackMetadata, Vec<u8>)>>,
    albums: Mutex<HashMap<String, (AlbumInfo, Vec<String>)>>,
    playlists: Mutex<HashMap<String, PlaylistInfo>>,
    streams_opened: AtomicUsize,
}

impl Library {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a playable track on `album` with `size` bytes of audio
    pub fn add_track(&self, id: &str, album: &str, size: usize) {
        let metadata = TrackMetadata {
            id: id.to_string(),
            name: format!("Song {id}"),
            artists: vec!["Boards of Canada".into()],
            album_name: album.to_string(),
            album_artists: vec!["Boards of Canada".into()],
            release_year: "2002".into(),
            disc_number: 1,
            track_number: 1,
            total_tracks: 1,
            total_discs: 1,
            is_playable: true,
            ..Default::default()
        };
        self.tracks
            .lock()
            .unwrap()
            .insert(id.to_string(), (metadata, vec![7u8; size]));
    }

    /// Mark a previously added track as not playable in this region
    pub fn make_unplayable(&self, id: &str) {
        if let Some((metadata, _)) = self.tracks.lock().unwrap().get_mut(id) {
            metadata.is_playable = false;
        }
    }

    pub fn add_album(&self, id: &str, name: &str, track_ids: &[&str]) {
        let info = AlbumInfo {
            id: id.to_string(),
            name: name.to_string(),
            artists: vec!["Boards of Canada".into()],
            release_year: "2002".into(),
            total_tracks: track_ids.len() as u32,
            ..Default::default()
        };
        let tracks = track_ids.iter().map(|t| t.to_string()).collect();
        self.albums
            .lock()
            .unwrap()
            .insert(id.to_string(), (info, tracks));
    }

    pub fn add_playlist(&self, playlist: PlaylistInfo) {
        self.playlists
            .lock()
            .unwrap()
            .insert(playlist.id.clone(), playlist);
    }

    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }
}

pub struct LibrarySession {
    uuid: String,
    library: Arc<Library>,
}

#[async_trait]
impl Session for LibrarySession {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn is_premium(&self) -> bool {
        true
    }

    async fn track_metadata(&self, media_id: &MediaId) -> Result<TrackMetadata> {
        self.library
            .tracks
            .lock()
            .unwrap()
            .get(media_id.as_str())
            .map(|(metadata, _)| metadata.clone())
            .ok_or_else(|| Error::Metadata {
                media_id: media_id.to_string(),
                reason: "not in library".into(),
            })
    }

    async fn episode_metadata(&self, media_id: &MediaId) -> Result<EpisodeMetadata> {
        Err(Error::Metadata {
            media_id: media_id.to_string(),
            reason: "no episodes in library".into(),
        })
    }

    async fn open_stream(
        &self,
        _kind: MediaKind,
        media_id: &MediaId,
        _quality: StreamQuality,
    ) -> Result<Box<dyn MediaStream>> {
        self.library.streams_opened.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .library
            .tracks
            .lock()
            .unwrap()
            .get(media_id.as_str())
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| Error::Other(format!("no audio for {media_id}")))?;
        Ok(Box::new(BufferStream { bytes, position: 0 }))
    }
}

struct BufferStream {
    bytes: Vec<u8>,
    position: usize,
}

#[async_trait]
impl MediaStream for BufferStream {
    fn total_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let end = (self.position + max_len).min(self.bytes.len());
        let chunk = self.bytes[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }
}

pub struct LibraryAuthenticator {
    library: Arc<Library>,
}

#[async_trait]
impl Authenticator for LibraryAuthenticator {
    async fn authenticate(&self, uuid: &str) -> Result<Arc<dyn Session>> {
        Ok(Arc::new(LibrarySession {
            uuid: uuid.to_string(),
            library: self.library.clone(),
        }))
    }
}

pub struct LibraryCatalog {
    library: Arc<Library>,
}

#[async_trait]
impl Catalog for LibraryCatalog {
    async fn album(&self, album_id: &str) -> Result<AlbumInfo> {
        self.library
            .albums
            .lock()
            .unwrap()
            .get(album_id)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| Error::Catalog(format!("album {album_id} not found")))
    }

    async fn album_tracks(&self, album_id: &str) -> Result<Vec<String>> {
        self.library
            .albums
            .lock()
            .unwrap()
            .get(album_id)
            .map(|(_, tracks)| tracks.clone())
            .ok_or_else(|| Error::Catalog(format!("album {album_id} not found")))
    }

    async fn artist_albums(&self, artist_id: &str) -> Result<Vec<String>> {
        Err(Error::Catalog(format!("artist {artist_id} not found")))
    }

    async fn playlist(&self, playlist_id: &str) -> Result<PlaylistInfo> {
        self.library
            .playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("playlist {playlist_id} not found")))
    }

    async fn show_episodes(&self, show_id: &str) -> Result<Vec<String>> {
        Err(Error::Catalog(format!("show {show_id} not found")))
    }
}

/// Config rooted in `root` with delays shortened and no external tools
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_root = root.join("downloads");
    config.download.download_delay = Duration::ZERO;
    config.download.recoverable_fail_wait_delay = Duration::ZERO;
    config.download.max_threads = 2;
    config.playlists.poll_interval = Duration::from_millis(20);
    config.tools.search_path = false;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.jitter = false;
    config
}

/// Build a started downloader over a fresh library, with one session logged in
pub async fn start_downloader(
    configure: impl FnOnce(&mut Config),
) -> (MediaDownloader, Arc<Library>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let library = Library::new();
    let authenticator = Arc::new(LibraryAuthenticator {
        library: library.clone(),
    });
    let catalog = Arc::new(LibraryCatalog {
        library: library.clone(),
    });

    let downloader = MediaDownloader::new(config, authenticator.clone(), catalog)
        .await
        .unwrap();
    downloader.start().await.unwrap();
    let session = authenticator.authenticate("account-1").await.unwrap();
    downloader.add_session(session).await.unwrap();

    (downloader, library, temp_dir)
}

/// Wait until `media_id` reaches `expected`, panicking after 10 seconds
pub async fn wait_for_status(downloader: &MediaDownloader, media_id: &str, expected: DownloadStatus) {
    let media_id = MediaId::from(media_id);
    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(view) = downloader.status(&media_id).await
                && view.status == expected
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "{media_id} never reached {expected}: {:?}",
        downloader.status(&media_id).await
    );
}
