//! In-memory collaborators for driving the engine in unit tests

use crate::catalog::{AlbumInfo, Catalog, PlaylistInfo};
use crate::error::{Error, Result};
use crate::post_processing::{ConvertOptions, MediaProcessor, MediaTags, ProcessorCapabilities};
use crate::session::{Authenticator, EpisodeMetadata, MediaStream, Session, TrackMetadata};
use crate::types::{MediaId, MediaKind, StreamQuality};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure kinds a fake can be scripted to produce
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FakeFailure {
    Connectivity,
    Timeout,
    Decode,
    Metadata,
    NotFound,
    Other,
}

impl FakeFailure {
    pub(crate) fn to_error(self, id: &str) -> Error {
        match self {
            FakeFailure::Connectivity => Error::Connectivity(format!("dns lookup failed for {id}")),
            FakeFailure::Timeout => Error::Timeout(format!("read of {id} timed out")),
            FakeFailure::Decode => Error::Decode(format!("bad frame in {id}")),
            FakeFailure::Metadata => Error::Metadata {
                media_id: id.to_string(),
                reason: "HTTP 500".into(),
            },
            FakeFailure::NotFound => Error::Catalog(format!("{id} not found")),
            FakeFailure::Other => Error::Other(format!("unexpected failure for {id}")),
        }
    }
}

fn pop_failure(map: &Mutex<HashMap<String, VecDeque<FakeFailure>>>, id: &str) -> Option<FakeFailure> {
    map.lock().unwrap().get_mut(id).and_then(|q| q.pop_front())
}

fn push_failure(map: &Mutex<HashMap<String, VecDeque<FakeFailure>>>, id: &str, failure: FakeFailure) {
    map.lock()
        .unwrap()
        .entry(id.to_string())
        .or_default()
        .push_back(failure);
}

/// Stream content: bytes actually delivered and the size announced by the transport
#[derive(Clone, Debug)]
struct FakeContent {
    bytes: Vec<u8>,
    announced: u64,
}

/// Media library shared by every fake session (survives re-authentication)
#[derive(Default)]
pub(crate) struct FakeMedia {
    tracks: Mutex<HashMap<String, TrackMetadata>>,
    episodes: Mutex<HashMap<String, EpisodeMetadata>>,
    contents: Mutex<HashMap<String, FakeContent>>,
    lyrics: Mutex<HashMap<String, String>>,
    metadata_failures: Mutex<HashMap<String, VecDeque<FakeFailure>>>,
    stream_failures: Mutex<HashMap<String, VecDeque<FakeFailure>>>,
    read_delay: Mutex<Option<Duration>>,
    qualities: Mutex<Vec<StreamQuality>>,
    opened: AtomicUsize,
    metadata_calls: AtomicUsize,
}

impl FakeMedia {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a playable track whose stream delivers `bytes`
    pub(crate) fn add_track(&self, id: &str, bytes: Vec<u8>) {
        self.add_track_metadata(track_metadata(id));
        self.set_content(id, bytes);
    }

    pub(crate) fn add_track_metadata(&self, metadata: TrackMetadata) {
        self.tracks
            .lock()
            .unwrap()
            .insert(metadata.id.clone(), metadata);
    }

    /// Register a playable episode whose stream delivers `bytes`
    pub(crate) fn add_episode(&self, id: &str, show: &str, bytes: Vec<u8>) {
        let metadata = EpisodeMetadata {
            id: id.to_string(),
            name: format!("Episode {id}"),
            show_name: show.to_string(),
            release_date: "2024-05-01".into(),
            is_playable: true,
            ..Default::default()
        };
        self.episodes.lock().unwrap().insert(id.to_string(), metadata);
        self.set_content(id, bytes);
    }

    pub(crate) fn set_content(&self, id: &str, bytes: Vec<u8>) {
        let announced = bytes.len() as u64;
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), FakeContent { bytes, announced });
    }

    /// Deliver `bytes` but announce `announced` as the total size
    pub(crate) fn set_truncated_content(&self, id: &str, bytes: Vec<u8>, announced: u64) {
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), FakeContent { bytes, announced });
    }

    pub(crate) fn set_lyrics(&self, id: &str, lyrics: &str) {
        self.lyrics
            .lock()
            .unwrap()
            .insert(id.to_string(), lyrics.to_string());
    }

    pub(crate) fn fail_metadata(&self, id: &str, failure: FakeFailure) {
        push_failure(&self.metadata_failures, id, failure);
    }

    pub(crate) fn fail_stream(&self, id: &str, failure: FakeFailure) {
        push_failure(&self.stream_failures, id, failure);
    }

    pub(crate) fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    /// Number of streams opened so far
    pub(crate) fn opened_streams(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Qualities requested by every `open_stream` call, in order
    pub(crate) fn requested_qualities(&self) -> Vec<StreamQuality> {
        self.qualities.lock().unwrap().clone()
    }

    pub(crate) fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

/// Playable track metadata with predictable values
pub(crate) fn track_metadata(id: &str) -> TrackMetadata {
    TrackMetadata {
        id: id.to_string(),
        name: format!("Track {id}"),
        artists: vec!["Artist".into(), "Guest".into()],
        album_name: "Album".into(),
        album_artists: vec!["Artist".into()],
        release_year: "2001".into(),
        disc_number: 1,
        track_number: 1,
        total_tracks: 3,
        total_discs: 1,
        genres: vec!["Electronic".into()],
        label: "Warp".into(),
        explicit: false,
        is_playable: true,
        duration_ms: 180_000,
        cover_url: Some("https://img.example/cover.jpg".into()),
    }
}

/// Session backed by a shared [`FakeMedia`] library
pub(crate) struct FakeSession {
    uuid: String,
    premium: bool,
    media: Arc<FakeMedia>,
}

impl FakeSession {
    pub(crate) fn new(uuid: &str, media: Arc<FakeMedia>) -> Self {
        Self {
            uuid: uuid.to_string(),
            premium: false,
            media,
        }
    }

    pub(crate) fn premium(mut self) -> Self {
        self.premium = true;
        self
    }
}

#[async_trait]
impl Session for FakeSession {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn is_premium(&self) -> bool {
        self.premium
    }

    async fn track_metadata(&self, media_id: &MediaId) -> Result<TrackMetadata> {
        self.media.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = pop_failure(&self.media.metadata_failures, media_id.as_str()) {
            return Err(failure.to_error(media_id.as_str()));
        }
        self.media
            .tracks
            .lock()
            .unwrap()
            .get(media_id.as_str())
            .cloned()
            .ok_or_else(|| FakeFailure::Metadata.to_error(media_id.as_str()))
    }

    async fn episode_metadata(&self, media_id: &MediaId) -> Result<EpisodeMetadata> {
        self.media.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = pop_failure(&self.media.metadata_failures, media_id.as_str()) {
            return Err(failure.to_error(media_id.as_str()));
        }
        self.media
            .episodes
            .lock()
            .unwrap()
            .get(media_id.as_str())
            .cloned()
            .ok_or_else(|| FakeFailure::Metadata.to_error(media_id.as_str()))
    }

    async fn open_stream(
        &self,
        _kind: MediaKind,
        media_id: &MediaId,
        quality: StreamQuality,
    ) -> Result<Box<dyn MediaStream>> {
        self.media.opened.fetch_add(1, Ordering::SeqCst);
        self.media.qualities.lock().unwrap().push(quality);
        if let Some(failure) = pop_failure(&self.media.stream_failures, media_id.as_str()) {
            return Err(failure.to_error(media_id.as_str()));
        }
        let content = self
            .media
            .contents
            .lock()
            .unwrap()
            .get(media_id.as_str())
            .cloned()
            .ok_or_else(|| Error::Other(format!("no content for {media_id}")))?;
        let delay = *self.media.read_delay.lock().unwrap();
        Ok(Box::new(FakeStream::new(content.bytes, content.announced, delay)))
    }

    async fn lyrics(&self, media_id: &MediaId, _synced_only: bool) -> Result<Option<String>> {
        Ok(self.media.lyrics.lock().unwrap().get(media_id.as_str()).cloned())
    }
}

/// Stream serving a byte buffer; reads past the buffer return empty
pub(crate) struct FakeStream {
    bytes: Vec<u8>,
    position: usize,
    announced: u64,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<usize>>>,
}

impl FakeStream {
    pub(crate) fn new(bytes: Vec<u8>, announced: u64, delay: Option<Duration>) -> Self {
        Self {
            bytes,
            position: 0,
            announced,
            delay,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the list of requested read sizes
    pub(crate) fn requests(&self) -> Arc<Mutex<Vec<usize>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl MediaStream for FakeStream {
    fn total_size(&self) -> u64 {
        self.announced
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(max_len);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let end = (self.position + max_len).min(self.bytes.len());
        let chunk = self.bytes[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }
}

/// Authenticator handing out fresh [`FakeSession`]s over the same media library
pub(crate) struct FakeAuthenticator {
    media: Arc<FakeMedia>,
    failures: Mutex<VecDeque<FakeFailure>>,
    calls: AtomicUsize,
}

impl FakeAuthenticator {
    pub(crate) fn new(media: Arc<FakeMedia>) -> Self {
        Self {
            media,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_next(&self, failure: FakeFailure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self, uuid: &str) -> Result<Arc<dyn Session>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.to_error(uuid));
        }
        Ok(Arc::new(FakeSession::new(uuid, self.media.clone())))
    }
}

/// Catalog backed by in-memory maps
#[derive(Default)]
pub(crate) struct FakeCatalog {
    albums: Mutex<HashMap<String, (AlbumInfo, Vec<String>)>>,
    artists: Mutex<HashMap<String, Vec<String>>>,
    playlists: Mutex<HashMap<String, PlaylistInfo>>,
    shows: Mutex<HashMap<String, Vec<String>>>,
    failures: Mutex<HashMap<String, VecDeque<FakeFailure>>>,
    calls: AtomicUsize,
}

impl FakeCatalog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_album(&self, album: AlbumInfo, track_ids: &[&str]) {
        let ids = track_ids.iter().map(|id| id.to_string()).collect();
        self.albums
            .lock()
            .unwrap()
            .insert(album.id.clone(), (album, ids));
    }

    pub(crate) fn add_artist(&self, artist_id: &str, album_ids: &[&str]) {
        let ids = album_ids.iter().map(|id| id.to_string()).collect();
        self.artists
            .lock()
            .unwrap()
            .insert(artist_id.to_string(), ids);
    }

    pub(crate) fn add_playlist(&self, playlist: PlaylistInfo) {
        self.playlists
            .lock()
            .unwrap()
            .insert(playlist.id.clone(), playlist);
    }

    pub(crate) fn add_show(&self, show_id: &str, episode_ids: &[&str]) {
        let ids = episode_ids.iter().map(|id| id.to_string()).collect();
        self.shows.lock().unwrap().insert(show_id.to_string(), ids);
    }

    /// Fail the next lookup of `id` (any kind of lookup)
    pub(crate) fn fail_next(&self, id: &str, failure: FakeFailure) {
        push_failure(&self.failures, id, failure);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, id: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match pop_failure(&self.failures, id) {
            Some(failure) => Err(failure.to_error(id)),
            None => Ok(()),
        }
    }
}

/// Album metadata with predictable values
pub(crate) fn album_info(id: &str, name: &str) -> AlbumInfo {
    AlbumInfo {
        id: id.to_string(),
        name: name.to_string(),
        artists: vec!["Artist".into()],
        release_year: "2001".into(),
        total_tracks: 3,
        genres: vec!["Electronic".into()],
        label: "Warp".into(),
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn album(&self, album_id: &str) -> Result<AlbumInfo> {
        self.check(album_id)?;
        self.albums
            .lock()
            .unwrap()
            .get(album_id)
            .map(|(album, _)| album.clone())
            .ok_or_else(|| FakeFailure::NotFound.to_error(album_id))
    }

    async fn album_tracks(&self, album_id: &str) -> Result<Vec<String>> {
        self.albums
            .lock()
            .unwrap()
            .get(album_id)
            .map(|(_, tracks)| tracks.clone())
            .ok_or_else(|| FakeFailure::NotFound.to_error(album_id))
    }

    async fn artist_albums(&self, artist_id: &str) -> Result<Vec<String>> {
        self.check(artist_id)?;
        self.artists
            .lock()
            .unwrap()
            .get(artist_id)
            .cloned()
            .ok_or_else(|| FakeFailure::NotFound.to_error(artist_id))
    }

    async fn playlist(&self, playlist_id: &str) -> Result<PlaylistInfo> {
        self.check(playlist_id)?;
        self.playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| FakeFailure::NotFound.to_error(playlist_id))
    }

    async fn show_episodes(&self, show_id: &str) -> Result<Vec<String>> {
        self.check(show_id)?;
        self.shows
            .lock()
            .unwrap()
            .get(show_id)
            .cloned()
            .ok_or_else(|| FakeFailure::NotFound.to_error(show_id))
    }
}

/// Processor that records every call and "converts" by copying bytes
pub(crate) struct RecordingProcessor {
    calls: Mutex<Vec<String>>,
    tags: Mutex<Vec<MediaTags>>,
    fail_convert: bool,
}

impl RecordingProcessor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            tags: Mutex::new(Vec::new()),
            fail_convert: false,
        })
    }

    pub(crate) fn failing_conversion() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            tags: Mutex::new(Vec::new()),
            fail_convert: true,
        })
    }

    /// Stage names in call order (`convert`, `tag`, `thumbnail`, `lyrics`)
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn written_tags(&self) -> Vec<MediaTags> {
        self.tags.lock().unwrap().clone()
    }

    fn record(&self, stage: &str, path: &Path) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{stage}:{}", file_name(path)));
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl MediaProcessor for RecordingProcessor {
    async fn convert(
        &self,
        source: &Path,
        target: &Path,
        _options: &ConvertOptions,
    ) -> Result<()> {
        self.record("convert", target);
        if self.fail_convert {
            return Err(Error::ExternalTool("ffmpeg exited with 1".into()));
        }
        tokio::fs::copy(source, target).await?;
        Ok(())
    }

    async fn write_tags(&self, path: &Path, tags: &MediaTags) -> Result<()> {
        self.record("tag", path);
        self.tags.lock().unwrap().push(tags.clone());
        Ok(())
    }

    async fn set_thumbnail(&self, path: &Path, _image_url: &str) -> Result<()> {
        self.record("thumbnail", path);
        Ok(())
    }

    async fn embed_lyrics(&self, path: &Path, _lyrics: &str) -> Result<()> {
        self.record("lyrics", path);
        Ok(())
    }

    fn capabilities(&self) -> ProcessorCapabilities {
        ProcessorCapabilities {
            can_convert: true,
            can_tag: true,
            can_set_thumbnail: true,
            can_embed_lyrics: true,
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Files directly inside `dir`, sorted
pub(crate) fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}
