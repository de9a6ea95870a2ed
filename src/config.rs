//! Configuration types for media-dl

use crate::error::{Error, Result};
use crate::template::{ALBUM_FIELDS, PLAYLIST_FILE_FIELDS, PathTemplate, TRACK_FIELDS};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, transfer tunables)
///
/// Groups settings related to how media is fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download root directory (default: "./downloads")
    #[serde(default = "default_download_root")]
    pub download_root: PathBuf,

    /// Maximum number of session workers running at once (default: 1)
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Bytes requested from the media stream per read (default: 50000)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Attempts per job before it is recorded as failed (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before retrying after an indeterminate failure (default: 10 seconds)
    #[serde(default = "default_recoverable_fail_wait_delay", with = "duration_serde")]
    pub recoverable_fail_wait_delay: Duration,

    /// Politeness delay between jobs on one worker (default: 5 seconds)
    #[serde(default = "default_download_delay", with = "duration_serde")]
    pub download_delay: Duration,

    /// Trailing bytes that may be missing from a stream without counting as a failure (default: 167)
    ///
    /// Some containers arrive with a truncated tail. A zero-length read with at most
    /// this many bytes outstanding is treated as a clean end of stream.
    #[serde(default = "default_dl_end_padding_bytes")]
    pub dl_end_padding_bytes: u64,

    /// Keep the raw container and skip convert/tag/thumbnail/lyrics (default: false)
    #[serde(default)]
    pub force_raw: bool,

    /// Request premium quality even when the session is not premium (default: false)
    #[serde(default)]
    pub force_premium: bool,

    /// Output container for tracks (default: "mp3")
    #[serde(default = "default_media_format")]
    pub media_format: String,

    /// Output container for podcast episodes (default: "mp3")
    #[serde(default = "default_media_format")]
    pub podcast_media_format: String,

    /// Directory below the download root for podcast episodes (default: "Podcasts")
    #[serde(default = "default_podcast_subdir")]
    pub podcast_subdir: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_root: default_download_root(),
            max_threads: default_max_threads(),
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            recoverable_fail_wait_delay: default_recoverable_fail_wait_delay(),
            download_delay: default_download_delay(),
            dl_end_padding_bytes: default_dl_end_padding_bytes(),
            force_raw: false,
            force_premium: false,
            media_format: default_media_format(),
            podcast_media_format: default_media_format(),
            podcast_subdir: default_podcast_subdir(),
        }
    }
}

/// File name templates
///
/// Templates use `{field}` placeholders; literal braces are written `{{` and `}}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Track file name, without extension (default: "{artist} - {album} - {name}")
    #[serde(default = "default_track_name_formatter")]
    pub track_name_formatter: String,

    /// Album directory inserted when album layout is forced (default: "{artist}/[{rel_year}] {album}")
    #[serde(default = "default_album_name_formatter")]
    pub album_name_formatter: String,

    /// Playlist file path below the download root, without extension
    /// (default: "MyPlaylists/{name} by {owner}")
    #[serde(default = "default_playlist_name_formatter")]
    pub playlist_name_formatter: String,

    /// Separator used when joining multi-valued tags such as artists (default: ";")
    #[serde(default = "default_metadata_separator")]
    pub metadata_separator: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            track_name_formatter: default_track_name_formatter(),
            album_name_formatter: default_album_name_formatter(),
            playlist_name_formatter: default_playlist_name_formatter(),
            metadata_separator: default_metadata_separator(),
        }
    }
}

/// Lyrics handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Fetch lyrics for tracks (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only accept time-synced lyrics (default: false)
    #[serde(default)]
    pub only_synced: bool,

    /// Write lyrics to a sibling `.lrc` file (default: true)
    #[serde(default = "default_true")]
    pub use_lrc_file: bool,

    /// Embed lyrics into the media file (default: false)
    #[serde(default)]
    pub embed: bool,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            only_synced: false,
            use_lrc_file: true,
            embed: false,
        }
    }
}

/// Playlist (m3u8) generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// Write an m3u8 file once every track of a queued playlist is done (default: false)
    #[serde(default)]
    pub create_m3u_playlists: bool,

    /// How often pending playlists are checked for completion (default: 4 seconds)
    #[serde(default = "default_playlist_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            create_m3u_playlists: false,
            poll_interval: default_playlist_poll_interval(),
        }
    }
}

/// Session supervision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on a blocking re-authentication (default: 120 seconds)
    #[serde(default = "default_reinit_timeout", with = "duration_serde")]
    pub reinit_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reinit_timeout: default_reinit_timeout(),
        }
    }
}

/// External tool paths (ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Extra arguments passed to ffmpeg when converting
    #[serde(default)]
    pub ffmpeg_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
            ffmpeg_args: Vec::new(),
        }
    }
}

/// Retry configuration for transient catalog failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) - directories, concurrency, transfer tunables
/// - [`templates`](TemplateConfig) - file name templates
/// - [`lyrics`](LyricsConfig) - lyrics fetching and storage
/// - [`playlists`](PlaylistConfig) - m3u8 generation
/// - [`sessions`](SessionConfig) - re-authentication bounds
/// - [`tools`](ToolsConfig) - external binaries
/// - [`retry`](RetryConfig) - catalog retry policy
///
/// `download` and `templates` are flattened so the common keys (`max_threads`,
/// `chunk_size`, `track_name_formatter`, ...) sit at the top level.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// File name templates
    #[serde(flatten)]
    pub templates: TemplateConfig,

    /// Lyrics settings
    #[serde(default)]
    pub lyrics: LyricsConfig,

    /// Playlist generation settings
    #[serde(default)]
    pub playlists: PlaylistConfig,

    /// Session supervision settings
    #[serde(default)]
    pub sessions: SessionConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Catalog retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Download root directory
    pub fn download_root(&self) -> &PathBuf {
        &self.download.download_root
    }

    /// Check settings that would otherwise surface as runtime failures
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key when a tunable is zero or a
    /// template references a field that does not exist.
    pub fn validate(&self) -> Result<()> {
        if self.download.max_threads == 0 {
            return Err(Error::config("max_threads", "must be at least 1"));
        }
        if self.download.chunk_size == 0 {
            return Err(Error::config("chunk_size", "must be greater than zero"));
        }
        if self.download.max_retries == 0 {
            return Err(Error::config("max_retries", "must be at least 1"));
        }

        let templates = [
            (
                "track_name_formatter",
                &self.templates.track_name_formatter,
                TRACK_FIELDS,
            ),
            (
                "album_name_formatter",
                &self.templates.album_name_formatter,
                ALBUM_FIELDS,
            ),
            (
                "playlist_name_formatter",
                &self.templates.playlist_name_formatter,
                PLAYLIST_FILE_FIELDS,
            ),
        ];
        for (key, text, fields) in templates {
            PathTemplate::parse(text)
                .and_then(|template| template.check_fields(fields))
                .map_err(|e| Error::config(key, e.to_string()))?;
        }

        Ok(())
    }
}

fn default_download_root() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_threads() -> usize {
    1
}

fn default_chunk_size() -> usize {
    50_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_recoverable_fail_wait_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_download_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_dl_end_padding_bytes() -> u64 {
    167
}

fn default_media_format() -> String {
    "mp3".to_string()
}

fn default_podcast_subdir() -> String {
    "Podcasts".to_string()
}

fn default_track_name_formatter() -> String {
    "{artist} - {album} - {name}".to_string()
}

fn default_album_name_formatter() -> String {
    "{artist}/[{rel_year}] {album}".to_string()
}

fn default_playlist_name_formatter() -> String {
    "MyPlaylists/{name} by {owner}".to_string()
}

fn default_metadata_separator() -> String {
    ";".to_string()
}

fn default_playlist_poll_interval() -> Duration {
    Duration::from_secs(4)
}

fn default_reinit_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
