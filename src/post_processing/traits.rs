//! Traits and types for post-download media processing

use crate::types::StreamQuality;
use async_trait::async_trait;
use std::path::Path;

/// Options for converting a raw stream into the configured container
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Quality the stream was requested at (selects the target bitrate)
    pub quality: StreamQuality,
    /// Extra arguments appended to the converter invocation
    pub extra_args: Vec<String>,
}

/// Ordered tag set written into a media file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaTags {
    entries: Vec<(String, String)>,
}

impl MediaTags {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag; empty values are skipped
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.entries.push((key.to_string(), value));
        }
        self
    }

    /// Tags in insertion order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Look up a tag value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Capabilities of a media processor implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorCapabilities {
    /// Can transcode the raw container
    pub can_convert: bool,
    /// Can write tags
    pub can_tag: bool,
    /// Can attach cover art
    pub can_set_thumbnail: bool,
    /// Can embed lyrics
    pub can_embed_lyrics: bool,
}

/// Trait for post-download media processing
///
/// Workers call the stages in order (convert, tags, thumbnail, lyrics) and skip
/// stages the implementation does not report as supported. Failures are reported
/// but never delete the downloaded bytes.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Transcode `source` into `target`
    ///
    /// `source` is left in place; the caller removes it once conversion succeeded.
    async fn convert(
        &self,
        source: &Path,
        target: &Path,
        options: &ConvertOptions,
    ) -> crate::Result<()>;

    /// Write `tags` into the file at `path`
    async fn write_tags(&self, path: &Path, tags: &MediaTags) -> crate::Result<()>;

    /// Attach the image found at `image_url` as cover art
    async fn set_thumbnail(&self, path: &Path, image_url: &str) -> crate::Result<()>;

    /// Embed lyrics text into the file at `path`
    async fn embed_lyrics(&self, path: &Path, lyrics: &str) -> crate::Result<()>;

    /// Query capabilities of this processor
    fn capabilities(&self) -> ProcessorCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
