//! No-op media processor for graceful degradation

use super::traits::{ConvertOptions, MediaProcessor, MediaTags, ProcessorCapabilities};
use async_trait::async_trait;
use std::path::Path;

/// No-op processor used when no converter is available or configured
///
/// Reports no capabilities, so workers keep the raw container and skip tagging.
/// Every operation returns `Error::NotSupported` if called anyway.
pub struct NoOpMediaProcessor;

fn not_supported(what: &str) -> crate::Error {
    crate::Error::NotSupported(format!(
        "{what} requires the external ffmpeg binary. \
         Configure ffmpeg_path in config or ensure ffmpeg is in PATH."
    ))
}

#[async_trait]
impl MediaProcessor for NoOpMediaProcessor {
    async fn convert(
        &self,
        _source: &Path,
        _target: &Path,
        _options: &ConvertOptions,
    ) -> crate::Result<()> {
        Err(not_supported("Conversion"))
    }

    async fn write_tags(&self, _path: &Path, _tags: &MediaTags) -> crate::Result<()> {
        Err(not_supported("Tag writing"))
    }

    async fn set_thumbnail(&self, _path: &Path, _image_url: &str) -> crate::Result<()> {
        Err(not_supported("Cover art"))
    }

    async fn embed_lyrics(&self, _path: &Path, _lyrics: &str) -> crate::Result<()> {
        Err(not_supported("Embedding lyrics"))
    }

    fn capabilities(&self) -> ProcessorCapabilities {
        ProcessorCapabilities {
            can_convert: false,
            can_tag: false,
            can_set_thumbnail: false,
            can_embed_lyrics: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
