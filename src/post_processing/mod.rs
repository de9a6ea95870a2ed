//! Post-download media processing
//!
//! After a transfer completes the worker runs these stages in order:
//! 1. Convert - transcode the raw container into the configured format
//! 2. Tag - write title/artist/album/... metadata
//! 3. Thumbnail - attach cover art
//! 4. Lyrics - write a `.lrc` sibling and/or embed lyrics (tracks only)
//!
//! The stages themselves are delegated to a [`MediaProcessor`]. The default
//! implementation shells out to ffmpeg; [`NoOpMediaProcessor`] is used when no
//! binary is available, in which case downloads are kept in their raw container.

use crate::config::ToolsConfig;
use std::sync::Arc;

mod ffmpeg;
mod noop;
mod traits;

pub use ffmpeg::FfmpegMediaProcessor;
pub use noop::NoOpMediaProcessor;
pub use traits::{ConvertOptions, MediaProcessor, MediaTags, ProcessorCapabilities};

/// Pick a media processor based on the tools configuration
///
/// An explicit `ffmpeg_path` wins; otherwise PATH is searched when `search_path` is
/// enabled. Falls back to [`NoOpMediaProcessor`].
pub fn processor_from_config(tools: &ToolsConfig) -> Arc<dyn MediaProcessor> {
    let processor: Arc<dyn MediaProcessor> = if let Some(ref ffmpeg_path) = tools.ffmpeg_path {
        Arc::new(FfmpegMediaProcessor::new(ffmpeg_path.clone()))
    } else if tools.search_path {
        FfmpegMediaProcessor::from_path()
            .map(|p| Arc::new(p) as Arc<dyn MediaProcessor>)
            .unwrap_or_else(|| Arc::new(NoOpMediaProcessor))
    } else {
        Arc::new(NoOpMediaProcessor)
    };

    let caps = processor.capabilities();
    tracing::info!(
        media_processor = processor.name(),
        can_convert = caps.can_convert,
        can_tag = caps.can_tag,
        can_set_thumbnail = caps.can_set_thumbnail,
        can_embed_lyrics = caps.can_embed_lyrics,
        "Media processor initialized"
    );

    processor
}
