//! Post-transfer stages: convert, tag, cover art, lyrics
//!
//! Every failure here is reported as [`Event::PostProcessFailed`] and logged; the
//! downloaded bytes are always kept.

use super::context::WorkerContext;
use super::paths::{MediaInfo, RAW_EXTENSION, TargetPaths, raw_fallback};
use crate::error::{Error, PostProcessError};
use crate::post_processing::{ConvertOptions, MediaTags};
use crate::session::Session;
use crate::types::{DownloadStatus, Event, JobSpec, PostProcessStage, StreamQuality};
use std::path::PathBuf;

/// File actually produced by the job after post-processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Finalized {
    pub(crate) path: PathBuf,
    pub(crate) display_name: String,
}

/// Run the post-processing stages the processor supports
pub(crate) async fn finalize(
    ctx: &WorkerContext,
    session: &dyn Session,
    job: &JobSpec,
    info: &MediaInfo,
    target: &TargetPaths,
    quality: StreamQuality,
) -> Finalized {
    let caps = ctx.processor.capabilities();
    let mut produced = Finalized {
        path: target.final_path.clone(),
        display_name: target.display_name.clone(),
    };

    if target.convert {
        ctx.report(job, Some(DownloadStatus::Converting), None).await;
        let options = ConvertOptions {
            quality,
            extra_args: ctx.config.tools.ffmpeg_args.clone(),
        };
        match ctx
            .processor
            .convert(&target.download_path, &target.final_path, &options)
            .await
        {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&target.download_path).await {
                    tracing::warn!(media_id = %job.media_id, error = %e, "Failed to remove raw download");
                }
            }
            Err(e) => {
                stage_failed(ctx, job, PostProcessStage::Convert, &e);
                let fallback = raw_fallback(&target.final_path);
                produced = match tokio::fs::rename(&target.download_path, &fallback).await {
                    Ok(()) => Finalized {
                        path: fallback,
                        display_name: info.display_name(RAW_EXTENSION),
                    },
                    Err(rename_err) => {
                        tracing::warn!(media_id = %job.media_id, error = %rename_err, "Failed to keep raw download under its final name");
                        Finalized {
                            path: target.download_path.clone(),
                            display_name: info.display_name(RAW_EXTENSION),
                        }
                    }
                };
            }
        }
    }

    if caps.can_tag {
        ctx.report(job, Some(DownloadStatus::WritingMetadata), None)
            .await;
        let tags = build_tags(info, &ctx.config.templates.metadata_separator);
        if let Err(e) = ctx.processor.write_tags(&produced.path, &tags).await {
            stage_failed(ctx, job, PostProcessStage::Tag, &e);
        }
    }

    if caps.can_set_thumbnail
        && let Some(cover_url) = info.cover_url()
    {
        ctx.report(job, Some(DownloadStatus::SettingThumbnail), None)
            .await;
        if let Err(e) = ctx.processor.set_thumbnail(&produced.path, cover_url).await {
            stage_failed(ctx, job, PostProcessStage::Thumbnail, &e);
        }
    }

    if matches!(info, MediaInfo::Track(_)) && ctx.config.lyrics.enabled {
        ctx.report(job, Some(DownloadStatus::GettingLyrics), None)
            .await;
        if let Err(e) = store_lyrics(ctx, session, job, &produced.path).await {
            let error: Error = PostProcessError::LyricsFailed {
                media_id: job.media_id.to_string(),
                reason: e.to_string(),
            }
            .into();
            stage_failed(ctx, job, PostProcessStage::Lyrics, &error);
        }
    }

    produced
}

async fn store_lyrics(
    ctx: &WorkerContext,
    session: &dyn Session,
    job: &JobSpec,
    path: &std::path::Path,
) -> crate::Result<()> {
    let lyrics_config = &ctx.config.lyrics;
    let Some(lyrics) = session
        .lyrics(&job.media_id, lyrics_config.only_synced)
        .await?
    else {
        tracing::debug!(media_id = %job.media_id, "No lyrics available");
        return Ok(());
    };

    if lyrics_config.use_lrc_file {
        tokio::fs::write(path.with_extension("lrc"), lyrics.as_bytes()).await?;
    }
    if lyrics_config.embed && ctx.processor.capabilities().can_embed_lyrics {
        ctx.processor.embed_lyrics(path, &lyrics).await?;
    }
    Ok(())
}

fn stage_failed(ctx: &WorkerContext, job: &JobSpec, stage: PostProcessStage, error: &Error) {
    tracing::warn!(media_id = %job.media_id, ?stage, error = %error, "Post-processing stage failed");
    ctx.emit(Event::PostProcessFailed {
        media_id: job.media_id.clone(),
        stage,
        error: error.to_string(),
    });
}

/// Tag set written into the produced file
pub(crate) fn build_tags(info: &MediaInfo, separator: &str) -> MediaTags {
    match info {
        MediaInfo::Track(t) => MediaTags::new()
            .with("title", &t.name)
            .with("artist", t.artists.join(separator))
            .with("album", &t.album_name)
            .with("album_artist", t.album_artists.join(separator))
            .with("date", &t.release_year)
            .with("track", format!("{}/{}", t.track_number, t.total_tracks))
            .with("disc", format!("{}/{}", t.disc_number, t.total_discs))
            .with("genre", t.genres.join(separator))
            .with("publisher", &t.label),
        MediaInfo::Episode(e) => MediaTags::new()
            .with("title", &e.name)
            .with("artist", &e.show_name)
            .with("album", &e.show_name)
            .with("date", &e.release_date)
            .with("genre", "Podcast")
            .with("comment", &e.description)
            .with("language", &e.language),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EpisodeMetadata;
    use crate::test_support::track_metadata;

    #[test]
    fn track_tags_join_multi_values_with_separator() {
        let tags = build_tags(&MediaInfo::Track(track_metadata("t1")), "; ");

        assert_eq!(tags.get("title"), Some("Track t1"));
        assert_eq!(tags.get("artist"), Some("Artist; Guest"));
        assert_eq!(tags.get("track"), Some("1/3"));
        assert_eq!(tags.get("disc"), Some("1/1"));
        assert_eq!(tags.get("publisher"), Some("Warp"));
    }

    #[test]
    fn episode_tags_use_podcast_genre() {
        let info = MediaInfo::Episode(EpisodeMetadata {
            id: "e1".into(),
            name: "Pilot".into(),
            show_name: "Tech Talk".into(),
            is_playable: true,
            ..Default::default()
        });

        let tags = build_tags(&info, ";");

        assert_eq!(tags.get("genre"), Some("Podcast"));
        assert_eq!(tags.get("album"), Some("Tech Talk"));
        // empty fields are not written
        assert_eq!(tags.get("comment"), None);
    }
}
