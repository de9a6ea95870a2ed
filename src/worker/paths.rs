//! Output path resolution for a job

use crate::config::Config;
use crate::error::Result;
use crate::session::{EpisodeMetadata, TrackMetadata};
use crate::template::{PathTemplate, TemplateValues, sanitize_component};
use crate::types::JobSpec;
use std::path::{Path, PathBuf};

/// Extension of the raw container delivered by the transport
pub(crate) const RAW_EXTENSION: &str = "ogg";

/// Metadata of the item a job refers to
#[derive(Debug, Clone)]
pub(crate) enum MediaInfo {
    Track(TrackMetadata),
    Episode(EpisodeMetadata),
}

impl MediaInfo {
    pub(crate) fn is_playable(&self) -> bool {
        match self {
            MediaInfo::Track(t) => t.is_playable,
            MediaInfo::Episode(e) => e.is_playable,
        }
    }

    pub(crate) fn cover_url(&self) -> Option<&str> {
        match self {
            MediaInfo::Track(t) => t.cover_url.as_deref(),
            MediaInfo::Episode(e) => e.cover_url.as_deref(),
        }
    }

    /// Name shown in playlists and front-ends
    pub(crate) fn display_name(&self, extension: &str) -> String {
        match self {
            MediaInfo::Track(t) => format!(
                "{} [{} - {}:{}].{}",
                t.name,
                primary(&t.artists),
                t.album_name,
                t.release_year,
                extension
            ),
            MediaInfo::Episode(e) => format!("{} - {}.{}", e.show_name, e.name, extension),
        }
    }
}

fn primary(values: &[String]) -> &str {
    values.first().map(String::as_str).unwrap_or_default()
}

/// Where a job's bytes go
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TargetPaths {
    /// The file the job produces
    pub(crate) final_path: PathBuf,
    /// The file the stream is written to (a hidden sibling when converting)
    pub(crate) download_path: PathBuf,
    /// Whether the raw download is transcoded into `final_path`
    pub(crate) convert: bool,
    pub(crate) display_name: String,
}

/// Resolve the single output path of a job
///
/// `raw` keeps the transport's container and skips conversion.
pub(crate) fn resolve_target(
    config: &Config,
    job: &JobSpec,
    info: &MediaInfo,
    raw: bool,
) -> Result<TargetPaths> {
    let (root, extra) = output_root(config, job)?;

    let (final_path, extension) = match info {
        MediaInfo::Track(track) => {
            let extension = if raw {
                RAW_EXTENSION
            } else {
                config.download.media_format.as_str()
            };
            let mut dir = root;
            push_relative(&mut dir, extra);

            let album_layout = (!job.extra_path_is_root && job.force_album_layout)
                || (job.extra_path_is_root && job.force_album_after_root);
            if album_layout {
                let album_dir = PathTemplate::parse(&config.templates.album_name_formatter)?
                    .render(&track_values(job, track))?;
                push_relative(&mut dir, &album_dir);
            }

            let stem = PathTemplate::parse(&config.templates.track_name_formatter)?
                .render(&track_values(job, track))?;
            push_relative(&mut dir, &format!("{stem}.{extension}"));
            (dir, extension)
        }
        MediaInfo::Episode(episode) => {
            let extension = if raw {
                RAW_EXTENSION
            } else {
                config.download.podcast_media_format.as_str()
            };
            let mut dir = root;
            if !job.extra_path_is_root {
                push_relative(&mut dir, &config.download.podcast_subdir);
            }
            push_relative(&mut dir, extra);
            let show = sanitize_component(&episode.show_name);
            dir.push(&show);
            dir.push(format!(
                "{} - {}.{}",
                show,
                sanitize_component(&episode.name),
                extension
            ));
            (dir, extension)
        }
    };

    let convert = !raw && extension != RAW_EXTENSION;
    let download_path = if convert {
        raw_sibling(&final_path)
    } else {
        final_path.clone()
    };

    Ok(TargetPaths {
        display_name: info.display_name(extension),
        final_path,
        download_path,
        convert,
    })
}

/// Base directory and the extra segment still to be appended below it
fn output_root<'a>(config: &Config, job: &'a JobSpec) -> Result<(PathBuf, &'a str)> {
    if job.extra_path_is_root && !job.extra_subpath.is_empty() {
        return Ok((std::path::absolute(&job.extra_subpath)?, ""));
    }
    let base = job
        .output_base_path
        .as_deref()
        .unwrap_or(config.download.download_root.as_path());
    Ok((std::path::absolute(base)?, &job.extra_subpath))
}

/// Append `/`-separated segments, ignoring empty and `.` segments
fn push_relative(dir: &mut PathBuf, relative: &str) {
    for segment in relative.split(['/', '\\']) {
        if !segment.is_empty() && segment != "." {
            dir.push(segment);
        }
    }
}

/// Hidden `.~<stem>.ogg` sibling the raw stream is written to before conversion
pub(crate) fn raw_sibling(final_path: &Path) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".~{stem}.{RAW_EXTENSION}"))
}

/// `<stem>.ogg` next to the intended output, used when conversion fails
pub(crate) fn raw_fallback(final_path: &Path) -> PathBuf {
    final_path.with_extension(RAW_EXTENSION)
}

fn track_values(job: &JobSpec, track: &TrackMetadata) -> TemplateValues {
    let mut values = TemplateValues::new();
    values
        .set("artist", primary(&track.artists))
        .set("album", &track.album_name)
        .set("name", &track.name)
        .set("rel_year", &track.release_year)
        .set("disc_number", track.disc_number.to_string())
        .set("track_number", track.track_number.to_string())
        .set("spotid", job.media_id.as_str())
        .set("genre", primary(&track.genres))
        .set("label", &track.label)
        .set("explicit", if track.explicit { "Explicit" } else { "" })
        .set("trackcount", track.total_tracks.to_string())
        .set("disccount", track.total_discs.to_string());

    let playlist = job.playlist.as_ref();
    values
        .set("playlist_name", playlist.map(|p| p.name.as_str()).unwrap_or_default())
        .set(
            "playlist_owner",
            playlist.map(|p| p.owner.as_str()).unwrap_or_default(),
        )
        .set(
            "playlist_desc",
            playlist.map(|p| p.description.as_str()).unwrap_or_default(),
        );
    values
}
