//! ffmpeg-based media processor using the external ffmpeg binary

use super::traits::{ConvertOptions, MediaProcessor, MediaTags, ProcessorCapabilities};
use crate::error::PostProcessError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// ffmpeg-based processor
///
/// Conversion writes the target directly. Tag, cover art and lyrics updates remux the
/// file into a hidden sibling (`.<name>.tmp.<ext>`) with stream copy and rename it over
/// the original, so a failed run never leaves a half-written file in place.
///
/// # Examples
///
/// ```no_run
/// use media_dl::post_processing::{FfmpegMediaProcessor, MediaProcessor};
///
/// let processor = FfmpegMediaProcessor::from_path()
///     .expect("ffmpeg not found in PATH");
/// assert!(processor.capabilities().can_convert);
/// ```
pub struct FfmpegMediaProcessor {
    binary_path: PathBuf,
}

impl FfmpegMediaProcessor {
    /// Create a processor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffmpeg in PATH
    ///
    /// Uses the `which` crate to search for the `ffmpeg` binary in the system PATH.
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Run ffmpeg with the given arguments, mapping failures to `ExternalTool`
    async fn run(&self, args: Vec<OsString>) -> crate::Result<()> {
        let output = Command::new(&self.binary_path)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(&args)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(crate::Error::ExternalTool(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }

    /// Remux `path` through a temp sibling with `extra` arguments, then replace the original
    async fn remux_in_place(&self, path: &Path, extra: Vec<OsString>) -> crate::Result<()> {
        let tmp = remux_temp_path(path);
        let mut args: Vec<OsString> = vec!["-i".into(), path.into()];
        args.extend(extra);
        args.push(tmp.clone().into());

        if let Err(e) = self.run(args).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e);
        }
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Hidden sibling used while remuxing, keeping the extension so ffmpeg picks the muxer
fn remux_temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (name.clone(), String::new()),
    };
    path.with_file_name(format!(".{stem}.tmp{ext}"))
}

fn conversion_args(source: &Path, target: &Path, options: &ConvertOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-i".into(),
        source.into(),
        "-ar".into(),
        "44100".into(),
        "-ac".into(),
        "2".into(),
        "-b:a".into(),
        options.quality.bitrate().into(),
    ];
    args.extend(options.extra_args.iter().map(OsString::from));
    args.push(target.into());
    args
}

fn tag_args(tags: &MediaTags) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-map".into(), "0".into(), "-c".into(), "copy".into()];
    for (key, value) in tags.entries() {
        args.push("-metadata".into());
        args.push(format!("{key}={value}").into());
    }
    args
}

#[async_trait]
impl MediaProcessor for FfmpegMediaProcessor {
    async fn convert(
        &self,
        source: &Path,
        target: &Path,
        options: &ConvertOptions,
    ) -> crate::Result<()> {
        self.run(conversion_args(source, target, options))
            .await
            .map_err(|e| {
                PostProcessError::ConversionFailed {
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    async fn write_tags(&self, path: &Path, tags: &MediaTags) -> crate::Result<()> {
        self.remux_in_place(path, tag_args(tags))
            .await
            .map_err(|e| {
                PostProcessError::TaggingFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    async fn set_thumbnail(&self, path: &Path, image_url: &str) -> crate::Result<()> {
        let extra: Vec<OsString> = vec![
            "-i".into(),
            image_url.into(),
            "-map".into(),
            "0:a".into(),
            "-map".into(),
            "1".into(),
            "-c".into(),
            "copy".into(),
            "-id3v2_version".into(),
            "3".into(),
            "-disposition:v".into(),
            "attached_pic".into(),
        ];
        self.remux_in_place(path, extra).await.map_err(|e| {
            PostProcessError::ThumbnailFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn embed_lyrics(&self, path: &Path, lyrics: &str) -> crate::Result<()> {
        let tags = MediaTags::new().with("lyrics", lyrics);
        self.remux_in_place(path, tag_args(&tags))
            .await
            .map_err(|e| {
                PostProcessError::TaggingFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
                .into()
            })
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
        "cli-ffmpeg"
    }
}
