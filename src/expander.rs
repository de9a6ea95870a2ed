//! Item expansion: turns item references into leaf download jobs
//!
//! Collections are resolved through the [`Catalog`]:
//! - an album becomes one job per track, sharing one pre-rendered album directory when
//!   album layout is forced
//! - an artist becomes the tracks of every album; an album that cannot be resolved is
//!   logged and skipped
//! - a playlist becomes one job per track that still has a catalog id, carrying the
//!   playlist naming context; with m3u8 output enabled the playlist is watched before
//!   any member is admitted
//! - a show becomes one job per episode
//!
//! Every job goes through [`Registries::admit`], so resubmitting a media id never
//! duplicates it in the queue.

use crate::catalog::{AlbumInfo, Catalog};
use crate::config::Config;
use crate::error::Result;
use crate::item_ref::ItemRef;
use crate::playlist::{CollectionWatch, PlaylistTracker};
use crate::queue::JobQueue;
use crate::registry::{Admission, Registries};
use crate::retry::with_retry;
use crate::template::{PathTemplate, TemplateValues};
use crate::types::{Event, JobSpec, MediaId, PathLayout, PlaylistContext};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// A reference waiting to be expanded, with the path options its jobs inherit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpansionRequest {
    /// What to expand
    pub reference: ItemRef,
    /// Path composition options copied onto every resulting job
    pub layout: PathLayout,
}

/// Resolves item references into jobs and admits them to the queue
#[derive(Clone)]
pub struct ItemExpander {
    catalog: Arc<dyn Catalog>,
    config: Arc<Config>,
    registries: Registries,
    queue: JobQueue,
    tracker: PlaylistTracker,
    event_tx: broadcast::Sender<Event>,
}

impl ItemExpander {
    /// Create an expander feeding `queue`
    pub fn new(
        catalog: Arc<dyn Catalog>,
        config: Arc<Config>,
        registries: Registries,
        queue: JobQueue,
        tracker: PlaylistTracker,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            catalog,
            config,
            registries,
            queue,
            tracker,
            event_tx,
        }
    }

    /// Expand `reference` and admit its jobs
    ///
    /// Returns the number of jobs queued (new or re-queued). If the reference itself
    /// cannot be resolved nothing is queued, [`Event::ExpansionFailed`] is emitted and
    /// the error is returned.
    pub async fn expand(&self, reference: &ItemRef, layout: &PathLayout) -> Result<usize> {
        tracing::info!(reference = %reference, "Expanding item reference");
        match self.resolve(reference, layout).await {
            Ok(queued) => {
                tracing::info!(reference = %reference, queued, "Expansion finished");
                Ok(queued)
            }
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "Failed to resolve item reference");
                self.event_tx
                    .send(Event::ExpansionFailed {
                        reference: reference.to_string(),
                        error: e.to_string(),
                    })
                    .ok();
                Err(e)
            }
        }
    }

    /// Consume expansion requests one at a time until `stop` is cancelled
    ///
    /// Failures are already reported by [`expand`](Self::expand); the loop keeps going.
    pub async fn run(
        self,
        mut requests: mpsc::UnboundedReceiver<ExpansionRequest>,
        stop: CancellationToken,
    ) {
        tracing::info!("Item expander started");
        loop {
            let request = tokio::select! {
                _ = stop.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.expand(&request.reference, &request.layout).await.ok();
        }
        tracing::info!("Item expander stopped");
    }

    /// Admit a single job; returns whether it was (re-)queued
    pub async fn admit(&self, job: JobSpec) -> bool {
        let media_id = job.media_id.clone();
        match self.registries.admit(job).await {
            Admission::Enqueue(job) | Admission::Requeue(job) => {
                let media_kind = job.media_kind;
                self.queue.push(job).await;
                self.event_tx
                    .send(Event::Queued {
                        media_id,
                        media_kind,
                    })
                    .ok();
                true
            }
            Admission::Uncancelled => {
                tracing::info!(media_id = %media_id, "Withdrew pending cancellation");
                false
            }
            Admission::Deferred => {
                tracing::info!(media_id = %media_id, "Cancellation in flight, job re-queued once it lands");
                false
            }
            Admission::Ignored => {
                tracing::debug!(media_id = %media_id, "Already queued or finished, ignoring");
                false
            }
        }
    }

    async fn resolve(&self, reference: &ItemRef, layout: &PathLayout) -> Result<usize> {
        match reference {
            ItemRef::Track(id) => Ok(usize::from(
                self.admit(JobSpec::track(id.as_str()).with_layout(layout))
                    .await,
            )),
            ItemRef::Episode(id) => Ok(usize::from(
                self.admit(JobSpec::episode(id.as_str()).with_layout(layout))
                    .await,
            )),
            ItemRef::Album(id) => self.expand_album(id, layout).await,
            ItemRef::Artist(id) => self.expand_artist(id, layout).await,
            ItemRef::Playlist(id) => self.expand_playlist(id, layout).await,
            ItemRef::Podcast(id) => self.expand_show(id, layout).await,
        }
    }

    async fn expand_album(&self, album_id: &str, layout: &PathLayout) -> Result<usize> {
        let album = with_retry(&self.config.retry, || self.catalog.album(album_id)).await?;
        let track_ids = with_retry(&self.config.retry, || self.catalog.album_tracks(album_id)).await?;
        let layout = self.album_layout(&album, layout)?;

        tracing::debug!(album = %album.name, tracks = track_ids.len(), "Resolved album");
        let mut queued = 0;
        for track_id in track_ids {
            if self
                .admit(JobSpec::track(track_id).with_layout(&layout))
                .await
            {
                queued += 1;
            }
        }
        Ok(queued)
    }

    async fn expand_artist(&self, artist_id: &str, layout: &PathLayout) -> Result<usize> {
        let album_ids =
            with_retry(&self.config.retry, || self.catalog.artist_albums(artist_id)).await?;

        let mut queued = 0;
        for album_id in &album_ids {
            match self.expand_album(album_id, layout).await {
                Ok(n) => queued += n,
                Err(e) => {
                    tracing::warn!(artist = artist_id, album = %album_id, error = %e, "Skipping album that could not be resolved");
                }
            }
        }
        Ok(queued)
    }

    async fn expand_playlist(&self, playlist_id: &str, layout: &PathLayout) -> Result<usize> {
        let playlist =
            with_retry(&self.config.retry, || self.catalog.playlist(playlist_id)).await?;
        let context = PlaylistContext {
            name: playlist.name.clone(),
            owner: playlist.owner.clone(),
            description: playlist.description.clone(),
        };

        let member_ids: Vec<MediaId> = playlist
            .track_ids
            .iter()
            .flatten()
            .map(|id| MediaId::from(id.as_str()))
            .collect();
        let skipped = playlist.track_ids.len() - member_ids.len();
        if skipped > 0 {
            tracing::info!(playlist = %playlist.name, skipped, "Skipping playlist entries without a catalog id");
        }

        // The watch must exist before any member can complete
        if self.config.playlists.create_m3u_playlists {
            let target_path = self.playlist_file(&context)?;
            self.tracker
                .register(CollectionWatch {
                    collection_id: playlist.id.clone(),
                    target_path,
                    member_ids: member_ids.clone(),
                })
                .await;
        }

        let mut queued = 0;
        for media_id in member_ids {
            let job = JobSpec::track(media_id)
                .with_layout(layout)
                .with_playlist(context.clone());
            if self.admit(job).await {
                queued += 1;
            }
        }
        Ok(queued)
    }

    async fn expand_show(&self, show_id: &str, layout: &PathLayout) -> Result<usize> {
        let episode_ids =
            with_retry(&self.config.retry, || self.catalog.show_episodes(show_id)).await?;

        let mut queued = 0;
        for episode_id in episode_ids {
            if self
                .admit(JobSpec::episode(episode_id).with_layout(layout))
                .await
            {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Pre-render the album directory once for every track of the album
    ///
    /// The rendered directory is appended to the extra segment and the force flags are
    /// cleared, so workers do not render it again per track.
    fn album_layout(&self, album: &AlbumInfo, layout: &PathLayout) -> Result<PathLayout> {
        let forced = (!layout.extra_path_is_root && layout.force_album_layout)
            || (layout.extra_path_is_root && layout.force_album_after_root);
        if !forced {
            return Ok(layout.clone());
        }

        let mut values = TemplateValues::new();
        values
            .set("artist", album.artists.first().map(String::as_str).unwrap_or_default())
            .set("rel_year", &album.release_year)
            .set("album", &album.name)
            .set("genre", album.genres.first().map(String::as_str).unwrap_or_default())
            .set("label", &album.label)
            .set("trackcount", album.total_tracks.to_string())
            .set("playlist_name", "")
            .set("playlist_owner", "")
            .set("playlist_desc", "");
        let album_dir =
            PathTemplate::parse(&self.config.templates.album_name_formatter)?.render(&values)?;

        let extra_subpath = if layout.extra_subpath.is_empty() {
            album_dir
        } else {
            format!("{}/{}", layout.extra_subpath.trim_end_matches(['/', '\\']), album_dir)
        };
        Ok(PathLayout {
            extra_subpath,
            force_album_layout: false,
            force_album_after_root: false,
            ..layout.clone()
        })
    }

    /// Absolute path of the m3u8 file for a playlist, below the download root
    fn playlist_file(&self, context: &PlaylistContext) -> Result<PathBuf> {
        let mut values = TemplateValues::new();
        values
            .set("name", &context.name)
            .set("owner", &context.owner)
            .set("description", &context.description);
        let relative = PathTemplate::parse(&self.config.templates.playlist_name_formatter)?
            .render(&values)?;

        let mut path = std::path::absolute(self.config.download_root())?;
        for segment in relative.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".") {
            path.push(segment);
        }
        let file_name = path
            .file_name()
            .map(|n| format!("{}.m3u8", n.to_string_lossy()))
            .unwrap_or_else(|| "playlist.m3u8".to_string());
        path.set_file_name(file_name);
        Ok(path)
    }
}
