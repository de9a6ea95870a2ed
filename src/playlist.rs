//! Playlist (m3u8) generation for completed collections
//!
//! The tracker keeps one [`CollectionWatch`] per playlist queued for m3u8 output and polls
//! the registries at a fixed interval. A watch fires once every member that is not
//! globally unavailable has finished successfully: the playlist file is written in one
//! piece (temp file, then rename) and the watch is dropped, so it can never fire twice.
//! Members may complete in any order.

use crate::registry::Registries;
use crate::types::{CompletedMedia, Event, MediaId};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A pending playlist file tied to the member ids of one playlist
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionWatch {
    /// Playlist catalog id
    pub collection_id: String,
    /// Absolute path of the file to write
    pub target_path: PathBuf,
    /// Member ids in playlist order
    pub member_ids: Vec<MediaId>,
}

/// Background tracker that turns completed playlists into m3u8 files
#[derive(Clone)]
pub struct PlaylistTracker {
    watches: Arc<Mutex<Vec<CollectionWatch>>>,
    registries: Registries,
    event_tx: broadcast::Sender<Event>,
}

impl PlaylistTracker {
    /// Create a tracker reading completion state from `registries`
    pub fn new(registries: Registries, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            watches: Arc::new(Mutex::new(Vec::new())),
            registries,
            event_tx,
        }
    }

    /// Start watching a collection
    ///
    /// A watch for the same target path replaces the previous one.
    pub async fn register(&self, watch: CollectionWatch) {
        info!(
            collection = %watch.collection_id,
            path = %watch.target_path.display(),
            members = watch.member_ids.len(),
            "Watching playlist for m3u8 generation"
        );
        let mut watches = self.watches.lock().await;
        watches.retain(|w| w.target_path != watch.target_path);
        watches.push(watch);
    }

    /// Number of playlists still waiting for members
    pub async fn pending(&self) -> usize {
        self.watches.lock().await.len()
    }

    /// Check every watch once and write the playlists that are complete
    ///
    /// Returns the number of playlist files written.
    pub async fn poll_once(&self) -> usize {
        let (completed, unavailable) = self.registries.completion_view().await;

        let ready: Vec<CollectionWatch> = {
            let mut watches = self.watches.lock().await;
            let (ready, waiting): (Vec<_>, Vec<_>) = watches
                .drain(..)
                .partition(|w| is_complete(w, &completed, &unavailable));
            *watches = waiting;
            ready
        };

        let mut written = 0;
        for watch in ready {
            let entries = playlist_entries(&watch, &completed, &unavailable);
            match write_playlist(&watch.target_path, &entries).await {
                Ok(()) => {
                    info!(
                        collection = %watch.collection_id,
                        path = %watch.target_path.display(),
                        entries = entries.len(),
                        "Playlist written"
                    );
                    self.event_tx
                        .send(Event::PlaylistWritten {
                            path: watch.target_path.clone(),
                            entries: entries.len(),
                        })
                        .ok();
                    written += 1;
                }
                Err(e) => {
                    // Keep the watch so the next poll tries again
                    error!(
                        collection = %watch.collection_id,
                        path = %watch.target_path.display(),
                        error = %e,
                        "Failed to write playlist"
                    );
                    self.watches.lock().await.push(watch);
                }
            }
        }
        written
    }

    /// Poll at `interval` until `stop` is cancelled
    pub async fn run(self, interval: Duration, stop: CancellationToken) {
        info!(interval = ?interval, "Playlist tracker started");
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    debug!("Checking pending playlists");
                    self.poll_once().await;
                }
            }
        }
        info!("Playlist tracker stopped");
    }
}

fn is_complete(
    watch: &CollectionWatch,
    completed: &HashMap<MediaId, CompletedMedia>,
    unavailable: &HashSet<MediaId>,
) -> bool {
    watch
        .member_ids
        .iter()
        .filter(|id| !unavailable.contains(*id))
        .all(|id| completed.contains_key(id))
}

/// Entries in member order, skipping unavailable members
fn playlist_entries<'a>(
    watch: &CollectionWatch,
    completed: &'a HashMap<MediaId, CompletedMedia>,
    unavailable: &HashSet<MediaId>,
) -> Vec<&'a CompletedMedia> {
    watch
        .member_ids
        .iter()
        .filter(|id| !unavailable.contains(*id))
        .filter_map(|id| completed.get(id))
        .collect()
}

/// Extended m3u body: header, then `#EXTINF:<n>, <name>` and the path per entry
pub(crate) fn render_m3u(entries: &[&CompletedMedia]) -> String {
    let mut out = String::from("#EXTM3U\n");
    for (index, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "#EXTINF:{}, {}\n{}\n",
            index + 1,
            entry.display_name,
            entry.output_path.display()
        ));
    }
    out
}

async fn write_playlist(path: &Path, entries: &[&CompletedMedia]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = tokio::fs::write(&temp_path, render_m3u(entries)).await;
    let result = match result {
        Ok(()) => tokio::fs::rename(&temp_path, path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        tokio::fs::remove_file(&temp_path).await.ok();
    }
    result
}
