//! Background service starters.

use super::MediaDownloader;

impl MediaDownloader {
    /// Start the expander task consuming submitted references
    ///
    /// Returns `None` when the expander was already started.
    pub(crate) async fn start_expander(&self) -> Option<tokio::task::JoinHandle<()>> {
        let requests = self.control.expansion_rx.lock().await.take()?;
        let expander = self.pipeline.expander.clone();
        let stop = self.control.shutdown_token.child_token();

        let handle = tokio::spawn(expander.run(requests, stop));

        tracing::info!("Item expander background task started");

        Some(handle)
    }

    /// Start the playlist tracker that writes m3u8 files for completed playlists
    pub(crate) fn start_playlist_tracker(&self) -> tokio::task::JoinHandle<()> {
        if !self.config.playlists.create_m3u_playlists {
            tracing::info!("Playlist generation disabled, skipping playlist tracker");
            return tokio::spawn(async {});
        }

        let tracker = self.pipeline.tracker.clone();
        let interval = self.config.playlists.poll_interval;
        let stop = self.control.shutdown_token.child_token();

        let handle = tokio::spawn(tracker.run(interval, stop));

        tracing::info!("Playlist tracker background task started");

        handle
    }
}
