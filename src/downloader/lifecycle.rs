//! Startup and shutdown coordination.

use crate::error::Result;
use crate::types::Event;

use super::MediaDownloader;

/// How long shutdown waits for the background services to stop
const SERVICE_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

impl MediaDownloader {
    /// Start the background services
    ///
    /// Spawns the expander task (consumer of [`submit`](Self::submit)) and, when playlist
    /// generation is enabled, the playlist tracker. Workers are spawned as sessions are
    /// added. Calling `start` twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`](crate::Error::ShuttingDown) after
    /// [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<()> {
        self.ensure_accepting()?;

        let Some(expander) = self.start_expander().await else {
            tracing::debug!("Background services already running");
            return Ok(());
        };
        let tracker = self.start_playlist_tracker();

        self.control
            .services
            .lock()
            .await
            .extend([expander, tracker]);

        self.pipeline.supervisor.reconcile().await;
        tracing::info!("Media downloader started");
        Ok(())
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new submissions, jobs and sessions
    /// 2. Signals every worker to stop after its current job
    /// 3. Waits for the workers with a timeout (30 seconds)
    /// 4. Stops the expander and the playlist tracker
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Jobs still waiting in the queue stay in the status registry as `Waiting`.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new work
        self.control
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new work");

        // 2-3. Workers finish their current job, bounded by the supervisor's timeout
        self.pipeline.supervisor.shutdown().await;

        // 4. Stop background services
        self.control.shutdown_token.cancel();
        let services: Vec<_> = self.control.services.lock().await.drain(..).collect();
        let wait_services = async {
            for handle in services {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Background service panicked");
                }
            }
        };
        if tokio::time::timeout(SERVICE_STOP_TIMEOUT, wait_services)
            .await
            .is_err()
        {
            tracing::warn!("Timeout waiting for background services to stop");
        }

        // 5. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
