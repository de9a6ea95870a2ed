//! Top-level downloader handle split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`control`] - Submission, cancellation, retry and status queries
//! - [`lifecycle`] - Startup and shutdown coordination
//! - [`services`] - Background service starters (expander, playlist tracker)

mod control;
mod lifecycle;
mod services;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::expander::{ExpansionRequest, ItemExpander};
use crate::playlist::PlaylistTracker;
use crate::post_processing::{self, MediaProcessor, ProcessorCapabilities};
use crate::queue::JobQueue;
use crate::registry::Registries;
use crate::session::{Authenticator, SessionPool, SessionSupervisor};
use crate::types::Event;
use crate::worker::WorkerContext;

/// Submission and shutdown state
#[derive(Clone)]
pub(crate) struct ControlState {
    /// Flag to indicate whether new work is accepted (set to false during shutdown)
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// Root token; background services run on child tokens
    pub(crate) shutdown_token: tokio_util::sync::CancellationToken,
    /// Expansion requests consumed by the single expander task
    pub(crate) expansion_tx: tokio::sync::mpsc::UnboundedSender<ExpansionRequest>,
    /// Receiving end, handed to the expander task by `start()`
    pub(crate) expansion_rx: std::sync::Arc<
        tokio::sync::Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<ExpansionRequest>>>,
    >,
    /// Handles of the background services
    pub(crate) services: std::sync::Arc<tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

/// Expansion, download and aggregation stages
#[derive(Clone)]
pub(crate) struct Pipeline {
    /// Resolves item references into jobs
    pub(crate) expander: ItemExpander,
    /// Writes m3u8 files for completed playlists
    pub(crate) tracker: PlaylistTracker,
    /// Keeps one worker per session running
    pub(crate) supervisor: std::sync::Arc<SessionSupervisor>,
    /// Post-processing backend shared by every worker
    pub(crate) processor: std::sync::Arc<dyn MediaProcessor>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Cancellation, failure, unavailability and status registries
    pub(crate) registries: Registries,
    /// Shared FIFO job queue
    pub(crate) queue: JobQueue,
    /// Submission and shutdown state
    pub(crate) control: ControlState,
    /// Expansion, download and aggregation stages
    pub(crate) pipeline: Pipeline,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// The post-processing backend is chosen from `config.tools`: an explicit ffmpeg path,
    /// else ffmpeg found on PATH, else no post-processing (raw downloads).
    ///
    /// Workers start as sessions are added; [`start`](Self::start) launches the expander
    /// and the playlist tracker.
    pub async fn new(
        config: Config,
        authenticator: std::sync::Arc<dyn Authenticator>,
        catalog: std::sync::Arc<dyn Catalog>,
    ) -> Result<Self> {
        let processor = post_processing::processor_from_config(&config.tools);
        Self::with_processor(config, authenticator, catalog, processor).await
    }

    /// Create a MediaDownloader with an explicit post-processing backend
    pub async fn with_processor(
        config: Config,
        authenticator: std::sync::Arc<dyn Authenticator>,
        catalog: std::sync::Arc<dyn Catalog>,
        processor: std::sync::Arc<dyn MediaProcessor>,
    ) -> Result<Self> {
        config.validate()?;

        // Ensure the download root exists
        tokio::fs::create_dir_all(config.download_root())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_root().display(),
                        e
                    ),
                ))
            })?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let config = std::sync::Arc::new(config);
        let registries = Registries::new();
        let queue = JobQueue::new();
        let shutdown_token = tokio_util::sync::CancellationToken::new();

        let sessions = SessionPool::new(
            authenticator,
            config.sessions.reinit_timeout,
            event_tx.clone(),
        );

        let worker_ctx = WorkerContext {
            config: config.clone(),
            queue: queue.clone(),
            registries: registries.clone(),
            sessions,
            processor: processor.clone(),
            event_tx: event_tx.clone(),
        };
        let supervisor = SessionSupervisor::new(
            worker_ctx,
            config.download.max_threads,
            shutdown_token.child_token(),
        );

        let tracker = PlaylistTracker::new(registries.clone(), event_tx.clone());
        let expander = ItemExpander::new(
            catalog,
            config.clone(),
            registries.clone(),
            queue.clone(),
            tracker.clone(),
            event_tx.clone(),
        );

        let (expansion_tx, expansion_rx) = tokio::sync::mpsc::unbounded_channel();

        let control = ControlState {
            accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
            shutdown_token,
            expansion_tx,
            expansion_rx: std::sync::Arc::new(tokio::sync::Mutex::new(Some(expansion_rx))),
            services: std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new())),
        };

        tracing::info!(
            download_root = %config.download_root().display(),
            max_threads = config.download.max_threads,
            processor = processor.name(),
            "Media downloader created"
        );

        Ok(Self {
            event_tx,
            config,
            registries,
            queue,
            control,
            pipeline: Pipeline {
                expander,
                tracker,
                supervisor,
                processor,
            },
        })
    }

    /// Subscribe to downloader events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{MediaDownloader, Config, Event};
    /// # use std::sync::Arc;
    /// # async fn example(
    /// #     authenticator: Arc<dyn media_dl::Authenticator>,
    /// #     catalog: Arc<dyn media_dl::Catalog>,
    /// # ) -> Result<(), Box<dyn std::error::Error>> {
    /// let downloader = MediaDownloader::new(Config::default(), authenticator, catalog).await?;
    ///
    /// let mut events = downloader.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         if let Event::Progress { media_id, status: Some(status), .. } = event {
    ///             println!("{media_id}: {status}");
    ///         }
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone operation.
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Post-processing features available with the configured tools
    pub fn capabilities(&self) -> ProcessorCapabilities {
        self.pipeline.processor.capabilities()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Fail fast once shutdown has begun
    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self
            .control
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
