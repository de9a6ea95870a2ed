//! # media-dl
//!
//! Backend library for streaming-catalog media downloaders.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Session-bound** - One download worker per authenticated account session
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! The catalog and the streaming transport are supplied by the embedder through the
//! [`Catalog`], [`Authenticator`] and [`Session`] traits.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, ItemRef, MediaDownloader, PathLayout};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     authenticator: Arc<dyn media_dl::Authenticator>,
//! #     catalog: Arc<dyn media_dl::Catalog>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = MediaDownloader::new(Config::default(), authenticator.clone(), catalog).await?;
//! downloader.start().await?;
//!
//! // One worker per logged-in account
//! let session = authenticator.authenticate("account-1").await?;
//! downloader.add_session(session).await?;
//!
//! // Subscribe to events
//! let mut events = downloader.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! downloader.submit(
//!     "spotify:album:1DFixLWuPkv3KT3TnV35m3".parse::<ItemRef>()?,
//!     PathLayout::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog lookups used to resolve collections
pub mod catalog;
/// Configuration types
pub mod config;
/// Top-level downloader handle (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Item expansion into download jobs
pub mod expander;
/// Item references (links and URIs)
pub mod item_ref;
/// Playlist (m3u8) generation
pub mod playlist;
/// Post-processing backends
pub mod post_processing;
/// Shared job queue
pub mod queue;
/// Cancellation, failure and status registries
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Sessions and the worker supervisor
pub mod session;
/// File name templates
pub mod template;
/// Core types and events
pub mod types;

mod worker;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use catalog::{AlbumInfo, Catalog, PlaylistInfo};
pub use config::Config;
pub use downloader::MediaDownloader;
pub use error::{Error, PostProcessError, Result};
pub use item_ref::ItemRef;
pub use post_processing::{
    FfmpegMediaProcessor, MediaProcessor, NoOpMediaProcessor, ProcessorCapabilities,
};
pub use session::{Authenticator, EpisodeMetadata, MediaStream, Session, TrackMetadata};
pub use types::{
    CompletedMedia, DownloadStatus, Event, JobSpec, MediaId, MediaKind, PathLayout,
    PlaylistContext, PostProcessStage, StatusView, StreamQuality,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
/// use std::sync::Arc;
///
/// # async fn example(
/// #     authenticator: Arc<dyn media_dl::Authenticator>,
/// #     catalog: Arc<dyn media_dl::Catalog>,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let downloader = MediaDownloader::new(Config::default(), authenticator, catalog).await?;
/// downloader.start().await?;
///
/// // Run with automatic signal handling
/// run_with_shutdown(downloader).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
