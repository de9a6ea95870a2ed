//! Shared test helpers for creating MediaDownloader instances in tests.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::test_support::{FakeAuthenticator, FakeCatalog, FakeMedia, RecordingProcessor};
use crate::types::{DownloadStatus, MediaId};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Handles to the fakes behind a test downloader
pub(crate) struct Fakes {
    pub(crate) media: Arc<FakeMedia>,
    pub(crate) catalog: Arc<FakeCatalog>,
    pub(crate) auth: Arc<FakeAuthenticator>,
    pub(crate) processor: Arc<RecordingProcessor>,
}

/// Config rooted in `root` with every delay shortened for tests
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_root = root.join("downloads");
    config.download.download_delay = Duration::ZERO;
    config.download.recoverable_fail_wait_delay = Duration::ZERO;
    config.download.chunk_size = 4096;
    config.download.max_threads = 2;
    config.playlists.poll_interval = Duration::from_millis(20);
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.jitter = false;
    config
}

/// Helper to create a test MediaDownloader backed by in-memory fakes.
/// Returns the downloader, its fakes and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    configure: impl FnOnce(&mut Config),
) -> (MediaDownloader, Fakes, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let media = FakeMedia::new();
    let catalog = FakeCatalog::new();
    let auth = Arc::new(FakeAuthenticator::new(media.clone()));
    let processor = RecordingProcessor::new();

    let downloader = MediaDownloader::with_processor(
        config,
        auth.clone(),
        catalog.clone(),
        processor.clone(),
    )
    .await
    .unwrap();

    let fakes = Fakes {
        media,
        catalog,
        auth,
        processor,
    };
    (downloader, fakes, temp_dir)
}

/// Wait until `media_id` reaches `expected`, failing the test after 10 seconds
pub(crate) async fn wait_for_status(
    downloader: &MediaDownloader,
    media_id: &str,
    expected: DownloadStatus,
) {
    let media_id = MediaId::from(media_id);
    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(view) = downloader.status(&media_id).await
                && view.status == expected
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "{media_id} never reached {expected}: {:?}",
        downloader.status(&media_id).await
    );
}
