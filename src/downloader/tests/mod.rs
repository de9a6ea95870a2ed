use super::test_helpers::{Fakes, create_test_downloader, wait_for_status};
use super::*;
use crate::item_ref::ItemRef;
use crate::test_support::{FakeFailure, FakeSession, album_info, track_metadata};
use crate::types::{DownloadStatus, JobSpec, MediaId, PathLayout};
use std::sync::Arc;
use std::time::Duration;


/// Bind a fresh fake session to the downloader
async fn add_session(downloader: &MediaDownloader, fakes: &Fakes, uuid: &str) {
    downloader
        .add_session(Arc::new(FakeSession::new(uuid, fakes.media.clone())))
        .await
        .unwrap();
}
