//! Chunked stream transfer with the end-of-stream heuristic

use super::context::WorkerContext;
use crate::error::Result;
use crate::session::MediaStream;
use crate::types::JobSpec;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// How a transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferOutcome {
    /// All bytes written (or the transport ended within the padding tolerance)
    Complete { written: u64, total: u64 },
    /// A pending cancellation was consumed at a chunk boundary
    Cancelled,
    /// The transport stopped delivering while a significant amount was still missing
    ShortRead { written: u64, total: u64 },
}

/// Meaning of a zero-length read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EmptyRead {
    /// Trailing bytes the transport sometimes drops; safe to ignore
    CleanEnd,
    /// Genuine stream failure
    Truncated,
}

/// Size of the next read: never larger than what remains
pub(crate) fn next_read_size(chunk_size: usize, remaining: u64) -> usize {
    usize::try_from(remaining).map_or(chunk_size, |remaining| chunk_size.min(remaining))
}

/// Decide whether an empty read ends the stream or fails the attempt
pub(crate) fn classify_empty_read(remaining: u64, padding: u64) -> EmptyRead {
    if remaining <= padding {
        EmptyRead::CleanEnd
    } else {
        EmptyRead::Truncated
    }
}

/// Stream `stream` into `path`, reporting progress after every chunk
///
/// Cancellation is checked before each read. The file is removed on every outcome
/// other than [`TransferOutcome::Complete`], including errors.
pub(crate) async fn transfer(
    ctx: &WorkerContext,
    job: &JobSpec,
    stream: &mut dyn MediaStream,
    path: &Path,
) -> Result<TransferOutcome> {
    let result = write_stream(ctx, job, stream, path).await;
    if !matches!(result, Ok(TransferOutcome::Complete { .. }))
        && let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(media_id = %job.media_id, path = %path.display(), error = %e, "Failed to remove partial file");
    }
    result
}

async fn write_stream(
    ctx: &WorkerContext,
    job: &JobSpec,
    stream: &mut dyn MediaStream,
    path: &Path,
) -> Result<TransferOutcome> {
    let chunk_size = ctx.config.download.chunk_size;
    let padding = ctx.config.download.dl_end_padding_bytes;
    let total = stream.total_size();
    let mut written: u64 = 0;
    let mut file = tokio::fs::File::create(path).await?;

    loop {
        if ctx.registries.take_cancel(&job.media_id).await {
            tracing::info!(media_id = %job.media_id, written, total, "Cancelled mid-transfer");
            return Ok(TransferOutcome::Cancelled);
        }

        let remaining = total.saturating_sub(written);
        if remaining == 0 {
            break;
        }

        let request = next_read_size(chunk_size, remaining);
        let data = stream.read(request).await?;

        if data.is_empty() {
            match classify_empty_read(remaining, padding) {
                EmptyRead::CleanEnd => {
                    tracing::debug!(media_id = %job.media_id, remaining, "Stream ended within padding");
                    break;
                }
                EmptyRead::Truncated => {
                    tracing::warn!(media_id = %job.media_id, written, total, "Stream ended early");
                    return Ok(TransferOutcome::ShortRead { written, total });
                }
            }
        }

        file.write_all(&data).await?;
        written += data.len() as u64;
        ctx.report(job, None, Some((written, total))).await;
    }

    file.flush().await?;
    Ok(TransferOutcome::Complete { written, total })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStream;
    use crate::worker::tests::test_context;

    #[test]
    fn read_size_shrinks_to_remaining() {
        assert_eq!(next_read_size(50_000, 1_000_000), 50_000);
        assert_eq!(next_read_size(50_000, 120), 120);
        assert_eq!(next_read_size(50_000, 0), 0);
    }

    #[test]
    fn empty_read_is_clean_only_within_padding() {
        assert_eq!(classify_empty_read(0, 167), EmptyRead::CleanEnd);
        assert_eq!(classify_empty_read(167, 167), EmptyRead::CleanEnd);
        assert_eq!(classify_empty_read(168, 167), EmptyRead::Truncated);
        assert_eq!(classify_empty_read(40_000, 167), EmptyRead::Truncated);
    }

    #[tokio::test]
    async fn writes_every_byte_in_bounded_chunks() {
        let (ctx, temp_dir) = test_context(|c| c.download.chunk_size = 4);
        let job = JobSpec::track("t1");
        ctx.registries.admit(job.clone()).await;
        let mut stream = FakeStream::new(b"0123456789".to_vec(), 10, None);
        let requests = stream.requests();
        let path = temp_dir.path().join("out.ogg");

        let outcome = transfer(&ctx, &job, &mut stream, &path).await.unwrap();

        assert_eq!(outcome, TransferOutcome::Complete { written: 10, total: 10 });
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
        assert_eq!(*requests.lock().unwrap(), vec![4, 4, 2]);
        let view = ctx.registries.status(&job.media_id).await.unwrap();
        assert_eq!(view.progress, Some((10, 10)));
    }

    #[tokio::test]
    async fn shortfall_within_padding_is_a_clean_end() {
        let (ctx, temp_dir) = test_context(|c| {
            c.download.chunk_size = 64;
            c.download.dl_end_padding_bytes = 16;
        });
        let job = JobSpec::track("t1");
        let bytes = vec![7u8; 100];
        let mut stream = FakeStream::new(bytes, 110, None);
        let path = temp_dir.path().join("out.ogg");

        let outcome = transfer(&ctx, &job, &mut stream, &path).await.unwrap();

        match outcome {
            TransferOutcome::Complete { written, total } => {
                assert_eq!(written, 100);
                assert!(total - written <= 16);
            }
            other => panic!("expected clean end, got {:?}", other),
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 100);
    }

    #[tokio::test]
    async fn empty_read_with_large_remainder_fails_and_removes_file() {
        let (ctx, temp_dir) = test_context(|c| {
            c.download.chunk_size = 64;
            c.download.dl_end_padding_bytes = 16;
        });
        let job = JobSpec::track("t1");
        let mut stream = FakeStream::new(vec![1u8; 100], 1_000, None);
        let path = temp_dir.path().join("out.ogg");

        let outcome = transfer(&ctx, &job, &mut stream, &path).await.unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::ShortRead {
                written: 100,
                total: 1_000
            }
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn pending_cancellation_stops_at_chunk_boundary() {
        let (ctx, temp_dir) = test_context(|c| c.download.chunk_size = 4);
        let job = JobSpec::track("t1");
        ctx.registries.admit(job.clone()).await;
        ctx.registries.request_cancel(&job.media_id).await;
        let mut stream = FakeStream::new(b"0123456789".to_vec(), 10, None);
        let requests = stream.requests();
        let path = temp_dir.path().join("out.ogg");

        let outcome = transfer(&ctx, &job, &mut stream, &path).await.unwrap();

        assert_eq!(outcome, TransferOutcome::Cancelled);
        assert!(!path.exists());
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_write_error_is_returned() {
        let (ctx, temp_dir) = test_context(|_| {});
        let job = JobSpec::track("t1");
        let mut stream = FakeStream::new(vec![1u8; 10], 10, None);
        let path = temp_dir.path().join("missing-dir").join("out.ogg");

        let result = transfer(&ctx, &job, &mut stream, &path).await;

        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
