//! Download workers
//!
//! One worker runs per authenticated session. It pulls jobs from the shared queue,
//! resolves the output path, streams the bytes in chunks, runs post-processing and
//! reports progress. Failed attempts are retried up to `max_retries` times:
//!
//! - metadata failures retry immediately
//! - stream hiccups (timeouts, decode errors, short reads) retry after
//!   `recoverable_fail_wait_delay` with a live countdown
//! - connectivity failures re-authenticate the session first
//! - template errors, local I/O errors and re-authentication timeouts fail the job at once
//!
//! Cancellation is cooperative: it is honoured before a job starts, before every retry
//! and at every chunk boundary.

mod context;
mod finalization;
mod paths;
mod transfer;


pub(crate) use context::WorkerContext;

use crate::error::Error;
use crate::retry::IsRetryable;
use crate::session::Session;
use crate::types::{DownloadStatus, Event, JobSpec, MediaKind, StreamQuality};
use finalization::{Finalized, finalize};
use paths::{MediaInfo, resolve_target};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use transfer::{TransferOutcome, transfer};

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Downloaded,
    AlreadyExists,
    Unavailable,
    Cancelled,
    Failed,
}

impl JobOutcome {
    /// Whether the politeness delay applies before the next job
    ///
    /// Only outcomes that involved a transfer (or transfer attempts) are delayed.
    fn applies_delay(self) -> bool {
        matches!(self, JobOutcome::Downloaded | JobOutcome::Failed)
    }
}

/// Result of a single download attempt
#[derive(Debug)]
enum AttemptResult {
    Done {
        status: DownloadStatus,
        path: PathBuf,
        display_name: String,
    },
    Cancelled,
    Unavailable,
    /// Metadata could not be fetched; retry without waiting
    MetadataFailed,
    /// Stream hiccup; retry after the recoverable-failure wait
    Indeterminate,
    /// Remote service unreachable; re-authenticate before retrying
    Connectivity(Error),
    /// Not worth retrying
    Hard(Error),
}

/// How a backoff wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backoff {
    Elapsed,
    Cancelled,
    Stopped,
}

/// Worker bound to exactly one session uuid
pub(crate) struct DownloadWorker {
    session_uuid: String,
    ctx: WorkerContext,
    stop: CancellationToken,
}

impl DownloadWorker {
    pub(crate) fn new(session_uuid: String, ctx: WorkerContext, stop: CancellationToken) -> Self {
        Self {
            session_uuid,
            ctx,
            stop,
        }
    }

    /// Process jobs until `stop` is cancelled
    ///
    /// A stop signal never interrupts a running job; it is observed while waiting for
    /// the next job, during backoff and during the inter-job delay.
    pub(crate) async fn run(self) {
        tracing::info!(session = %self.session_uuid, "Worker started");
        self.ctx.emit(Event::WorkerStarted {
            session: self.session_uuid.clone(),
        });

        while let Some(job) = self.ctx.queue.next(&self.stop).await {
            let outcome = self.process_job(&job).await;

            let delay = self.ctx.config.download.download_delay;
            if outcome.applies_delay() && !delay.is_zero() {
                tracing::debug!(session = %self.session_uuid, delay_secs = delay.as_secs(), "Waiting before next job");
                tokio::select! {
                    _ = self.stop.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        tracing::info!(session = %self.session_uuid, "Worker stopped");
        self.ctx.emit(Event::WorkerStopped {
            session: self.session_uuid.clone(),
        });
    }

    /// Run one job through the attempt loop to a terminal state
    pub(crate) async fn process_job(&self, job: &JobSpec) -> JobOutcome {
        if self.ctx.registries.take_cancel(&job.media_id).await {
            tracing::info!(media_id = %job.media_id, "Job cancelled before start");
            self.ctx.report_failed(job, DownloadStatus::Cancelled).await;
            return JobOutcome::Cancelled;
        }

        let max_retries = self.ctx.config.download.max_retries.max(1);
        let mut attempt = 0;

        while attempt < max_retries {
            attempt += 1;

            if attempt > 1 {
                if self.ctx.registries.take_cancel(&job.media_id).await {
                    tracing::info!(media_id = %job.media_id, attempt, "Job cancelled before retry");
                    self.ctx.report_failed(job, DownloadStatus::Cancelled).await;
                    return JobOutcome::Cancelled;
                }
                self.ctx
                    .report(job, Some(DownloadStatus::Retry(attempt)), None)
                    .await;
            }
            self.ctx
                .report(job, Some(DownloadStatus::Downloading), Some((0, 100)))
                .await;

            match self.attempt(job).await {
                AttemptResult::Done {
                    status,
                    path,
                    display_name,
                } => {
                    tracing::info!(media_id = %job.media_id, path = %path.display(), %status, "Job finished");
                    let outcome = if status == DownloadStatus::AlreadyExists {
                        JobOutcome::AlreadyExists
                    } else {
                        JobOutcome::Downloaded
                    };
                    self.ctx
                        .report_completed(job, status, path, display_name)
                        .await;
                    return outcome;
                }
                AttemptResult::Cancelled => {
                    self.ctx.report_failed(job, DownloadStatus::Cancelled).await;
                    return JobOutcome::Cancelled;
                }
                AttemptResult::Unavailable => {
                    tracing::info!(media_id = %job.media_id, "Media is unavailable");
                    self.ctx.registries.mark_unavailable(job).await;
                    self.ctx.emit(Event::Progress {
                        media_id: job.media_id.clone(),
                        status: Some(DownloadStatus::Unavailable),
                        progress: Some((0, 100)),
                        output_path: None,
                        display_name: None,
                    });
                    return JobOutcome::Unavailable;
                }
                AttemptResult::MetadataFailed => {}
                AttemptResult::Indeterminate => {
                    if attempt < max_retries {
                        match self.backoff(job).await {
                            Backoff::Elapsed => {}
                            Backoff::Cancelled => {
                                self.ctx.report_failed(job, DownloadStatus::Cancelled).await;
                                return JobOutcome::Cancelled;
                            }
                            Backoff::Stopped => break,
                        }
                    }
                }
                AttemptResult::Connectivity(e) => {
                    tracing::warn!(media_id = %job.media_id, session = %self.session_uuid, attempt, error = %e, "Connectivity lost, re-authenticating");
                    if let Err(reinit_err) = self.ctx.sessions.reinit(&self.session_uuid).await {
                        tracing::error!(media_id = %job.media_id, session = %self.session_uuid, error = %reinit_err, "Re-authentication failed");
                        break;
                    }
                }
                AttemptResult::Hard(e) => {
                    tracing::error!(media_id = %job.media_id, attempt, error = %e, "Download failed");
                    break;
                }
            }
        }

        tracing::error!(media_id = %job.media_id, attempts = attempt, "Job failed");
        self.ctx.report_failed(job, DownloadStatus::Failed).await;
        JobOutcome::Failed
    }

    async fn attempt(&self, job: &JobSpec) -> AttemptResult {
        let Some(session) = self.ctx.sessions.get(&self.session_uuid).await else {
            return AttemptResult::Hard(Error::SessionNotFound(self.session_uuid.clone()));
        };

        let info = match fetch_metadata(session.as_ref(), job).await {
            Ok(info) => info,
            Err(e) if e.is_connectivity() => return AttemptResult::Connectivity(e),
            Err(e) => {
                tracing::warn!(media_id = %job.media_id, error = %e, "Metadata fetch failed");
                self.ctx
                    .report(job, Some(DownloadStatus::GetMetadataFailed), Some((0, 100)))
                    .await;
                return AttemptResult::MetadataFailed;
            }
        };

        if !info.is_playable() {
            return AttemptResult::Unavailable;
        }

        let download = &self.ctx.config.download;
        let raw = download.force_raw || !self.ctx.processor.capabilities().can_convert;
        let target = match resolve_target(&self.ctx.config, job, &info, raw) {
            Ok(target) => target,
            Err(e) => return AttemptResult::Hard(e),
        };

        if let Ok(existing) = tokio::fs::metadata(&target.final_path).await
            && existing.len() > 0
        {
            tracing::debug!(media_id = %job.media_id, path = %target.final_path.display(), "Output already exists");
            return AttemptResult::Done {
                status: DownloadStatus::AlreadyExists,
                path: target.final_path,
                display_name: target.display_name,
            };
        }

        if let Some(parent) = target.final_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return AttemptResult::Hard(e.into());
        }

        let quality = if session.is_premium() || download.force_premium {
            StreamQuality::VeryHigh
        } else {
            StreamQuality::High
        };

        let mut stream = match session
            .open_stream(job.media_kind, &job.media_id, quality)
            .await
        {
            Ok(stream) => stream,
            Err(e) => return self.stream_failure(job, e).await,
        };

        match transfer(&self.ctx, job, stream.as_mut(), &target.download_path).await {
            Ok(TransferOutcome::Complete { written, total }) => {
                tracing::debug!(media_id = %job.media_id, written, total, "Transfer complete");
            }
            Ok(TransferOutcome::Cancelled) => return AttemptResult::Cancelled,
            Ok(TransferOutcome::ShortRead { .. }) => {
                self.ctx
                    .report(job, Some(DownloadStatus::PartialDownload), Some((0, 100)))
                    .await;
                return AttemptResult::Indeterminate;
            }
            Err(e) => return self.stream_failure(job, e).await,
        }
        drop(stream);

        let produced = if download.force_raw {
            Finalized {
                path: target.final_path.clone(),
                display_name: target.display_name.clone(),
            }
        } else {
            finalize(&self.ctx, session.as_ref(), job, &info, &target, quality).await
        };

        AttemptResult::Done {
            status: DownloadStatus::Downloaded,
            path: produced.path,
            display_name: produced.display_name,
        }
    }

    /// Classify an error raised while opening or reading the stream
    async fn stream_failure(&self, job: &JobSpec, e: Error) -> AttemptResult {
        if e.is_connectivity() {
            return AttemptResult::Connectivity(e);
        }
        tracing::warn!(media_id = %job.media_id, error = %e, "Stream failed");
        match e {
            Error::Timeout(_) => {
                self.ctx
                    .report(job, Some(DownloadStatus::TimedOut), Some((0, 100)))
                    .await;
                AttemptResult::Indeterminate
            }
            Error::Decode(_) => {
                self.ctx
                    .report(job, Some(DownloadStatus::DecodeError), Some((0, 100)))
                    .await;
                AttemptResult::Indeterminate
            }
            // local file errors (disk full, permissions) will not go away by waiting
            Error::Io(_) if !e.is_retryable() => AttemptResult::Hard(e),
            _ => AttemptResult::Indeterminate,
        }
    }

    /// Wait `recoverable_fail_wait_delay`, publishing a per-second countdown
    async fn backoff(&self, job: &JobSpec) -> Backoff {
        let deadline = Instant::now() + self.ctx.config.download.recoverable_fail_wait_delay;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Backoff::Elapsed;
            }
            if self.ctx.registries.take_cancel(&job.media_id).await {
                tracing::info!(media_id = %job.media_id, "Job cancelled during backoff");
                return Backoff::Cancelled;
            }

            let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
            self.ctx
                .report(job, Some(DownloadStatus::RetryingIn(secs)), Some((0, 100)))
                .await;

            // sleep until the displayed number drops by one
            let tick = left.saturating_sub(Duration::from_secs(secs - 1));
            tokio::select! {
                _ = self.stop.cancelled() => {
                    tracing::info!(media_id = %job.media_id, "Worker stopping during backoff");
                    return Backoff::Stopped;
                }
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }
}

async fn fetch_metadata(session: &dyn Session, job: &JobSpec) -> crate::Result<MediaInfo> {
    match job.media_kind {
        MediaKind::Track => Ok(MediaInfo::Track(
            session.track_metadata(&job.media_id).await?,
        )),
        MediaKind::Episode => Ok(MediaInfo::Episode(
            session.episode_metadata(&job.media_id).await?,
        )),
    }
}
