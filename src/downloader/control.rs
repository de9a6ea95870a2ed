//! Submission, cancellation, retry and status queries.

use crate::error::Result;
use crate::expander::ExpansionRequest;
use crate::item_ref::ItemRef;
use crate::session::Session;
use crate::types::{Event, JobSpec, MediaId, PathLayout, StatusView};
use std::collections::HashMap;
use std::sync::Arc;

use super::MediaDownloader;

impl MediaDownloader {
    /// Queue an item reference for expansion
    ///
    /// Expansion runs on the background expander task started by [`start`](Self::start),
    /// one reference at a time. Resolution failures are reported as
    /// [`Event::ExpansionFailed`].
    pub fn submit(&self, reference: ItemRef, layout: PathLayout) -> Result<()> {
        self.ensure_accepting()?;
        tracing::debug!(reference = %reference, "Expansion request queued");
        self.control
            .expansion_tx
            .send(ExpansionRequest { reference, layout })
            .map_err(|_| crate::Error::ShuttingDown)
    }

    /// Parse a web link or URI and queue it for expansion
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownReference`](crate::Error::UnknownReference) when the text
    /// is neither a catalog link nor a URI.
    pub fn submit_link(&self, link: &str, layout: PathLayout) -> Result<ItemRef> {
        let reference: ItemRef = link.parse()?;
        self.submit(reference.clone(), layout)?;
        Ok(reference)
    }

    /// Expand a reference right away and return the number of jobs queued
    ///
    /// Unlike [`submit`](Self::submit), a root resolution failure is returned to the caller.
    pub async fn expand_now(&self, reference: &ItemRef, layout: &PathLayout) -> Result<usize> {
        self.ensure_accepting()?;
        self.pipeline.expander.expand(reference, layout).await
    }

    /// Offer a single job to the queue
    ///
    /// A media id that is already queued or running is not queued twice: a pending
    /// cancellation is withdrawn, a failed job is re-queued with its original JobSpec.
    /// Returns whether the job was (re-)queued.
    pub async fn add_job(&self, job: JobSpec) -> Result<bool> {
        self.ensure_accepting()?;
        Ok(self.pipeline.expander.admit(job).await)
    }

    /// Request cooperative cancellation of a queued or running job
    ///
    /// Returns `false` when the job is unknown or already finished; cancelling twice is
    /// harmless.
    pub async fn cancel(&self, media_id: &MediaId) -> bool {
        let requested = self.registries.request_cancel(media_id).await;
        if requested {
            tracing::info!(media_id = %media_id, "Cancellation requested");
        } else {
            tracing::debug!(media_id = %media_id, "Nothing to cancel");
        }
        requested
    }

    /// Request cancellation of every queued or running job
    pub async fn cancel_all(&self) -> usize {
        let count = self.registries.request_cancel_all().await;
        tracing::info!(count, "Cancellation requested for all jobs");
        count
    }

    /// Move a failed (or cancelled) job back to the queue with its original JobSpec
    ///
    /// Returns `false` when the media id is not in the failed set.
    pub async fn retry(&self, media_id: &MediaId) -> Result<bool> {
        self.ensure_accepting()?;
        match self.registries.take_failed(media_id).await {
            Some(job) => {
                tracing::info!(media_id = %media_id, "Retrying failed job");
                self.enqueue(job).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move every failed job back to the queue
    pub async fn retry_all_failed(&self) -> Result<usize> {
        self.ensure_accepting()?;
        let jobs = self.registries.take_all_failed().await;
        let count = jobs.len();
        for job in jobs {
            self.enqueue(job).await;
        }
        tracing::info!(count, "Retrying all failed jobs");
        Ok(count)
    }

    /// Drop status entries of finished jobs; failed jobs stay inspectable
    pub async fn clear_completed(&self) -> usize {
        self.registries.clear_completed().await
    }

    /// Last known state of a media id
    pub async fn status(&self, media_id: &MediaId) -> Option<StatusView> {
        self.registries.status(media_id).await
    }

    /// Last known state of every tracked media id
    pub async fn status_snapshot(&self) -> HashMap<MediaId, StatusView> {
        self.registries.status_snapshot().await
    }

    /// JobSpecs of jobs that ended without success
    pub async fn failed_jobs(&self) -> Vec<JobSpec> {
        self.registries.failed_jobs().await
    }

    /// Number of jobs waiting for a worker
    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Register an authenticated session; a worker is bound to it while below the cap
    pub async fn add_session(&self, session: Arc<dyn Session>) -> Result<()> {
        self.ensure_accepting()?;
        self.pipeline.supervisor.add_session(session).await
    }

    /// Retire a session once its worker finishes the current job
    pub async fn remove_session(&self, uuid: &str) -> Result<()> {
        self.pipeline.supervisor.remove_session(uuid).await
    }

    /// Change how many workers may run at once
    pub async fn set_max_threads(&self, max_threads: usize) -> Result<()> {
        self.pipeline.supervisor.set_max_threads(max_threads).await
    }

    /// Number of running workers
    pub async fn active_workers(&self) -> usize {
        self.pipeline.supervisor.active_workers().await
    }

    async fn enqueue(&self, job: JobSpec) {
        let media_id = job.media_id.clone();
        let media_kind = job.media_kind;
        self.queue.push(job).await;
        self.emit_event(Event::Queued {
            media_id,
            media_kind,
        });
    }
}
