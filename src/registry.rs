//! Process-wide registries shared by the expander, workers and the playlist tracker
//!
//! All four maps live behind a single async mutex so compound decisions (admission of a
//! resubmitted job, cancelling, clearing) are atomic. The lock is never held across
//! network I/O, sleeps or queue waits.

use crate::types::{CompletedMedia, DownloadStatus, JobSpec, MediaId, StatusView};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct RegistryState {
    /// Presence means "cancel at next opportunity"
    cancel_requests: HashSet<MediaId>,
    /// Cancellation consumed by a worker, outcome not recorded yet
    cancelling: HashSet<MediaId>,
    /// Resubmitted while cancelling; re-queued once the cancellation lands
    resubmitted: HashSet<MediaId>,
    /// Jobs that ended without success and may be resubmitted verbatim
    failed_jobs: HashMap<MediaId, JobSpec>,
    /// Media the catalog reports as unplayable
    unavailable: HashSet<MediaId>,
    /// Last known state per media id
    ui_status: HashMap<MediaId, StatusView>,
    /// Finished media with their output files; untouched by `clear_completed`
    completed: HashMap<MediaId, CompletedMedia>,
}

/// Outcome of offering a job to the registries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// New job: a Waiting entry was created and the job must be queued
    Enqueue(JobSpec),
    /// The job had failed or was cancelled: its original JobSpec must be re-queued
    Requeue(JobSpec),
    /// A pending cancellation was withdrawn; the job continues where it is
    Uncancelled,
    /// The job is being cancelled right now; it is re-queued once the cancellation lands
    Deferred,
    /// Already queued or running, or finished and not yet cleared
    Ignored,
}

/// Concurrency-safe registries of cancellations, failures, unavailable media and status
#[derive(Clone, Default)]
pub struct Registries {
    inner: Arc<Mutex<RegistryState>>,
}

impl Registries {
    /// Create empty registries
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what to do with a submitted job
    ///
    /// A media id with a live status entry is never queued twice: a pending cancellation
    /// is withdrawn, a failed job is moved back to the queue with its original JobSpec,
    /// anything else is ignored.
    pub async fn admit(&self, job: JobSpec) -> Admission {
        let mut state = self.inner.lock().await;

        if state.ui_status.contains_key(&job.media_id) {
            if state.cancel_requests.remove(&job.media_id) {
                return Admission::Uncancelled;
            }
            if state.cancelling.contains(&job.media_id) {
                state.resubmitted.insert(job.media_id.clone());
                return Admission::Deferred;
            }
            if let Some(original) = state.failed_jobs.remove(&job.media_id) {
                if let Some(view) = state.ui_status.get_mut(&job.media_id) {
                    view.status = DownloadStatus::Waiting;
                    view.progress = None;
                    view.updated_at = Utc::now();
                }
                return Admission::Requeue(original);
            }
            return Admission::Ignored;
        }

        state
            .ui_status
            .insert(job.media_id.clone(), StatusView::waiting(job.media_kind));
        Admission::Enqueue(job)
    }

    /// Take a failed job out of the failed set for an explicit retry
    pub async fn take_failed(&self, media_id: &MediaId) -> Option<JobSpec> {
        let mut state = self.inner.lock().await;
        let job = state.failed_jobs.remove(media_id)?;
        if let Some(view) = state.ui_status.get_mut(media_id) {
            view.status = DownloadStatus::Waiting;
            view.progress = None;
            view.updated_at = Utc::now();
        }
        Some(job)
    }

    /// Take every failed job out of the failed set
    pub async fn take_all_failed(&self) -> Vec<JobSpec> {
        let mut state = self.inner.lock().await;
        let jobs: Vec<JobSpec> = state.failed_jobs.drain().map(|(_, job)| job).collect();
        for job in &jobs {
            if let Some(view) = state.ui_status.get_mut(&job.media_id) {
                view.status = DownloadStatus::Waiting;
                view.progress = None;
                view.updated_at = Utc::now();
            }
        }
        jobs
    }

    /// Request cancellation of a queued or running job
    ///
    /// Returns `false` (and records nothing) when the job is unknown or already terminal.
    pub async fn request_cancel(&self, media_id: &MediaId) -> bool {
        let mut state = self.inner.lock().await;
        let cancellable = state
            .ui_status
            .get(media_id)
            .is_some_and(|view| !view.status.is_terminal());
        if cancellable {
            state.cancel_requests.insert(media_id.clone());
        }
        cancellable
    }

    /// Request cancellation of every queued or running job, returning how many were marked
    pub async fn request_cancel_all(&self) -> usize {
        let mut state = self.inner.lock().await;
        let ids: Vec<MediaId> = state
            .ui_status
            .iter()
            .filter(|(_, view)| !view.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        let count = ids.len();
        state.cancel_requests.extend(ids);
        count
    }

    /// Consume a pending cancellation (at-most-once)
    ///
    /// The job stays in a cancelling state until [`record_failed`](Self::record_failed)
    /// lands its outcome; a resubmission in between is deferred, not dropped.
    pub async fn take_cancel(&self, media_id: &MediaId) -> bool {
        let mut state = self.inner.lock().await;
        let taken = state.cancel_requests.remove(media_id);
        if taken {
            state.cancelling.insert(media_id.clone());
        }
        taken
    }

    /// Record a job that ended without success, keeping its original JobSpec
    ///
    /// Returns `true` when the job was resubmitted while its cancellation was in flight:
    /// it is then back to Waiting instead of failed, and the caller must re-queue it.
    pub async fn record_failed(&self, job: &JobSpec, status: DownloadStatus) -> bool {
        let mut state = self.inner.lock().await;
        let was_cancelling = state.cancelling.remove(&job.media_id);
        let resubmitted = state.resubmitted.remove(&job.media_id) && was_cancelling;
        state.completed.remove(&job.media_id);

        if resubmitted && status == DownloadStatus::Cancelled {
            if let Some(view) = state.ui_status.get_mut(&job.media_id) {
                view.status = DownloadStatus::Waiting;
                view.progress = None;
                view.updated_at = Utc::now();
            }
            return true;
        }

        state.failed_jobs.insert(job.media_id.clone(), job.clone());
        set_status(&mut state, &job.media_id, job, status, None);
        false
    }

    /// Record a media id as permanently unplayable
    pub async fn mark_unavailable(&self, job: &JobSpec) {
        let mut state = self.inner.lock().await;
        state.unavailable.insert(job.media_id.clone());
        set_status(
            &mut state,
            &job.media_id,
            job,
            DownloadStatus::Unavailable,
            Some((0, 100)),
        );
    }

    /// Whether the catalog reported this media id as unplayable
    pub async fn is_unavailable(&self, media_id: &MediaId) -> bool {
        self.inner.lock().await.unavailable.contains(media_id)
    }

    /// Update status and progress of a job
    pub async fn update_status(
        &self,
        job: &JobSpec,
        status: Option<DownloadStatus>,
        progress: Option<(u64, u64)>,
    ) {
        let mut state = self.inner.lock().await;
        let view = state
            .ui_status
            .entry(job.media_id.clone())
            .or_insert_with(|| StatusView::waiting(job.media_kind));
        if let Some(status) = status {
            view.status = status;
        }
        if progress.is_some() {
            view.progress = progress;
        }
        view.updated_at = Utc::now();
    }

    /// Record a successful outcome together with the output file and display name
    pub async fn record_completed(
        &self,
        job: &JobSpec,
        status: DownloadStatus,
        output_path: PathBuf,
        display_name: String,
    ) {
        let mut state = self.inner.lock().await;
        let view = state
            .ui_status
            .entry(job.media_id.clone())
            .or_insert_with(|| StatusView::waiting(job.media_kind));
        view.status = status;
        view.progress = Some((100, 100));
        view.output_path = Some(output_path.clone());
        view.display_name = Some(display_name.clone());
        view.updated_at = Utc::now();
        state.cancel_requests.remove(&job.media_id);
        state.completed.insert(
            job.media_id.clone(),
            CompletedMedia {
                output_path,
                display_name,
            },
        );
    }

    /// Current status of a media id
    pub async fn status(&self, media_id: &MediaId) -> Option<StatusView> {
        self.inner.lock().await.ui_status.get(media_id).cloned()
    }

    /// Copy of every status entry
    pub async fn status_snapshot(&self) -> HashMap<MediaId, StatusView> {
        self.inner.lock().await.ui_status.clone()
    }

    /// Copy of every failed job
    pub async fn failed_jobs(&self) -> Vec<JobSpec> {
        self.inner
            .lock()
            .await
            .failed_jobs
            .values()
            .cloned()
            .collect()
    }

    /// Completed media and unavailable ids, read under one lock for a consistent view
    pub async fn completion_view(&self) -> (HashMap<MediaId, CompletedMedia>, HashSet<MediaId>) {
        let state = self.inner.lock().await;
        (state.completed.clone(), state.unavailable.clone())
    }

    /// Drop status entries of finished jobs (Downloaded, Already exists, Cancelled, Unavailable)
    ///
    /// Failed jobs stay inspectable. Cleared cancelled jobs also leave the failed set, so a
    /// later submission of the same id starts fresh. Completion records used for playlist
    /// generation are kept.
    pub async fn clear_completed(&self) -> usize {
        let mut state = self.inner.lock().await;
        let cleared: Vec<MediaId> = state
            .ui_status
            .iter()
            .filter(|(_, view)| view.status.is_clearable())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &cleared {
            state.ui_status.remove(id);
            state.failed_jobs.remove(id);
            state.cancel_requests.remove(id);
        }
        cleared.len()
    }
}

fn set_status(
    state: &mut RegistryState,
    media_id: &MediaId,
    job: &JobSpec,
    status: DownloadStatus,
    progress: Option<(u64, u64)>,
) {
    let view = state
        .ui_status
        .entry(media_id.clone())
        .or_insert_with(|| StatusView::waiting(job.media_kind));
    let terminal = status.is_terminal();
    view.status = status;
    if progress.is_some() {
        view.progress = progress;
    }
    view.updated_at = Utc::now();
    // A terminal job has nothing left to cancel
    if terminal {
        state.cancel_requests.remove(media_id);
        state.cancelling.remove(media_id);
        state.resubmitted.remove(media_id);
    }
}
