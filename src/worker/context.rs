//! Shared handles a download worker needs

use crate::config::Config;
use crate::post_processing::MediaProcessor;
use crate::queue::JobQueue;
use crate::registry::Registries;
use crate::session::SessionPool;
use crate::types::{DownloadStatus, Event, JobSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything shared between workers (cloneable - all fields are Arc-backed)
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) config: Arc<Config>,
    pub(crate) queue: JobQueue,
    pub(crate) registries: Registries,
    pub(crate) sessions: SessionPool,
    pub(crate) processor: Arc<dyn MediaProcessor>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl WorkerContext {
    /// Publish an event; dropped when nobody is subscribed
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Update the status registry and publish a progress event
    pub(crate) async fn report(
        &self,
        job: &JobSpec,
        status: Option<DownloadStatus>,
        progress: Option<(u64, u64)>,
    ) {
        self.registries
            .update_status(job, status.clone(), progress)
            .await;
        self.emit(Event::Progress {
            media_id: job.media_id.clone(),
            status,
            progress,
            output_path: None,
            display_name: None,
        });
    }

    /// Record a successful outcome and publish it with the output file
    pub(crate) async fn report_completed(
        &self,
        job: &JobSpec,
        status: DownloadStatus,
        output_path: PathBuf,
        display_name: String,
    ) {
        self.registries
            .record_completed(job, status.clone(), output_path.clone(), display_name.clone())
            .await;
        self.emit(Event::Progress {
            media_id: job.media_id.clone(),
            status: Some(status),
            progress: Some((100, 100)),
            output_path: Some(output_path),
            display_name: Some(display_name),
        });
    }

    /// Record a job as failed (or cancelled) and publish the terminal status
    ///
    /// A job resubmitted while its cancellation was in flight goes straight back to the
    /// queue with its original JobSpec.
    pub(crate) async fn report_failed(&self, job: &JobSpec, status: DownloadStatus) {
        let requeue = self.registries.record_failed(job, status.clone()).await;
        self.emit(Event::Progress {
            media_id: job.media_id.clone(),
            status: Some(status),
            progress: Some((0, 100)),
            output_path: None,
            display_name: None,
        });

        if requeue {
            tracing::info!(media_id = %job.media_id, "Resubmitted during cancellation, re-queueing");
            self.queue.push(job.clone()).await;
            self.emit(Event::Queued {
                media_id: job.media_id.clone(),
                media_kind: job.media_kind,
            });
        }
    }
}
