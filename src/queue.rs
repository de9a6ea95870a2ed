//! Shared FIFO job queue consumed by session workers

use crate::types::JobSpec;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Interval between queue polling attempts when the queue is empty
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// FIFO queue of jobs waiting for a worker
#[derive(Clone, Default)]
pub struct JobQueue {
    jobs: Arc<Mutex<VecDeque<JobSpec>>>,
}

impl JobQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job
    pub async fn push(&self, job: JobSpec) {
        self.jobs.lock().await.push_back(job);
    }

    /// Pop the oldest job without waiting
    pub async fn try_pop(&self) -> Option<JobSpec> {
        self.jobs.lock().await.pop_front()
    }

    /// Wait for the next job, or return `None` once `stop` is cancelled
    ///
    /// The lock is only held for the pop itself; an empty queue is re-checked every
    /// poll interval.
    pub async fn next(&self, stop: &CancellationToken) -> Option<JobSpec> {
        loop {
            if stop.is_cancelled() {
                return None;
            }
            if let Some(job) = self.try_pop().await {
                return Some(job);
            }
            tokio::select! {
                _ = stop.cancelled() => return None,
                _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
            }
        }
    }

    /// Number of queued jobs
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jobs_come_out_in_submission_order() {
        let queue = JobQueue::new();
        queue.push(JobSpec::track("a")).await;
        queue.push(JobSpec::track("b")).await;

        let stop = CancellationToken::new();
        assert_eq!(queue.next(&stop).await.unwrap().media_id.as_str(), "a");
        assert_eq!(queue.next(&stop).await.unwrap().media_id.as_str(), "b");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn next_returns_none_when_stopped_while_waiting() {
        let queue = JobQueue::new();
        let stop = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let stop = stop.clone();
            tokio::spawn(async move { queue.next(&stop).await })
        };
        stop.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("next() should return promptly after stop")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn next_picks_up_job_pushed_while_waiting() {
        let queue = JobQueue::new();
        let stop = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let stop = stop.clone();
            tokio::spawn(async move { queue.next(&stop).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.push(JobSpec::episode("e1")).await;

        let job = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("queued job should be delivered")
            .unwrap()
            .unwrap();
        assert_eq!(job.media_id.as_str(), "e1");
    }
}
