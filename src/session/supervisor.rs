//! Keeps one download worker running per session, up to the thread cap

use super::{Session, SessionPool};
use crate::error::{Error, Result};
use crate::worker::{DownloadWorker, WorkerContext};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for workers to finish their current job
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct WorkerHandle {
    /// Distinguishes this worker from a later one bound to the same session
    id: u64,
    stop: CancellationToken,
    /// Cancelled once the worker task has returned (or panicked)
    done: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct WorkerSet {
    handles: HashMap<String, WorkerHandle>,
    /// Sessions being removed; never rebound while their worker winds down
    removing: HashSet<String>,
}

/// Signals the end of a worker task, including on panic
struct ExitNotice {
    session: String,
    id: u64,
    done: CancellationToken,
    exits: mpsc::UnboundedSender<(String, u64)>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        self.done.cancel();
        self.exits.send((self.session.clone(), self.id)).ok();
    }
}

/// Supervisor of the session-bound worker pool
///
/// Guarantees that `min(sessions, cap)` workers run, each bound to a distinct session.
/// Workers being retired keep their entry until their task finishes, so a session is
/// never served by two workers at once. Every worker exit triggers a reconcile, so a
/// slot freed by a retired worker is filled again when the cap allows it.
pub struct SessionSupervisor {
    pool: SessionPool,
    ctx: WorkerContext,
    workers: Mutex<WorkerSet>,
    cap: AtomicUsize,
    next_id: AtomicU64,
    exits: mpsc::UnboundedSender<(String, u64)>,
    root: CancellationToken,
}

impl SessionSupervisor {
    /// Create the supervisor and its exit watcher task
    pub(crate) fn new(ctx: WorkerContext, cap: usize, root: CancellationToken) -> Arc<Self> {
        let (exits, exit_rx) = mpsc::unbounded_channel();
        let supervisor = Arc::new(Self {
            pool: ctx.sessions.clone(),
            ctx,
            workers: Mutex::new(WorkerSet::default()),
            cap: AtomicUsize::new(cap),
            next_id: AtomicU64::new(0),
            exits,
            root: root.clone(),
        });
        tokio::spawn(Self::watch_exits(Arc::downgrade(&supervisor), exit_rx, root));
        supervisor
    }

    async fn watch_exits(
        supervisor: Weak<Self>,
        mut exits: mpsc::UnboundedReceiver<(String, u64)>,
        root: CancellationToken,
    ) {
        loop {
            let exit = tokio::select! {
                _ = root.cancelled() => break,
                exit = exits.recv() => exit,
            };
            let Some((session, id)) = exit else {
                break;
            };
            let Some(supervisor) = supervisor.upgrade() else {
                break;
            };
            supervisor.worker_exited(&session, id).await;
        }
        tracing::debug!("Worker exit watcher stopped");
    }

    async fn worker_exited(&self, session: &str, id: u64) {
        {
            let mut workers = self.workers.lock().await;
            if workers.handles.get(session).is_some_and(|w| w.id == id) {
                workers.handles.remove(session);
                tracing::debug!(session = %session, "Worker exited, slot released");
            }
        }
        self.reconcile().await;
    }

    /// The session pool workers resolve their sessions from
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Current worker cap
    pub fn max_threads(&self) -> usize {
        self.cap.load(Ordering::SeqCst)
    }

    /// Register a session and start a worker for it if below the cap
    pub async fn add_session(&self, session: Arc<dyn Session>) -> Result<()> {
        if self.root.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        let uuid = session.uuid().to_string();
        if self.pool.insert(session).await.is_some() {
            tracing::info!(session = %uuid, "Session replaced");
        } else {
            tracing::info!(session = %uuid, "Session added");
        }
        self.reconcile().await;
        Ok(())
    }

    /// Retire a session
    ///
    /// The bound worker finishes its current job first; then the session is dropped
    /// and another session may take over the freed slot.
    pub async fn remove_session(&self, uuid: &str) -> Result<()> {
        if self.pool.get(uuid).await.is_none() {
            return Err(Error::SessionNotFound(uuid.to_string()));
        }

        let done = {
            let mut workers = self.workers.lock().await;
            workers.removing.insert(uuid.to_string());
            workers.handles.get(uuid).map(|w| {
                w.stop.cancel();
                w.done.clone()
            })
        };
        if let Some(done) = done {
            done.cancelled().await;
        }

        self.pool.remove(uuid).await;
        self.workers.lock().await.removing.remove(uuid);
        tracing::info!(session = %uuid, "Session removed");

        self.reconcile().await;
        Ok(())
    }

    /// Change the worker cap and reconcile
    pub async fn set_max_threads(&self, cap: usize) -> Result<()> {
        if cap == 0 {
            return Err(Error::config("max_threads", "must be at least 1"));
        }
        self.cap.store(cap, Ordering::SeqCst);
        tracing::info!(max_threads = cap, "Worker cap changed");
        self.reconcile().await;
        Ok(())
    }

    /// Number of workers that are running and not being retired
    pub async fn active_workers(&self) -> usize {
        self.workers
            .lock()
            .await
            .handles
            .values()
            .filter(|w| !w.stop.is_cancelled() && !w.handle.is_finished())
            .count()
    }

    /// Uuids of sessions with a live worker, sorted
    pub async fn bound_sessions(&self) -> Vec<String> {
        let workers = self.workers.lock().await;
        let mut uuids: Vec<String> = workers
            .handles
            .iter()
            .filter(|(_, w)| !w.stop.is_cancelled() && !w.handle.is_finished())
            .map(|(uuid, _)| uuid.clone())
            .collect();
        uuids.sort();
        uuids
    }

    /// Bring the worker set in line with the sessions and the cap
    ///
    /// Extra workers are asked to stop (they finish their current job) and keep their
    /// slot until they exit. Missing workers are spawned for sessions without one.
    pub async fn reconcile(&self) {
        if self.root.is_cancelled() {
            return;
        }

        let cap = self.cap.load(Ordering::SeqCst);
        let sessions = self.pool.uuids().await;
        let mut guard = self.workers.lock().await;
        let workers = &mut *guard;

        workers.handles.retain(|uuid, w| {
            let finished = w.handle.is_finished();
            if finished {
                tracing::debug!(session = %uuid, "Reaped finished worker");
            }
            !finished
        });

        // Workers whose session disappeared
        for (uuid, w) in workers.handles.iter() {
            if !sessions.contains(uuid) && !w.stop.is_cancelled() {
                tracing::info!(session = %uuid, "Stopping worker of removed session");
                w.stop.cancel();
            }
        }

        let mut active: Vec<String> = workers
            .handles
            .iter()
            .filter(|(_, w)| !w.stop.is_cancelled())
            .map(|(uuid, _)| uuid.clone())
            .collect();
        active.sort();

        if active.len() > cap {
            for uuid in active.split_off(cap) {
                if let Some(w) = workers.handles.get(&uuid) {
                    tracing::info!(session = %uuid, "Retiring worker above cap");
                    w.stop.cancel();
                }
            }
        }

        let target = sessions.len().min(cap);
        let mut running = active.len();
        for uuid in &sessions {
            if running >= target {
                break;
            }
            // A session with any handle (even one being retired) is not rebound yet
            if workers.handles.contains_key(uuid) || workers.removing.contains(uuid) {
                continue;
            }
            let handle = self.spawn_worker(uuid);
            workers.handles.insert(uuid.clone(), handle);
            running += 1;
        }
    }

    fn spawn_worker(&self, uuid: &str) -> WorkerHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stop = self.root.child_token();
        let done = CancellationToken::new();
        let notice = ExitNotice {
            session: uuid.to_string(),
            id,
            done: done.clone(),
            exits: self.exits.clone(),
        };
        let worker = DownloadWorker::new(uuid.to_string(), self.ctx.clone(), stop.clone());
        let handle = tokio::spawn(async move {
            let _notice = notice;
            worker.run().await;
        });
        tracing::info!(session = %uuid, "Spawned worker");
        WorkerHandle {
            id,
            stop,
            done,
            handle,
        }
    }

    /// Stop every worker and wait (bounded) for them to finish their current job
    pub(crate) async fn shutdown(&self) {
        self.root.cancel();
        let handles: Vec<(String, WorkerHandle)> =
            self.workers.lock().await.handles.drain().collect();
        tracing::info!(workers = handles.len(), "Signaled all workers to stop");

        let wait_all = async {
            for (uuid, worker) in handles {
                if let Err(e) = worker.handle.await {
                    tracing::error!(session = %uuid, error = %e, "Worker task panicked");
                }
            }
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await {
            Ok(()) => tracing::info!("All workers stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for workers to finish, proceeding with shutdown")
            }
        }
    }
}
