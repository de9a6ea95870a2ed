//! Session pool: uuid -> current session, with bounded re-authentication

use super::{Authenticator, Session};
use crate::error::{Error, Result};
use crate::types::Event;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

/// Pause between re-authentication attempts while the network is unreachable
const REAUTH_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Map of authenticated sessions keyed by uuid
///
/// Workers look their session up by uuid on every attempt, so a session replaced by
/// [`reinit`](Self::reinit) is picked up on the next lookup.
#[derive(Clone)]
pub struct SessionPool {
    sessions: Arc<RwLock<HashMap<String, Arc<dyn Session>>>>,
    authenticator: Arc<dyn Authenticator>,
    reinit_timeout: Duration,
    event_tx: broadcast::Sender<Event>,
}

impl SessionPool {
    /// Create an empty pool
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        reinit_timeout: Duration,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            authenticator,
            reinit_timeout,
            event_tx,
        }
    }

    /// Current session for `uuid`
    pub async fn get(&self, uuid: &str) -> Option<Arc<dyn Session>> {
        self.sessions.read().await.get(uuid).cloned()
    }

    /// Add or replace a session, returning the previous one
    pub async fn insert(&self, session: Arc<dyn Session>) -> Option<Arc<dyn Session>> {
        let uuid = session.uuid().to_string();
        self.sessions.write().await.insert(uuid, session)
    }

    /// Remove a session
    pub async fn remove(&self, uuid: &str) -> Option<Arc<dyn Session>> {
        self.sessions.write().await.remove(uuid)
    }

    /// Registered uuids, sorted for deterministic worker assignment
    pub async fn uuids(&self) -> Vec<String> {
        let mut uuids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        uuids.sort();
        uuids
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the pool is empty
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Re-authenticate `uuid` and replace its session in place
    ///
    /// Connectivity failures are retried until the configured timeout elapses; any
    /// other authentication error is returned immediately. No lock is held while
    /// authenticating.
    pub async fn reinit(&self, uuid: &str) -> Result<()> {
        tracing::info!(session = %uuid, "Re-initializing session");

        let attempt_loop = async {
            loop {
                match self.authenticator.authenticate(uuid).await {
                    Ok(session) => return Ok(session),
                    Err(e) if e.is_connectivity() => {
                        tracing::debug!(session = %uuid, error = %e, "Network unreachable, retrying login");
                        tokio::time::sleep(REAUTH_RETRY_INTERVAL).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let session = match tokio::time::timeout(self.reinit_timeout, attempt_loop).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(
                    session = %uuid,
                    timeout_secs = self.reinit_timeout.as_secs(),
                    "Session re-initialization timed out"
                );
                return Err(Error::ReauthTimeout {
                    session: uuid.to_string(),
                    seconds: self.reinit_timeout.as_secs(),
                });
            }
        };

        self.sessions
            .write()
            .await
            .insert(uuid.to_string(), session);
        self.event_tx
            .send(Event::SessionReinitialized {
                session: uuid.to_string(),
            })
            .ok();
        tracing::info!(session = %uuid, "Session re-initialized");
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeAuthenticator, FakeFailure, FakeMedia, FakeSession};

    fn pool_with(authenticator: Arc<FakeAuthenticator>, timeout: Duration) -> SessionPool {
        let (event_tx, _) = broadcast::channel(16);
        SessionPool::new(authenticator, timeout, event_tx)
    }

    #[tokio::test]
    async fn uuids_are_sorted() {
        let media = FakeMedia::new();
        let pool = pool_with(
            Arc::new(FakeAuthenticator::new(media.clone())),
            Duration::from_secs(1),
        );
        pool.insert(Arc::new(FakeSession::new("b", media.clone())))
            .await;
        pool.insert(Arc::new(FakeSession::new("a", media.clone())))
            .await;

        assert_eq!(pool.uuids().await, vec!["a", "b"]);
        assert_eq!(pool.len().await, 2);
        assert!(pool.remove("a").await.is_some());
        assert_eq!(pool.uuids().await, vec!["b"]);
    }

    #[tokio::test]
    async fn reinit_replaces_session_and_emits_event() {
        let media = FakeMedia::new();
        let auth = Arc::new(FakeAuthenticator::new(media.clone()));
        let (event_tx, mut events) = broadcast::channel(16);
        let pool = SessionPool::new(auth.clone(), Duration::from_secs(5), event_tx);
        let original: Arc<dyn Session> = Arc::new(FakeSession::new("acct", media.clone()));
        pool.insert(original.clone()).await;

        pool.reinit("acct").await.unwrap();

        let current = pool.get("acct").await.unwrap();
        assert!(!Arc::ptr_eq(&current, &original));
        assert_eq!(auth.calls(), 1);
        match events.recv().await.unwrap() {
            Event::SessionReinitialized { session } => assert_eq!(session, "acct"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reinit_retries_through_connectivity_failures() {
        let media = FakeMedia::new();
        let auth = Arc::new(FakeAuthenticator::new(media.clone()));
        auth.fail_next(FakeFailure::Connectivity);
        let pool = pool_with(auth.clone(), Duration::from_secs(5));

        pool.reinit("acct").await.unwrap();

        assert_eq!(auth.calls(), 2);
        assert!(pool.get("acct").await.is_some());
    }

    #[tokio::test]
    async fn reinit_gives_up_after_timeout() {
        let media = FakeMedia::new();
        let auth = Arc::new(FakeAuthenticator::new(media.clone()));
        for _ in 0..10 {
            auth.fail_next(FakeFailure::Connectivity);
        }
        let pool = pool_with(auth, Duration::from_millis(300));

        let result = pool.reinit("acct").await;

        assert!(matches!(result, Err(Error::ReauthTimeout { .. })));
        assert!(pool.get("acct").await.is_none());
    }

    #[tokio::test]
    async fn reinit_returns_non_connectivity_errors() {
        let media = FakeMedia::new();
        let auth = Arc::new(FakeAuthenticator::new(media.clone()));
        auth.fail_next(FakeFailure::Other);
        let pool = pool_with(auth.clone(), Duration::from_secs(5));

        let result = pool.reinit("acct").await;

        assert!(matches!(result, Err(Error::Other(_))));
        assert_eq!(auth.calls(), 1);
    }
}
