//! In-memory registry of build sessions
//!
//! Sessions are created by `begin`, looked up by `build`, and removed by a
//! per-session timer a fixed interval after creation. They are not removed
//! when a build is fetched, so a client may fetch the same build repeatedly
//! until it expires.

use crate::error::{OffbuildError, OffbuildResult};
use crate::model::BuildRequest;
use crate::session::id::{BuildId, Session};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default lifetime of a build session
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

type SessionMap = HashMap<BuildId, Session>;

/// Registry of live build sessions, owned by the server instance
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<SessionMap>>,
    timeout: Duration,
}

impl SessionRegistry {
    /// Create an empty registry whose sessions live for `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a manifest under a fresh build id and schedule its expiry.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn create(&self, request: BuildRequest) -> BuildId {
        let session = Session::new(request);
        let id = session.id.clone();

        self.sessions.lock().await.insert(id.clone(), session);
        info!(build_id = %id, "Created build session");

        let sessions = Arc::clone(&self.sessions);
        let timeout = self.timeout;
        let expiring = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if sessions.lock().await.remove(&expiring).is_some() {
                debug!(build_id = %expiring, "Build session expired");
            }
        });

        id
    }

    /// Look up the manifest of a live session
    pub async fn lookup(&self, id: &BuildId) -> OffbuildResult<Session> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OffbuildError::UnknownSession(id.to_string()))
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> BuildRequest {
        BuildRequest {
            package_name: name.to_string(),
            packages: vec![],
            flags: vec![],
        }
    }

    #[tokio::test]
    async fn create_then_lookup() {
        let registry = SessionRegistry::default();
        let id = registry.create(request("hello")).await;

        let session = registry.lookup(&id).await.unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.request.package_name, "hello");
    }

    #[tokio::test]
    async fn lookup_unknown_id() {
        let registry = SessionRegistry::default();
        let err = registry.lookup(&BuildId::generate()).await.unwrap_err();
        assert!(matches!(err, OffbuildError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn repeated_lookup_succeeds() {
        let registry = SessionRegistry::default();
        let id = registry.create(request("hello")).await;

        assert!(registry.lookup(&id).await.is_ok());
        assert!(registry.lookup(&id).await.is_ok());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let registry = SessionRegistry::default();
        let a = registry.create(request("a")).await;
        let b = registry.create(request("b")).await;

        assert_ne!(a, b);
        assert_eq!(registry.lookup(&a).await.unwrap().request.package_name, "a");
        assert_eq!(registry.lookup(&b).await.unwrap().request.package_name, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn session_expires_after_timeout() {
        let registry = SessionRegistry::new(Duration::from_secs(300));
        let id = registry.create(request("hello")).await;

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(registry.lookup(&id).await.is_ok());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let err = registry.lookup(&id).await.unwrap_err();
        assert!(matches!(err, OffbuildError::UnknownSession(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_counts_from_creation() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        let first = registry.create(request("first")).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        let second = registry.create(request("second")).await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(registry.lookup(&first).await.is_err());
        assert!(registry.lookup(&second).await.is_ok());
    }
}
