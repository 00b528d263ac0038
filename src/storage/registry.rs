use super::SessionHandle;
use crate::core::{DbError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Map from access id to session store.
///
/// Owned by whoever embeds the engine and passed in explicitly; there is no
/// process-wide registry. Staging creates sessions, querying never does,
/// and eviction is left to the embedding application.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for `access_id`, opening a fresh store on first use.
    pub async fn get_or_create(&self, access_id: &str) -> Result<Arc<SessionHandle>> {
        self.fetch(access_id, false).await
    }

    /// Like [`SessionRegistry::get_or_create`], but holds a claim on the
    /// session for a load. Every claim is handed back with
    /// [`SessionRegistry::release`].
    pub async fn claim(&self, access_id: &str) -> Result<Arc<SessionHandle>> {
        self.fetch(access_id, true).await
    }

    async fn fetch(&self, access_id: &str, claim: bool) -> Result<Arc<SessionHandle>> {
        // Claims are taken under the map lock so `release` never sees a
        // session as abandoned while another stager is about to load into it.
        if let Some(session) = self.sessions.read().await.get(access_id) {
            if claim {
                session.begin_claim();
            }
            return Ok(Arc::clone(session));
        }

        let mut sessions = self.sessions.write().await;
        // Another stager may have won the race while we waited for the lock.
        let session = match sessions.get(access_id) {
            Some(session) => Arc::clone(session),
            None => {
                let session = Arc::new(SessionHandle::open(access_id)?);
                sessions.insert(access_id.to_string(), Arc::clone(&session));
                info!(access_id, sessions = sessions.len(), "Created session");
                session
            }
        };
        if claim {
            session.begin_claim();
        }
        Ok(session)
    }

    /// Hand back a claim. A session that no stager holds any more and that
    /// never completed a load is dropped; returns whether that happened.
    pub async fn release(&self, session: &Arc<SessionHandle>) -> bool {
        let mut sessions = self.sessions.write().await;
        let remaining = session.end_claim();
        if remaining > 0 || session.has_loaded() {
            return false;
        }

        let access_id = session.access_id();
        match sessions.get(access_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(access_id);
                info!(access_id, "Dropped session without a completed load");
                true
            }
            _ => false,
        }
    }

    /// Existing session for `access_id`.
    pub async fn get(&self, access_id: &str) -> Result<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .get(access_id)
            .cloned()
            .ok_or_else(|| DbError::UnknownSession(access_id.to_string()))
    }

    pub async fn contains(&self, access_id: &str) -> bool {
        self.sessions.read().await.contains_key(access_id)
    }

    /// Drop a session. Handles already held by in-flight calls stay valid
    /// until those calls finish.
    pub async fn evict(&self, access_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(access_id).is_some();
        if removed {
            info!(access_id, "Evicted session");
        }
        removed
    }

    /// Access ids of all live sessions, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
