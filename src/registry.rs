//! SessionRegistry (spec §4.8): the only process-wide state. One active
//! session per owner; the Owner API (`open`/`pause`/`resume`/`seek`/
//! `set_quality`/`close`) is exposed as inherent methods here rather than on
//! `StreamSession` itself, mirroring the teacher's `HlsDownloaderManager`
//! owning a map of coordinators instead of exposing coordinator construction
//! to callers directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::events::StreamEvent;
use crate::playlist::ContainerKind;
use crate::proxy::RequestProxy;
use crate::session::{SessionState, StreamSession};
use crate::sink::{Sink, Transmuxer};
use crate::store::SegmentStore;

struct SessionMeta {
    owner_id: String,
    manifest_url: String,
    container_kind: ContainerKind,
}

/// Serializable session snapshot for an embedder's own persistence layer
/// (spec §4.8 `save`/`restore`). Does not capture in-flight buffers or the
/// download cursor — only enough to re-`open` the same stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub owner_id: String,
    pub manifest_url: String,
    pub state_tag: String,
    pub resume_epoch: u64,
}

impl SessionSnapshot {
    /// Serialize for an embedder's own persistence layer (spec §4.8
    /// `save`/`restore`) — the wire form crossing whatever storage or IPC
    /// boundary sits outside this crate.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Process-wide owner/session bookkeeping. One instance per embedding app.
pub struct SessionRegistry {
    proxy: Arc<dyn RequestProxy>,
    store: Arc<SegmentStore>,
    owner_to_session: RwLock<HashMap<String, String>>,
    sessions: RwLock<HashMap<String, Arc<StreamSession>>>,
    meta: RwLock<HashMap<String, SessionMeta>>,
    next_id: AtomicU64,
    epoch: AtomicU64,
}

impl SessionRegistry {
    pub fn new(proxy: Arc<dyn RequestProxy>, store: Arc<SegmentStore>) -> Self {
        Self {
            proxy,
            store,
            owner_to_session: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            meta: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            epoch: AtomicU64::new(1),
        }
    }

    /// Open a session for `owner_id`. Fails with `DuplicateOwner` if the
    /// owner already has an active session (spec §4.8: one active session
    /// per owner; opening a second is rejected, not queued or replaced).
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &self,
        owner_id: String,
        manifest_url: String,
        container_kind: ContainerKind,
        config: StreamConfig,
        sink: Arc<dyn Sink>,
        transmuxer: Option<Arc<dyn Transmuxer>>,
    ) -> Result<(Arc<StreamSession>, mpsc::UnboundedReceiver<StreamEvent>), StreamError> {
        if self.owner_to_session.read().contains_key(&owner_id) {
            return Err(StreamError::DuplicateOwner(owner_id));
        }

        let session_id = format!("sess-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (session, events_rx) = StreamSession::open(
            session_id.clone(),
            owner_id.clone(),
            manifest_url.clone(),
            container_kind,
            config,
            Arc::clone(&self.proxy),
            sink,
            transmuxer,
            Arc::clone(&self.store),
        );

        self.owner_to_session.write().insert(owner_id.clone(), session_id.clone());
        self.sessions.write().insert(session_id.clone(), Arc::clone(&session));
        self.meta.write().insert(
            session_id,
            SessionMeta {
                owner_id,
                manifest_url,
                container_kind,
            },
        );

        Ok((session, events_rx))
    }

    fn session_for_owner(&self, owner_id: &str) -> Result<Arc<StreamSession>, StreamError> {
        let session_id = self
            .owner_to_session
            .read()
            .get(owner_id)
            .cloned()
            .ok_or_else(|| StreamError::SessionNotFound(owner_id.to_string()))?;
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or_else(|| StreamError::SessionNotFound(session_id))
    }

    pub fn pause(&self, owner_id: &str) -> Result<(), StreamError> {
        self.session_for_owner(owner_id)?.pause();
        Ok(())
    }

    pub fn resume(&self, owner_id: &str) -> Result<(), StreamError> {
        self.session_for_owner(owner_id)?.resume();
        Ok(())
    }

    pub fn seek(&self, owner_id: &str, t_seconds: f64) -> Result<(), StreamError> {
        self.session_for_owner(owner_id)?.seek(t_seconds);
        Ok(())
    }

    pub fn set_quality(&self, owner_id: &str, variant_ix: Option<usize>) -> Result<(), StreamError> {
        self.session_for_owner(owner_id)?.set_quality(variant_ix);
        Ok(())
    }

    /// Tear down the owner's session: abort the task, drop its cached
    /// segments, erase bookkeeping (spec §4.8 teardown).
    pub fn close(&self, owner_id: &str) -> Result<(), StreamError> {
        let session_id = self
            .owner_to_session
            .write()
            .remove(owner_id)
            .ok_or_else(|| StreamError::SessionNotFound(owner_id.to_string()))?;
        if let Some(session) = self.sessions.write().remove(&session_id) {
            session.close();
        }
        self.meta.write().remove(&session_id);
        self.store.clear_session(&session_id);
        Ok(())
    }

    /// Serialize enough of a session's identity to re-`open` it later (spec
    /// §4.8). Does not survive process restart on its own — the embedder is
    /// responsible for storing the returned snapshot.
    pub fn save(&self, session_id: &str) -> Result<SessionSnapshot, StreamError> {
        let session = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| StreamError::SessionNotFound(session_id.to_string()))?;
        let meta = self.meta.read();
        let meta = meta
            .get(session_id)
            .ok_or_else(|| StreamError::SessionNotFound(session_id.to_string()))?;

        Ok(SessionSnapshot {
            id: session_id.to_string(),
            owner_id: meta.owner_id.clone(),
            manifest_url: meta.manifest_url.clone(),
            state_tag: format!("{:?}", session.state()),
            resume_epoch: self.epoch.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Re-open a session from a previously-`save`d snapshot. The new
    /// session gets a fresh id; `snapshot.owner_id` must not already have an
    /// active session.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        &self,
        snapshot: SessionSnapshot,
        container_kind: ContainerKind,
        config: StreamConfig,
        sink: Arc<dyn Sink>,
        transmuxer: Option<Arc<dyn Transmuxer>>,
    ) -> Result<(Arc<StreamSession>, mpsc::UnboundedReceiver<StreamEvent>), StreamError> {
        self.open(snapshot.owner_id, snapshot.manifest_url, container_kind, config, sink, transmuxer)
    }

    pub fn is_ended_or_failed(state: &SessionState) -> bool {
        matches!(state, SessionState::Ended | SessionState::Failed(_))
    }
}
