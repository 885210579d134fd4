//! Session manager
//!
//! Owns the owner → session map for the host integration. Sessions are
//! created lazily on first lookup and torn down explicitly.

use crate::error::{Error, Result};
use crate::playback::context::PipelineContext;
use crate::playback::session::{PlaybackSession, SessionSettings};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;
use voxstream_common::{OwnerId, StreamEvent};

/// Explicit registry of per-owner playback sessions
pub struct SessionManager {
    context: Arc<PipelineContext>,
    defaults: SessionSettings,
    sessions: RwLock<HashMap<OwnerId, Arc<PlaybackSession>>>,
}

impl SessionManager {
    pub fn new(context: PipelineContext, defaults: SessionSettings) -> Self {
        Self {
            context: Arc::new(context),
            defaults,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Session for `owner`, creating it with the default settings if needed
    pub fn get(&self, owner: OwnerId) -> Result<Arc<PlaybackSession>> {
        if let Some(session) = self.find(owner) {
            return Ok(session);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get(&owner) {
            return Ok(Arc::clone(session));
        }

        let session = PlaybackSession::new(owner, Arc::clone(&self.context), self.defaults.clone())?;
        sessions.insert(owner, Arc::clone(&session));
        drop(sessions);

        info!(owner = %owner, "Created playback session");
        self.context.events.emit_lossy(StreamEvent::SessionCreated {
            owner,
            timestamp: chrono::Utc::now(),
        });
        Ok(session)
    }

    /// Existing session for `owner`, without creating one
    pub fn find(&self, owner: OwnerId) -> Option<Arc<PlaybackSession>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&owner)
            .cloned()
    }

    /// Tear down `owner`'s session, cancelling its producer
    pub fn remove(&self, owner: OwnerId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&owner)
            .ok_or_else(|| Error::InvalidInput(format!("no session for owner {}", owner)))?;

        session.close();
        info!(owner = %owner, "Removed playback session");
        self.context.events.emit_lossy(StreamEvent::SessionRemoved {
            owner,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    pub fn owners(&self) -> Vec<OwnerId> {
        let mut owners: Vec<OwnerId> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        owners.sort();
        owners
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one tick on every session; returns the sessions whose tick failed
    pub fn tick_all(&self, dt: Duration) -> Vec<(OwnerId, Error)> {
        let sessions: Vec<Arc<PlaybackSession>> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        sessions
            .into_iter()
            .filter_map(|session| session.tick(dt).err().map(|e| (session.owner(), e)))
            .collect()
    }

    /// Close every session
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<PlaybackSession>> = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in &sessions {
            session.close();
        }
        info!("Closed {} sessions", sessions.len());
    }
}
