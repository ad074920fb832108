//! In-process coordination

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CoordinationClient, CoordinationError, CoordinationResult, Session};

#[derive(Debug)]
struct Lease {
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<String, Lease>,
    /// Lock key -> holding session id
    locks: HashMap<String, String>,
}

impl State {
    fn drop_session(&mut self, id: &str) {
        self.sessions.remove(id);
        self.locks.retain(|_, holder| holder != id);
    }

    /// Forget the session if its lease ran out; true when it is still live
    fn check_live(&mut self, id: &str, now: Instant) -> bool {
        match self.sessions.get(id) {
            Some(lease) if lease.expires_at > now => true,
            Some(_) => {
                self.drop_session(id);
                false
            }
            None => false,
        }
    }
}

/// Sessions and locks kept in this process
///
/// Only meaningful for a single node; leases still expire so the WAL's
/// session-loss path behaves the same as with a remote service.
#[derive(Debug, Default)]
pub struct EmbeddedCoordination {
    state: Mutex<State>,
}

impl EmbeddedCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a session as if its lease had expired
    pub fn expire_session(&self, id: &str) {
        self.state.lock().drop_session(id);
    }

    /// Session currently holding `key`, if any
    pub fn lock_holder(&self, key: &str) -> Option<String> {
        self.state.lock().locks.get(key).cloned()
    }
}

#[async_trait]
impl CoordinationClient for EmbeddedCoordination {
    async fn open_session(&self, owner: &str, ttl: Duration) -> CoordinationResult<Session> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            ttl,
        };
        self.state.lock().sessions.insert(
            session.id.clone(),
            Lease {
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(session)
    }

    async fn keep_alive(&self, session: &Session) -> CoordinationResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock();
        if !state.check_live(&session.id, now) {
            return Err(CoordinationError::SessionExpired(session.id.clone()));
        }
        if let Some(lease) = state.sessions.get_mut(&session.id) {
            lease.expires_at = now + session.ttl;
        }
        Ok(())
    }

    async fn try_lock(&self, key: &str, session: &Session) -> CoordinationResult<bool> {
        let now = Instant::now();
        let mut state = self.state.lock();
        if !state.check_live(&session.id, now) {
            return Err(CoordinationError::SessionExpired(session.id.clone()));
        }

        let holder = state.locks.get(key).cloned();
        match holder {
            Some(holder) if holder == session.id => Ok(true),
            Some(holder) if state.check_live(&holder, now) => Ok(false),
            _ => {
                state.locks.insert(key.to_string(), session.id.clone());
                Ok(true)
            }
        }
    }

    async fn unlock(&self, key: &str, session: &Session) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        match state.locks.get(key) {
            Some(holder) if *holder == session.id => {
                state.locks.remove(key);
                Ok(())
            }
            _ => Err(CoordinationError::NotLockOwner {
                key: key.to_string(),
                session: session.id.clone(),
            }),
        }
    }

    async fn close_session(&self, session: &Session) -> CoordinationResult<()> {
        self.state.lock().drop_session(&session.id);
        Ok(())
    }
}
