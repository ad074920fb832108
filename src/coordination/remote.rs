//! Endpoint-backed coordination client
//!
//! Construction fails unless one of the configured endpoints accepts a
//! connection. Keep-alives re-probe the endpoint, so an outage surfaces as a
//! lost session on the next heartbeat. Lease bookkeeping is kept locally.
//!
//! Locks are not shared through the endpoint: two processes configured with
//! the same endpoints can both hold `configstore/wal/writer`. Run one
//! configstore process per long-term store.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::net::TcpStream;

use super::{CoordinationClient, CoordinationError, CoordinationResult, EmbeddedCoordination, Session};

/// Client for an external coordination service
///
/// Only reachability goes through the endpoint. Sessions and locks live in
/// this process, so they exclude other writers in the same process only.
#[derive(Debug)]
pub struct RemoteCoordination {
    endpoints: Vec<String>,
    connect_timeout: Duration,
    /// Endpoint that answered the last probe
    active: RwLock<String>,
    leases: EmbeddedCoordination,
}

impl RemoteCoordination {
    /// Connect to the first reachable endpoint
    pub async fn connect(
        endpoints: Vec<String>,
        connect_timeout: Duration,
    ) -> CoordinationResult<Self> {
        let active = probe_any(&endpoints, connect_timeout).await?;
        tracing::info!(endpoint = %active, "connected to coordination service");
        Ok(Self {
            endpoints,
            connect_timeout,
            active: RwLock::new(active),
            leases: EmbeddedCoordination::new(),
        })
    }

    /// Endpoint currently in use
    pub fn active_endpoint(&self) -> String {
        self.active.read().clone()
    }

    async fn ensure_reachable(&self) -> CoordinationResult<()> {
        let current = self.active_endpoint();
        if probe(&current, self.connect_timeout).await.is_ok() {
            return Ok(());
        }
        let next = probe_any(&self.endpoints, self.connect_timeout).await?;
        tracing::warn!(from = %current, to = %next, "coordination endpoint failover");
        *self.active.write() = next;
        Ok(())
    }
}

async fn probe(endpoint: &str, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("{}: {}", endpoint, e)),
        Err(_) => Err(format!("{}: connect timed out", endpoint)),
    }
}

async fn probe_any(endpoints: &[String], timeout: Duration) -> CoordinationResult<String> {
    let mut failures = Vec::new();
    for endpoint in endpoints {
        match probe(endpoint, timeout).await {
            Ok(()) => return Ok(endpoint.clone()),
            Err(reason) => failures.push(reason),
        }
    }
    Err(CoordinationError::Unreachable {
        endpoints: endpoints.join(","),
        reason: if failures.is_empty() {
            "no endpoints configured".to_string()
        } else {
            failures.join("; ")
        },
    })
}

#[async_trait]
impl CoordinationClient for RemoteCoordination {
    async fn open_session(&self, owner: &str, ttl: Duration) -> CoordinationResult<Session> {
        self.ensure_reachable().await?;
        self.leases.open_session(owner, ttl).await
    }

    async fn keep_alive(&self, session: &Session) -> CoordinationResult<()> {
        if let Err(e) = self.ensure_reachable().await {
            self.leases.expire_session(&session.id);
            return Err(e);
        }
        self.leases.keep_alive(session).await
    }

    async fn try_lock(&self, key: &str, session: &Session) -> CoordinationResult<bool> {
        self.ensure_reachable().await?;
        self.leases.try_lock(key, session).await
    }

    async fn unlock(&self, key: &str, session: &Session) -> CoordinationResult<()> {
        self.leases.unlock(key, session).await
    }

    async fn close_session(&self, session: &Session) -> CoordinationResult<()> {
        self.leases.close_session(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_fails_when_unreachable() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = RemoteCoordination::connect(vec![addr], Duration::from_millis(200)).await;
        assert!(matches!(result, Err(CoordinationError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_connect_picks_reachable_endpoint() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        drop(dead);
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_addr = live.local_addr().unwrap().to_string();

        let client = RemoteCoordination::connect(
            vec![dead_addr, live_addr.clone()],
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        assert_eq!(client.active_endpoint(), live_addr);

        let session = client
            .open_session("wal", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(client.try_lock("writer", &session).await.unwrap());
        client.keep_alive(&session).await.unwrap();
    }

    #[tokio::test]
    async fn test_locks_are_not_shared_between_clients() {
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = live.local_addr().unwrap().to_string();

        let mut clients = Vec::new();
        for _ in 0..2 {
            let client = RemoteCoordination::connect(vec![addr.clone()], Duration::from_millis(200))
                .await
                .unwrap();
            let session = client
                .open_session("wal", Duration::from_secs(5))
                .await
                .unwrap();
            clients.push((client, session));
        }

        // both processes would take the writer lock
        for (client, session) in &clients {
            assert!(client.try_lock("configstore/wal/writer", session).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_keep_alive_fails_after_outage() {
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = live.local_addr().unwrap().to_string();
        let client = RemoteCoordination::connect(vec![addr], Duration::from_millis(200))
            .await
            .unwrap();
        let session = client
            .open_session("wal", Duration::from_secs(5))
            .await
            .unwrap();

        drop(live);

        assert!(client.keep_alive(&session).await.is_err());
        // The lease is gone even if the endpoint comes back
        assert!(client.leases.keep_alive(&session).await.is_err());
    }
}
