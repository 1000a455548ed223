//! Bounded pool of reusable remote connections.
//!
//! Connections are created lazily up to a configured maximum, handed out
//! exclusively (never to two callers at once), and returned with
//! [`ConnectionPool::release`]. When the pool is at capacity, `acquire`
//! polls for a freed connection at a short interval until the wait bound
//! elapses, then fails with
//! [`AppError::PoolExhausted`](crate::AppError::PoolExhausted).
//!
//! The internal entry set is a single mutex-guarded structure; every
//! read-modify-write happens under the lock, and the polling wait sleeps
//! with the lock released so unrelated sessions keep making progress.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::{RemoteConnection, RemoteTransport};
use crate::{AppError, Result};

/// Sizing and wait bounds for the pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of simultaneously established connections.
    pub max_connections: usize,
    /// How long `acquire` waits for a freed connection at capacity.
    pub acquire_timeout: Duration,
    /// Poll interval while waiting for a freed connection.
    pub poll_interval: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 3,
            acquire_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Opaque identifier for one pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Checkout token for an exclusively held pooled connection.
///
/// The caller must hand the token's id back via
/// [`ConnectionPool::release`] (or [`ConnectionPool::evict`] after a
/// transport failure) exactly once when finished.
#[derive(Clone)]
pub struct Checkout {
    id: ConnectionId,
    conn: Arc<dyn RemoteConnection>,
}

impl Checkout {
    /// Pool identifier for release/eviction.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The checked-out connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn RemoteConnection> {
        &self.conn
    }
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout").field("id", &self.id).finish()
    }
}

struct PooledEntry {
    id: ConnectionId,
    conn: Arc<dyn RemoteConnection>,
    busy: bool,
    last_used: Instant,
}

#[derive(Default)]
struct PoolInner {
    entries: Vec<PooledEntry>,
    /// Establishments in flight; counted toward capacity so concurrent
    /// acquires cannot overshoot `max_connections`.
    connecting: usize,
    next_id: u64,
}

/// Bounded pool of remote transport connections.
pub struct ConnectionPool {
    transport: Arc<dyn RemoteTransport>,
    settings: PoolSettings,
    inner: Mutex<PoolInner>,
}

enum AcquirePlan {
    Reuse(Checkout),
    Establish,
    Wait,
}

impl ConnectionPool {
    /// Create an empty pool over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn RemoteTransport>, settings: PoolSettings) -> Self {
        Self {
            transport,
            settings,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Check out a connection, establishing one if below capacity.
    ///
    /// # Errors
    ///
    /// - [`AppError::Connection`] if establishing a new connection fails;
    ///   the in-flight reservation is dropped so the slot becomes usable
    ///   again.
    /// - [`AppError::PoolExhausted`] if the pool is at capacity and no
    ///   connection is released within the wait bound.
    pub async fn acquire(&self) -> Result<Checkout> {
        let deadline = Instant::now() + self.settings.acquire_timeout;

        loop {
            let plan = {
                let mut inner = self.inner.lock().await;
                if let Some(entry) = inner.entries.iter_mut().find(|e| !e.busy) {
                    entry.busy = true;
                    let idle_for = entry.last_used.elapsed();
                    entry.last_used = Instant::now();
                    debug!(id = ?entry.id, ?idle_for, "reusing idle pooled connection");
                    AcquirePlan::Reuse(Checkout {
                        id: entry.id,
                        conn: Arc::clone(&entry.conn),
                    })
                } else if inner.entries.len() + inner.connecting < self.settings.max_connections {
                    inner.connecting += 1;
                    AcquirePlan::Establish
                } else {
                    AcquirePlan::Wait
                }
            };

            match plan {
                AcquirePlan::Reuse(checkout) => return Ok(checkout),
                AcquirePlan::Establish => return self.establish().await,
                AcquirePlan::Wait => {
                    if Instant::now() >= deadline {
                        return Err(AppError::PoolExhausted(format!(
                            "no connection freed within {:?}",
                            self.settings.acquire_timeout
                        )));
                    }
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    /// Return a checked-out connection to the idle set.
    ///
    /// Unknown ids (already evicted) are a no-op.
    pub async fn release(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        match inner.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.busy = false;
                entry.last_used = Instant::now();
            }
            None => debug!(?id, "release for unknown connection ignored"),
        }
    }

    /// Drop a connection from the pool entirely (after a transport error).
    pub async fn evict(&self, id: ConnectionId) {
        let removed = {
            let mut inner = self.inner.lock().await;
            let before = inner.entries.len();
            let mut evicted = None;
            inner.entries.retain(|e| {
                if e.id == id {
                    evicted = Some(Arc::clone(&e.conn));
                    false
                } else {
                    true
                }
            });
            debug_assert!(inner.entries.len() <= before);
            evicted
        };

        // Close outside the lock.
        if let Some(conn) = removed {
            warn!(?id, "evicting failed connection from pool");
            conn.close().await;
        }
    }

    /// Whether at least one connection is currently established.
    pub async fn is_healthy(&self) -> bool {
        !self.inner.lock().await.entries.is_empty()
    }

    /// Number of currently established connections (busy or idle).
    pub async fn size(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Terminate every connection and clear the pool. Shutdown only.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock().await;
            inner.entries.drain(..).collect()
        };
        let count = drained.len();
        for entry in drained {
            entry.conn.close().await;
        }
        info!(count, "connection pool closed");
    }

    /// Establish a new connection against a held reservation.
    async fn establish(&self) -> Result<Checkout> {
        let connected = self.transport.connect().await;

        let mut inner = self.inner.lock().await;
        inner.connecting -= 1;

        match connected {
            Ok(conn) => {
                inner.next_id += 1;
                let id = ConnectionId(inner.next_id);
                inner.entries.push(PooledEntry {
                    id,
                    conn: Arc::clone(&conn),
                    busy: true,
                    last_used: Instant::now(),
                });
                info!(?id, total = inner.entries.len(), "established new pooled connection");
                Ok(Checkout { id, conn })
            }
            Err(err) => {
                warn!(%err, "connection establishment failed");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
