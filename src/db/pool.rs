//! Per-database connection pools.
//!
//! One lazily created MySQL pool per database name, all sharing the same
//! server coordinates and pool options.
//!
//! # Concurrency
//!
//! - The pool map sits behind a `tokio::sync::RwLock`. Lookups take the read
//!   lock. Creation takes the write lock and re-checks so concurrent first
//!   requests for a database end up with the same pool.
//! - Pools are created with `connect_lazy_with`, so no await happens while the
//!   write lock is held.
//! - Each pool tracks leased connections with an `AtomicUsize`. A
//!   [`PooledConnection`] decrements it exactly once, when dropped.

use crate::config::{PoolOptions, ServerSettings};
use crate::db::session::SqlSession;
use crate::error::{GatewayError, GatewayResult};
use sqlx::MySql;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Source of database connections for request handlers.
///
/// Every successful [`acquire`](Self::acquire) is paired with exactly one
/// [`release`](Self::release). Handlers call `release(None)` on paths where
/// nothing was acquired; that is a no-op.
pub trait ConnectionSource: Send + Sync + 'static {
    type Connection: SqlSession + Send + 'static;

    /// Check out a connection bound to `database`.
    fn acquire(
        &self,
        database: &str,
    ) -> impl Future<Output = GatewayResult<Self::Connection>> + Send;

    /// Return a connection obtained from [`acquire`](Self::acquire).
    fn release(&self, conn: Option<Self::Connection>);
}

/// Snapshot of one database pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, idle or in use.
    pub size: u32,
    pub idle: usize,
    /// Connections currently checked out through the gateway.
    pub leased: usize,
}

/// Pool for a single database.
pub struct DatabasePool {
    pub database: String,
    pub pool: MySqlPool,
    /// Count of connections checked out and not yet dropped.
    leased: AtomicUsize,
}

impl DatabasePool {
    fn new(database: String, pool: MySqlPool) -> Self {
        Self {
            database,
            pool,
            leased: AtomicUsize::new(0),
        }
    }

    /// Increment the leased count. Call when a connection is handed out.
    pub fn increment_active(&self) {
        self.leased.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the leased count.
    /// Saturates at 0 to prevent underflow from extra release calls.
    pub fn decrement_active(&self) {
        let result = self
            .leased
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            });

        // Log warning if we detected an underflow attempt (helps catch logic bugs)
        if let Ok(0) = result {
            warn!(
                database = %self.database,
                "Leased count underflow detected - extra release call"
            );
        }
    }

    pub fn active_count(&self) -> usize {
        self.leased.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            leased: self.active_count(),
        }
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("database", &self.database)
            .field("leased", &self.leased.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A connection checked out of a [`DatabasePool`].
///
/// Dropping it returns the connection to its pool and decrements the leased
/// count, unless the session marked it for closing.
pub struct PooledConnection {
    pub(crate) conn: PoolConnection<MySql>,
    pool: Arc<DatabasePool>,
    /// Set once a statement was abandoned mid-flight; the wire state is unknown.
    pub(crate) broken: bool,
}

impl PooledConnection {
    pub fn database(&self) -> &str {
        &self.pool.database
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.decrement_active();
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("database", &self.pool.database)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

/// Manages one lazily created pool per database name.
pub struct PoolManager {
    settings: ServerSettings,
    options: PoolOptions,
    pools: RwLock<HashMap<String, Arc<DatabasePool>>>,
}

impl PoolManager {
    pub fn new(settings: ServerSettings, options: PoolOptions) -> Self {
        Self {
            settings,
            options,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Get the pool for `database`, creating it on first use.
    ///
    /// Pool creation does not open any connection; the first `acquire` does.
    pub async fn get_pool(&self, database: &str) -> GatewayResult<Arc<DatabasePool>> {
        if database.is_empty() {
            return Err(GatewayError::validation("Database name cannot be empty"));
        }

        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(database) {
                return Ok(Arc::clone(pool));
            }
        }

        let mut pools = self.pools.write().await;
        // Double-check after acquiring write lock
        if let Some(pool) = pools.get(database) {
            return Ok(Arc::clone(pool));
        }

        debug!(database = %database, "Creating new database pool");
        let pool = Arc::new(DatabasePool::new(
            database.to_string(),
            self.create_pool(database),
        ));
        pools.insert(database.to_string(), Arc::clone(&pool));
        info!(database = %database, pools = pools.len(), "Database pool created");
        Ok(pool)
    }

    /// Check out a connection for `database`.
    pub async fn acquire(&self, database: &str) -> GatewayResult<PooledConnection> {
        let pool = self.get_pool(database).await?;

        // Count the lease only once a connection exists, so a dropped acquire
        // future leaves the count untouched.
        match pool.pool.acquire().await {
            Ok(conn) => {
                pool.increment_active();
                debug!(
                    database = %database,
                    leased = pool.active_count(),
                    "Connection acquired"
                );
                Ok(PooledConnection {
                    conn,
                    pool,
                    broken: false,
                })
            }
            Err(e) => {
                warn!(database = %database, error = %e, "Failed to acquire connection");
                Err(acquire_error(database, e))
            }
        }
    }

    /// Return a connection to its pool. `None` is a no-op.
    pub fn release(&self, conn: Option<PooledConnection>) {
        if let Some(conn) = conn {
            debug!(
                database = %conn.database(),
                broken = conn.broken,
                "Releasing connection"
            );
            drop(conn);
        }
    }

    /// Stats for one database pool, if it has been created.
    pub async fn stats(&self, database: &str) -> Option<PoolStats> {
        let pools = self.pools.read().await;
        pools.get(database).map(|p| p.stats())
    }

    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }

    /// Close all database pools.
    pub async fn close_all(&self) {
        // Drain pools under lock, close outside lock
        let pools_to_close: Vec<_> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        };

        for (database, entry) in pools_to_close {
            info!(database = %database, "Closing database pool");
            entry.pool.close().await;
        }
        info!("All database pools closed");
    }

    fn create_pool(&self, database: &str) -> MySqlPool {
        let opts = &self.options;
        let mut connect = MySqlConnectOptions::new()
            .host(&self.settings.host)
            .port(self.settings.port)
            .username(&self.settings.user)
            .database(database)
            .charset("utf8mb4");
        if let Some(password) = &self.settings.password {
            connect = connect.password(password);
        }

        MySqlPoolOptions::new()
            .min_connections(opts.min_connections_or_default())
            .max_connections(opts.max_connections_or_default())
            .acquire_timeout(Duration::from_secs(opts.acquire_timeout_or_default()))
            .idle_timeout(Some(Duration::from_secs(opts.idle_timeout_or_default())))
            .test_before_acquire(opts.test_before_acquire_or_default())
            .connect_lazy_with(connect)
    }
}

impl ConnectionSource for PoolManager {
    type Connection = PooledConnection;

    async fn acquire(&self, database: &str) -> GatewayResult<PooledConnection> {
        PoolManager::acquire(self, database).await
    }

    fn release(&self, conn: Option<PooledConnection>) {
        PoolManager::release(self, conn)
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("user", &self.settings.user)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Map a failure to obtain a connection to a pool error with a suggestion.
fn acquire_error(database: &str, error: sqlx::Error) -> GatewayError {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) {
        return error.into();
    }

    let error_str = error.to_string().to_lowercase();
    let suggestion = if error_str.contains("connection refused") {
        "Check that the MySQL server is running and accessible"
    } else if error_str.contains("access denied") || error_str.contains("password") {
        "Verify the gateway's database user and password"
    } else if error_str.contains("unknown database") {
        "Check that the database name exists"
    } else if error_str.contains("tls") || error_str.contains("ssl") {
        "Check TLS/SSL configuration or try disabling it"
    } else {
        "Check the database host, port and credentials"
    };

    GatewayError::pool(
        format!("Failed to connect to database '{}': {}", database, error),
        suggestion,
    )
}
