//! Connection pool configuration and initialization
//!
//! Uses `sqlmodel_pool` for efficient connection management. There is no
//! process-global pool: callers construct a [`DbPool`] and thread it through
//! every component (loaders, query builders) explicitly, which keeps the
//! layer trivially testable against a tempfile-backed database.

use crate::DbConn;
use crate::error::{DbError, DbResult};
use crate::schema;
use asupersync::sync::OnceCell;
use asupersync::{Cx, Outcome};
use sqlmodel_core::Error as SqlError;
use sqlmodel_pool::{Pool, PoolConfig, PooledConnection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};
use threadline_core::config::env_value;

/// Default pool configuration values.
///
/// `SQLite` WAL mode allows unlimited concurrent readers but serializes
/// writers. This subsystem is read-heavy (aggregation queries), so the pool
/// is sized for reader throughput; extra write connections would only queue
/// on the WAL lock.
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_OVERFLOW: usize = 30;
pub const DEFAULT_POOL_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_POOL_RECYCLE_MS: u64 = 30 * 60 * 1000; // 30 minutes

/// Auto-detect a reasonable pool size from available CPU parallelism.
///
/// Returns `(min_connections, max_connections)`:
///
/// - `min = clamp(cpus * 2, 4, 25)`
/// - `max = clamp(cpus * 8, 25, 100)`
///
/// Used when `DATABASE_POOL_SIZE` is unset or `"auto"`.
#[must_use]
pub fn auto_pool_size() -> (usize, usize) {
    let cpus = std::thread::available_parallelism().map_or(4, std::num::NonZero::get);
    let min = (cpus * 2).clamp(4, 25);
    let max = (cpus * 8).clamp(25, 100);
    (min, max)
}

/// Pool configuration
#[derive(Debug, Clone)]
pub struct DbPoolConfig {
    /// Database URL (`sqlite:///path/to/db.sqlite3`)
    pub database_url: String,
    /// Minimum connections to keep open
    pub min_connections: usize,
    /// Maximum connections
    pub max_connections: usize,
    /// Timeout for acquiring a connection (ms)
    pub acquire_timeout_ms: u64,
    /// Max connection lifetime (ms)
    pub max_lifetime_ms: u64,
    /// Run migrations on init
    pub run_migrations: bool,
    /// Number of connections to eagerly open on startup (0 = disabled).
    pub warmup_connections: usize,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:///./threadline.sqlite3".to_string(),
            min_connections: DEFAULT_POOL_SIZE,
            max_connections: DEFAULT_POOL_SIZE + DEFAULT_MAX_OVERFLOW,
            acquire_timeout_ms: DEFAULT_POOL_TIMEOUT_MS,
            max_lifetime_ms: DEFAULT_POOL_RECYCLE_MS,
            run_migrations: true,
            warmup_connections: 0,
        }
    }
}

impl DbPoolConfig {
    /// Create config from environment.
    ///
    /// Pool sizing honours two strategies in priority order:
    ///
    /// 1. **Explicit**: `DATABASE_POOL_SIZE` and/or `DATABASE_MAX_OVERFLOW`
    ///    set to numeric values are used literally.
    /// 2. **Auto** (default): [`auto_pool_size()`] picks sizes from CPU count.
    #[must_use]
    pub fn from_env() -> Self {
        let database_url = env_value("DATABASE_URL")
            .unwrap_or_else(|| "sqlite:///./threadline.sqlite3".to_string());

        let pool_timeout = env_value("DATABASE_POOL_TIMEOUT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POOL_TIMEOUT_MS);

        let explicit_size =
            env_value("DATABASE_POOL_SIZE").and_then(|s| s.parse::<usize>().ok());
        let explicit_overflow =
            env_value("DATABASE_MAX_OVERFLOW").and_then(|s| s.parse::<usize>().ok());

        let (min_conn, max_conn) = match (explicit_size, explicit_overflow) {
            (Some(size), Some(overflow)) => (size, size + overflow),
            (Some(size), None) => (size, size + DEFAULT_MAX_OVERFLOW),
            (None, maybe_overflow) => {
                let (auto_min, auto_max) = auto_pool_size();
                maybe_overflow.map_or((auto_min, auto_max), |overflow| {
                    (auto_min, auto_min + overflow)
                })
            }
        };

        let warmup = env_value("DATABASE_POOL_WARMUP")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0)
            .min(min_conn);

        Self {
            database_url,
            min_connections: min_conn,
            max_connections: max_conn,
            acquire_timeout_ms: pool_timeout,
            max_lifetime_ms: DEFAULT_POOL_RECYCLE_MS,
            run_migrations: true,
            warmup_connections: warmup,
        }
    }

    /// Parse the `SQLite` file path from the database URL.
    pub fn sqlite_path(&self) -> DbResult<String> {
        let url = self.database_url.trim();
        if url == ":memory:" || url == "sqlite::memory:" || url == "sqlite:///:memory:" {
            return Ok(":memory:".to_string());
        }

        let Some(path) = url.strip_prefix("sqlite:///") else {
            return Err(DbError::InvalidArgument {
                field: "database_url",
                message: format!(
                    "Invalid SQLite database URL: {url} (expected sqlite:///path/to/db.sqlite3)"
                ),
            });
        };
        if path.is_empty() {
            return Err(DbError::InvalidArgument {
                field: "database_url",
                message: "SQLite database URL has an empty path".to_string(),
            });
        }

        Ok(path.to_string())
    }
}

/// A configured `SQLite` connection pool with schema initialization.
///
/// Wraps `sqlmodel_pool::Pool<DbConn>` and encapsulates URL parsing,
/// per-connection PRAGMAs, and one-time schema migration per database file.
#[derive(Clone)]
pub struct DbPool {
    pool: Arc<Pool<DbConn>>,
    sqlite_path: String,
    init_sql: Arc<String>,
    run_migrations: bool,
    max_connections: usize,
}

impl DbPool {
    /// Create a new pool (does not open connections until first acquire).
    pub fn new(config: &DbPoolConfig) -> DbResult<Self> {
        let sqlite_path = config.sqlite_path()?;
        let init_sql = Arc::new(schema::build_conn_pragmas(config.max_connections));

        let pool_config = PoolConfig::new(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout_ms)
            .max_lifetime(config.max_lifetime_ms)
            .test_on_checkout(true)
            .test_on_return(false);

        Ok(Self {
            pool: Arc::new(Pool::new(pool_config)),
            sqlite_path,
            init_sql,
            run_migrations: config.run_migrations,
            max_connections: config.max_connections,
        })
    }

    #[must_use]
    pub fn sqlite_path(&self) -> &str {
        &self.sqlite_path
    }

    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Acquire a pooled connection, creating and initializing a new one if needed.
    pub async fn acquire(&self, cx: &Cx) -> Outcome<PooledConnection<DbConn>, SqlError> {
        let sqlite_path = self.sqlite_path.clone();
        let init_sql = self.init_sql.clone();
        let run_migrations = self.run_migrations;
        let cx2 = cx.clone();

        self.pool
            .acquire(cx, || {
                let sqlite_path = sqlite_path.clone();
                let init_sql = init_sql.clone();
                let cx2 = cx2.clone();
                async move {
                    if sqlite_path != ":memory:" {
                        // Ensure parent directory exists for file-backed DBs.
                        if let Some(parent) = Path::new(&sqlite_path).parent() {
                            if !parent.as_os_str().is_empty() {
                                if let Err(e) = std::fs::create_dir_all(parent) {
                                    return Outcome::Err(SqlError::Custom(format!(
                                        "failed to create db dir {}: {e}",
                                        parent.display()
                                    )));
                                }
                            }
                        }

                        // DB-wide init (journal mode, migrations) runs once per
                        // file, with the C-backed SqliteConnection, BEFORE
                        // FrankenConnection opens. The two drivers must never
                        // have the same file open simultaneously.
                        let init_gate = sqlite_init_gate(&sqlite_path);
                        let gate_out = init_gate
                            .get_or_try_init(|| {
                                let cx2 = cx2.clone();
                                let sqlite_path = sqlite_path.clone();
                                async move {
                                    let mig_conn =
                                        sqlmodel_sqlite::SqliteConnection::open_file(&sqlite_path)
                                            .map_err(Outcome::<(), SqlError>::Err)?;

                                    if let Err(e) = mig_conn.execute_raw(schema::PRAGMA_DB_INIT_SQL)
                                    {
                                        return Err(Outcome::Err(e));
                                    }
                                    if run_migrations {
                                        match schema::migrate_to_latest(&cx2, &mig_conn).await {
                                            Outcome::Ok(applied) => {
                                                if !applied.is_empty() {
                                                    tracing::info!(
                                                        count = applied.len(),
                                                        path = %sqlite_path,
                                                        "applied schema migrations"
                                                    );
                                                }
                                            }
                                            Outcome::Err(e) => return Err(Outcome::Err(e)),
                                            Outcome::Cancelled(r) => {
                                                return Err(Outcome::Cancelled(r));
                                            }
                                            Outcome::Panicked(p) => {
                                                return Err(Outcome::Panicked(p));
                                            }
                                        }
                                    }
                                    // Drop SqliteConnection before FrankenConnection opens.
                                    drop(mig_conn);
                                    Ok(())
                                }
                            })
                            .await;

                        match gate_out {
                            Ok(()) => {}
                            Err(Outcome::Err(e)) => return Outcome::Err(e),
                            Err(Outcome::Cancelled(r)) => return Outcome::Cancelled(r),
                            Err(Outcome::Panicked(p)) => return Outcome::Panicked(p),
                            Err(Outcome::Ok(())) => {
                                unreachable!("sqlite init gate returned Err(Outcome::Ok(()))")
                            }
                        }
                    }

                    let conn = if sqlite_path == ":memory:" {
                        match DbConn::open_memory() {
                            Ok(c) => c,
                            Err(e) => return Outcome::Err(e),
                        }
                    } else {
                        match DbConn::open_file(&sqlite_path) {
                            Ok(c) => c,
                            Err(e) => return Outcome::Err(e),
                        }
                    };

                    // Per-connection PRAGMAs.
                    if let Err(e) = conn.execute_raw(&init_sql) {
                        return Outcome::Err(e);
                    }

                    Outcome::Ok(conn)
                }
            })
            .await
    }

    /// Eagerly open up to `n` connections to avoid first-burst latency.
    ///
    /// Connections are acquired and immediately returned to the pool idle
    /// set. Bounded: stops after `timeout` elapses or on first acquire error.
    /// Returns the number of connections successfully warmed up.
    pub async fn warmup(&self, cx: &Cx, n: usize, timeout: std::time::Duration) -> usize {
        let deadline = std::time::Instant::now() + timeout;
        let mut opened = 0usize;
        let mut batch: Vec<PooledConnection<DbConn>> = Vec::with_capacity(n);
        for _ in 0..n {
            if std::time::Instant::now() >= deadline {
                break;
            }
            match self.acquire(cx).await {
                Outcome::Ok(conn) => {
                    batch.push(conn);
                    opened += 1;
                }
                _ => break, // stop on any error (timeout, cancelled, etc.)
            }
        }
        drop(batch);
        opened
    }

    /// Run an explicit WAL checkpoint (`TRUNCATE` mode).
    ///
    /// Moves all WAL content back into the main database file and truncates
    /// the WAL to zero length. No-ops silently for `:memory:` databases.
    pub fn wal_checkpoint(&self) -> DbResult<u64> {
        if self.sqlite_path == ":memory:" {
            return Ok(0);
        }
        let conn = DbConn::open_file(&self.sqlite_path)
            .map_err(|e| DbError::Sqlite(format!("checkpoint: open failed: {e}")))?;

        conn.execute_raw("PRAGMA busy_timeout = 60000;")
            .map_err(|e| DbError::Sqlite(format!("checkpoint: busy_timeout: {e}")))?;

        let rows = conn
            .query_sync("PRAGMA wal_checkpoint(TRUNCATE);", &[])
            .map_err(|e| DbError::Sqlite(format!("checkpoint: {e}")))?;

        // wal_checkpoint returns (busy, log, checkpointed)
        let checkpointed = rows
            .first()
            .and_then(|r| r.get_by_name("checkpointed"))
            .and_then(crate::queries::value_as_i64)
            .map_or(0, |n| u64::try_from(n).unwrap_or(0));

        Ok(checkpointed)
    }
}

static SQLITE_INIT_GATES: OnceLock<RwLock<HashMap<String, Arc<OnceCell<()>>>>> = OnceLock::new();

fn sqlite_init_gate(sqlite_path: &str) -> Arc<OnceCell<()>> {
    let gates = SQLITE_INIT_GATES.get_or_init(|| RwLock::new(HashMap::new()));

    // Fast path: read lock for an existing gate.
    {
        let guard = gates.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(gate) = guard.get(sqlite_path) {
            return Arc::clone(gate);
        }
    }

    // Slow path: write lock to create a new gate (once per SQLite file).
    let mut guard = gates
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(gate) = guard.get(sqlite_path) {
        return Arc::clone(gate);
    }
    let gate = Arc::new(OnceCell::new());
    guard.insert(sqlite_path.to_string(), Arc::clone(&gate));
    gate
}

/// Create a pool from config: thin convenience wrapper over [`DbPool::new`].
pub fn create_pool(config: &DbPoolConfig) -> DbResult<DbPool> {
    DbPool::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_path_parses_file_urls() {
        let config = DbPoolConfig {
            database_url: "sqlite:////tmp/threadline/test.db".to_string(),
            ..Default::default()
        };
        assert_eq!(config.sqlite_path().unwrap(), "/tmp/threadline/test.db");

        let relative = DbPoolConfig {
            database_url: "sqlite:///./threadline.sqlite3".to_string(),
            ..Default::default()
        };
        assert_eq!(relative.sqlite_path().unwrap(), "./threadline.sqlite3");
    }

    #[test]
    fn sqlite_path_parses_memory_urls() {
        for url in [":memory:", "sqlite::memory:", "sqlite:///:memory:"] {
            let config = DbPoolConfig {
                database_url: url.to_string(),
                ..Default::default()
            };
            assert_eq!(config.sqlite_path().unwrap(), ":memory:");
        }
    }

    #[test]
    fn sqlite_path_rejects_other_schemes() {
        let config = DbPoolConfig {
            database_url: "postgres://localhost/threads".to_string(),
            ..Default::default()
        };
        assert!(config.sqlite_path().is_err());
    }

    #[test]
    fn auto_pool_size_bounds() {
        let (min, max) = auto_pool_size();
        assert!(min >= 4);
        assert!(max >= min);
        assert!(max <= 100);
    }

    #[test]
    fn default_config_is_consistent() {
        let config = DbPoolConfig::default();
        assert!(config.max_connections >= config.min_connections);
        assert!(config.run_migrations);
        assert_eq!(config.warmup_connections, 0);
    }
}
