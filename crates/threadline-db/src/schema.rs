//! Database schema creation and migrations
//!
//! Creates all tables and indexes for the thread activity store.

use asupersync::{Cx, Outcome};
use sqlmodel_core::{Connection, Error as SqlError};
use sqlmodel_schema::{Migration, MigrationRunner, MigrationStatus};

/// SQL statements for creating the database schema
pub const CREATE_TABLES_SQL: &str = r"
-- Orgs table (tenants)
CREATE TABLE IF NOT EXISTS orgs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    platform_application_id INTEGER NOT NULL,
    created_ts INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orgs_application ON orgs(platform_application_id);

-- Page locations (denormalized location index)
CREATE TABLE IF NOT EXISTS pages (
    org_id INTEGER NOT NULL REFERENCES orgs(id),
    context_hash TEXT NOT NULL,
    context_data TEXT NOT NULL DEFAULT '{}',
    created_ts INTEGER NOT NULL,
    PRIMARY KEY(org_id, context_hash)
);

-- Threads table
CREATE TABLE IF NOT EXISTS threads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id INTEGER NOT NULL REFERENCES orgs(id),
    platform_application_id INTEGER NOT NULL,
    page_context_hash TEXT,
    name TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    extra_classnames TEXT NOT NULL DEFAULT '',
    resolved INTEGER NOT NULL DEFAULT 0,
    resolved_ts INTEGER,
    created_ts INTEGER NOT NULL,
    CHECK ((resolved = 0) = (resolved_ts IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_threads_org_created ON threads(org_id, created_ts);
CREATE INDEX IF NOT EXISTS idx_threads_org_page ON threads(org_id, page_context_hash);
CREATE INDEX IF NOT EXISTS idx_threads_application ON threads(platform_application_id);
CREATE INDEX IF NOT EXISTS idx_threads_resolved_ts ON threads(resolved_ts);

-- Messages table (soft delete via deleted_ts)
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id INTEGER NOT NULL REFERENCES threads(id),
    org_id INTEGER NOT NULL REFERENCES orgs(id),
    source_id INTEGER NOT NULL,
    kind TEXT NOT NULL DEFAULT 'user_message',
    content TEXT NOT NULL DEFAULT '',
    ts INTEGER NOT NULL,
    deleted_ts INTEGER,
    imported INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_messages_thread_ts ON messages(thread_id, ts);
CREATE INDEX IF NOT EXISTS idx_messages_thread_deleted ON messages(thread_id, deleted_ts);
CREATE INDEX IF NOT EXISTS idx_messages_source ON messages(source_id);

-- Per-viewer thread state
CREATE TABLE IF NOT EXISTS thread_participants (
    thread_id INTEGER NOT NULL REFERENCES threads(id),
    user_id INTEGER NOT NULL,
    org_id INTEGER NOT NULL REFERENCES orgs(id),
    last_seen_ts INTEGER,
    subscribed INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY(thread_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_thread_participants_user ON thread_participants(user_id, thread_id);

-- Mentions (many-to-many)
CREATE TABLE IF NOT EXISTS message_mentions (
    message_id INTEGER NOT NULL REFERENCES messages(id),
    user_id INTEGER NOT NULL,
    PRIMARY KEY(message_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_message_mentions_user ON message_mentions(user_id);

-- Reactions
CREATE TABLE IF NOT EXISTS message_reactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id INTEGER NOT NULL REFERENCES messages(id),
    user_id INTEGER NOT NULL,
    unicode_reaction TEXT NOT NULL,
    ts INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_message_reactions_message_ts ON message_reactions(message_id, ts);
";

/// SQL run once per database file before the pool hands out connections:
/// journal mode is a database-level property, not a per-connection one.
pub const PRAGMA_DB_INIT_SQL: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 60000;
";

/// Total page-cache budget shared across all pooled connections (KB).
const CACHE_BUDGET_KB: i64 = 512 * 1024;

/// Per-connection cache ceiling (KB).
const CACHE_PER_CONN_MAX_KB: i64 = 64 * 1024;

/// Build the per-connection PRAGMA batch.
///
/// - `journal_mode=WAL`: readers never block writers; writers never block readers
/// - `busy_timeout=60s`: wait for locks instead of failing fast
/// - `cache_size`: a share of [`CACHE_BUDGET_KB`] so a large pool doesn't
///   multiply into gigabytes of page cache
/// - `temp_store=MEMORY`: temp tables and indices stay in RAM
#[must_use]
pub fn build_conn_pragmas(max_connections: usize) -> String {
    let conns = i64::try_from(max_connections.max(1)).unwrap_or(1);
    let cache_kb = (CACHE_BUDGET_KB / conns).min(CACHE_PER_CONN_MAX_KB).max(2048);
    format!(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA busy_timeout = 60000;\n\
         PRAGMA cache_size = -{cache_kb};\n\
         PRAGMA temp_store = MEMORY;\n"
    )
}

/// Schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the schema migration tracking table.
pub const MIGRATIONS_TABLE_NAME: &str = "threadline_migrations";

fn extract_ident_after_keyword(stmt: &str, keyword_lc: &str) -> Option<String> {
    let lower = stmt.to_ascii_lowercase();
    let idx = lower.find(keyword_lc)?;
    let after = stmt[idx + keyword_lc.len()..].trim_start();
    let end = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after.len());
    let ident = after[..end].trim();
    if ident.is_empty() {
        None
    } else {
        Some(ident.to_string())
    }
}

fn derive_migration_id_and_description(stmt: &str) -> Option<(String, String)> {
    const CREATE_TABLE: &str = "create table if not exists ";
    const CREATE_INDEX: &str = "create index if not exists ";

    if let Some(name) = extract_ident_after_keyword(stmt, CREATE_TABLE) {
        return Some((
            format!("v1_create_table_{name}"),
            format!("create table {name}"),
        ));
    }
    if let Some(name) = extract_ident_after_keyword(stmt, CREATE_INDEX) {
        return Some((
            format!("v1_create_index_{name}"),
            format!("create index {name}"),
        ));
    }

    None
}

/// Return the complete list of schema migrations.
///
/// Migrations are designed so each `up` is a single `SQLite` statement
/// (compatible with drivers that only execute the first prepared statement
/// of a batch).
#[must_use]
pub fn schema_migrations() -> Vec<Migration> {
    let mut migrations: Vec<Migration> = Vec::new();

    for chunk in CREATE_TABLES_SQL.split(';') {
        let stmt = chunk.trim();
        if stmt.is_empty() {
            continue;
        }

        let Some((id, desc)) = derive_migration_id_and_description(stmt) else {
            continue;
        };

        migrations.push(Migration::new(id, desc, stmt.to_string(), String::new()));
    }

    migrations
}

#[must_use]
pub fn migration_runner() -> MigrationRunner {
    MigrationRunner::new(schema_migrations()).table_name(MIGRATIONS_TABLE_NAME)
}

pub async fn init_migrations_table<C: Connection>(cx: &Cx, conn: &C) -> Outcome<(), SqlError> {
    // Ensure duplicate inserts are ignored. Under concurrency, multiple
    // connections may attempt to record the same migration id.
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE_NAME} (
            id TEXT PRIMARY KEY ON CONFLICT IGNORE,
            description TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )"
    );
    conn.execute(cx, &sql, &[]).await.map(|_| ())
}

pub async fn migration_status<C: Connection>(
    cx: &Cx,
    conn: &C,
) -> Outcome<Vec<(String, MigrationStatus)>, SqlError> {
    match init_migrations_table(cx, conn).await {
        Outcome::Ok(()) => {}
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    }
    migration_runner().status(cx, conn).await
}

pub async fn migrate_to_latest<C: Connection>(cx: &Cx, conn: &C) -> Outcome<Vec<String>, SqlError> {
    match init_migrations_table(cx, conn).await {
        Outcome::Ok(()) => {}
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    }
    migration_runner().migrate(cx, conn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use sqlmodel_sqlite::SqliteConnection;

    fn block_on<F, Fut, T>(f: F) -> T
    where
        F: FnOnce(Cx) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let cx = Cx::for_testing();
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("build runtime");
        rt.block_on(f(cx))
    }

    #[test]
    fn every_table_and_index_becomes_a_migration() {
        // 7 tables + 11 indexes in CREATE_TABLES_SQL.
        assert_eq!(schema_migrations().len(), 18);
    }

    #[test]
    fn migration_ids_derive_from_statement_kind() {
        let (id, desc) = derive_migration_id_and_description(
            "CREATE TABLE IF NOT EXISTS threads (id INTEGER PRIMARY KEY)",
        )
        .unwrap();
        assert_eq!(id, "v1_create_table_threads");
        assert_eq!(desc, "create table threads");

        let (id, _) = derive_migration_id_and_description(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread_ts ON messages(thread_id, ts)",
        )
        .unwrap();
        assert_eq!(id, "v1_create_index_idx_messages_thread_ts");

        assert!(derive_migration_id_and_description("-- just a comment").is_none());
    }

    #[test]
    fn conn_pragmas_share_the_cache_budget() {
        let sql_100 = build_conn_pragmas(100);
        assert!(
            sql_100.contains("cache_size = -5242"),
            "100 conns should get ~5MB each: {sql_100}"
        );

        let sql_1 = build_conn_pragmas(1);
        assert!(
            sql_1.contains("cache_size = -65536"),
            "1 conn is clamped to the 64MB ceiling: {sql_1}"
        );

        // Zero is treated as one connection, not a division by zero.
        let sql_0 = build_conn_pragmas(0);
        assert!(sql_0.contains("cache_size = -65536"));
    }

    #[test]
    fn migrations_apply_and_are_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("migrations_apply.db");
        let conn = SqliteConnection::open_file(db_path.display().to_string())
            .expect("open sqlite connection");

        // First run applies all schema migrations.
        let applied = block_on({
            let conn = &conn;
            move |cx| async move { migrate_to_latest(&cx, conn).await.into_result().unwrap() }
        });
        assert!(
            !applied.is_empty(),
            "fresh DB should apply at least one migration"
        );

        // Second run is a no-op (already applied).
        let applied2 = block_on({
            let conn = &conn;
            move |cx| async move { migrate_to_latest(&cx, conn).await.into_result().unwrap() }
        });
        assert!(
            applied2.is_empty(),
            "second migrate call should be idempotent"
        );
    }

    #[test]
    fn migrations_preserve_existing_data() {
        use sqlmodel_core::Value;

        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("migrations_preserve.db");
        let conn = SqliteConnection::open_file(db_path.display().to_string())
            .expect("open sqlite connection");

        // Simulate an older DB with only the `orgs` table.
        conn.execute_sync(
            "CREATE TABLE IF NOT EXISTS orgs (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, platform_application_id INTEGER NOT NULL, created_ts INTEGER NOT NULL)",
            &[],
        )
        .expect("create orgs table");
        conn.execute_sync(
            "INSERT INTO orgs (name, platform_application_id, created_ts) VALUES (?, ?, ?)",
            &[
                Value::Text("acme".to_string()),
                Value::BigInt(1),
                Value::BigInt(123),
            ],
        )
        .expect("insert org row");

        // Migrating should not delete existing rows.
        block_on({
            let conn = &conn;
            move |cx| async move { migrate_to_latest(&cx, conn).await.into_result().unwrap() }
        });

        let rows = conn
            .query_sync("SELECT name FROM orgs", &[])
            .expect("query orgs");
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get_named::<String>("name").unwrap_or_default(),
            "acme"
        );
    }

    #[test]
    fn corrupted_migrations_table_yields_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("migrations_corrupt.db");
        let conn = SqliteConnection::open_file(db_path.display().to_string())
            .expect("open sqlite connection");

        // Create a tracking table with the right name but wrong schema.
        conn.execute_sync(
            &format!("CREATE TABLE {MIGRATIONS_TABLE_NAME} (id INTEGER PRIMARY KEY)"),
            &[],
        )
        .expect("create corrupted migrations table");

        let outcome = block_on({
            let conn = &conn;
            move |cx| async move { migrate_to_latest(&cx, conn).await }
        });
        assert!(outcome.is_err(), "corrupted migrations table should error");
    }
}
