//! Database query plumbing and entity helpers
//!
//! The tracked connection wrapper, raw-query helpers, and the small set of
//! write/point-read operations the aggregation layer needs for seeding and
//! lookups. Loaders and query builders should rely on these helpers rather
//! than embedding their own plumbing.

#![allow(clippy::missing_const_for_fn)]

use crate::error::DbError;
use crate::models::{MessageRow, OrgRow, PageRow, ThreadParticipantRow, ThreadRow};
use crate::pool::DbPool;
use crate::timestamps::now_micros;
use asupersync::Outcome;
use sqlmodel::prelude::*;
use sqlmodel_core::{Connection, Dialect, Error as SqlError, IsolationLevel, PreparedStatement};
use sqlmodel_core::{Row as SqlRow, TransactionOps, Value};
use sqlmodel_query::{raw_execute, raw_query};
use threadline_core::Location;

// =============================================================================
// Tracked query wrappers
// =============================================================================

pub(crate) struct TrackedConnection<'conn> {
    inner: &'conn crate::DbConn,
}

impl<'conn> TrackedConnection<'conn> {
    fn new(inner: &'conn crate::DbConn) -> Self {
        Self { inner }
    }
}

pub(crate) struct TrackedTransaction<'conn> {
    inner: sqlmodel_frankensqlite::FrankenTransaction<'conn>,
}

impl TransactionOps for TrackedTransaction<'_> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<SqlRow>, SqlError>> + Send {
        let start = crate::tracking::query_timer();
        let fut = self.inner.query(cx, sql, params);
        async move {
            let result = fut.await;
            crate::tracking::record_query(sql, crate::tracking::elapsed_us(start));
            result
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<SqlRow>, SqlError>> + Send {
        let start = crate::tracking::query_timer();
        let fut = self.inner.query_one(cx, sql, params);
        async move {
            let result = fut.await;
            crate::tracking::record_query(sql, crate::tracking::elapsed_us(start));
            result
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, SqlError>> + Send {
        let start = crate::tracking::query_timer();
        let fut = self.inner.execute(cx, sql, params);
        async move {
            let result = fut.await;
            crate::tracking::record_query(sql, crate::tracking::elapsed_us(start));
            result
        }
    }

    fn savepoint(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), SqlError>> + Send {
        self.inner.savepoint(cx, name)
    }

    fn rollback_to(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), SqlError>> + Send {
        self.inner.rollback_to(cx, name)
    }

    fn release(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), SqlError>> + Send {
        self.inner.release(cx, name)
    }

    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), SqlError>> + Send {
        self.inner.commit(cx)
    }

    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), SqlError>> + Send {
        self.inner.rollback(cx)
    }
}

impl Connection for TrackedConnection<'_> {
    type Tx<'conn>
        = TrackedTransaction<'conn>
    where
        Self: 'conn;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<SqlRow>, SqlError>> + Send {
        let start = crate::tracking::query_timer();
        let fut = self.inner.query(cx, sql, params);
        async move {
            let result = fut.await;
            crate::tracking::record_query(sql, crate::tracking::elapsed_us(start));
            result
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<SqlRow>, SqlError>> + Send {
        let start = crate::tracking::query_timer();
        let fut = self.inner.query_one(cx, sql, params);
        async move {
            let result = fut.await;
            crate::tracking::record_query(sql, crate::tracking::elapsed_us(start));
            result
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, SqlError>> + Send {
        let start = crate::tracking::query_timer();
        let fut = self.inner.execute(cx, sql, params);
        async move {
            let result = fut.await;
            crate::tracking::record_query(sql, crate::tracking::elapsed_us(start));
            result
        }
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, SqlError>> + Send {
        let start = crate::tracking::query_timer();
        let fut = self.inner.insert(cx, sql, params);
        async move {
            let result = fut.await;
            crate::tracking::record_query(sql, crate::tracking::elapsed_us(start));
            result
        }
    }

    fn batch(
        &self,
        cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, SqlError>> + Send {
        let statements = statements.to_vec();
        async move {
            let mut results = Vec::with_capacity(statements.len());
            for (sql, params) in statements {
                let start = crate::tracking::query_timer();
                let out = self.inner.execute(cx, &sql, &params).await;
                crate::tracking::record_query(&sql, crate::tracking::elapsed_us(start));
                match out {
                    Outcome::Ok(n) => results.push(n),
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
            Outcome::Ok(results)
        }
    }

    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, SqlError>> + Send {
        self.begin_with(cx, IsolationLevel::default())
    }

    fn begin_with(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, SqlError>> + Send {
        let fut = self.inner.begin_with(cx, isolation);
        async move {
            match fut.await {
                Outcome::Ok(tx) => Outcome::Ok(TrackedTransaction { inner: tx }),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn prepare(
        &self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, SqlError>> + Send {
        self.inner.prepare(cx, sql)
    }

    fn query_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<SqlRow>, SqlError>> + Send {
        self.query(cx, stmt.sql(), params)
    }

    fn execute_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, SqlError>> + Send {
        self.execute(cx, stmt.sql(), params)
    }

    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), SqlError>> + Send {
        self.inner.ping(cx)
    }

    async fn close(self, _cx: &Cx) -> sqlmodel_core::Result<()> {
        // TrackedConnection borrows the underlying connection; closing is a
        // no-op because we don't own it.
        Ok(())
    }
}

/// Execute a raw query using the tracked connection.
pub(crate) async fn traw_query(
    cx: &Cx,
    conn: &TrackedConnection<'_>,
    sql: &str,
    params: &[Value],
) -> Outcome<Vec<SqlRow>, SqlError> {
    raw_query(cx, conn, sql, params).await
}

/// Execute a raw statement using the tracked connection.
pub(crate) async fn traw_execute(
    cx: &Cx,
    conn: &TrackedConnection<'_>,
    sql: &str,
    params: &[Value],
) -> Outcome<u64, SqlError> {
    raw_execute(cx, conn, sql, params).await
}

// =============================================================================
// Shared helpers
// =============================================================================

pub(crate) fn map_sql_error(e: &SqlError) -> DbError {
    DbError::Sqlite(e.to_string())
}

pub(crate) fn map_sql_outcome<T>(out: Outcome<T, SqlError>) -> Outcome<T, DbError> {
    match out {
        Outcome::Ok(v) => Outcome::Ok(v),
        Outcome::Err(e) => Outcome::Err(map_sql_error(&e)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::BigInt(n) => Some(*n),
        Value::Int(n) => Some(i64::from(*n)),
        Value::SmallInt(n) => Some(i64::from(*n)),
        Value::TinyInt(n) => Some(i64::from(*n)),
        _ => None,
    }
}

/// `SQLite` default `SQLITE_MAX_VARIABLE_NUMBER` is 999 (32766 in newer
/// builds). IN-clause item counts are capped well below that to prevent
/// excessively large SQL strings and parameter arrays from untrusted input.
pub(crate) const MAX_IN_CLAUSE_ITEMS: usize = 500;

pub(crate) fn placeholders(count: usize) -> String {
    let capped = count.min(MAX_IN_CLAUSE_ITEMS);
    std::iter::repeat_n("?", capped)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) async fn acquire_conn(
    cx: &Cx,
    pool: &DbPool,
) -> Outcome<sqlmodel_pool::PooledConnection<crate::DbConn>, DbError> {
    map_sql_outcome(pool.acquire(cx).await)
}

pub(crate) fn tracked(conn: &crate::DbConn) -> TrackedConnection<'_> {
    TrackedConnection::new(conn)
}

pub(crate) const THREAD_SELECT_COLUMNS_SQL: &str = "SELECT id, org_id, platform_application_id, page_context_hash, name, url, metadata, extra_classnames, resolved, resolved_ts, created_ts FROM threads";
pub(crate) const MESSAGE_SELECT_COLUMNS_SQL: &str =
    "SELECT id, thread_id, org_id, source_id, kind, content, ts, deleted_ts, imported FROM messages";

pub(crate) fn decode_thread_row(row: &SqlRow) -> std::result::Result<ThreadRow, DbError> {
    ThreadRow::from_row(row).map_err(|e| map_sql_error(&e))
}

pub(crate) fn decode_message_row(row: &SqlRow) -> std::result::Result<MessageRow, DbError> {
    MessageRow::from_row(row).map_err(|e| map_sql_error(&e))
}

pub(crate) fn decode_message_rows(rows: &[SqlRow]) -> std::result::Result<Vec<MessageRow>, DbError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(decode_message_row(row)?);
    }
    Ok(out)
}

// =============================================================================
// Org / page helpers
// =============================================================================

/// Ensure an org exists, creating if necessary. Returns the org row.
pub async fn ensure_org(
    cx: &Cx,
    pool: &DbPool,
    name: &str,
    platform_application_id: i64,
) -> Outcome<OrgRow, DbError> {
    if name.is_empty() {
        return Outcome::Err(DbError::invalid("name", "org name must be non-empty"));
    }

    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let select_sql = "SELECT id, name, platform_application_id, created_ts FROM orgs \
                      WHERE name = ? AND platform_application_id = ? LIMIT 1";
    let select_params = [
        Value::Text(name.to_string()),
        Value::BigInt(platform_application_id),
    ];

    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, select_sql, &select_params).await
    ));
    if let Some(row) = rows.first() {
        return match OrgRow::from_row(row) {
            Ok(org) => Outcome::Ok(org),
            Err(e) => Outcome::Err(map_sql_error(&e)),
        };
    }

    let row = OrgRow::new(name.to_string(), platform_application_id);
    let id = crate::try_out!(map_sql_outcome(insert!(&row).execute(cx, &tracked).await));
    Outcome::Ok(OrgRow {
        id: Some(id),
        ..row
    })
}

/// Ensure a page row exists for a location, keyed by its context hash.
pub async fn ensure_page(
    cx: &Cx,
    pool: &DbPool,
    org_id: i64,
    location: &Location,
) -> Outcome<PageRow, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let row = PageRow {
        org_id,
        context_hash: location.context_hash(),
        context_data: location.canonical_json(),
        created_ts: now_micros(),
    };

    let sql = "INSERT INTO pages (org_id, context_hash, context_data, created_ts) \
               VALUES (?, ?, ?, ?) \
               ON CONFLICT(org_id, context_hash) DO NOTHING";
    let params = [
        Value::BigInt(row.org_id),
        Value::Text(row.context_hash.clone()),
        Value::Text(row.context_data.clone()),
        Value::BigInt(row.created_ts),
    ];
    crate::try_out!(map_sql_outcome(
        traw_execute(cx, &tracked, sql, &params).await
    ));
    Outcome::Ok(row)
}

// =============================================================================
// Thread helpers
// =============================================================================

/// Insert a thread row, returning its id.
pub async fn create_thread(cx: &Cx, pool: &DbPool, row: &ThreadRow) -> Outcome<i64, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);
    map_sql_outcome(insert!(row).execute(cx, &tracked).await)
}

/// Get thread by ID.
pub async fn get_thread(cx: &Cx, pool: &DbPool, thread_id: i64) -> Outcome<ThreadRow, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let sql = format!("{THREAD_SELECT_COLUMNS_SQL} WHERE id = ? LIMIT 1");
    let params = [Value::BigInt(thread_id)];
    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, &sql, &params).await
    ));
    rows.first().map_or_else(
        || Outcome::Err(DbError::not_found("Thread", thread_id.to_string())),
        |r| match decode_thread_row(r) {
            Ok(row) => Outcome::Ok(row),
            Err(e) => Outcome::Err(e),
        },
    )
}

/// Toggle a thread's resolved state, keeping flag and timestamp in lockstep.
pub async fn set_thread_resolved(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    resolved: bool,
) -> Outcome<(), DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let resolved_ts = if resolved {
        Value::BigInt(now_micros())
    } else {
        Value::Null
    };
    let sql = "UPDATE threads SET resolved = ?, resolved_ts = ? WHERE id = ?";
    let params = [
        Value::BigInt(i64::from(resolved)),
        resolved_ts,
        Value::BigInt(thread_id),
    ];
    let changed = crate::try_out!(map_sql_outcome(
        traw_execute(cx, &tracked, sql, &params).await
    ));
    if changed == 0 {
        return Outcome::Err(DbError::not_found("Thread", thread_id.to_string()));
    }
    Outcome::Ok(())
}

// =============================================================================
// Message helpers
// =============================================================================

/// Insert a message and its mentions, creating participant rows implicitly.
///
/// The author becomes a subscribed participant whose last-seen watermark is
/// advanced to the message timestamp (you have seen your own message).
/// Mentioned users become participants with no last-seen watermark.
pub async fn create_message_with_mentions(
    cx: &Cx,
    pool: &DbPool,
    row: &MessageRow,
    mention_user_ids: &[i64],
) -> Outcome<i64, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let message_id = crate::try_out!(map_sql_outcome(insert!(row).execute(cx, &tracked).await));

    crate::try_out!(
        upsert_participant_on(
            cx,
            &tracked,
            row.thread_id,
            row.source_id,
            row.org_id,
            Some(row.ts),
        )
        .await
    );

    for user_id in mention_user_ids {
        let sql = "INSERT INTO message_mentions (message_id, user_id) VALUES (?, ?) \
                   ON CONFLICT(message_id, user_id) DO NOTHING";
        let params = [Value::BigInt(message_id), Value::BigInt(*user_id)];
        crate::try_out!(map_sql_outcome(
            traw_execute(cx, &tracked, sql, &params).await
        ));
        crate::try_out!(
            upsert_participant_on(cx, &tracked, row.thread_id, *user_id, row.org_id, None).await
        );
    }

    Outcome::Ok(message_id)
}

/// Insert a message without mentions.
pub async fn create_message(cx: &Cx, pool: &DbPool, row: &MessageRow) -> Outcome<i64, DbError> {
    create_message_with_mentions(cx, pool, row, &[]).await
}

/// Get message by ID.
pub async fn get_message(cx: &Cx, pool: &DbPool, message_id: i64) -> Outcome<MessageRow, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let sql = format!("{MESSAGE_SELECT_COLUMNS_SQL} WHERE id = ? LIMIT 1");
    let params = [Value::BigInt(message_id)];
    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, &sql, &params).await
    ));
    rows.first().map_or_else(
        || Outcome::Err(DbError::not_found("Message", message_id.to_string())),
        |r| match decode_message_row(r) {
            Ok(row) => Outcome::Ok(row),
            Err(e) => Outcome::Err(e),
        },
    )
}

/// Soft-delete a message (stamps `deleted_ts`, row stays in place).
pub async fn soft_delete_message(
    cx: &Cx,
    pool: &DbPool,
    message_id: i64,
) -> Outcome<(), DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let sql = "UPDATE messages SET deleted_ts = ? WHERE id = ? AND deleted_ts IS NULL";
    let params = [Value::BigInt(now_micros()), Value::BigInt(message_id)];
    crate::try_out!(map_sql_outcome(
        traw_execute(cx, &tracked, sql, &params).await
    ));
    Outcome::Ok(())
}

/// Attach a reaction to a message.
pub async fn add_reaction(
    cx: &Cx,
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
    unicode_reaction: &str,
) -> Outcome<i64, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let row = crate::models::MessageReactionRow {
        id: None,
        message_id,
        user_id,
        unicode_reaction: unicode_reaction.to_string(),
        ts: now_micros(),
    };
    map_sql_outcome(insert!(&row).execute(cx, &tracked).await)
}

// =============================================================================
// Participant helpers
// =============================================================================

async fn upsert_participant_on(
    cx: &Cx,
    tracked: &TrackedConnection<'_>,
    thread_id: i64,
    user_id: i64,
    org_id: i64,
    last_seen_ts: Option<i64>,
) -> Outcome<(), DbError> {
    // Advance-only watermark: a concurrent older write must not regress it.
    let sql = "INSERT INTO thread_participants (thread_id, user_id, org_id, last_seen_ts, subscribed) \
               VALUES (?, ?, ?, ?, 1) \
               ON CONFLICT(thread_id, user_id) DO UPDATE SET \
               last_seen_ts = MAX(COALESCE(last_seen_ts, -1), COALESCE(excluded.last_seen_ts, -1))";
    let params = [
        Value::BigInt(thread_id),
        Value::BigInt(user_id),
        Value::BigInt(org_id),
        last_seen_ts.map_or(Value::Null, Value::BigInt),
    ];
    crate::try_out!(map_sql_outcome(traw_execute(cx, tracked, sql, &params).await));

    // The MAX() upsert turns "never seen" into -1; normalize back to NULL.
    let fix_sql = "UPDATE thread_participants SET last_seen_ts = NULL \
                   WHERE thread_id = ? AND user_id = ? AND last_seen_ts = -1";
    let fix_params = [Value::BigInt(thread_id), Value::BigInt(user_id)];
    crate::try_out!(map_sql_outcome(
        traw_execute(cx, tracked, fix_sql, &fix_params).await
    ));
    Outcome::Ok(())
}

/// Ensure a participant row exists (no last-seen watermark).
pub async fn upsert_participant(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    user_id: i64,
    org_id: i64,
) -> Outcome<(), DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);
    upsert_participant_on(cx, &tracked, thread_id, user_id, org_id, None).await
}

/// Advance the viewer's last-seen watermark for a thread.
pub async fn mark_thread_seen(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    user_id: i64,
    org_id: i64,
    seen_ts: i64,
) -> Outcome<(), DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);
    upsert_participant_on(cx, &tracked, thread_id, user_id, org_id, Some(seen_ts)).await
}

/// Set the subscription flag on an existing (or new) participant row.
pub async fn set_subscribed(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    user_id: i64,
    org_id: i64,
    subscribed: bool,
) -> Outcome<(), DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    crate::try_out!(upsert_participant_on(cx, &tracked, thread_id, user_id, org_id, None).await);

    let sql = "UPDATE thread_participants SET subscribed = ? WHERE thread_id = ? AND user_id = ?";
    let params = [
        Value::BigInt(i64::from(subscribed)),
        Value::BigInt(thread_id),
        Value::BigInt(user_id),
    ];
    crate::try_out!(map_sql_outcome(
        traw_execute(cx, &tracked, sql, &params).await
    ));
    Outcome::Ok(())
}

/// Fetch a participant row, if any.
pub async fn get_participant(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    user_id: i64,
) -> Outcome<Option<ThreadParticipantRow>, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, pool).await);
    let tracked = tracked(&*conn);

    let sql = "SELECT thread_id, user_id, org_id, last_seen_ts, subscribed \
               FROM thread_participants WHERE thread_id = ? AND user_id = ? LIMIT 1";
    let params = [Value::BigInt(thread_id), Value::BigInt(user_id)];
    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, sql, &params).await
    ));
    match rows.first() {
        None => Outcome::Ok(None),
        Some(r) => match ThreadParticipantRow::from_row(r) {
            Ok(row) => Outcome::Ok(Some(row)),
            Err(e) => Outcome::Err(map_sql_error(&e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_comma_separated() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }

    #[test]
    fn placeholders_are_capped() {
        let sql = placeholders(MAX_IN_CLAUSE_ITEMS + 100);
        assert_eq!(sql.matches('?').count(), MAX_IN_CLAUSE_ITEMS);
    }

    #[test]
    fn value_as_i64_accepts_integer_widths() {
        assert_eq!(value_as_i64(&Value::BigInt(9)), Some(9));
        assert_eq!(value_as_i64(&Value::Int(9)), Some(9));
        assert_eq!(value_as_i64(&Value::Text("9".into())), None);
    }
}
