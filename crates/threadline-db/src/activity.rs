//! Activity summary aggregator.
//!
//! Computes one row of cross-thread counts for a filter. All six counts are
//! aggregated from the same derived per-thread boolean table in a single
//! query, so a snapshot is internally consistent even under concurrent
//! writers — separate queries could each observe different data.

use asupersync::{Cx, Outcome};
use sqlmodel_core::Value;
use threadline_core::{TenantScope, ThreadCollectionFilter, ThreadCounts};

use crate::collection::build_filter_fragments;
use crate::counts::LoaderContext;
use crate::error::DbError;
use crate::queries::{acquire_conn, map_sql_outcome, tracked, traw_query};

/// Compute the activity summary for every thread matching `filter` under
/// `scope`.
///
/// The derived table computes, per thread: `has_message` (a non-deleted
/// user message exists), `has_unread` (a qualifying message is newer than
/// the viewer's last-seen watermark), `never_seen`, `subscribed`, and
/// `resolved`; the outer query folds those into [`ThreadCounts`] with
/// conditional sums. Threads whose only activity is invisible action
/// messages never inflate `unread` past `total`: the unread conditions all
/// require `has_message`.
pub async fn thread_activity_summary(
    cx: &Cx,
    ctx: &LoaderContext,
    scope: &TenantScope,
    filter: &ThreadCollectionFilter,
) -> Outcome<ThreadCounts, DbError> {
    let user_id = match ctx.viewer.require_user_id() {
        Ok(v) => v,
        Err(e) => return Outcome::Err(e.into()),
    };

    let fragments = match build_filter_fragments(ctx, scope, filter) {
        Ok(f) => f,
        Err(e) => return Outcome::Err(e),
    };

    let sql = format!(
        "SELECT \
            SUM(has_message) AS total, \
            SUM(CASE WHEN has_message = 1 AND has_unread = 1 AND resolved = 0 \
                THEN 1 ELSE 0 END) AS unread, \
            SUM(CASE WHEN has_message = 1 AND has_unread = 1 AND subscribed = 1 \
                AND resolved = 0 THEN 1 ELSE 0 END) AS unread_subscribed, \
            SUM(resolved) AS resolved, \
            SUM(CASE WHEN has_message = 1 AND never_seen = 1 AND resolved = 0 \
                THEN 1 ELSE 0 END) AS new_threads, \
            SUM(CASE WHEN has_message = 0 THEN 1 ELSE 0 END) AS empty \
         FROM ( \
            SELECT t.id, \
                EXISTS (SELECT 1 FROM messages m WHERE m.thread_id = t.id \
                    AND m.deleted_ts IS NULL AND m.kind = 'user_message') AS has_message, \
                EXISTS (SELECT 1 FROM messages m WHERE m.thread_id = t.id \
                    AND m.deleted_ts IS NULL AND m.source_id <> ? \
                    AND (tp.last_seen_ts IS NULL OR m.ts > tp.last_seen_ts)) AS has_unread, \
                CASE WHEN tp.last_seen_ts IS NULL THEN 1 ELSE 0 END AS never_seen, \
                COALESCE(tp.subscribed, 0) AS subscribed, \
                t.resolved AS resolved \
            FROM threads t \
            LEFT JOIN thread_participants tp \
                ON tp.thread_id = t.id AND tp.user_id = ? \
            {} WHERE {} \
         ) activity",
        fragments.join_sql(),
        fragments.where_sql()
    );

    // Bind order follows the textual placeholder order: the has_unread
    // subquery, the participant join, then the filter fragments.
    let mut params: Vec<Value> = Vec::with_capacity(fragments.binds().len() + 2);
    params.push(Value::BigInt(user_id));
    params.push(Value::BigInt(user_id));
    params.extend(fragments.into_binds());

    let conn = crate::try_out!(acquire_conn(cx, &ctx.pool).await);
    let tracked = tracked(&*conn);
    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, &sql, &params).await
    ));

    let Some(row) = rows.first() else {
        return Outcome::Ok(ThreadCounts::default());
    };

    let get = |name: &str| -> u64 {
        let value: Option<i64> = row.get_named(name).unwrap_or(None);
        value.and_then(|n| u64::try_from(n).ok()).unwrap_or(0)
    };

    Outcome::Ok(ThreadCounts {
        total: get("total"),
        unread: get("unread"),
        unread_subscribed: get("unread_subscribed"),
        resolved: get("resolved"),
        new: get("new_threads"),
        empty: get("empty"),
    })
}
