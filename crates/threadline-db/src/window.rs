//! Initial-window loader.
//!
//! Computes the bounded, gap-free slice of a conversation handed to a
//! freshly-opened thread view: always the oldest visible message, then
//! either the whole thread (small threads), a fixed-size trailing window
//! (explicit count, or collapsed when the viewer has no participation
//! record), or a window anchored at the viewer's last-seen watermark.

use asupersync::{Cx, Outcome};
use sqlmodel_core::Value;
use threadline_core::Config;

use crate::counts::LoaderContext;
use crate::error::DbError;
use crate::loaders::ThreadLoaders;
use crate::models::MessageRow;
use crate::queries::{
    MESSAGE_SELECT_COLUMNS_SQL, acquire_conn, decode_message_rows, get_participant,
    map_sql_outcome, tracked, traw_query,
};

/// Page size used when scanning for the first/last visible message.
const VISIBLE_SCAN_PAGE: usize = 20;

/// Compute the initial message window for a thread.
///
/// The returned list is chronological (oldest first) and never empty if the
/// thread has at least one visible message; its first element is the oldest
/// visible message. If every message is invisible to the viewer, returns an
/// empty list — indistinguishable from a thread that does not exist.
pub async fn initial_messages(
    cx: &Cx,
    loaders: &ThreadLoaders,
    thread_id: i64,
    requested_count: Option<usize>,
) -> Outcome<Vec<MessageRow>, DbError> {
    if requested_count == Some(0) {
        return Outcome::Err(DbError::invalid(
            "requested_count",
            "requested_count must be at least 1",
        ));
    }

    let config = Config::get();
    let ctx = loaders.context();

    let total = crate::try_out!(loaders.messages_excluding_deleted.load(cx, thread_id).await);

    // Small threads are returned whole; no window bookkeeping.
    let small = usize::try_from(total).unwrap_or(usize::MAX) < config.initial_window_small_thread;
    if small && requested_count.is_none() {
        return all_visible_messages(cx, ctx, thread_id).await;
    }

    let first = crate::try_out!(first_visible_message(cx, ctx, thread_id).await);
    let last = crate::try_out!(last_visible_message(cx, ctx, thread_id).await);

    let (Some(first), Some(last)) = (first, last) else {
        // Nothing visible at all.
        return Outcome::Ok(Vec::new());
    };

    if first.id == last.id {
        return Outcome::Ok(vec![first]);
    }

    if let Some(count) = requested_count {
        // Fixed-size trailing window ending at the newest message. The first
        // message is swapped in for the window's oldest entry so the result
        // still opens the conversation, without growing past `count`.
        let tail =
            crate::try_out!(tail_window_desc(cx, ctx, thread_id, None, None, count).await);
        let mut chronological: Vec<MessageRow> = tail.into_iter().rev().collect();
        if !chronological.iter().any(|m| m.id == first.id) {
            if chronological.len() == count {
                chronological.remove(0);
            }
            chronological.insert(0, first);
        }
        return Outcome::Ok(chronological);
    }

    let user_id = match ctx.viewer.require_user_id() {
        Ok(v) => v,
        Err(e) => return Outcome::Err(e.into()),
    };
    let participant = crate::try_out!(get_participant(cx, &ctx.pool, thread_id, user_id).await);

    let tail: Vec<MessageRow> = if let Some(participant) = participant {
        // Anchor at the latest message at-or-before the last-seen watermark:
        // one read message for context, plus everything newer, capped.
        let anchor_ts = match participant.last_seen_ts {
            Some(last_seen) => {
                crate::try_out!(anchor_timestamp(cx, ctx, thread_id, last_seen).await)
            }
            None => None,
        };
        crate::try_out!(
            tail_window_desc(
                cx,
                ctx,
                thread_id,
                anchor_ts,
                None,
                config.initial_window_max_unread,
            )
            .await
        )
    } else {
        // No participation record: collapsed view, just the endpoints.
        Vec::new()
    };

    let mut result = Vec::with_capacity(tail.len() + 2);
    result.push(first.clone());
    for message in tail.into_iter().rev() {
        if message.id == first.id || message.id == last.id {
            continue;
        }
        result.push(message);
    }
    result.push(last);
    Outcome::Ok(result)
}

/// Keyset continuation: up to `count` messages strictly older than
/// `before_message_id`, newest-first. The cursor's position is resolved by
/// subquery so the caller only needs the id of the last message it actually
/// received.
pub async fn older_messages(
    cx: &Cx,
    ctx: &LoaderContext,
    thread_id: i64,
    before_message_id: i64,
    count: usize,
) -> Outcome<Vec<MessageRow>, DbError> {
    if count == 0 {
        return Outcome::Err(DbError::invalid("count", "count must be at least 1"));
    }
    tail_window_desc(cx, ctx, thread_id, None, Some(before_message_id), count).await
}

async fn all_visible_messages(
    cx: &Cx,
    ctx: &LoaderContext,
    thread_id: i64,
) -> Outcome<Vec<MessageRow>, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, &ctx.pool).await);
    let tracked = tracked(&*conn);

    let sql = format!(
        "{MESSAGE_SELECT_COLUMNS_SQL} \
         WHERE thread_id = ? AND deleted_ts IS NULL \
         ORDER BY ts ASC, id ASC"
    );
    let params = [Value::BigInt(thread_id)];
    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, &sql, &params).await
    ));
    let messages = match decode_message_rows(&rows) {
        Ok(v) => v,
        Err(e) => return Outcome::Err(e),
    };
    Outcome::Ok(
        messages
            .into_iter()
            .filter(|m| ctx.acl.can_see_message(&ctx.viewer, m))
            .collect(),
    )
}

/// Oldest visible non-deleted message, scanning forward in pages so one
/// screenful of invisible rows doesn't force a full-thread fetch.
async fn first_visible_message(
    cx: &Cx,
    ctx: &LoaderContext,
    thread_id: i64,
) -> Outcome<Option<MessageRow>, DbError> {
    visible_endpoint(cx, ctx, thread_id, true).await
}

/// Newest visible non-deleted message.
async fn last_visible_message(
    cx: &Cx,
    ctx: &LoaderContext,
    thread_id: i64,
) -> Outcome<Option<MessageRow>, DbError> {
    visible_endpoint(cx, ctx, thread_id, false).await
}

async fn visible_endpoint(
    cx: &Cx,
    ctx: &LoaderContext,
    thread_id: i64,
    oldest: bool,
) -> Outcome<Option<MessageRow>, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, &ctx.pool).await);
    let tracked = tracked(&*conn);

    let mut cursor: Option<(i64, i64)> = None; // (ts, id) of last scanned row
    loop {
        let mut sql = format!(
            "{MESSAGE_SELECT_COLUMNS_SQL} WHERE thread_id = ? AND deleted_ts IS NULL"
        );
        let mut params: Vec<Value> = vec![Value::BigInt(thread_id)];
        if let Some((ts, id)) = cursor {
            if oldest {
                sql.push_str(" AND (ts > ? OR (ts = ? AND id > ?))");
            } else {
                sql.push_str(" AND (ts < ? OR (ts = ? AND id < ?))");
            }
            params.push(Value::BigInt(ts));
            params.push(Value::BigInt(ts));
            params.push(Value::BigInt(id));
        }
        if oldest {
            sql.push_str(" ORDER BY ts ASC, id ASC LIMIT ?");
        } else {
            sql.push_str(" ORDER BY ts DESC, id DESC LIMIT ?");
        }
        let Ok(limit_i64) = i64::try_from(VISIBLE_SCAN_PAGE) else {
            return Outcome::Err(DbError::invalid("limit", "limit exceeds i64::MAX"));
        };
        params.push(Value::BigInt(limit_i64));

        let rows = crate::try_out!(map_sql_outcome(
            traw_query(cx, &tracked, &sql, &params).await
        ));
        if rows.is_empty() {
            return Outcome::Ok(None);
        }
        let page = match decode_message_rows(&rows) {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e),
        };
        for message in &page {
            if ctx.acl.can_see_message(&ctx.viewer, message) {
                return Outcome::Ok(Some(message.clone()));
            }
        }
        let last = &page[page.len() - 1];
        cursor = Some((last.ts, last.id.unwrap_or(0)));
    }
}

/// Resolve the anchor: the newest non-deleted message at-or-before the
/// viewer's last-seen timestamp.
async fn anchor_timestamp(
    cx: &Cx,
    ctx: &LoaderContext,
    thread_id: i64,
    last_seen_ts: i64,
) -> Outcome<Option<i64>, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, &ctx.pool).await);
    let tracked = tracked(&*conn);

    let sql = "SELECT MAX(ts) AS anchor_ts FROM messages \
               WHERE thread_id = ? AND deleted_ts IS NULL AND ts <= ?";
    let params = [Value::BigInt(thread_id), Value::BigInt(last_seen_ts)];
    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, sql, &params).await
    ));
    let anchor = rows
        .first()
        .and_then(|r| r.get_named::<Option<i64>>("anchor_ts").ok())
        .flatten();
    Outcome::Ok(anchor)
}

/// Fetch up to `count` visible messages newest-first, optionally bounded
/// below by `min_ts` (inclusive) or above by a keyset cursor message id.
async fn tail_window_desc(
    cx: &Cx,
    ctx: &LoaderContext,
    thread_id: i64,
    min_ts: Option<i64>,
    before_message_id: Option<i64>,
    count: usize,
) -> Outcome<Vec<MessageRow>, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, &ctx.pool).await);
    let tracked = tracked(&*conn);

    let mut sql = format!(
        "{MESSAGE_SELECT_COLUMNS_SQL} WHERE thread_id = ? AND deleted_ts IS NULL"
    );
    let mut params: Vec<Value> = vec![Value::BigInt(thread_id)];

    if let Some(min_ts) = min_ts {
        sql.push_str(" AND ts >= ?");
        params.push(Value::BigInt(min_ts));
    }
    if let Some(before_id) = before_message_id {
        sql.push_str(
            " AND (ts < (SELECT ts FROM messages WHERE id = ?) \
               OR (ts = (SELECT ts FROM messages WHERE id = ?) AND id < ?))",
        );
        params.push(Value::BigInt(before_id));
        params.push(Value::BigInt(before_id));
        params.push(Value::BigInt(before_id));
    }

    sql.push_str(" ORDER BY ts DESC, id DESC LIMIT ?");
    let Ok(limit_i64) = i64::try_from(count) else {
        return Outcome::Err(DbError::invalid("count", "count exceeds i64::MAX"));
    };
    params.push(Value::BigInt(limit_i64));

    let rows = crate::try_out!(map_sql_outcome(
        traw_query(cx, &tracked, &sql, &params).await
    ));
    let messages = match decode_message_rows(&rows) {
        Ok(v) => v,
        Err(e) => return Outcome::Err(e),
    };
    Outcome::Ok(
        messages
            .into_iter()
            .filter(|m| ctx.acl.can_see_message(&ctx.viewer, m))
            .collect(),
    )
}
