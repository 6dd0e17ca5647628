//! Count aggregators: per-thread scalar and grouped counts.
//!
//! Each aggregator is a [`BatchSource`] keyed by thread id that issues one
//! grouped query for the whole batch (`GROUP BY thread_id` over an `IN`
//! list), then runs a visibility adjustment pass: candidate rows that the
//! viewer cannot see are subtracted from the raw counts, so a count never
//! includes a message that matched the SQL predicate but is invisible.
//!
//! All aggregators default absent groups to zero — a thread with no matching
//! rows resolves to `0`, never "missing".
//!
//! These loaders opt out of the per-request value cache: their results can
//! change within a request across mutations, so callers must always observe
//! fresh values.

use std::collections::HashMap;

use asupersync::{Cx, Outcome};
use sqlmodel_core::Value;
use threadline_core::Viewer;

use crate::batch::{BatchSource, CachePolicy};
use crate::error::DbError;
use crate::models::{MESSAGE_KIND_ACTION, MESSAGE_KIND_USER};
use crate::pool::DbPool;
use crate::queries::{
    MAX_IN_CLAUSE_ITEMS, acquire_conn, decode_message_rows, map_sql_outcome, placeholders,
    tracked, traw_query,
};
use crate::visibility::VisibilityHandle;

/// Everything a loader needs: the pool, the viewer, and the permission
/// filter. Cloned into each source when a request's loader set is built.
#[derive(Clone)]
pub struct LoaderContext {
    pub pool: DbPool,
    pub viewer: Viewer,
    pub acl: VisibilityHandle,
}

impl LoaderContext {
    #[must_use]
    pub fn new(pool: DbPool, viewer: Viewer, acl: VisibilityHandle) -> Self {
        Self { pool, viewer, acl }
    }
}

// =============================================================================
// Shared predicate plumbing
// =============================================================================

/// One filtered view over `messages m`: an optional join plus a conjunction
/// appended after the `thread_id IN (…)` predicate. Bind order is join
/// params, then thread ids, then condition params — matching the textual
/// placeholder order.
struct MessagePredicate {
    join: String,
    join_params: Vec<Value>,
    cond: String,
    cond_params: Vec<Value>,
}

impl MessagePredicate {
    fn plain(cond: &str) -> Self {
        Self {
            join: String::new(),
            join_params: Vec::new(),
            cond: cond.to_string(),
            cond_params: Vec::new(),
        }
    }

    fn params_for(&self, ids: &[i64]) -> Vec<Value> {
        let mut params =
            Vec::with_capacity(self.join_params.len() + ids.len() + self.cond_params.len());
        params.extend(self.join_params.iter().cloned());
        params.extend(ids.iter().map(|id| Value::BigInt(*id)));
        params.extend(self.cond_params.iter().cloned());
        params
    }
}

const MESSAGE_CANDIDATE_COLUMNS: &str =
    "m.id, m.thread_id, m.org_id, m.source_id, m.kind, m.content, m.ts, m.deleted_ts, m.imported";

/// Run one grouped count plus the visibility adjustment pass for a batch of
/// thread ids, chunked below the IN-clause cap.
async fn visible_grouped_counts(
    cx: &Cx,
    ctx: &LoaderContext,
    pred: &MessagePredicate,
    keys: &[i64],
) -> Outcome<HashMap<i64, i64>, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, &ctx.pool).await);
    let tracked = tracked(&*conn);

    let mut counts: HashMap<i64, i64> = HashMap::with_capacity(keys.len());
    for chunk in keys.chunks(MAX_IN_CLAUSE_ITEMS) {
        let ph = placeholders(chunk.len());
        let params = pred.params_for(chunk);

        let count_sql = format!(
            "SELECT m.thread_id AS thread_id, COUNT(*) AS n \
             FROM messages m {} \
             WHERE m.thread_id IN ({ph}) {} \
             GROUP BY m.thread_id",
            pred.join, pred.cond
        );
        let rows = crate::try_out!(map_sql_outcome(
            traw_query(cx, &tracked, &count_sql, &params).await
        ));
        for row in &rows {
            let thread_id: i64 = row.get_named("thread_id").unwrap_or(0);
            let n: i64 = row.get_named("n").unwrap_or(0);
            counts.insert(thread_id, n);
        }

        // Adjustment pass: the per-row permission check cannot be expressed
        // in the WHERE clause, so fetch the candidates and subtract the
        // invisible ones from the raw counts.
        let candidate_sql = format!(
            "SELECT {MESSAGE_CANDIDATE_COLUMNS} \
             FROM messages m {} \
             WHERE m.thread_id IN ({ph}) {}",
            pred.join, pred.cond
        );
        let rows = crate::try_out!(map_sql_outcome(
            traw_query(cx, &tracked, &candidate_sql, &params).await
        ));
        let candidates = match decode_message_rows(&rows) {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e),
        };
        for message in &candidates {
            if !ctx.acl.can_see_message(&ctx.viewer, message) {
                if let Some(count) = counts.get_mut(&message.thread_id) {
                    *count -= 1;
                }
            }
        }
    }

    for count in counts.values_mut() {
        if *count < 0 {
            *count = 0;
        }
    }
    Outcome::Ok(counts)
}

// =============================================================================
// Plain per-thread message counts
// =============================================================================

/// Total message count, including soft-deleted rows.
pub struct TotalMessageCount {
    ctx: LoaderContext,
}

impl TotalMessageCount {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for TotalMessageCount {
    type Key = i64;
    type Value = i64;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> i64 {
        0
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, i64>, DbError> {
        visible_grouped_counts(cx, &self.ctx, &MessagePredicate::plain(""), keys).await
    }
}

/// Message count excluding soft-deleted rows.
pub struct MessageCountExcludingDeleted {
    ctx: LoaderContext,
}

impl MessageCountExcludingDeleted {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for MessageCountExcludingDeleted {
    type Key = i64;
    type Value = i64;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> i64 {
        0
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, i64>, DbError> {
        let pred = MessagePredicate::plain("AND m.deleted_ts IS NULL");
        visible_grouped_counts(cx, &self.ctx, &pred, keys).await
    }
}

fn kind_predicate(kind: &str) -> MessagePredicate {
    MessagePredicate {
        join: String::new(),
        join_params: Vec::new(),
        cond: "AND m.deleted_ts IS NULL AND m.kind = ?".to_string(),
        cond_params: vec![Value::Text(kind.to_string())],
    }
}

/// Non-deleted `user_message` count.
pub struct UserMessageCount {
    ctx: LoaderContext,
}

impl UserMessageCount {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for UserMessageCount {
    type Key = i64;
    type Value = i64;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> i64 {
        0
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, i64>, DbError> {
        visible_grouped_counts(cx, &self.ctx, &kind_predicate(MESSAGE_KIND_USER), keys).await
    }
}

/// Non-deleted `action_message` count.
pub struct ActionMessageCount {
    ctx: LoaderContext,
}

impl ActionMessageCount {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for ActionMessageCount {
    type Key = i64;
    type Value = i64;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> i64 {
        0
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, i64>, DbError> {
        visible_grouped_counts(cx, &self.ctx, &kind_predicate(MESSAGE_KIND_ACTION), keys).await
    }
}

// =============================================================================
// Unread counts
// =============================================================================

/// Predicate shared by the unread loaders: not deleted, not authored by the
/// viewer, newer than the viewer's last-seen watermark. A missing
/// participant row means "never viewed" and compares as negative infinity,
/// which the `LEFT JOIN … IS NULL` arm encodes.
fn unread_predicate(user_id: i64) -> MessagePredicate {
    MessagePredicate {
        join: "LEFT JOIN thread_participants tp \
               ON tp.thread_id = m.thread_id AND tp.user_id = ?"
            .to_string(),
        join_params: vec![Value::BigInt(user_id)],
        cond: "AND m.deleted_ts IS NULL AND m.source_id <> ? \
               AND (tp.last_seen_ts IS NULL OR m.ts > tp.last_seen_ts)"
            .to_string(),
        cond_params: vec![Value::BigInt(user_id)],
    }
}

/// New (unread) message count for the viewer.
pub struct NewMessageCount {
    ctx: LoaderContext,
}

impl NewMessageCount {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for NewMessageCount {
    type Key = i64;
    type Value = i64;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> i64 {
        0
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, i64>, DbError> {
        let user_id = match self.ctx.viewer.require_user_id() {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e.into()),
        };
        visible_grouped_counts(cx, &self.ctx, &unread_predicate(user_id), keys).await
    }
}

/// New reaction count: reactions added by others to the viewer's own
/// messages since the viewer last saw the thread.
pub struct NewReactionCount {
    ctx: LoaderContext,
}

impl NewReactionCount {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for NewReactionCount {
    type Key = i64;
    type Value = i64;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> i64 {
        0
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, i64>, DbError> {
        let user_id = match self.ctx.viewer.require_user_id() {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e.into()),
        };

        let conn = crate::try_out!(acquire_conn(cx, &self.ctx.pool).await);
        let tracked = tracked(&*conn);

        let mut counts: HashMap<i64, i64> = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(MAX_IN_CLAUSE_ITEMS) {
            let ph = placeholders(chunk.len());
            let sql = format!(
                "SELECT m.thread_id AS thread_id, COUNT(*) AS n \
                 FROM message_reactions r \
                 JOIN messages m ON m.id = r.message_id \
                 LEFT JOIN thread_participants tp \
                   ON tp.thread_id = m.thread_id AND tp.user_id = ? \
                 WHERE m.thread_id IN ({ph}) \
                   AND m.deleted_ts IS NULL \
                   AND m.source_id = ? \
                   AND r.user_id <> ? \
                   AND (tp.last_seen_ts IS NULL OR r.ts > tp.last_seen_ts) \
                 GROUP BY m.thread_id"
            );
            let mut params: Vec<Value> = Vec::with_capacity(chunk.len() + 3);
            params.push(Value::BigInt(user_id));
            params.extend(chunk.iter().map(|id| Value::BigInt(*id)));
            params.push(Value::BigInt(user_id));
            params.push(Value::BigInt(user_id));

            let rows = crate::try_out!(map_sql_outcome(
                traw_query(cx, &tracked, &sql, &params).await
            ));
            for row in &rows {
                let thread_id: i64 = row.get_named("thread_id").unwrap_or(0);
                let n: i64 = row.get_named("n").unwrap_or(0);
                counts.insert(thread_id, n);
            }
        }
        // Reactions sit on the viewer's own messages, which are visible by
        // definition; no adjustment pass is needed here.
        Outcome::Ok(counts)
    }
}

// =============================================================================
// Reply counts and replier ids
// =============================================================================

/// Inner ranked view: `rn = 1` marks the first message of each thread in the
/// unfiltered ordering. Rank is computed before the deleted filter so a
/// soft-deleted first message does not promote the second message to
/// "first".
const RANKED_MESSAGES_SQL: &str = "SELECT m.id, m.thread_id, m.org_id, m.source_id, m.kind, \
            m.content, m.ts, m.deleted_ts, m.imported, \
            ROW_NUMBER() OVER (PARTITION BY m.thread_id ORDER BY m.ts ASC, m.id ASC) AS rn \
     FROM messages m";

async fn ranked_reply_rows(
    cx: &Cx,
    ctx: &LoaderContext,
    kind: &str,
    keys: &[i64],
) -> Outcome<Vec<crate::models::MessageRow>, DbError> {
    let conn = crate::try_out!(acquire_conn(cx, &ctx.pool).await);
    let tracked = tracked(&*conn);

    let mut out = Vec::new();
    for chunk in keys.chunks(MAX_IN_CLAUSE_ITEMS) {
        let ph = placeholders(chunk.len());
        let sql = format!(
            "SELECT id, thread_id, org_id, source_id, kind, content, ts, deleted_ts, imported \
             FROM ({RANKED_MESSAGES_SQL} WHERE m.thread_id IN ({ph})) \
             WHERE rn > 1 AND kind = ? AND deleted_ts IS NULL \
             ORDER BY thread_id ASC, ts ASC, id ASC"
        );
        let mut params: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
        params.extend(chunk.iter().map(|id| Value::BigInt(*id)));
        params.push(Value::Text(kind.to_string()));

        let rows = crate::try_out!(map_sql_outcome(
            traw_query(cx, &tracked, &sql, &params).await
        ));
        match decode_message_rows(&rows) {
            Ok(mut msgs) => out.append(&mut msgs),
            Err(e) => return Outcome::Err(e),
        }
    }
    Outcome::Ok(out)
}

/// Reply count: non-first, non-deleted `user_message` rows.
pub struct ReplyCount {
    ctx: LoaderContext,
}

impl ReplyCount {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for ReplyCount {
    type Key = i64;
    type Value = i64;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> i64 {
        0
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, i64>, DbError> {
        let candidates =
            crate::try_out!(ranked_reply_rows(cx, &self.ctx, MESSAGE_KIND_USER, keys).await);
        let mut counts: HashMap<i64, i64> = HashMap::with_capacity(keys.len());
        for message in &candidates {
            if self.ctx.acl.can_see_message(&self.ctx.viewer, message) {
                *counts.entry(message.thread_id).or_insert(0) += 1;
            }
        }
        Outcome::Ok(counts)
    }
}

fn distinct_replier_ids(
    ctx: &LoaderContext,
    candidates: &[crate::models::MessageRow],
) -> HashMap<i64, Vec<i64>> {
    let mut out: HashMap<i64, Vec<i64>> = HashMap::new();
    for message in candidates {
        if !ctx.acl.can_see_message(&ctx.viewer, message) {
            continue;
        }
        let authors = out.entry(message.thread_id).or_default();
        if !authors.contains(&message.source_id) {
            authors.push(message.source_id);
        }
    }
    out
}

/// Distinct author ids of non-first `user_message` replies, in first-reply
/// order per thread.
pub struct ReplyingUserIds {
    ctx: LoaderContext,
}

impl ReplyingUserIds {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for ReplyingUserIds {
    type Key = i64;
    type Value = Vec<i64>;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> Vec<i64> {
        Vec::new()
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, Vec<i64>>, DbError> {
        let candidates =
            crate::try_out!(ranked_reply_rows(cx, &self.ctx, MESSAGE_KIND_USER, keys).await);
        Outcome::Ok(distinct_replier_ids(&self.ctx, &candidates))
    }
}

/// Distinct author ids of non-first `action_message` rows.
pub struct ActionReplyingUserIds {
    ctx: LoaderContext,
}

impl ActionReplyingUserIds {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for ActionReplyingUserIds {
    type Key = i64;
    type Value = Vec<i64>;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NoCache
    }

    fn absent_value(&self) -> Vec<i64> {
        Vec::new()
    }

    async fn load_batch(&self, cx: &Cx, keys: &[i64]) -> Outcome<HashMap<i64, Vec<i64>>, DbError> {
        let candidates =
            crate::try_out!(ranked_reply_rows(cx, &self.ctx, MESSAGE_KIND_ACTION, keys).await);
        Outcome::Ok(distinct_replier_ids(&self.ctx, &candidates))
    }
}
