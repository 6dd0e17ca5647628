//! Unseen-boundary resolver.
//!
//! For each thread, finds the earliest message the viewer has not yet seen:
//! not deleted, not authored by the viewer, with a timestamp strictly past
//! the viewer's last-seen watermark (no participant row means everything is
//! unseen). Resolves to `None` when the thread is fully seen.

use std::collections::HashMap;

use asupersync::{Cx, Outcome};
use sqlmodel_core::Value;

use crate::batch::{BatchSource, CachePolicy};
use crate::counts::LoaderContext;
use crate::error::DbError;
use crate::queries::{
    MAX_IN_CLAUSE_ITEMS, acquire_conn, decode_message_rows, map_sql_outcome, placeholders,
    tracked, traw_query,
};

/// Batched resolver for the first unseen message id per thread.
pub struct FirstUnseenMessage {
    ctx: LoaderContext,
}

impl FirstUnseenMessage {
    #[must_use]
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl BatchSource for FirstUnseenMessage {
    type Key = i64;
    type Value = Option<i64>;

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::PerRequest
    }

    fn absent_value(&self) -> Option<i64> {
        None
    }

    async fn load_batch(
        &self,
        cx: &Cx,
        keys: &[i64],
    ) -> Outcome<HashMap<i64, Option<i64>>, DbError> {
        let user_id = match self.ctx.viewer.require_user_id() {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e.into()),
        };

        let conn = crate::try_out!(acquire_conn(cx, &self.ctx.pool).await);
        let tracked = tracked(&*conn);

        let mut out: HashMap<i64, Option<i64>> = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(MAX_IN_CLAUSE_ITEMS) {
            let ph = placeholders(chunk.len());
            // Candidates come back oldest-first per thread; the first row the
            // permission filter lets through is the boundary.
            let sql = format!(
                "SELECT m.id, m.thread_id, m.org_id, m.source_id, m.kind, m.content, \
                        m.ts, m.deleted_ts, m.imported \
                 FROM messages m \
                 LEFT JOIN thread_participants tp \
                   ON tp.thread_id = m.thread_id AND tp.user_id = ? \
                 WHERE m.thread_id IN ({ph}) \
                   AND m.deleted_ts IS NULL \
                   AND m.source_id <> ? \
                   AND (tp.last_seen_ts IS NULL OR m.ts > tp.last_seen_ts) \
                 ORDER BY m.thread_id ASC, m.ts ASC, m.id ASC"
            );
            let mut params: Vec<Value> = Vec::with_capacity(chunk.len() + 2);
            params.push(Value::BigInt(user_id));
            params.extend(chunk.iter().map(|id| Value::BigInt(*id)));
            params.push(Value::BigInt(user_id));

            let rows = crate::try_out!(map_sql_outcome(
                traw_query(cx, &tracked, &sql, &params).await
            ));
            let candidates = match decode_message_rows(&rows) {
                Ok(v) => v,
                Err(e) => return Outcome::Err(e),
            };
            for message in &candidates {
                if out.get(&message.thread_id).is_some_and(Option::is_some) {
                    continue; // boundary already found for this thread
                }
                if self.ctx.acl.can_see_message(&self.ctx.viewer, message) {
                    out.insert(message.thread_id, message.id);
                }
            }
        }
        Outcome::Ok(out)
    }
}
