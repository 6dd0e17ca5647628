//! Collection query builder.
//!
//! Builds one dynamic, parameterized query listing threads that match a
//! structured filter, applies a derived-timestamp sort with keyset
//! pagination, and post-filters the page through the permission filter via
//! the filtered pager.
//!
//! SQL text only ever contains `?` placeholders; values only ever travel
//! through the bind list. Fragments are accumulated in order, so bind
//! positions fall out of fragment push order — never from string
//! interpolation of values.

use asupersync::{Cx, Outcome};
use sqlmodel_core::Value;
use threadline_core::{
    SortBy, SortDirection, TenantScope, ThreadCollectionFilter, ViewerRelation,
};

use crate::counts::LoaderContext;
use crate::error::DbError;
use crate::models::ThreadRow;
use crate::pager::{FilteredPage, PageSource, filtered_page};
use crate::queries::{
    acquire_conn, decode_thread_row, map_sql_outcome, placeholders, tracked, traw_query,
};

// =============================================================================
// Fragment builder
// =============================================================================

/// An ordered accumulation of join fragments, where-clause fragments, and
/// their bind values.
///
/// Joins are emitted before the where clause in the assembled SQL, so join
/// binds and condition binds are tracked separately and concatenated in
/// emission order — bind positions always derive from fragment order, never
/// from the order filter branches happened to run in.
#[derive(Debug, Default)]
pub(crate) struct FragmentBuilder {
    joins: Vec<String>,
    conds: Vec<String>,
    join_binds: Vec<Value>,
    cond_binds: Vec<Value>,
}

impl FragmentBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a join clause. Binds referenced by the join must be pushed in
    /// the same call so positions stay aligned with the SQL text.
    pub(crate) fn join(&mut self, sql: impl Into<String>, binds: Vec<Value>) {
        self.joins.push(sql.into());
        self.join_binds.extend(binds);
    }

    /// Append a where-clause conjunct with its binds.
    pub(crate) fn cond(&mut self, sql: impl Into<String>, binds: Vec<Value>) {
        self.conds.push(sql.into());
        self.cond_binds.extend(binds);
    }

    pub(crate) fn join_sql(&self) -> String {
        self.joins.join(" ")
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.conds.is_empty() {
            "1=1".to_string()
        } else {
            self.conds.join(" AND ")
        }
    }

    /// All binds in emission order: joins first, then conditions.
    pub(crate) fn binds(&self) -> Vec<Value> {
        let mut binds =
            Vec::with_capacity(self.join_binds.len() + self.cond_binds.len());
        binds.extend(self.join_binds.iter().cloned());
        binds.extend(self.cond_binds.iter().cloned());
        binds
    }

    pub(crate) fn into_binds(self) -> Vec<Value> {
        let mut binds = self.join_binds;
        binds.extend(self.cond_binds);
        binds
    }

    /// Placeholder count across all accumulated fragments.
    pub(crate) fn placeholder_count(&self) -> usize {
        self.joins
            .iter()
            .chain(self.conds.iter())
            .map(|sql| sql.matches('?').count())
            .sum()
    }
}

/// Convert a JSON scalar into a bindable SQL value, matching what SQLite's
/// `json_extract` returns for that scalar (booleans come back as 0/1).
fn json_scalar_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Bool(b) => Some(Value::BigInt(i64::from(*b))),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::BigInt(i))
            } else {
                n.as_f64().map(Value::Double)
            }
        }
        serde_json::Value::String(s) => Some(Value::Text(s.clone())),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            None
        }
    }
}

/// A `$."key"` JSON path for `json_extract`, with the key bound as a value.
fn json_path_for_key(key: &str) -> Result<String, DbError> {
    if key.contains('"') {
        return Err(DbError::invalid(
            "metadata",
            format!("metadata key must not contain '\"': {key}"),
        ));
    }
    Ok(format!("$.\"{key}\""))
}

/// Append one `json_extract(column, ?) = ?` conjunct per key/value pair.
fn push_json_containment(
    fragments: &mut FragmentBuilder,
    column: &str,
    entries: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), DbError> {
    for (key, value) in entries {
        let path = json_path_for_key(key)?;
        match value {
            serde_json::Value::Null => {
                fragments.cond(
                    format!("json_extract({column}, ?) IS NULL"),
                    vec![Value::Text(path)],
                );
            }
            other => {
                let Some(bound) = json_scalar_to_value(other) else {
                    return Err(DbError::invalid(
                        "metadata",
                        format!("nested objects are not supported in containment filters: {key}"),
                    ));
                };
                fragments.cond(
                    format!("json_extract({column}, ?) = ?"),
                    vec![Value::Text(path), bound],
                );
            }
        }
    }
    Ok(())
}

/// Build the join/where fragments for a tenant scope and filter. Shared with
/// the activity summary aggregator, which wraps them in its derived table.
pub(crate) fn build_filter_fragments(
    ctx: &LoaderContext,
    scope: &TenantScope,
    filter: &ThreadCollectionFilter,
) -> Result<FragmentBuilder, DbError> {
    let mut fragments = FragmentBuilder::new();

    // Base tenant predicate, always present.
    match scope {
        TenantScope::Orgs(org_ids) => {
            if org_ids.is_empty() {
                return Err(DbError::Precondition(
                    "collection query requires a non-empty org scope".to_string(),
                ));
            }
            let ph = placeholders(org_ids.len());
            fragments.cond(
                format!("t.org_id IN ({ph})"),
                org_ids.iter().map(|id| Value::BigInt(*id)).collect(),
            );
        }
        TenantScope::Application(application_id) => {
            fragments.cond(
                "t.platform_application_id = ?",
                vec![Value::BigInt(*application_id)],
            );
        }
    }

    if let Some(resolved) = filter.resolved {
        if resolved {
            fragments.cond("t.resolved_ts IS NOT NULL", vec![]);
        } else {
            fragments.cond("t.resolved_ts IS NULL", vec![]);
        }
    }

    if let Some(metadata) = &filter.metadata {
        push_json_containment(&mut fragments, "t.metadata", metadata)?;
    }

    if let Some(location) = &filter.location {
        fragments.join(
            "JOIN pages p ON p.org_id = t.org_id AND p.context_hash = t.page_context_hash",
            vec![],
        );
        if filter.partial_match {
            push_json_containment(&mut fragments, "p.context_data", &location.0)?;
        } else {
            fragments.cond(
                "p.context_hash = ?",
                vec![Value::Text(location.context_hash())],
            );
        }
    }

    if !filter.viewer.is_empty() {
        let user_id = ctx.viewer.require_user_id()?;

        // Relations are OR'd together. `Subscribed` alone uses the inner
        // join form; combined with others it degrades to a LEFT JOIN so the
        // OR can still admit threads the viewer never joined.
        let only_subscribed =
            filter.viewer.len() == 1 && filter.viewer[0] == ViewerRelation::Subscribed;

        if only_subscribed {
            fragments.join(
                "JOIN thread_participants vp ON vp.thread_id = t.id AND vp.user_id = ?",
                vec![Value::BigInt(user_id)],
            );
            fragments.cond("vp.subscribed = 1", vec![]);
        } else {
            let mut needs_participant_join = false;
            let mut ors: Vec<String> = Vec::new();
            let mut or_binds: Vec<Value> = Vec::new();
            for relation in &filter.viewer {
                // Exhaustive on purpose: a new relation variant must be
                // given a branch here before this compiles.
                match relation {
                    ViewerRelation::Subscribed => {
                        needs_participant_join = true;
                        ors.push("COALESCE(vp.subscribed, 0) = 1".to_string());
                    }
                    ViewerRelation::Mentioned => {
                        ors.push(
                            "EXISTS (SELECT 1 FROM message_mentions mm \
                             JOIN messages m2 ON m2.id = mm.message_id \
                             WHERE m2.thread_id = t.id AND mm.user_id = ? \
                               AND m2.deleted_ts IS NULL AND m2.kind = 'user_message')"
                                .to_string(),
                        );
                        or_binds.push(Value::BigInt(user_id));
                    }
                }
            }
            if needs_participant_join {
                fragments.join(
                    "LEFT JOIN thread_participants vp ON vp.thread_id = t.id AND vp.user_id = ?",
                    vec![Value::BigInt(user_id)],
                );
            }
            fragments.cond(format!("({})", ors.join(" OR ")), or_binds);
        }
    }

    Ok(fragments)
}

/// The derived order-by expression for a sort mode, as SQL text. Appears in
/// both the select list and (for cursors) the where clause.
const fn order_expr(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::FirstMessageTimestamp => {
            "(SELECT MIN(m.ts) FROM messages m \
             WHERE m.thread_id = t.id AND m.deleted_ts IS NULL)"
        }
        SortBy::MostRecentMessageTimestamp => {
            "(SELECT MAX(m.ts) FROM messages m \
             WHERE m.thread_id = t.id AND m.deleted_ts IS NULL)"
        }
    }
}

// =============================================================================
// Thread page source
// =============================================================================

/// A page of threads plus continuation state.
pub type ThreadPage = FilteredPage<ThreadRow>;

struct ThreadPageSource<'a> {
    ctx: &'a LoaderContext,
    scope: &'a TenantScope,
    filter: &'a ThreadCollectionFilter,
    sort_by: SortBy,
    direction: SortDirection,
    strict_org_check: bool,
}

impl ThreadPageSource<'_> {
    /// Resolve the order value of the cursor thread. Keyset math does not
    /// require the cursor row to be visible — only its position.
    async fn cursor_order_value(
        &self,
        cx: &Cx,
        after_thread_id: i64,
    ) -> Outcome<Option<i64>, DbError> {
        let conn = crate::try_out!(acquire_conn(cx, &self.ctx.pool).await);
        let tracked = tracked(&*conn);

        let agg = match self.sort_by {
            SortBy::FirstMessageTimestamp => "MIN",
            SortBy::MostRecentMessageTimestamp => "MAX",
        };
        let sql = format!(
            "SELECT {agg}(m.ts) AS order_ts FROM messages m \
             WHERE m.thread_id = ? AND m.deleted_ts IS NULL"
        );
        let params = [Value::BigInt(after_thread_id)];
        let rows = crate::try_out!(map_sql_outcome(
            traw_query(cx, &tracked, &sql, &params).await
        ));
        let order_ts = rows
            .first()
            .and_then(|r| r.get_named::<Option<i64>>("order_ts").ok())
            .flatten();
        Outcome::Ok(order_ts)
    }
}

impl PageSource for ThreadPageSource<'_> {
    type Item = ThreadRow;

    async fn fetch_page(
        &self,
        cx: &Cx,
        cursor: Option<i64>,
        limit: usize,
    ) -> Outcome<Vec<ThreadRow>, DbError> {
        let fragments = match build_filter_fragments(self.ctx, self.scope, self.filter) {
            Ok(f) => f,
            Err(e) => return Outcome::Err(e),
        };

        let oe = order_expr(self.sort_by);
        let ascending = self.direction == SortDirection::Ascending;

        let mut sql = format!(
            "SELECT t.id, t.org_id, t.platform_application_id, t.page_context_hash, \
                    t.name, t.url, t.metadata, t.extra_classnames, t.resolved, \
                    t.resolved_ts, t.created_ts \
             FROM threads t {} WHERE {}",
            fragments.join_sql(),
            fragments.where_sql()
        );
        let mut params = fragments.into_binds();

        if let Some(after_thread_id) = cursor {
            let cursor_order = crate::try_out!(self.cursor_order_value(cx, after_thread_id).await);
            match cursor_order {
                Some(order_ts) => {
                    // Strictly beyond the cursor in the sort direction, with
                    // the id tiebreak at equal order values. Null-ordered
                    // rows sort last in either direction, so they are always
                    // "beyond" a non-null cursor.
                    if ascending {
                        sql.push_str(&format!(
                            " AND ({oe} > ? OR ({oe} = ? AND t.id > ?) OR {oe} IS NULL)"
                        ));
                    } else {
                        sql.push_str(&format!(
                            " AND ({oe} < ? OR ({oe} = ? AND t.id < ?) OR {oe} IS NULL)"
                        ));
                    }
                    params.push(Value::BigInt(order_ts));
                    params.push(Value::BigInt(order_ts));
                    params.push(Value::BigInt(after_thread_id));
                }
                None => {
                    // Cursor sits in the null tail; only later null rows follow.
                    if ascending {
                        sql.push_str(&format!(" AND {oe} IS NULL AND t.id > ?"));
                    } else {
                        sql.push_str(&format!(" AND {oe} IS NULL AND t.id < ?"));
                    }
                    params.push(Value::BigInt(after_thread_id));
                }
            }
        }

        let dir = if ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(
            " ORDER BY {oe} IS NULL ASC, {oe} {dir}, t.id {dir} LIMIT ?"
        ));
        let Ok(limit_i64) = i64::try_from(limit) else {
            return Outcome::Err(DbError::invalid("limit", "limit exceeds i64::MAX"));
        };
        params.push(Value::BigInt(limit_i64));

        let conn = crate::try_out!(acquire_conn(cx, &self.ctx.pool).await);
        let tracked = tracked(&*conn);
        let rows = crate::try_out!(map_sql_outcome(
            traw_query(cx, &tracked, &sql, &params).await
        ));

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_thread_row(row) {
                Ok(thread) => out.push(thread),
                Err(e) => return Outcome::Err(e),
            }
        }
        Outcome::Ok(out)
    }

    fn cursor_for(&self, item: &ThreadRow) -> i64 {
        item.id.unwrap_or(0)
    }

    fn is_visible(&self, item: &ThreadRow) -> bool {
        self.ctx
            .acl
            .can_see_thread(&self.ctx.viewer, item, self.strict_org_check)
    }
}

/// List threads matching `filter` under `scope`, sorted and keyset-paginated.
///
/// `after` is an opaque cursor: the id of the last thread of the previous
/// page. The returned page's cursor is always the id of the last thread
/// actually delivered.
pub async fn thread_collection_page(
    cx: &Cx,
    ctx: &LoaderContext,
    scope: &TenantScope,
    filter: &ThreadCollectionFilter,
    sort_by: SortBy,
    direction: SortDirection,
    limit: usize,
    after: Option<i64>,
) -> Outcome<ThreadPage, DbError> {
    // Org scoping already restricts rows to the viewer's tenants, so the
    // post-filter runs in strict mode. Application scoping bypasses the
    // org-level WHERE and relies on the permission filter instead.
    let strict_org_check = matches!(scope, TenantScope::Orgs(_));

    let source = ThreadPageSource {
        ctx,
        scope,
        filter,
        sort_by,
        direction,
        strict_org_check,
    };
    filtered_page(cx, &source, after, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::{AllowAllVisibility, VisibilityHandle};
    use serde_json::json;
    use std::sync::Arc;
    use threadline_core::{Location, Viewer};

    fn test_ctx() -> LoaderContext {
        let pool = crate::pool::DbPool::new(&crate::pool::DbPoolConfig {
            database_url: "sqlite:///./unused-fragment-tests.db".to_string(),
            ..Default::default()
        })
        .expect("pool");
        let acl: VisibilityHandle = Arc::new(AllowAllVisibility);
        LoaderContext::new(pool, Viewer::new(7, vec![1, 2]), acl)
    }

    fn map_of(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn fragment_binds_align_with_placeholders() {
        let ctx = test_ctx();
        let filter = ThreadCollectionFilter {
            location: Some(Location::new(map_of(&[("page", json!("/docs"))]))),
            partial_match: true,
            metadata: Some(map_of(&[("priority", json!(2)), ("color", json!("red"))])),
            viewer: vec![ViewerRelation::Subscribed, ViewerRelation::Mentioned],
            resolved: Some(false),
        };
        let fragments =
            build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1, 2]), &filter).unwrap();
        assert_eq!(fragments.placeholder_count(), fragments.binds().len());
    }

    #[test]
    fn empty_filter_is_tenant_scope_only() {
        let ctx = test_ctx();
        let fragments = build_filter_fragments(
            &ctx,
            &TenantScope::Orgs(vec![1]),
            &ThreadCollectionFilter::default(),
        )
        .unwrap();
        assert_eq!(fragments.join_sql(), "");
        assert_eq!(fragments.where_sql(), "t.org_id IN (?)");
        assert_eq!(fragments.binds().len(), 1);
    }

    #[test]
    fn empty_org_scope_fails_fast() {
        let ctx = test_ctx();
        let err = build_filter_fragments(
            &ctx,
            &TenantScope::Orgs(vec![]),
            &ThreadCollectionFilter::default(),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "PRECONDITION_FAILED");
    }

    #[test]
    fn subscribed_alone_uses_inner_join() {
        let ctx = test_ctx();
        let filter = ThreadCollectionFilter {
            viewer: vec![ViewerRelation::Subscribed],
            ..Default::default()
        };
        let fragments =
            build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap();
        assert!(fragments.join_sql().starts_with("JOIN thread_participants"));
        assert!(fragments.where_sql().contains("vp.subscribed = 1"));
    }

    #[test]
    fn combined_viewer_relations_are_ored() {
        let ctx = test_ctx();
        let filter = ThreadCollectionFilter {
            viewer: vec![ViewerRelation::Subscribed, ViewerRelation::Mentioned],
            ..Default::default()
        };
        let fragments =
            build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap();
        assert!(fragments.join_sql().starts_with("LEFT JOIN thread_participants"));
        let where_sql = fragments.where_sql();
        assert!(where_sql.contains("COALESCE(vp.subscribed, 0) = 1 OR EXISTS"));
    }

    #[test]
    fn join_binds_precede_cond_binds() {
        // The participant join is built by the viewer branch, which runs
        // after the metadata branch — but its placeholder appears first in
        // the assembled SQL, so its bind must come first too.
        let ctx = test_ctx();
        let filter = ThreadCollectionFilter {
            metadata: Some(map_of(&[("priority", json!(2))])),
            viewer: vec![ViewerRelation::Subscribed, ViewerRelation::Mentioned],
            ..Default::default()
        };
        let fragments =
            build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap();
        let binds = fragments.binds();
        assert!(
            matches!(binds[0], Value::BigInt(7)),
            "first bind is the join's viewer id, not the first cond bind"
        );
    }

    #[test]
    fn viewer_filter_without_identity_fails_fast() {
        let pool = crate::pool::DbPool::new(&crate::pool::DbPoolConfig {
            database_url: "sqlite:///./unused-fragment-tests.db".to_string(),
            ..Default::default()
        })
        .expect("pool");
        let acl: VisibilityHandle = Arc::new(AllowAllVisibility);
        let anonymous = Viewer {
            user_id: None,
            org_ids: vec![1],
            platform_application_id: None,
        };
        let ctx = LoaderContext::new(pool, anonymous, acl);

        let filter = ThreadCollectionFilter {
            viewer: vec![ViewerRelation::Mentioned],
            ..Default::default()
        };
        let err = build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap_err();
        assert_eq!(err.error_code(), "PRECONDITION_FAILED");
    }

    #[test]
    fn exact_location_binds_the_context_hash() {
        let ctx = test_ctx();
        let location = Location::new(map_of(&[("page", json!("/docs"))]));
        let expected_hash = location.context_hash();
        let filter = ThreadCollectionFilter {
            location: Some(location),
            ..Default::default()
        };
        let fragments =
            build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap();
        assert!(fragments.join_sql().contains("JOIN pages p"));
        assert!(fragments.where_sql().contains("p.context_hash = ?"));
        assert!(
            fragments
                .binds()
                .iter()
                .any(|v| matches!(v, Value::Text(s) if *s == expected_hash))
        );
    }

    #[test]
    fn metadata_keys_become_bound_json_paths() {
        let ctx = test_ctx();
        let filter = ThreadCollectionFilter {
            metadata: Some(map_of(&[("priority", json!(2))])),
            ..Default::default()
        };
        let fragments =
            build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap();
        assert!(fragments.where_sql().contains("json_extract(t.metadata, ?) = ?"));
        assert!(
            fragments
                .binds()
                .iter()
                .any(|v| matches!(v, Value::Text(s) if s == "$.\"priority\""))
        );
    }

    #[test]
    fn metadata_null_matches_with_is_null() {
        let ctx = test_ctx();
        let filter = ThreadCollectionFilter {
            metadata: Some(map_of(&[("archived", serde_json::Value::Null)])),
            ..Default::default()
        };
        let fragments =
            build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap();
        assert!(fragments.where_sql().contains("json_extract(t.metadata, ?) IS NULL"));
    }

    #[test]
    fn metadata_key_with_quote_is_rejected() {
        let ctx = test_ctx();
        let filter = ThreadCollectionFilter {
            metadata: Some(map_of(&[("bad\"key", json!(1))])),
            ..Default::default()
        };
        assert!(build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).is_err());
    }

    #[test]
    fn resolved_tri_state() {
        let ctx = test_ctx();
        for (resolved, expected) in [
            (Some(true), "t.resolved_ts IS NOT NULL"),
            (Some(false), "t.resolved_ts IS NULL"),
        ] {
            let filter = ThreadCollectionFilter {
                resolved,
                ..Default::default()
            };
            let fragments =
                build_filter_fragments(&ctx, &TenantScope::Orgs(vec![1]), &filter).unwrap();
            assert!(fragments.where_sql().contains(expected));
        }

        let unset = build_filter_fragments(
            &ctx,
            &TenantScope::Orgs(vec![1]),
            &ThreadCollectionFilter::default(),
        )
        .unwrap();
        assert!(!unset.where_sql().contains("resolved_ts"));
    }

    #[test]
    fn application_scope_binds_application_id() {
        let ctx = test_ctx();
        let fragments = build_filter_fragments(
            &ctx,
            &TenantScope::Application(42),
            &ThreadCollectionFilter::default(),
        )
        .unwrap();
        assert_eq!(fragments.where_sql(), "t.platform_application_id = ?");
        assert!(matches!(fragments.binds()[0], Value::BigInt(42)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_scalar() -> impl Strategy<Value = serde_json::Value> {
            prop_oneof![
                any::<bool>().prop_map(serde_json::Value::from),
                any::<i64>().prop_map(serde_json::Value::from),
                "[a-z0-9 /._-]{0,12}".prop_map(serde_json::Value::from),
                Just(serde_json::Value::Null),
            ]
        }

        fn arb_map() -> impl Strategy<Value = serde_json::Map<String, serde_json::Value>> {
            proptest::collection::btree_map("[a-z_][a-z0-9_]{0,8}", arb_scalar(), 0..5)
                .prop_map(|m| m.into_iter().collect())
        }

        fn arb_filter() -> impl Strategy<Value = ThreadCollectionFilter> {
            (
                proptest::option::of(arb_map()),
                any::<bool>(),
                proptest::option::of(arb_map()),
                proptest::sample::subsequence(
                    vec![ViewerRelation::Subscribed, ViewerRelation::Mentioned],
                    0..=2,
                ),
                proptest::option::of(any::<bool>()),
            )
                .prop_map(|(location, partial_match, metadata, viewer, resolved)| {
                    ThreadCollectionFilter {
                        location: location.map(Location::new),
                        partial_match,
                        metadata,
                        viewer,
                        resolved,
                    }
                })
        }

        proptest! {
            // Placeholder positions must always align with the bind list; a
            // drift here is an injection-shaped bug, not a cosmetic one.
            #[test]
            fn binds_always_align_with_placeholders(
                filter in arb_filter(),
                org_ids in proptest::collection::vec(1_i64..100, 1..4),
            ) {
                let ctx = test_ctx();
                if let Ok(fragments) =
                    build_filter_fragments(&ctx, &TenantScope::Orgs(org_ids), &filter)
                {
                    prop_assert_eq!(fragments.placeholder_count(), fragments.binds().len());
                }
            }
        }
    }
}
