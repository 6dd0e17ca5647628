//! Viewer context, filter value objects, and aggregate count types.
//!
//! These are the inputs and outputs of the data-access layer: everything a
//! caller hands to the collection query builder or the activity summary
//! aggregator lives here, with no database dependencies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// =============================================================================
// Viewer
// =============================================================================

/// The authenticated viewer on whose behalf all reads are executed.
///
/// Several queries fail fast if the viewer lacks a user identity, an org
/// scope, or a platform application — missing scope is a programming error in
/// the request layer, never something to silently default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    /// The current user, if any (service accounts have none).
    pub user_id: Option<i64>,
    /// Orgs the viewer is scoped to. Empty means "no org scope established".
    pub org_ids: Vec<i64>,
    /// The platform application this request belongs to.
    pub platform_application_id: Option<i64>,
}

impl Viewer {
    #[must_use]
    pub fn new(user_id: i64, org_ids: Vec<i64>) -> Self {
        Self {
            user_id: Some(user_id),
            org_ids,
            platform_application_id: None,
        }
    }

    #[must_use]
    pub fn with_application(mut self, application_id: i64) -> Self {
        self.platform_application_id = Some(application_id);
        self
    }

    /// The viewer's user id, or a precondition error.
    pub fn require_user_id(&self) -> Result<i64> {
        self.user_id.ok_or(Error::MissingViewerIdentity)
    }

    /// The viewer's org scope, or a precondition error when empty.
    pub fn require_org_ids(&self) -> Result<&[i64]> {
        if self.org_ids.is_empty() {
            return Err(Error::MissingOrgScope);
        }
        Ok(&self.org_ids)
    }

    /// The viewer's platform application id, or a precondition error.
    pub fn require_application_id(&self) -> Result<i64> {
        self.platform_application_id
            .ok_or(Error::MissingApplicationScope)
    }

    /// Whether the given org is within the viewer's scope.
    #[must_use]
    pub fn is_member_of(&self, org_id: i64) -> bool {
        self.org_ids.contains(&org_id)
    }
}

// =============================================================================
// Location
// =============================================================================

/// An application-defined page location: an opaque key/value object.
///
/// Locations are matched either exactly (by a hash of the canonical JSON
/// encoding, so equality is a single indexed comparison) or partially (the
/// stored location must contain every given key/value pair).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location(pub serde_json::Map<String, serde_json::Value>);

impl Location {
    #[must_use]
    pub fn new(entries: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(entries)
    }

    /// Canonical JSON encoding: object keys sorted lexicographically.
    ///
    /// The hash must not depend on caller-side key order, so the map is
    /// re-serialized through a `BTreeMap` before hashing.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        let sorted: BTreeMap<&String, &serde_json::Value> = self.0.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_else(|_| "{}".to_string())
    }

    /// Lowercase hex SHA-256 of the canonical JSON encoding.
    ///
    /// This is the value stored in `pages.context_hash` and used for indexed
    /// equality matching.
    #[must_use]
    pub fn context_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        hex::encode(hasher.finalize())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

// =============================================================================
// Collection filter
// =============================================================================

/// Viewer-relationship filter values. Multiple values are OR'd together.
///
/// The collection query builder matches on this exhaustively: adding a
/// variant without updating every builder branch is a compile error, not a
/// silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRelation {
    /// Threads the viewer is subscribed to.
    Subscribed,
    /// Threads containing a non-deleted user message that mentions the viewer.
    Mentioned,
}

/// A structured filter over a collection of threads.
///
/// An empty/unset filter matches every thread visible to the viewer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadCollectionFilter {
    /// Restrict to threads on this location.
    pub location: Option<Location>,
    /// When set with `location`, match threads whose location contains the
    /// given pairs rather than requiring exact equality.
    pub partial_match: bool,
    /// Threads whose metadata is a superset of these pairs.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Viewer-relationship requirements, OR'd together.
    pub viewer: Vec<ViewerRelation>,
    /// Tri-state resolved filter: `None` means "any".
    pub resolved: Option<bool>,
}

impl ThreadCollectionFilter {
    /// Whether this filter constrains anything beyond tenant scope.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.location.is_none()
            && self.metadata.is_none()
            && self.viewer.is_empty()
            && self.resolved.is_none()
    }
}

// =============================================================================
// Sort and pagination inputs
// =============================================================================

/// Which derived per-thread timestamp orders a collection listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    FirstMessageTimestamp,
    MostRecentMessageTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// How a collection query is scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Scope by an explicit org id set (the common case).
    Orgs(Vec<i64>),
    /// Scope by platform application id, bypassing org-level `WHERE`. Rows
    /// are post-filtered through the permission filter instead.
    Application(i64),
}

impl TenantScope {
    /// The common scope: the viewer's own org set. Fails fast when the
    /// viewer has no org scope established.
    pub fn for_viewer_orgs(viewer: &Viewer) -> Result<Self> {
        Ok(Self::Orgs(viewer.require_org_ids()?.to_vec()))
    }

    /// The permission-aggregated scope: the viewer's platform application.
    pub fn for_viewer_application(viewer: &Viewer) -> Result<Self> {
        Ok(Self::Application(viewer.require_application_id()?))
    }
}

// =============================================================================
// ThreadCounts
// =============================================================================

/// Cross-thread activity counts for a filter.
///
/// All six counts are computed from the same per-thread row set in a single
/// query, so they are mutually consistent under concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCounts {
    /// Threads with at least one non-deleted user message.
    pub total: u64,
    /// Unresolved threads with at least one unread message.
    pub unread: u64,
    /// Unread threads the viewer is subscribed to.
    pub unread_subscribed: u64,
    /// Resolved threads.
    pub resolved: u64,
    /// Unresolved threads the viewer has never seen at all.
    pub new: u64,
    /// Threads with no non-deleted user message.
    pub empty: u64,
}

impl ThreadCounts {
    /// Check the structural invariants that hold for any consistent snapshot.
    ///
    /// Used by tests; production code trusts the single-query construction.
    #[must_use]
    pub const fn invariants_hold(&self) -> bool {
        self.unread_subscribed <= self.unread
            && self.unread <= self.total
            && self.new <= self.unread
            && self.resolved <= self.total + self.empty
            && self.new <= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location_of(pairs: &[(&str, serde_json::Value)]) -> Location {
        let mut map = serde_json::Map::new();
        for (k, v) in pairs {
            map.insert((*k).to_string(), v.clone());
        }
        Location::new(map)
    }

    // ── Viewer ──────────────────────────────────────────────────────

    #[test]
    fn viewer_require_user_id() {
        let viewer = Viewer::new(7, vec![1]);
        assert_eq!(viewer.require_user_id().unwrap(), 7);

        let anonymous = Viewer {
            user_id: None,
            org_ids: vec![1],
            platform_application_id: None,
        };
        assert!(matches!(
            anonymous.require_user_id(),
            Err(Error::MissingViewerIdentity)
        ));
    }

    #[test]
    fn viewer_require_org_ids_rejects_empty() {
        let viewer = Viewer::new(7, vec![]);
        assert!(matches!(
            viewer.require_org_ids(),
            Err(Error::MissingOrgScope)
        ));

        let scoped = Viewer::new(7, vec![3, 4]);
        assert_eq!(scoped.require_org_ids().unwrap(), &[3, 4]);
    }

    #[test]
    fn viewer_application_scope() {
        let viewer = Viewer::new(7, vec![1]).with_application(99);
        assert_eq!(viewer.require_application_id().unwrap(), 99);
        assert!(viewer.is_member_of(1));
        assert!(!viewer.is_member_of(2));
    }

    // ── Location ────────────────────────────────────────────────────

    #[test]
    fn location_hash_is_key_order_independent() {
        let a = location_of(&[("page", json!("/docs")), ("section", json!(2))]);
        let b = location_of(&[("section", json!(2)), ("page", json!("/docs"))]);
        assert_eq!(a.context_hash(), b.context_hash());
    }

    #[test]
    fn location_hash_distinguishes_values() {
        let a = location_of(&[("page", json!("/docs"))]);
        let b = location_of(&[("page", json!("/blog"))]);
        assert_ne!(a.context_hash(), b.context_hash());
    }

    #[test]
    fn location_hash_is_hex_sha256() {
        let hash = location_of(&[("page", json!("/docs"))]).context_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_location_canonical_json() {
        assert_eq!(Location::default().canonical_json(), "{}");
    }

    // ── Filter ──────────────────────────────────────────────────────

    #[test]
    fn default_filter_is_unconstrained() {
        assert!(ThreadCollectionFilter::default().is_unconstrained());
    }

    #[test]
    fn filter_with_resolved_is_constrained() {
        let filter = ThreadCollectionFilter {
            resolved: Some(true),
            ..Default::default()
        };
        assert!(!filter.is_unconstrained());
    }

    #[test]
    fn viewer_relation_serde_names() {
        assert_eq!(
            serde_json::to_string(&ViewerRelation::Subscribed).unwrap(),
            "\"subscribed\""
        );
        assert_eq!(
            serde_json::to_string(&ViewerRelation::Mentioned).unwrap(),
            "\"mentioned\""
        );
    }

    // ── TenantScope ─────────────────────────────────────────────────

    #[test]
    fn tenant_scope_from_viewer() {
        let viewer = Viewer::new(7, vec![3, 4]).with_application(99);
        assert_eq!(
            TenantScope::for_viewer_orgs(&viewer).unwrap(),
            TenantScope::Orgs(vec![3, 4])
        );
        assert_eq!(
            TenantScope::for_viewer_application(&viewer).unwrap(),
            TenantScope::Application(99)
        );

        let unscoped = Viewer::new(7, vec![]);
        assert!(TenantScope::for_viewer_orgs(&unscoped).is_err());
        assert!(TenantScope::for_viewer_application(&unscoped).is_err());
    }

    // ── ThreadCounts ────────────────────────────────────────────────

    #[test]
    fn counts_invariants_hold_for_consistent_snapshot() {
        let counts = ThreadCounts {
            total: 10,
            unread: 4,
            unread_subscribed: 2,
            resolved: 3,
            new: 1,
            empty: 2,
        };
        assert!(counts.invariants_hold());
    }

    #[test]
    fn counts_invariants_catch_inconsistency() {
        let counts = ThreadCounts {
            total: 2,
            unread: 5,
            ..Default::default()
        };
        assert!(!counts.invariants_hold());
    }
}
