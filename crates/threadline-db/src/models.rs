//! Database models using sqlmodel derive macros
//!
//! These models map directly to `SQLite` tables. All datetime fields use
//! `i64` (microseconds since Unix epoch) for sqlmodel compatibility, and all
//! booleans are stored as `INTEGER 0/1`.

use serde::{Deserialize, Serialize};
use sqlmodel::Model;

use crate::timestamps::now_micros;

/// Message kind for rows authored by a person.
pub const MESSAGE_KIND_USER: &str = "user_message";
/// Message kind for system-generated rows (resolve/unresolve actions etc).
pub const MESSAGE_KIND_ACTION: &str = "action_message";

// =============================================================================
// Org
// =============================================================================

/// A tenant organization. Every thread and message belongs to exactly one.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "orgs")]
pub struct OrgRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub name: String,

    /// The platform application this org belongs to.
    pub platform_application_id: i64,

    /// Microseconds since Unix epoch
    pub created_ts: i64,
}

impl Default for OrgRow {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            platform_application_id: 0,
            created_ts: now_micros(),
        }
    }
}

impl OrgRow {
    #[must_use]
    pub fn new(name: String, platform_application_id: i64) -> Self {
        Self {
            id: None,
            name,
            platform_application_id,
            created_ts: now_micros(),
        }
    }
}

// =============================================================================
// Page
// =============================================================================

/// A page location row: the denormalized index for location filters.
///
/// `context_hash` is the lowercase hex SHA-256 of the canonical location
/// JSON (see `threadline_core::Location::context_hash`), giving indexed
/// equality; `context_data` keeps the raw object for partial-match queries.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "pages")]
pub struct PageRow {
    // Composite primary key: (org_id, context_hash)
    pub org_id: i64,
    pub context_hash: String,

    /// Canonical JSON object of the location key/value pairs.
    pub context_data: String,

    pub created_ts: i64,
}

impl Default for PageRow {
    fn default() -> Self {
        Self {
            org_id: 0,
            context_hash: String::new(),
            context_data: "{}".to_string(),
            created_ts: now_micros(),
        }
    }
}

// =============================================================================
// Thread
// =============================================================================

/// A conversation thread anchored to a page location.
///
/// # Invariant
/// `resolved_ts` is non-null iff `resolved = 1`. Use [`ThreadRow::set_resolved`]
/// rather than writing the fields independently.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "threads")]
pub struct ThreadRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub org_id: i64,
    pub platform_application_id: i64,

    #[sqlmodel(nullable)]
    pub page_context_hash: Option<String>,

    #[sqlmodel(default = "''")]
    pub name: String,

    #[sqlmodel(default = "''")]
    pub url: String,

    /// Opaque key/value map, stored as a JSON object.
    #[sqlmodel(default = "'{}'")]
    pub metadata: String,

    #[sqlmodel(default = "''")]
    pub extra_classnames: String,

    #[sqlmodel(default = "0")]
    pub resolved: i64, // SQLite doesn't have bool, use 0/1

    #[sqlmodel(nullable)]
    pub resolved_ts: Option<i64>,

    pub created_ts: i64,
}

impl Default for ThreadRow {
    fn default() -> Self {
        Self {
            id: None,
            org_id: 0,
            platform_application_id: 0,
            page_context_hash: None,
            name: String::new(),
            url: String::new(),
            metadata: "{}".to_string(),
            extra_classnames: String::new(),
            resolved: 0,
            resolved_ts: None,
            created_ts: now_micros(),
        }
    }
}

impl ThreadRow {
    #[must_use]
    pub fn new(org_id: i64, platform_application_id: i64) -> Self {
        Self {
            org_id,
            platform_application_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn resolved_bool(&self) -> bool {
        self.resolved != 0
    }

    /// Toggle resolved state, keeping flag and timestamp in lockstep.
    pub fn set_resolved(&mut self, resolved: bool) {
        self.resolved = i64::from(resolved);
        self.resolved_ts = if resolved { Some(now_micros()) } else { None };
    }

    /// Parse the metadata JSON object (empty map on malformed data).
    #[must_use]
    pub fn metadata_map(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::from_str(&self.metadata).unwrap_or_default()
    }
}

// =============================================================================
// Message
// =============================================================================

/// A message within a thread.
///
/// Deletion is soft: `deleted_ts` is stamped and the row stays in place, so
/// ordering-sensitive computations (first-message rank) remain stable.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "messages")]
pub struct MessageRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub thread_id: i64,
    pub org_id: i64,

    /// Author user id.
    pub source_id: i64,

    /// `user_message` | `action_message`
    #[sqlmodel(default = "'user_message'")]
    pub kind: String,

    #[sqlmodel(default = "''")]
    pub content: String,

    pub ts: i64,

    #[sqlmodel(nullable)]
    pub deleted_ts: Option<i64>,

    /// Non-zero when the row was mirrored from an external system.
    #[sqlmodel(default = "0")]
    pub imported: i64,
}

impl Default for MessageRow {
    fn default() -> Self {
        Self {
            id: None,
            thread_id: 0,
            org_id: 0,
            source_id: 0,
            kind: MESSAGE_KIND_USER.to_string(),
            content: String::new(),
            ts: now_micros(),
            deleted_ts: None,
            imported: 0,
        }
    }
}

impl MessageRow {
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_ts.is_some()
    }

    #[must_use]
    pub fn is_user_message(&self) -> bool {
        self.kind == MESSAGE_KIND_USER
    }

    #[must_use]
    pub const fn is_imported(&self) -> bool {
        self.imported != 0
    }
}

// =============================================================================
// ThreadParticipant
// =============================================================================

/// Per-viewer thread state: last-seen watermark and subscription flag.
///
/// Created implicitly when a user sends a message or receives a mention in a
/// thread. `last_seen_ts = NULL` means the user has never viewed the thread;
/// unread computations treat it as negative infinity.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "thread_participants")]
pub struct ThreadParticipantRow {
    // Composite primary key: (thread_id, user_id)
    pub thread_id: i64,
    pub user_id: i64,
    pub org_id: i64,

    #[sqlmodel(nullable)]
    pub last_seen_ts: Option<i64>,

    #[sqlmodel(default = "1")]
    pub subscribed: i64, // SQLite bool as 0/1
}

impl Default for ThreadParticipantRow {
    fn default() -> Self {
        Self {
            thread_id: 0,
            user_id: 0,
            org_id: 0,
            last_seen_ts: None,
            subscribed: 1,
        }
    }
}

impl ThreadParticipantRow {
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed != 0
    }

    #[must_use]
    pub const fn has_seen(&self) -> bool {
        self.last_seen_ts.is_some()
    }
}

// =============================================================================
// MessageMention
// =============================================================================

/// A mention of a user within a message.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "message_mentions")]
pub struct MessageMentionRow {
    // Composite primary key: (message_id, user_id)
    pub message_id: i64,
    pub user_id: i64,
}

impl Default for MessageMentionRow {
    fn default() -> Self {
        Self {
            message_id: 0,
            user_id: 0,
        }
    }
}

// =============================================================================
// MessageReaction
// =============================================================================

/// A unicode reaction attached to a message.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "message_reactions")]
pub struct MessageReactionRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub message_id: i64,
    pub user_id: i64,
    pub unicode_reaction: String,
    pub ts: i64,
}

impl Default for MessageReactionRow {
    fn default() -> Self {
        Self {
            id: None,
            message_id: 0,
            user_id: 0,
            unicode_reaction: String::new(),
            ts: now_micros(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    // ── OrgRow ──────────────────────────────────────────────────────

    #[test]
    fn org_row_default_has_recent_timestamp() {
        let org = OrgRow::default();
        assert!(org.id.is_none());
        let now = now_micros();
        assert!((now - org.created_ts).abs() < 1_000_000);
    }

    #[test]
    fn org_row_new_sets_fields() {
        let org = OrgRow::new("acme".into(), 7);
        assert_eq!(org.name, "acme");
        assert_eq!(org.platform_application_id, 7);
        assert!(org.id.is_none());
    }

    // ── ThreadRow ───────────────────────────────────────────────────

    #[test]
    fn thread_row_default_values() {
        let thread = ThreadRow::default();
        assert!(thread.id.is_none());
        assert_eq!(thread.metadata, "{}");
        assert!(!thread.resolved_bool());
        assert!(thread.resolved_ts.is_none());
        assert!(thread.page_context_hash.is_none());
    }

    #[test]
    fn thread_set_resolved_keeps_flag_and_timestamp_in_lockstep() {
        let mut thread = ThreadRow::default();

        thread.set_resolved(true);
        assert!(thread.resolved_bool());
        assert!(thread.resolved_ts.is_some());

        thread.set_resolved(false);
        assert!(!thread.resolved_bool());
        assert!(thread.resolved_ts.is_none());
    }

    #[test]
    fn thread_metadata_map_parses_json() {
        let mut thread = ThreadRow::default();
        thread.metadata = r#"{"color":"red","priority":2}"#.to_string();
        let map = thread.metadata_map();
        assert_eq!(map.get("color").and_then(|v| v.as_str()), Some("red"));
        assert_eq!(map.get("priority").and_then(serde_json::Value::as_i64), Some(2));
    }

    #[test]
    fn thread_metadata_map_tolerates_garbage() {
        let mut thread = ThreadRow::default();
        thread.metadata = "not json".to_string();
        assert!(thread.metadata_map().is_empty());
    }

    // ── MessageRow ──────────────────────────────────────────────────

    #[test]
    fn message_row_default_values() {
        let msg = MessageRow::default();
        assert!(msg.id.is_none());
        assert_eq!(msg.kind, MESSAGE_KIND_USER);
        assert!(msg.is_user_message());
        assert!(!msg.is_deleted());
        assert!(!msg.is_imported());
    }

    #[test]
    fn message_row_soft_delete_flag() {
        let mut msg = MessageRow::default();
        msg.deleted_ts = Some(now_micros());
        assert!(msg.is_deleted());
    }

    // ── ThreadParticipantRow ────────────────────────────────────────

    #[test]
    fn participant_default_is_subscribed_and_unseen() {
        let p = ThreadParticipantRow::default();
        assert!(p.is_subscribed());
        assert!(!p.has_seen());
    }

    // ── Serialization roundtrips ────────────────────────────────────

    #[test]
    fn thread_row_serde_roundtrip() {
        let mut thread = ThreadRow::new(3, 9);
        thread.name = "Launch review".into();
        thread.set_resolved(true);
        let json = serde_json::to_string(&thread).unwrap();
        let thread2: ThreadRow = serde_json::from_str(&json).unwrap();
        assert_eq!(thread.name, thread2.name);
        assert_eq!(thread.resolved, thread2.resolved);
        assert_eq!(thread.resolved_ts, thread2.resolved_ts);
    }

    #[test]
    fn message_row_serde_roundtrip() {
        let mut msg = MessageRow::default();
        msg.thread_id = 11;
        msg.content = "hello".into();
        msg.kind = MESSAGE_KIND_ACTION.to_string();
        let json = serde_json::to_string(&msg).unwrap();
        let msg2: MessageRow = serde_json::from_str(&json).unwrap();
        assert_eq!(msg2.thread_id, 11);
        assert!(!msg2.is_user_message());
    }
}
