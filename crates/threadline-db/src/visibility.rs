//! The permission filter boundary.
//!
//! Visibility decisions are made by an external collaborator; this module
//! only defines the seam. Every thread or message surfaced by the loaders,
//! the collection query builder, or the initial-window loader passes through
//! a [`ThreadVisibility`] implementation before it reaches a caller.
//!
//! Not-found and not-visible are indistinguishable to callers: both resolve
//! to absence, never to an error that would leak existence.

use std::sync::Arc;

use threadline_core::Viewer;

use crate::models::{MessageRow, ThreadRow};

/// Capability interface answering "can this viewer see this row".
///
/// Implementations must be cheap and pure: they are invoked once per
/// candidate row in post-filter passes.
pub trait ThreadVisibility: Send + Sync {
    /// Whether the viewer can see the thread at all.
    ///
    /// `strict_org_check` requires org membership even when the caller is
    /// scoped by platform application (the permission-aggregated mode passes
    /// `false` and relies on its own scoping).
    fn can_see_thread(&self, viewer: &Viewer, thread: &ThreadRow, strict_org_check: bool) -> bool;

    /// Whether the viewer can see an individual message.
    fn can_see_message(&self, viewer: &Viewer, message: &MessageRow) -> bool;
}

/// Shared handle to a visibility implementation.
pub type VisibilityHandle = Arc<dyn ThreadVisibility>;

/// Default production rule: org membership, with an application-id fallback
/// for permission-aggregated views.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrgMembershipVisibility;

impl ThreadVisibility for OrgMembershipVisibility {
    fn can_see_thread(&self, viewer: &Viewer, thread: &ThreadRow, strict_org_check: bool) -> bool {
        if viewer.is_member_of(thread.org_id) {
            return true;
        }
        if strict_org_check {
            return false;
        }
        viewer.platform_application_id == Some(thread.platform_application_id)
    }

    fn can_see_message(&self, viewer: &Viewer, message: &MessageRow) -> bool {
        viewer.is_member_of(message.org_id)
            || viewer.user_id == Some(message.source_id)
    }
}

/// Test/diagnostic rule: everything is visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllVisibility;

impl ThreadVisibility for AllowAllVisibility {
    fn can_see_thread(&self, _: &Viewer, _: &ThreadRow, _: bool) -> bool {
        true
    }

    fn can_see_message(&self, _: &Viewer, _: &MessageRow) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread_in(org_id: i64, application_id: i64) -> ThreadRow {
        ThreadRow {
            org_id,
            platform_application_id: application_id,
            ..ThreadRow::default()
        }
    }

    #[test]
    fn org_member_sees_thread() {
        let viewer = Viewer::new(1, vec![10]);
        let acl = OrgMembershipVisibility;
        assert!(acl.can_see_thread(&viewer, &thread_in(10, 0), true));
        assert!(!acl.can_see_thread(&viewer, &thread_in(11, 0), true));
    }

    #[test]
    fn application_fallback_requires_non_strict_mode() {
        let viewer = Viewer::new(1, vec![10]).with_application(7);
        let acl = OrgMembershipVisibility;
        let foreign = thread_in(99, 7);
        assert!(acl.can_see_thread(&viewer, &foreign, false));
        assert!(!acl.can_see_thread(&viewer, &foreign, true));
    }

    #[test]
    fn own_messages_are_always_visible() {
        let viewer = Viewer::new(5, vec![]);
        let acl = OrgMembershipVisibility;
        let own = MessageRow {
            org_id: 99,
            source_id: 5,
            ..MessageRow::default()
        };
        let other = MessageRow {
            org_id: 99,
            source_id: 6,
            ..MessageRow::default()
        };
        assert!(acl.can_see_message(&viewer, &own));
        assert!(!acl.can_see_message(&viewer, &other));
    }
}
