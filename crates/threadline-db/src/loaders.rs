//! The per-request loader set.
//!
//! One `ThreadLoaders` is constructed per request and dropped at request
//! end. Calls within the request are coalesced per batcher; nothing survives
//! the request, so stale counts can never leak between viewers.

use threadline_core::Viewer;

use crate::batch::Batcher;
use crate::counts::{
    ActionMessageCount, ActionReplyingUserIds, LoaderContext, MessageCountExcludingDeleted,
    NewMessageCount, NewReactionCount, ReplyCount, ReplyingUserIds, TotalMessageCount,
    UserMessageCount,
};
use crate::pool::DbPool;
use crate::unseen::FirstUnseenMessage;
use crate::visibility::VisibilityHandle;

/// Request-scoped bundle of every thread aggregator.
pub struct ThreadLoaders {
    pub total_messages: Batcher<TotalMessageCount>,
    pub messages_excluding_deleted: Batcher<MessageCountExcludingDeleted>,
    pub user_messages: Batcher<UserMessageCount>,
    pub action_messages: Batcher<ActionMessageCount>,
    pub replies: Batcher<ReplyCount>,
    pub new_messages: Batcher<NewMessageCount>,
    pub new_reactions: Batcher<NewReactionCount>,
    pub replying_users: Batcher<ReplyingUserIds>,
    pub action_replying_users: Batcher<ActionReplyingUserIds>,
    pub first_unseen: Batcher<FirstUnseenMessage>,
    ctx: LoaderContext,
}

impl ThreadLoaders {
    /// Build a fresh loader set for one request.
    #[must_use]
    pub fn new(pool: DbPool, viewer: Viewer, acl: VisibilityHandle) -> Self {
        let ctx = LoaderContext::new(pool, viewer, acl);
        Self {
            total_messages: Batcher::new(TotalMessageCount::new(ctx.clone())),
            messages_excluding_deleted: Batcher::new(MessageCountExcludingDeleted::new(
                ctx.clone(),
            )),
            user_messages: Batcher::new(UserMessageCount::new(ctx.clone())),
            action_messages: Batcher::new(ActionMessageCount::new(ctx.clone())),
            replies: Batcher::new(ReplyCount::new(ctx.clone())),
            new_messages: Batcher::new(NewMessageCount::new(ctx.clone())),
            new_reactions: Batcher::new(NewReactionCount::new(ctx.clone())),
            replying_users: Batcher::new(ReplyingUserIds::new(ctx.clone())),
            action_replying_users: Batcher::new(ActionReplyingUserIds::new(ctx.clone())),
            first_unseen: Batcher::new(FirstUnseenMessage::new(ctx.clone())),
            ctx,
        }
    }

    /// The request's loader context (pool, viewer, permission filter).
    #[must_use]
    pub const fn context(&self) -> &LoaderContext {
        &self.ctx
    }
}
