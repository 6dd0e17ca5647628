//! Batched data-access layer for Threadline
//!
//! This crate provides:
//! - `SQLite` database operations via `sqlmodel` on frankensqlite
//! - Connection pooling and schema migrations
//! - Per-request batched key loaders (count aggregators, unseen boundary)
//! - The initial-window loader, collection query builder, and activity
//!   summary aggregator
//!
//! # Timestamp Convention
//!
//! All timestamps are stored as `i64` (microseconds since Unix epoch)
//! internally. This matches `sqlmodel`'s convention. Helper functions are
//! provided to convert to/from `chrono::NaiveDateTime`.

#![forbid(unsafe_code)]

pub mod activity;
pub mod batch;
pub mod collection;
pub mod counts;
pub mod error;
pub mod loaders;
pub mod models;
pub mod pager;
pub mod pool;
pub mod queries;
pub mod schema;
pub mod timestamps;
pub mod tracking;
pub mod unseen;
pub mod visibility;
pub mod window;

pub use activity::thread_activity_summary;
pub use batch::{BatchSource, Batcher, BatcherMetrics, CachePolicy};
pub use collection::{ThreadPage, thread_collection_page};
pub use counts::LoaderContext;
pub use error::{DbError, DbResult, is_lock_error};
pub use loaders::ThreadLoaders;
pub use models::*;
pub use pager::{FilteredPage, PageSource, filtered_page};
pub use pool::{DbPool, DbPoolConfig, auto_pool_size, create_pool};
pub use timestamps::{
    iso_to_micros, micros_to_iso, micros_to_naive, naive_to_micros, now_micros, now_micros_raw,
};
pub use tracking::{
    QueryTracker, QueryTrackerSnapshot, SlowQueryEntry, TableId, elapsed_us, query_timer,
    record_query,
};
pub use unseen::FirstUnseenMessage;
pub use visibility::{
    AllowAllVisibility, OrgMembershipVisibility, ThreadVisibility, VisibilityHandle,
};
pub use window::{initial_messages, older_messages};

/// Global query tracker instance.
///
/// Disabled by default (zero overhead). Call
/// `QUERY_TRACKER.enable(threshold_ms)` at startup when
/// `Config::instrumentation_enabled` is true.
pub static QUERY_TRACKER: std::sync::LazyLock<QueryTracker> =
    std::sync::LazyLock::new(QueryTracker::new);

// Re-export the sqlmodel stack for consumers
pub use sqlmodel;
pub use sqlmodel_core;
pub use sqlmodel_frankensqlite;

/// The connection type used by this crate's pool and queries.
///
/// Runtime DB traffic uses `FrankenConnection` for pure-Rust `SQLite`.
pub type DbConn = sqlmodel_frankensqlite::FrankenConnection;

/// Unwrap an `Outcome`, returning early from the enclosing function on any
/// non-`Ok` arm. The `Cancelled`/`Panicked` arms are propagated verbatim.
///
/// Usage: `let val = crate::try_out!(some_outcome_expr);`
macro_rules! try_out {
    ($out:expr) => {
        match $out {
            ::asupersync::Outcome::Ok(v) => v,
            ::asupersync::Outcome::Err(e) => return ::asupersync::Outcome::Err(e.into()),
            ::asupersync::Outcome::Cancelled(r) => return ::asupersync::Outcome::Cancelled(r),
            ::asupersync::Outcome::Panicked(p) => return ::asupersync::Outcome::Panicked(p),
        }
    };
}
pub(crate) use try_out;
