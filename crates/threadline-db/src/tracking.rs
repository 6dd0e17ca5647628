//! Query tracking and instrumentation.
//!
//! Lightweight counters for total queries, per-table breakdowns, and a
//! capped slow-query log. Disabled by default (zero overhead); enabled at
//! startup when `Config::instrumentation_enabled` is set.
//!
//! The hot path (`record`) uses only atomic operations; the mutex is
//! acquired solely for slow-query logging (rare cold path).

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Maximum number of slow queries retained in the log.
const SLOW_QUERY_LIMIT: usize = 50;

// =============================================================================
// TableId — known table enumeration for lock-free counting
// =============================================================================

/// Known database tables for O(1) atomic counter indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TableId {
    Orgs = 0,
    Pages = 1,
    Threads = 2,
    Messages = 3,
    ThreadParticipants = 4,
    MessageMentions = 5,
    MessageReactions = 6,
    Unknown = 7,
}

impl TableId {
    /// Total number of variants (for array sizing).
    pub const COUNT: usize = 8;

    /// Human-readable table name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Orgs => "orgs",
            Self::Pages => "pages",
            Self::Threads => "threads",
            Self::Messages => "messages",
            Self::ThreadParticipants => "thread_participants",
            Self::MessageMentions => "message_mentions",
            Self::MessageReactions => "message_reactions",
            Self::Unknown => "unknown",
        }
    }

    /// Convert array index back to `TableId`.
    #[must_use]
    pub const fn from_index(i: usize) -> Self {
        match i {
            0 => Self::Orgs,
            1 => Self::Pages,
            2 => Self::Threads,
            3 => Self::Messages,
            4 => Self::ThreadParticipants,
            5 => Self::MessageMentions,
            6 => Self::MessageReactions,
            _ => Self::Unknown,
        }
    }
}

/// Match a lowercase table name to a known `TableId`.
fn match_known_table(name: &str) -> TableId {
    // Ordered by expected query frequency (messages/threads most common).
    match name {
        "messages" => TableId::Messages,
        "threads" => TableId::Threads,
        "thread_participants" => TableId::ThreadParticipants,
        "message_mentions" => TableId::MessageMentions,
        "message_reactions" => TableId::MessageReactions,
        "pages" => TableId::Pages,
        "orgs" => TableId::Orgs,
        _ => TableId::Unknown,
    }
}

/// Extract the primary table a SQL statement touches.
///
/// Scans for `INTO`, `UPDATE`, and `FROM` keywords (case-insensitive) and
/// takes the identifier after the earliest match. Subqueries make "primary"
/// approximate; good enough for instrumentation.
fn extract_table_id(sql: &str) -> TableId {
    let lower = sql.to_ascii_lowercase();
    let mut best: Option<usize> = None;
    let mut name_start = 0usize;

    for keyword in ["into ", "update ", "from "] {
        let mut search_from = 0;
        while let Some(rel) = lower[search_from..].find(keyword) {
            let pos = search_from + rel;
            // Keyword must start a word (preceded by whitespace or '(' or start).
            let boundary = pos == 0
                || matches!(lower.as_bytes()[pos - 1], b' ' | b'\n' | b'\t' | b'(');
            if boundary {
                if best.is_none_or(|b| pos < b) {
                    best = Some(pos);
                    name_start = pos + keyword.len();
                }
                break;
            }
            search_from = pos + keyword.len();
        }
    }

    let Some(_) = best else {
        return TableId::Unknown;
    };

    let rest = lower[name_start..].trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    match_known_table(&rest[..end])
}

// =============================================================================
// QueryTracker
// =============================================================================

/// A slow-query entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQueryEntry {
    pub table: &'static str,
    pub duration_ms: f64,
}

/// Lightweight query tracker.
///
/// Thread-safe via atomics for counters. The mutex is only used for the
/// slow-query log (cold path).
#[derive(Debug)]
pub struct QueryTracker {
    enabled: AtomicBool,
    total: AtomicU64,
    total_time_us: AtomicU64,
    slow_threshold_us: AtomicU64,
    /// Lock-free per-table counters indexed by `TableId`.
    per_table: [AtomicU64; TableId::COUNT],
    slow_queries: Mutex<Vec<SlowQueryEntry>>,
}

impl Default for QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryTracker {
    /// Create a disabled tracker (no overhead until `enable()` is called).
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            total: AtomicU64::new(0),
            total_time_us: AtomicU64::new(0),
            slow_threshold_us: AtomicU64::new(250_000), // 250ms default
            per_table: std::array::from_fn(|_| AtomicU64::new(0)),
            slow_queries: Mutex::new(Vec::new()),
        }
    }

    /// Enable tracking with a slow-query threshold (in milliseconds).
    pub fn enable(&self, slow_threshold_ms: u64) {
        self.slow_threshold_us
            .store(slow_threshold_ms.saturating_mul(1000), Ordering::Relaxed);
        self.enabled.store(true, Ordering::Release);
    }

    /// Disable tracking.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Whether tracking is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record a completed query. Call this after each SQL execution.
    pub fn record(&self, sql: &str, duration_us: u64) {
        if !self.is_enabled() {
            return;
        }

        self.total.fetch_add(1, Ordering::Relaxed);
        self.total_time_us.fetch_add(duration_us, Ordering::Relaxed);

        let table_id = extract_table_id(sql);
        self.per_table[table_id as usize].fetch_add(1, Ordering::Relaxed);

        if duration_us >= self.slow_threshold_us.load(Ordering::Relaxed) {
            let mut slow = self
                .slow_queries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if slow.len() < SLOW_QUERY_LIMIT {
                #[allow(clippy::cast_precision_loss)]
                slow.push(SlowQueryEntry {
                    table: table_id.as_str(),
                    duration_ms: (duration_us as f64) / 1000.0,
                });
            }
        }
    }

    /// Get a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> QueryTrackerSnapshot {
        let mut per_table = std::collections::HashMap::new();
        for i in 0..TableId::COUNT {
            let count = self.per_table[i].load(Ordering::Relaxed);
            let id = TableId::from_index(i);
            if count > 0 && id != TableId::Unknown {
                per_table.insert(id.as_str(), count);
            }
        }

        let slow_queries = self
            .slow_queries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        QueryTrackerSnapshot {
            total: self.total.load(Ordering::Relaxed),
            total_time_us: self.total_time_us.load(Ordering::Relaxed),
            per_table,
            slow_queries,
        }
    }

    /// Reset all counters and the slow-query log.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.total_time_us.store(0, Ordering::Relaxed);
        for counter in &self.per_table {
            counter.store(0, Ordering::Relaxed);
        }
        self.slow_queries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

/// Snapshot of tracker state.
#[derive(Debug, Clone)]
pub struct QueryTrackerSnapshot {
    pub total: u64,
    pub total_time_us: u64,
    pub per_table: std::collections::HashMap<&'static str, u64>,
    pub slow_queries: Vec<SlowQueryEntry>,
}

/// Start a query timer. Pair with [`elapsed_us`].
#[must_use]
pub fn query_timer() -> Instant {
    Instant::now()
}

/// Microseconds elapsed since `start`.
#[must_use]
pub fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros().min(u128::from(u64::MAX))).unwrap_or(u64::MAX)
}

/// Record a query against the global tracker.
pub fn record_query(sql: &str, duration_us: u64) {
    crate::QUERY_TRACKER.record(sql, duration_us);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracker_records_nothing() {
        let tracker = QueryTracker::new();
        tracker.record("SELECT * FROM messages", 10);
        let snap = tracker.snapshot();
        assert_eq!(snap.total, 0);
        assert!(snap.per_table.is_empty());
    }

    #[test]
    fn enabled_tracker_counts_per_table() {
        let tracker = QueryTracker::new();
        tracker.enable(1000);
        tracker.record("SELECT id FROM messages WHERE thread_id = ?", 10);
        tracker.record("SELECT id FROM messages WHERE thread_id = ?", 20);
        tracker.record("SELECT id FROM threads WHERE org_id = ?", 5);

        let snap = tracker.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.total_time_us, 35);
        assert_eq!(snap.per_table.get("messages"), Some(&2));
        assert_eq!(snap.per_table.get("threads"), Some(&1));
    }

    #[test]
    fn slow_queries_are_logged_above_threshold() {
        let tracker = QueryTracker::new();
        tracker.enable(1); // 1ms threshold
        tracker.record("SELECT * FROM thread_participants", 5_000);
        tracker.record("SELECT * FROM thread_participants", 10);

        let snap = tracker.snapshot();
        assert_eq!(snap.slow_queries.len(), 1);
        assert_eq!(snap.slow_queries[0].table, "thread_participants");
        assert!((snap.slow_queries[0].duration_ms - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn slow_query_log_is_capped() {
        let tracker = QueryTracker::new();
        tracker.enable(0);
        for _ in 0..(SLOW_QUERY_LIMIT + 10) {
            tracker.record("SELECT * FROM messages", 1_000);
        }
        assert_eq!(tracker.snapshot().slow_queries.len(), SLOW_QUERY_LIMIT);
    }

    #[test]
    fn reset_clears_everything() {
        let tracker = QueryTracker::new();
        tracker.enable(0);
        tracker.record("SELECT * FROM messages", 1_000);
        tracker.reset();

        let snap = tracker.snapshot();
        assert_eq!(snap.total, 0);
        assert!(snap.per_table.is_empty());
        assert!(snap.slow_queries.is_empty());
    }

    #[test]
    fn extract_table_id_variants() {
        assert_eq!(
            extract_table_id("SELECT * FROM messages WHERE id = ?"),
            TableId::Messages
        );
        assert_eq!(
            extract_table_id("INSERT INTO threads (org_id) VALUES (?)"),
            TableId::Threads
        );
        assert_eq!(
            extract_table_id("UPDATE thread_participants SET last_seen_ts = ?"),
            TableId::ThreadParticipants
        );
        assert_eq!(
            extract_table_id("select m.id from messages m join orgs o on o.id = m.org_id"),
            TableId::Messages
        );
        assert_eq!(extract_table_id("PRAGMA journal_mode"), TableId::Unknown);
        assert_eq!(
            extract_table_id("SELECT * FROM unheard_of_table"),
            TableId::Unknown
        );
    }
}
