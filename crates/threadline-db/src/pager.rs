//! Filtered keyset pagination.
//!
//! A reusable retry loop over `(fetch_page, is_visible)`: when a permission
//! post-filter discards rows from a raw page, further raw pages are pulled
//! and appended until the requested number of visible items accumulates or
//! the source is exhausted. `has_more` is computed at the *visible* level
//! (fetch one extra visible item and trim), and the returned cursor is
//! always the id of the last item actually delivered — never a cursor for a
//! row the caller didn't receive.

use asupersync::{Cx, Outcome};

use crate::error::DbError;

/// A raw keyset page source.
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Fetch up to `limit` raw items strictly beyond `cursor`.
    fn fetch_page(
        &self,
        cx: &Cx,
        cursor: Option<i64>,
        limit: usize,
    ) -> impl Future<Output = Outcome<Vec<Self::Item>, DbError>> + Send;

    /// The keyset cursor of an item (used both to continue raw fetching and
    /// as the page cursor handed back to callers).
    fn cursor_for(&self, item: &Self::Item) -> i64;

    /// Post-filter: whether the item may be shown to the viewer.
    fn is_visible(&self, item: &Self::Item) -> bool;
}

/// A visible page plus continuation state.
#[derive(Debug, Clone)]
pub struct FilteredPage<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    /// Cursor of the last delivered item; `None` for an empty page.
    pub cursor: Option<i64>,
}

/// Accumulate `limit` visible items starting after `after`.
pub async fn filtered_page<S: PageSource>(
    cx: &Cx,
    source: &S,
    after: Option<i64>,
    limit: usize,
) -> Outcome<FilteredPage<S::Item>, DbError> {
    if limit == 0 {
        return Outcome::Err(DbError::invalid("limit", "limit must be at least 1"));
    }

    // One extra visible item decides has_more exactly, even when raw pages
    // shrink under filtering.
    let want = limit + 1;
    let mut items: Vec<S::Item> = Vec::with_capacity(want);
    let mut raw_cursor = after;

    loop {
        let raw = crate::try_out!(source.fetch_page(cx, raw_cursor, want).await);
        if raw.is_empty() {
            break; // source exhausted
        }
        let raw_len = raw.len();
        for item in raw {
            raw_cursor = Some(source.cursor_for(&item));
            if source.is_visible(&item) {
                items.push(item);
                if items.len() == want {
                    break;
                }
            }
        }
        if items.len() == want {
            break;
        }
        if raw_len < want {
            break; // source exhausted
        }
    }

    let has_more = items.len() > limit;
    items.truncate(limit);
    let cursor = items.last().map(|item| source.cursor_for(item));
    Outcome::Ok(FilteredPage {
        items,
        has_more,
        cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;

    fn block_on<F, Fut, T>(f: F) -> T
    where
        F: FnOnce(Cx) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let cx = Cx::for_testing();
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("build runtime");
        rt.block_on(f(cx))
    }

    /// In-memory source over (id, visible) pairs, ordered by id ascending.
    struct VecSource {
        rows: Vec<(i64, bool)>,
    }

    impl PageSource for VecSource {
        type Item = (i64, bool);

        async fn fetch_page(
            &self,
            _cx: &Cx,
            cursor: Option<i64>,
            limit: usize,
        ) -> Outcome<Vec<(i64, bool)>, DbError> {
            let after = cursor.unwrap_or(i64::MIN);
            Outcome::Ok(
                self.rows
                    .iter()
                    .filter(|(id, _)| *id > after)
                    .take(limit)
                    .copied()
                    .collect(),
            )
        }

        fn cursor_for(&self, item: &(i64, bool)) -> i64 {
            item.0
        }

        fn is_visible(&self, item: &(i64, bool)) -> bool {
            item.1
        }
    }

    fn ids(page: &FilteredPage<(i64, bool)>) -> Vec<i64> {
        page.items.iter().map(|(id, _)| *id).collect()
    }

    #[test]
    fn unfiltered_page_has_exact_limit_and_cursor() {
        let source = VecSource {
            rows: (1..=10).map(|id| (id, true)).collect(),
        };
        let page = block_on(|cx| async move {
            filtered_page(&cx, &source, None, 4).await.into_result().unwrap()
        });
        assert_eq!(ids(&page), vec![1, 2, 3, 4]);
        assert!(page.has_more);
        assert_eq!(page.cursor, Some(4));
    }

    #[test]
    fn filtering_pulls_additional_raw_pages() {
        // Only every third row is visible; a single raw page of 4 can't
        // satisfy a visible page of 3.
        let source = VecSource {
            rows: (1..=30).map(|id| (id, id % 3 == 0)).collect(),
        };
        let page = block_on(|cx| async move {
            filtered_page(&cx, &source, None, 3).await.into_result().unwrap()
        });
        assert_eq!(ids(&page), vec![3, 6, 9]);
        assert!(page.has_more);
        assert_eq!(page.cursor, Some(9));
    }

    #[test]
    fn exhausted_source_reports_no_more() {
        let source = VecSource {
            rows: (1..=5).map(|id| (id, id % 2 == 1)).collect(),
        };
        let page = block_on(|cx| async move {
            filtered_page(&cx, &source, None, 10).await.into_result().unwrap()
        });
        assert_eq!(ids(&page), vec![1, 3, 5]);
        assert!(!page.has_more);
        assert_eq!(page.cursor, Some(5));
    }

    #[test]
    fn trailing_invisible_rows_do_not_claim_more() {
        // Visible rows end at 4; everything after is filtered out.
        let source = VecSource {
            rows: (1..=20).map(|id| (id, id <= 4)).collect(),
        };
        let page = block_on(|cx| async move {
            filtered_page(&cx, &source, None, 4).await.into_result().unwrap()
        });
        assert_eq!(ids(&page), vec![1, 2, 3, 4]);
        assert!(!page.has_more, "no further visible row exists");
    }

    #[test]
    fn cursor_resumes_after_last_delivered_item() {
        let source = VecSource {
            rows: (1..=12).map(|id| (id, id % 2 == 0)).collect(),
        };
        let (first, second) = block_on(|cx| async move {
            let first = filtered_page(&cx, &source, None, 3)
                .await
                .into_result()
                .unwrap();
            let second = filtered_page(&cx, &source, first.cursor, 3)
                .await
                .into_result()
                .unwrap();
            (first, second)
        });
        assert_eq!(ids(&first), vec![2, 4, 6]);
        assert_eq!(ids(&second), vec![8, 10, 12]);
        assert!(!second.has_more);
    }

    #[test]
    fn empty_source_yields_empty_page() {
        let source = VecSource { rows: Vec::new() };
        let page = block_on(|cx| async move {
            filtered_page(&cx, &source, None, 5).await.into_result().unwrap()
        });
        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.cursor, None);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let source = VecSource { rows: Vec::new() };
        let out = block_on(|cx| async move { filtered_page(&cx, &source, None, 0).await });
        assert!(out.is_err());
    }
}
