//! Lazy, resumable page sequence over one target.

use crate::error::{AuditError, AuditResult};
use crate::ports::Store;
use crate::retry::RetryPolicy;
use driftfix_types::{Page, PageCursor, ScanMode, Target};
use tracing::{debug, warn};

/// Pulls pages for one target in store order, never reordering or merging them.
///
/// The sequence ends after a page with no cursor, a short page, or a page whose
/// cursor repeats the one just consumed. After the end, or after a
/// `StoreUnavailable`, the paginator makes no further store calls.
pub struct Paginator<'a> {
    store: &'a dyn Store,
    target: Target,
    page_size: usize,
    retry: RetryPolicy,
    cursor: Option<PageCursor>,
    done: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(store: &'a dyn Store, target: Target, page_size: usize, retry: RetryPolicy) -> Self {
        Self {
            store,
            target,
            page_size,
            retry,
            cursor: None,
            done: false,
        }
    }

    /// Continue from a cursor observed in an earlier run.
    pub fn resume_from(mut self, cursor: PageCursor) -> Self {
        self.cursor = Some(cursor);
        self.done = false;
        self
    }

    /// Cursor of the next page to fetch; `None` at the start or once finished.
    pub fn next_cursor(&self) -> Option<&PageCursor> {
        if self.done { None } else { self.cursor.as_ref() }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch one page at `cursor`, retrying under the policy. Does not advance.
    pub fn fetch_page(&self, cursor: Option<&PageCursor>) -> AuditResult<Page> {
        let ns = &self.target.namespace;
        let structure = self.target.structure.as_str();
        let size = self.page_size;
        let store = self.store;
        let result = match self.target.mode {
            ScanMode::OrphanIndex => self
                .retry
                .run("fetch_index_page", || {
                    store.fetch_index_page(ns, structure, cursor, size)
                })
                .map(Page::into_records),
            ScanMode::ShardRepair => self
                .retry
                .run("fetch_shard_page", || {
                    store.fetch_shard_page(ns, structure, cursor, size)
                })
                .map(Page::into_records),
            ScanMode::DuplicateReference => self
                .retry
                .run("fetch_reference_page", || {
                    store.fetch_reference_page(ns, structure, cursor, size)
                })
                .map(Page::into_records),
        };
        result.map_err(|e| AuditError::StoreUnavailable {
            scope: self.target.key(),
            attempts: e.attempts,
            source: e.error,
        })
    }

    /// The next page, or `None` once the sequence has ended.
    pub fn next_page(&mut self) -> AuditResult<Option<Page>> {
        if self.done {
            return Ok(None);
        }
        let mut page = match self.fetch_page(self.cursor.as_ref()) {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if page.cursor.is_some() && page.cursor == self.cursor {
            warn!(
                target_key = %self.target,
                cursor = ?page.cursor,
                "store returned the consumed cursor again; treating as end of collection"
            );
            page.cursor = None;
        }

        if page.is_final(self.page_size) {
            self.done = true;
        } else {
            self.cursor = page.cursor.clone();
        }
        debug!(
            target_key = %self.target,
            records = page.len(),
            last = self.done,
            "fetched page"
        );
        Ok(Some(page))
    }
}

impl Iterator for Paginator<'_> {
    type Item = AuditResult<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page().transpose()
    }
}
