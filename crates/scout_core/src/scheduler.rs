//! Breadth-first expansion of queries into fetch tasks.
//!
//! Page `d` of a query is only handed out once every query that is still
//! paginating has handed out page `d - 1`, so a partial run covers every
//! query before going deep on any of them. The cursor for a follow-up page
//! is only known once the previous page has been fetched, which is why the
//! sequence is fed back through [`QueryScheduler::page_completed`].

use std::sync::Arc;
use std::time::Duration;

use crate::{FetchTask, PageCursor, QuerySpec, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frontier {
    /// Pages handed out so far; also the index of the next page.
    issued: u32,
    /// Cursor of the next page once it is known.
    ready: Option<PageCursor>,
    finished: bool,
}

impl Frontier {
    fn initial() -> Self {
        Self {
            issued: 0,
            ready: Some(PageCursor::Start),
            finished: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScheduler {
    queries: Vec<Arc<QuerySpec>>,
    frontier: Vec<Frontier>,
    next_id: TaskId,
}

impl QueryScheduler {
    pub fn new(queries: Vec<QuerySpec>) -> Self {
        let queries: Vec<_> = queries.into_iter().map(Arc::new).collect();
        let frontier = queries.iter().map(|_| Frontier::initial()).collect();
        Self {
            queries,
            frontier,
            next_id: 1,
        }
    }

    /// Rewinds to the first page of every query. Replaying the same page
    /// results reproduces the same task sequence.
    pub fn restart(&mut self) {
        for slot in &mut self.frontier {
            *slot = Frontier::initial();
        }
        self.next_id = 1;
    }

    pub fn queries(&self) -> &[Arc<QuerySpec>] {
        &self.queries
    }

    /// Next task that may be issued now, or `None` if nothing is ready yet.
    ///
    /// `None` does not mean the sequence is over; check [`is_exhausted`].
    ///
    /// [`is_exhausted`]: QueryScheduler::is_exhausted
    pub fn next_ready(&mut self) -> Option<FetchTask> {
        let (index, depth) = self
            .frontier
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.finished && slot.ready.is_some())
            .map(|(index, slot)| (index, slot.issued))
            .min_by_key(|&(index, depth)| (depth, index))?;

        let blocked = self
            .frontier
            .iter()
            .any(|slot| !slot.finished && slot.issued < depth);
        if blocked {
            return None;
        }

        let query = self.queries[index].clone();
        let slot = &mut self.frontier[index];
        let cursor = slot.ready.take()?;
        slot.issued += 1;
        if slot.issued >= query.page_limit() {
            slot.finished = true;
        }

        let id = self.next_id;
        self.next_id += 1;
        Some(FetchTask {
            id,
            query,
            query_index: index,
            page_index: depth,
            cursor,
            attempt: 0,
            timeout: Duration::ZERO,
        })
    }

    /// Records where the query continues after `page_index` was fetched.
    pub fn page_completed(
        &mut self,
        query_index: usize,
        page_index: u32,
        next_cursor: Option<PageCursor>,
    ) {
        let Some(slot) = self.frontier.get_mut(query_index) else {
            return;
        };
        if slot.finished || page_index + 1 != slot.issued {
            return;
        }
        match next_cursor {
            Some(cursor) => slot.ready = Some(cursor),
            None => slot.finished = true,
        }
    }

    /// Stops pagination for a query whose page failed permanently.
    pub fn page_abandoned(&mut self, query_index: usize) {
        if let Some(slot) = self.frontier.get_mut(query_index) {
            slot.finished = true;
            slot.ready = None;
        }
    }

    /// Every query has stopped issuing pages.
    pub fn is_exhausted(&self) -> bool {
        self.frontier.iter().all(|slot| slot.finished)
    }
}
