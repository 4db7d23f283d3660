use std::{collections::VecDeque, sync::Arc};

use crate::{
    schema::Row,
    service::{GetRowsRequest, TableService},
    statistics::Statistics,
    util::Result,
};

/// Lazy iterator over the rows of a table
///
/// Rows are fetched one page at a time, only when the previous page has
/// been consumed. The iterator owns its own reference to the service, so
/// it does not borrow the handle that created it.
///
/// # Error Handling
///
/// A failed page fetch is yielded once as `Err`, after which the iterator
/// is exhausted.
pub struct RowIterator {
    service: Arc<dyn TableService>,
    id: String,
    request: GetRowsRequest,
    page_rows: usize,

    /// Rows of the current page not yet yielded
    page: VecDeque<Row>,

    /// Cursor of the next page, `None` once the service reported the end
    next: Option<u64>,

    /// Rows still allowed by the caller's limit
    remaining: Option<usize>,

    statistics: Arc<Statistics>,
}

impl RowIterator {
    pub(crate) fn new(
        service: Arc<dyn TableService>,
        id: String,
        request: GetRowsRequest,
        page_rows: usize,
        statistics: Arc<Statistics>,
    ) -> Self {
        RowIterator {
            service,
            id,
            next: Some(request.starting),
            remaining: request.limit,
            request,
            page_rows: page_rows.max(1),
            page: VecDeque::new(),
            statistics,
        }
    }

    pub fn table_id(&self) -> &str {
        &self.id
    }

    fn fetch_page(&mut self, starting: u64) -> Result<()> {
        let limit = match self.remaining {
            Some(remaining) => remaining.min(self.page_rows),
            None => self.page_rows,
        };
        let request = GetRowsRequest {
            starting,
            limit: Some(limit),
            ..self.request.clone()
        };

        self.statistics.record_service_call();
        let page = self.service.get_rows(&self.id, &request)?;
        self.statistics.record_page(page.rows.len() as u64);

        self.next = page.next;
        self.page.extend(page.rows);
        Ok(())
    }
}

impl Iterator for RowIterator {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }

        if self.page.is_empty() {
            let starting = self.next?;
            if let Err(e) = self.fetch_page(starting) {
                self.statistics.record_error();
                self.next = None;
                self.page.clear();
                return Some(Err(e));
            }
        }

        let row = self.page.pop_front()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(Ok(row))
    }
}
