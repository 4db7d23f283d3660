use std::{
    fmt,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crate::{
    schema::{ColumnDescriptor, IndexDescriptor, Value},
    service::{
        CreateRequest, ExtendRequest, GetRowsRequest, RemoteState, RowPage, TableDescription,
        TableService,
    },
    statistics::Statistics,
    table::{AccessMode, CreateOptions, RowIterator, TableOptions},
    util::{Result, Status},
};

/// Local state of a handle
///
/// ```text
/// Unbound ──bind / create / extend──→ Open(mode) ──close──→ Closing ──→ Closed
///    │                                   │                    (indices)
///    └──────── service error ──→ Failed  └──close (read, or no indices)──→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableState {
    Unbound,
    Open(AccessMode),
    Closing,
    Closed,
    Failed,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableState::Unbound => write!(f, "unbound"),
            TableState::Open(mode) => write!(f, "open[{mode}]"),
            TableState::Closing => write!(f, "closing"),
            TableState::Closed => write!(f, "closed"),
            TableState::Failed => write!(f, "failed"),
        }
    }
}

/// Schema facts a writer needs, learned at create/extend time or from
/// `describe` for handles bound by id
struct WriteLayout {
    /// Columns each appended row carries values for, in order
    columns: Vec<ColumnDescriptor>,
    next_part: u32,
}

/// Binding between this process and one remote table
///
/// A handle is created unbound with a fixed access mode, then bound in one
/// step: to an existing table (`bind`), to a new table (`create`), or to a
/// new table extending another (`extend`). Appended rows are buffered and
/// uploaded as numbered parts.
///
/// Releasing a handle (dropping it, or `finish`) closes a write-mode table,
/// flushes an append-mode table and leaves a read-mode table alone.
///
/// A handle is not meant to be shared between threads; every mutating call
/// takes `&mut self`.
pub struct TableHandle {
    service: Arc<dyn TableService>,
    options: TableOptions,

    id: Option<String>,
    project: Option<String>,
    mode: AccessMode,
    state: TableState,

    columns: Vec<ColumnDescriptor>,
    indices: Vec<IndexDescriptor>,
    layout: Option<WriteLayout>,

    /// Rows appended but not yet uploaded
    write_buffer: Vec<Vec<Value>>,
    aborted: bool,

    statistics: Arc<Statistics>,
}

impl TableHandle {
    /// Create an unbound handle; `mode` cannot change afterwards
    pub fn new(service: Arc<dyn TableService>, mode: AccessMode, options: TableOptions) -> Self {
        TableHandle {
            service,
            options,
            id: None,
            project: None,
            mode,
            state: TableState::Unbound,
            columns: Vec::new(),
            indices: Vec::new(),
            layout: None,
            write_buffer: Vec::new(),
            aborted: false,
            statistics: Arc::new(Statistics::new()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    /// Columns of the table; empty for a handle bound by id until it has
    /// described the table (first write, or `describe`)
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn indices(&self) -> &[IndexDescriptor] {
        &self.indices
    }

    pub fn buffered_rows(&self) -> usize {
        self.write_buffer.len()
    }

    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.statistics)
    }

    fn bound_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| Status::invalid_state("table handle is not bound to a table"))
    }

    fn expect_unbound(&self) -> Result<()> {
        if self.state != TableState::Unbound {
            return Err(Status::invalid_state(format!(
                "table handle is already {}",
                self.state
            )));
        }
        Ok(())
    }

    fn expect_writable(&self) -> Result<()> {
        match self.state {
            TableState::Open(mode) if mode.is_writable() => Ok(()),
            TableState::Open(_) => Err(Status::not_supported(
                "rows cannot be appended through a read-mode handle",
            )),
            state => Err(Status::not_supported(format!(
                "rows cannot be appended to a {state} table handle"
            ))),
        }
    }

    /// Record a failed service call and pass the error through
    fn service_error(&self, err: Status) -> Status {
        self.statistics.record_error();
        err
    }

    /// Record a failed bind/create/extend: the handle becomes `Failed`
    fn fail(&mut self, err: Status) -> Status {
        log::debug!("table handle failed to bind: {err}");
        self.state = TableState::Failed;
        self.service_error(err)
    }

    fn describe_remote(&self, id: &str) -> Result<TableDescription> {
        self.statistics.record_service_call();
        self.service
            .describe(id)
            .map_err(|e| self.service_error(e))
    }

    /// Associate this handle with an existing table
    ///
    /// No service call is made; whether `id` exists, and whether the mode
    /// suits the table's remote state, surfaces on first use.
    pub fn bind(&mut self, id: &str, project: Option<String>) -> Result<()> {
        self.expect_unbound()?;
        if id.is_empty() {
            return Err(Status::invalid_argument("table id must not be empty"));
        }

        self.id = Some(id.to_string());
        self.project = project;
        self.state = TableState::Open(self.mode);
        log::debug!("bound table {id} in mode {}", self.mode);
        Ok(())
    }

    /// Create a new table and bind to it, returning the new id
    ///
    /// The schema comes from `columns`, or is cloned from `init_from`.
    /// `indices` are sent unmodified and in order.
    pub fn create(
        &mut self,
        columns: Option<Vec<ColumnDescriptor>>,
        indices: Option<Vec<IndexDescriptor>>,
        init_from: Option<&TableHandle>,
        options: CreateOptions,
    ) -> Result<String> {
        self.expect_unbound()?;
        if !self.mode.is_writable() {
            return Err(Status::invalid_mode_for_create(
                "a table being created can only be opened for write or append",
            ));
        }
        let init_from = match init_from {
            Some(source) => Some(source.bound_id()?.to_string()),
            None => None,
        };

        let project = options.project.clone();
        let request = CreateRequest {
            columns: columns.clone(),
            indices: indices.clone(),
            init_from,
            options,
        };

        self.statistics.record_service_call();
        let id = match self.service.create(request) {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e)),
        };

        match columns {
            Some(columns) => {
                self.layout = Some(WriteLayout {
                    columns: columns.clone(),
                    next_part: 1,
                });
                self.columns = columns;
                self.indices = indices.unwrap_or_default();
            },
            None => {
                // Cloned schema: learn what the service resolved
                let desc = match self.describe_remote(&id) {
                    Ok(desc) => desc,
                    Err(e) => return Err(self.fail(e)),
                };
                self.adopt(desc);
            },
        }

        self.id = Some(id.clone());
        self.project = project;
        self.state = TableState::Open(self.mode);
        log::debug!(
            "created table {id} with {} columns, {} indices, mode {}",
            self.columns.len(),
            self.indices.len(),
            self.mode
        );
        Ok(id)
    }

    /// Create a new table holding `source_id`'s columns followed by
    /// `columns`, and bind to it, returning the new id
    ///
    /// Rows appended through this handle carry values for the new columns
    /// only, one row per source row, in source row order.
    pub fn extend(
        &mut self,
        source_id: &str,
        columns: Vec<ColumnDescriptor>,
        indices: Vec<IndexDescriptor>,
        options: CreateOptions,
    ) -> Result<String> {
        self.expect_unbound()?;
        if !self.mode.is_writable() {
            return Err(Status::invalid_mode_for_create(
                "an extended table can only be opened for write or append",
            ));
        }
        if source_id.is_empty() {
            return Err(Status::invalid_argument("source table id must not be empty"));
        }

        let project = options.project.clone();
        let request = ExtendRequest {
            source_id: source_id.to_string(),
            columns,
            indices,
            options,
        };

        self.statistics.record_service_call();
        let id = match self.service.extend(request) {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e)),
        };
        let desc = match self.describe_remote(&id) {
            Ok(desc) => desc,
            Err(e) => return Err(self.fail(e)),
        };

        self.project = project.or_else(|| desc.project.clone());
        self.adopt(desc);
        self.id = Some(id.clone());
        self.state = TableState::Open(self.mode);
        log::debug!(
            "extended table {source_id} into {id} ({} columns), mode {}",
            self.columns.len(),
            self.mode
        );
        Ok(id)
    }

    fn adopt(&mut self, desc: TableDescription) {
        self.layout = Some(WriteLayout {
            columns: desc.writable_columns().to_vec(),
            next_part: desc.next_part(),
        });
        self.columns = desc.columns;
        self.indices = desc.indices;
    }

    /// Make sure the write layout is known, describing the table if the
    /// handle was bound by id
    fn ensure_layout(&mut self) -> Result<()> {
        if self.layout.is_none() {
            let id = self.bound_id()?.to_string();
            let desc = self.describe_remote(&id)?;
            if desc.state != RemoteState::Open {
                return Err(Status::invalid_state(format!(
                    "table {id} is not open for writing"
                )));
            }
            self.adopt(desc);
        }
        Ok(())
    }

    /// Fetch the table's current description from the service
    ///
    /// A handle bound by id also learns its columns and indices this way.
    pub fn describe(&mut self) -> Result<TableDescription> {
        let id = self.bound_id()?.to_string();
        let desc = self.describe_remote(&id)?;
        if self.columns.is_empty() {
            self.columns = desc.columns.clone();
            self.indices = desc.indices.clone();
        }
        Ok(desc)
    }

    pub fn append_row(&mut self, values: Vec<Value>) -> Result<()> {
        self.append_rows(std::iter::once(values))
    }

    /// Buffer rows, uploading a part whenever the buffer fills up
    ///
    /// The whole batch is checked before any row is buffered: a row with the
    /// wrong number of values, or a value its column does not accept, fails
    /// the call with `InvalidArgument` and nothing is kept.
    ///
    /// Once `Ok` is returned the rows belong to the handle. An upload that
    /// fails while appending is logged and retried by the next append,
    /// `flush` or `close`, which report the error if it persists.
    pub fn append_rows<I>(&mut self, rows: I) -> Result<()>
    where I: IntoIterator<Item = Vec<Value>> {
        self.expect_writable()?;
        self.ensure_layout()?;

        let columns = self.layout.as_ref().map_or(&[][..], |l| l.columns.as_slice());
        let staged = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| check_row(columns, i, &row).map(|_| row))
            .collect::<Result<Vec<_>>>()?;

        let mut upload_failed = false;
        for row in staged {
            self.write_buffer.push(row);
            self.statistics.record_append(1);

            if !upload_failed
                && self.write_buffer.len() >= self.options.write_buffer_rows
                && let Err(e) = self.flush()
            {
                log::warn!(
                    "table {}: upload of {} buffered rows failed, will retry: {e}",
                    self.id.as_deref().unwrap_or("<unbound>"),
                    self.write_buffer.len()
                );
                upload_failed = true;
            }
        }
        Ok(())
    }

    /// Upload buffered rows as the next part
    ///
    /// On failure the rows stay buffered and the next flush retries them
    /// under the same part number.
    pub fn flush(&mut self) -> Result<()> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        self.expect_writable()?;
        self.ensure_layout()?;

        let id = self.bound_id()?.to_string();
        let part = self.layout.as_ref().map_or(1, |l| l.next_part);

        self.statistics.record_service_call();
        self.service
            .add_rows(&id, part, &self.write_buffer)
            .map_err(|e| self.service_error(e))?;

        let rows = self.write_buffer.len() as u64;
        self.statistics.record_part_upload(rows);
        log::trace!("table {id}: uploaded part {part} ({rows} rows)");

        self.write_buffer.clear();
        if let Some(layout) = self.layout.as_mut() {
            layout.next_part = part + 1;
        }
        Ok(())
    }

    fn expect_readable(&self) -> Result<&str> {
        match self.state {
            TableState::Unbound | TableState::Failed => Err(Status::invalid_state(format!(
                "cannot read through a {} table handle",
                self.state
            ))),
            _ => self.bound_id(),
        }
    }

    /// Fetch a single page of rows
    pub fn get_rows(&self, request: &GetRowsRequest) -> Result<RowPage> {
        let id = self.expect_readable()?;
        self.statistics.record_service_call();
        let page = self
            .service
            .get_rows(id, request)
            .map_err(|e| self.service_error(e))?;
        self.statistics.record_page(page.rows.len() as u64);
        Ok(page)
    }

    /// Iterate over all rows, fetching pages lazily
    pub fn iter_rows(&self) -> Result<RowIterator> {
        self.iter_rows_with(GetRowsRequest::default())
    }

    /// Iterate over the rows selected by `request`
    ///
    /// `request.limit` caps the total number of rows yielded; pages are
    /// `TableOptions::read_page_rows` long.
    pub fn iter_rows_with(&self, request: GetRowsRequest) -> Result<RowIterator> {
        let id = self.expect_readable()?.to_string();
        Ok(RowIterator::new(
            Arc::clone(&self.service),
            id,
            request,
            self.options.read_page_rows,
            Arc::clone(&self.statistics),
        ))
    }

    /// Finalize the table
    ///
    /// Buffered rows are uploaded first. With declared indices the handle
    /// moves to `Closing` until `wait_on_close` sees the indices built;
    /// otherwise it is `Closed`. Closing a read-mode handle makes no
    /// service call. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            TableState::Closing | TableState::Closed => return Ok(()),
            TableState::Unbound | TableState::Failed => {
                return Err(Status::invalid_state(format!(
                    "cannot close a {} table handle",
                    self.state
                )));
            },
            TableState::Open(AccessMode::Read) => {
                self.state = TableState::Closed;
                return Ok(());
            },
            TableState::Open(_) => {},
        }

        self.ensure_layout()?;
        self.flush()?;

        let id = self.bound_id()?.to_string();
        self.statistics.record_service_call();
        self.service.close(&id).map_err(|e| self.service_error(e))?;

        self.state = if self.indices.is_empty() {
            TableState::Closed
        } else {
            TableState::Closing
        };
        log::debug!("table {id} is {}", self.state);
        Ok(())
    }

    /// Block until the service reports the table closed, polling `describe`
    ///
    /// An aborted handle never closed its table, so waiting on it is
    /// `InvalidState`.
    pub fn wait_on_close(&mut self, timeout: Duration) -> Result<()> {
        if self.aborted {
            return Err(Status::invalid_state(
                "table handle was aborted, its table was not closed",
            ));
        }
        match self.state {
            TableState::Closing | TableState::Closed => {},
            state => {
                return Err(Status::invalid_state(format!(
                    "wait_on_close on a {state} table handle"
                )));
            },
        }

        let id = self.bound_id()?.to_string();
        let deadline = Instant::now() + timeout;
        loop {
            self.statistics.record_close_poll();
            if self.describe_remote(&id)?.state == RemoteState::Closed {
                self.state = TableState::Closed;
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Status::timed_out(format!(
                    "table {id} did not close within {timeout:?}"
                )));
            }
            thread::sleep(self.options.close_poll_interval.min(deadline - now));
        }
    }

    /// Drop buffered rows and stop using the handle without finalizing
    /// the remote table
    pub fn abort(&mut self) {
        let discarded = self.write_buffer.len();
        self.write_buffer.clear();
        self.statistics.record_discard(discarded as u64);

        if let TableState::Open(_) = self.state {
            self.state = TableState::Closed;
            self.aborted = true;
        }
        log::info!(
            "aborted table handle {} ({discarded} buffered rows discarded)",
            self.id.as_deref().unwrap_or("<unbound>")
        );
    }

    /// Release the handle according to its mode: write closes, append
    /// flushes, read does nothing
    fn release(&mut self) -> Result<()> {
        match self.state {
            TableState::Open(mode) if mode.closes_on_release() => self.close(),
            TableState::Open(AccessMode::Append) => self.flush(),
            _ => Ok(()),
        }
    }

    /// Release the handle, reporting any error instead of logging it
    ///
    /// A handle whose release fails is left `Failed`, so dropping it does
    /// not try again.
    pub fn finish(mut self) -> Result<()> {
        let result = self.release();
        if result.is_err() {
            self.state = TableState::Failed;
        }
        result
    }
}

/// Check one appended row against the writable columns
fn check_row(columns: &[ColumnDescriptor], index: usize, row: &[Value]) -> Result<()> {
    if row.len() != columns.len() {
        return Err(Status::invalid_argument(format!(
            "row {index} has {} values, table expects {}",
            row.len(),
            columns.len()
        )));
    }
    for (column, value) in columns.iter().zip(row) {
        if !column.column_type.accepts(value) {
            return Err(Status::invalid_argument(format!(
                "row {index}: {value:?} is not a valid {} for column '{}'",
                column.column_type, column.name
            )));
        }
    }
    Ok(())
}

impl Drop for TableHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!(
                "releasing table handle {} failed: {e}",
                self.id.as_deref().unwrap_or("<unbound>")
            );
        }
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("id", &self.id)
            .field("project", &self.project)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("columns", &self.columns.len())
            .field("indices", &self.indices.len())
            .field("buffered_rows", &self.write_buffer.len())
            .finish()
    }
}
