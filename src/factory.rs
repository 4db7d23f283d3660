//! Entry points that turn user intent into a bound `TableHandle`.
//!
//! Each operation checks the arguments it can check locally, resolves one
//! access mode, builds an unbound handle with that mode and binds it in a
//! single step. Local configuration errors are returned before the table
//! service is contacted; service errors are returned as they come.

use std::sync::Arc;

use crate::{
    schema::ColumnDescriptor,
    service::TableService,
    table::{
        AccessMode, ExtendTableOptions, NewTableOptions, OpenOptions, TableHandle, TableOptions,
    },
    util::{Result, Status},
};

/// Builds table handles against one table service
///
/// Holds no per-table state; every call produces an independent handle.
#[derive(Clone)]
pub struct TableHandleFactory {
    service: Arc<dyn TableService>,
    options: TableOptions,
}

impl TableHandleFactory {
    pub fn new(service: Arc<dyn TableService>) -> Self {
        TableHandleFactory::with_options(service, TableOptions::default())
    }

    pub fn with_options(service: Arc<dyn TableService>, options: TableOptions) -> Self {
        TableHandleFactory { service, options }
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    fn handle(&self, mode: AccessMode) -> TableHandle {
        TableHandle::new(Arc::clone(&self.service), mode, self.options.clone())
    }

    /// Open an existing table for reading, writing or appending
    ///
    /// The mode comes from `open.mode`, else the deprecated `keep_open`,
    /// else defaults to read. No service call is made.
    pub fn open_table(&self, id: &str, open: OpenOptions) -> Result<TableHandle> {
        if id.is_empty() {
            return Err(Status::invalid_argument("table id must not be empty"));
        }
        let mode = AccessMode::resolve(open.keep_open, open.mode)?;

        let mut handle = self.handle(mode);
        handle.bind(id, open.project)?;
        Ok(handle)
    }

    /// Create a new table, open for writing
    ///
    /// The schema comes from exactly one of `new.columns` and
    /// `new.init_from`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let columns = vec![
    ///     ColumnDescriptor::new("a", ColumnType::String),
    ///     ColumnDescriptor::new("b", ColumnType::Int32),
    /// ];
    /// let mut table = factory.new_table(NewTableOptions::with_columns(columns))?;
    /// table.append_rows(vec![
    ///     vec!["foo".into(), 23.into()],
    ///     vec!["bar".into(), 7.into()],
    /// ])?;
    /// table.close()?;
    /// ```
    pub fn new_table(&self, new: NewTableOptions<'_>) -> Result<TableHandle> {
        let mode = AccessMode::resolve_for_create(new.keep_open, new.mode)?;

        match (&new.columns, &new.init_from) {
            (Some(_), Some(_)) => return Err(Status::ambiguous_schema_source()),
            (None, None) => return Err(Status::missing_schema_source()),
            (Some(columns), None) if columns.is_empty() => {
                return Err(Status::empty_column_set(
                    "a new table needs at least one column",
                ));
            },
            _ => {},
        }

        let mut handle = self.handle(mode);
        handle.create(new.columns, new.indices, new.init_from, new.create)?;
        Ok(handle)
    }

    /// Create a new table holding table `id`'s columns followed by
    /// `columns`, open for writing the new columns
    ///
    /// The source table is left untouched. Rows appended to the returned
    /// handle carry values for `columns` only, one per source row, in
    /// source row order; the service checks the row count on close.
    pub fn extend_table(
        &self,
        id: &str,
        columns: Vec<ColumnDescriptor>,
        extend: ExtendTableOptions,
    ) -> Result<TableHandle> {
        if id.is_empty() {
            return Err(Status::invalid_argument("table id must not be empty"));
        }
        let mode = AccessMode::resolve_for_create(extend.keep_open, extend.mode)?;
        if columns.is_empty() {
            return Err(Status::empty_column_set(
                "extending a table needs at least one new column",
            ));
        }

        let mut handle = self.handle(mode);
        handle.extend(
            id,
            columns,
            extend.indices.unwrap_or_default(),
            extend.create,
        )?;
        Ok(handle)
    }
}

/// Open an existing table with default `TableOptions`
pub fn open_table(
    service: Arc<dyn TableService>,
    id: &str,
    open: OpenOptions,
) -> Result<TableHandle> {
    TableHandleFactory::new(service).open_table(id, open)
}

/// Create a new table with default `TableOptions`
pub fn new_table(service: Arc<dyn TableService>, new: NewTableOptions<'_>) -> Result<TableHandle> {
    TableHandleFactory::new(service).new_table(new)
}

/// Extend an existing table with default `TableOptions`
pub fn extend_table(
    service: Arc<dyn TableService>,
    id: &str,
    columns: Vec<ColumnDescriptor>,
    extend: ExtendTableOptions,
) -> Result<TableHandle> {
    TableHandleFactory::new(service).extend_table(id, columns, extend)
}
