/// Table handle module
///
/// A `TableHandle` binds this process to one remote table:
/// - `AccessMode`: read, write or append, fixed per handle
/// - `TableOptions`: client-side buffering and paging
/// - `CreateOptions` and friends: explicit arguments for open/new/extend
/// - `RowIterator`: lazy, paged row reads
///
/// # Usage
///
/// ```ignore
/// use std::sync::Arc;
/// use gtable::{AccessMode, MemTableService, TableHandle, TableOptions};
///
/// let service = Arc::new(MemTableService::new());
/// let mut handle = TableHandle::new(service, AccessMode::Read, TableOptions::default());
/// handle.bind("gtable-000001", None)?;
///
/// for row in handle.iter_rows()? {
///     println!("{:?}", row?.values);
/// }
/// ```
mod access_mode;
mod row_iterator;
mod table_handle;
mod table_options;

pub use access_mode::AccessMode;
pub use row_iterator::RowIterator;
pub use table_handle::{TableHandle, TableState};
pub use table_options::{
    CreateOptions, ExtendTableOptions, NewTableOptions, OpenOptions, TableOptions,
};
