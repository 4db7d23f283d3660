pub mod factory;
pub mod schema;
pub mod service;
pub mod statistics;
pub mod table;
pub mod util;

pub use factory::{TableHandleFactory, extend_table, new_table, open_table};
pub use schema::{
    ColumnDescriptor, ColumnType, IndexDescriptor, LexicographicColumn, Row, SortOrder, Value,
};
pub use service::{
    GetRowsRequest, MemTableService, RemoteState, RowPage, RowQuery, TableDescription,
    TableService,
};
pub use statistics::Statistics;
pub use table::{
    AccessMode, CreateOptions, ExtendTableOptions, NewTableOptions, OpenOptions, RowIterator,
    TableHandle, TableOptions, TableState,
};
pub use util::{Code, Result, Status};
