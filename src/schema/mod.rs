/// Schema module
///
/// Pure data describing what a table holds:
/// - `ColumnDescriptor` / `ColumnType`: ordered, typed columns
/// - `IndexDescriptor`: secondary indices built when a table is closed
/// - `Value` / `Row`: cell values as appended and read back
///
/// All types serialize to the JSON shapes the table service speaks.
mod column;
mod index;
mod value;

pub use column::{ColumnDescriptor, ColumnType, validate_columns};
pub use index::{
    DEFAULT_GENOMIC_INDEX_NAME, IndexDescriptor, LexicographicColumn, SortOrder, validate_indices,
};
pub use value::{Row, Value};
