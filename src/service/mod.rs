/// Table service module
///
/// The `TableService` trait is the seam between table handles and whatever
/// hosts the tables. A handle never talks to storage directly; every
/// create/extend/upload/read/close goes through one of these calls, and any
/// error the service returns is handed back to the caller unmodified.
///
/// # Remote lifecycle
///
/// ```text
/// create / extend ──→ open ──add_rows(part)──→ open
///                      │
///                    close
///                      ↓
///          closing (building indices) ──→ closed (rows readable)
/// ```
///
/// `MemTableService` is an in-process implementation with the same
/// contract, used for tests and local pipelines.
use serde::{Deserialize, Serialize};

use crate::{
    schema::{ColumnDescriptor, IndexDescriptor, Row, Value},
    table::CreateOptions,
    util::Result,
};

mod index_builder;
mod mem_table_service;

pub use index_builder::IndexBuilder;
pub use mem_table_service::MemTableService;

/// State of a table as the service sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Open,
    Closing,
    Closed,
}

/// Where an extended table's leading columns come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSource {
    pub id: String,

    /// Number of leading columns inherited from the source
    pub columns: usize,
}

/// Snapshot of a table returned by `describe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub id: String,
    pub project: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    pub indices: Vec<IndexDescriptor>,
    pub state: RemoteState,

    /// Number of rows; only meaningful once the table is closed
    pub length: u64,

    /// Uploaded part numbers, ascending
    pub parts: Vec<u32>,

    pub source: Option<TableSource>,
    pub metadata: CreateOptions,
}

impl TableDescription {
    /// Columns that rows appended to this table must supply
    ///
    /// For an extended table only the new trailing columns are written;
    /// the leading ones come from the source.
    pub fn writable_columns(&self) -> &[ColumnDescriptor] {
        let inherited = self.source.as_ref().map_or(0, |s| s.columns);
        &self.columns[inherited.min(self.columns.len())..]
    }

    /// Part number the next upload should use
    pub fn next_part(&self) -> u32 {
        self.parts.last().map_or(1, |p| p + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnDescriptor>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<IndexDescriptor>>,

    /// Table whose schema is cloned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_from: Option<String>,

    pub options: CreateOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendRequest {
    pub source_id: String,

    /// Columns appended after the source's columns
    pub columns: Vec<ColumnDescriptor>,

    pub indices: Vec<IndexDescriptor>,
    pub options: CreateOptions,
}

/// Row selection through a built index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowQuery {
    /// Rows whose [lo, hi] interval overlaps the query interval on `chr`,
    /// in index order
    GenomicRange {
        index: String,
        chr: String,
        lo: i64,
        hi: i64,
    },

    /// All rows, in the order of a lexicographic or genomic index
    IndexOrder { index: String },
}

impl RowQuery {
    pub fn genomic_range<S: Into<String>>(index: S, chr: S, lo: i64, hi: i64) -> Self {
        RowQuery::GenomicRange {
            index: index.into(),
            chr: chr.into(),
            lo,
            hi,
        }
    }

    pub fn index(&self) -> &str {
        match self {
            RowQuery::GenomicRange { index, .. } => index,
            RowQuery::IndexOrder { index } => index,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetRowsRequest {
    /// Cursor position to start from: a row id without a query, an offset
    /// into the query result with one
    #[serde(default)]
    pub starting: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Column projection, by name; `None` returns every column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<RowQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPage {
    pub rows: Vec<Row>,

    /// Cursor for the following page, `None` when exhausted
    pub next: Option<u64>,

    /// Rows matched in total, across all pages
    pub total: u64,
}

/// Remote operations a table handle relies on
///
/// Calls block until the service answers. Implementations must be safe to
/// share between threads; a single table is only ever written through one
/// handle at a time.
///
/// Failures reaching the service are reported as `Code::IOError`; a handle
/// keeps rows whose upload failed and sends them again as the same part.
pub trait TableService: Send + Sync {
    fn describe(&self, id: &str) -> Result<TableDescription>;

    /// Create a new open table, returning its id
    fn create(&self, request: CreateRequest) -> Result<String>;

    /// Create a new open table whose schema is the source's columns followed
    /// by `request.columns`, returning its id
    fn extend(&self, request: ExtendRequest) -> Result<String>;

    /// Upload one numbered part of rows to an open table
    fn add_rows(&self, id: &str, part: u32, rows: &[Vec<Value>]) -> Result<()>;

    fn get_rows(&self, id: &str, request: &GetRowsRequest) -> Result<RowPage>;

    /// Finalize an open table; index building, if any, continues after
    /// this returns
    fn close(&self, id: &str) -> Result<()>;
}
