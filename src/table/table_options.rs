use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    schema::{ColumnDescriptor, IndexDescriptor},
    table::{AccessMode, TableHandle},
};

/// Client-side tuning for a table handle
///
/// # Example
///
/// ```ignore
/// use gtable::TableOptions;
///
/// let options = TableOptions {
///     write_buffer_rows: 1000,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Buffered rows that trigger a part upload
    /// Default: 10000
    pub write_buffer_rows: usize,

    /// Rows requested per page when iterating
    /// Default: 1000
    pub read_page_rows: usize,

    /// Delay between `describe` polls in `wait_on_close`
    /// Default: 250ms
    pub close_poll_interval: Duration,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            write_buffer_rows: 10_000,
            read_page_rows: 1000,
            close_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Metadata for a table being created or extended
///
/// Every option the table service understands at creation time is a field
/// here; anything else cannot be expressed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOptions {
    /// Display name of the new table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Project that will contain the new table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Folder inside the project, e.g. "/results"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Create missing parent folders
    #[serde(default)]
    pub parents: bool,

    /// Hide the table from default listings
    #[serde(default)]
    pub hidden: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Arbitrary JSON stored with the table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CreateOptions {
    pub fn named<S: Into<String>>(name: S) -> Self {
        CreateOptions {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Arguments for opening an existing table
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub project: Option<String>,

    /// Deprecated: `true` opens for write. Use `mode` instead.
    pub keep_open: Option<bool>,

    pub mode: Option<AccessMode>,
}

impl OpenOptions {
    pub fn with_mode(mode: AccessMode) -> Self {
        OpenOptions {
            mode: Some(mode),
            ..Default::default()
        }
    }
}

/// Arguments for creating a new table
///
/// Exactly one of `columns` and `init_from` must be set.
#[derive(Default)]
pub struct NewTableOptions<'a> {
    pub columns: Option<Vec<ColumnDescriptor>>,

    /// Declared indices; when cloning with `init_from` and left `None`,
    /// the source's indices are cloned too
    pub indices: Option<Vec<IndexDescriptor>>,

    /// Table whose columns (and indices) the new table copies
    pub init_from: Option<&'a TableHandle>,

    /// Deprecated: `true` opens for write. Use `mode` instead.
    pub keep_open: Option<bool>,

    pub mode: Option<AccessMode>,

    pub create: CreateOptions,
}

impl<'a> NewTableOptions<'a> {
    pub fn with_columns(columns: Vec<ColumnDescriptor>) -> Self {
        NewTableOptions {
            columns: Some(columns),
            ..Default::default()
        }
    }

    pub fn init_from(source: &'a TableHandle) -> Self {
        NewTableOptions {
            init_from: Some(source),
            ..Default::default()
        }
    }
}

/// Arguments for extending an existing table with new columns
#[derive(Debug, Clone, Default)]
pub struct ExtendTableOptions {
    pub indices: Option<Vec<IndexDescriptor>>,

    /// Deprecated: `true` opens for write. Use `mode` instead.
    pub keep_open: Option<bool>,

    pub mode: Option<AccessMode>,

    pub create: CreateOptions,
}
