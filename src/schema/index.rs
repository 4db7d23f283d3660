use serde::{Deserialize, Serialize};

use crate::{
    schema::{ColumnDescriptor, ColumnType},
    util::{Result, Status},
};

/// Default name given to a genomic range index
pub const DEFAULT_GENOMIC_INDEX_NAME: &str = "gri";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One column of a lexicographic index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LexicographicColumn {
    pub name: String,
    pub order: SortOrder,

    /// Only meaningful for string columns; `None` leaves it to the service
    /// (case sensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

impl LexicographicColumn {
    pub fn asc<S: Into<String>>(name: S) -> Self {
        LexicographicColumn {
            name: name.into(),
            order: SortOrder::Asc,
            case_sensitive: None,
        }
    }

    pub fn desc<S: Into<String>>(name: S) -> Self {
        LexicographicColumn {
            name: name.into(),
            order: SortOrder::Desc,
            case_sensitive: None,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }
}

/// Secondary index declared on a table
///
/// Indices are fixed when a table is created or extended and built by the
/// service after the table is closed. The wire shape is tagged by `kind`:
///
/// ```text
/// {"kind": "genomic", "name": "gri", "chr": "chr", "lo": "lo", "hi": "hi"}
/// {"kind": "lexicographic", "name": "by_name", "columns": [{"name": "a", "order": "asc"}]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndexDescriptor {
    /// Range index over (chromosome, low, high) coordinates
    Genomic {
        name: String,
        chr: String,
        lo: String,
        hi: String,
    },

    /// Multi-column sort-order index
    Lexicographic {
        name: String,
        columns: Vec<LexicographicColumn>,
    },
}

impl IndexDescriptor {
    /// Genomic range index named "gri"
    pub fn genomic_range<S: Into<String>>(chr: S, lo: S, hi: S) -> Self {
        Self::genomic_range_named(DEFAULT_GENOMIC_INDEX_NAME, chr, lo, hi)
    }

    pub fn genomic_range_named<N: Into<String>, S: Into<String>>(
        name: N,
        chr: S,
        lo: S,
        hi: S,
    ) -> Self {
        IndexDescriptor::Genomic {
            name: name.into(),
            chr: chr.into(),
            lo: lo.into(),
            hi: hi.into(),
        }
    }

    pub fn lexicographic<S: Into<String>>(name: S, columns: Vec<LexicographicColumn>) -> Self {
        IndexDescriptor::Lexicographic {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IndexDescriptor::Genomic { name, .. } => name,
            IndexDescriptor::Lexicographic { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IndexDescriptor::Genomic { .. } => "genomic",
            IndexDescriptor::Lexicographic { .. } => "lexicographic",
        }
    }

    /// Referenced column names, in declaration order
    pub fn columns(&self) -> Vec<&str> {
        match self {
            IndexDescriptor::Genomic { chr, lo, hi, .. } => vec![chr, lo, hi],
            IndexDescriptor::Lexicographic { columns, .. } => {
                columns.iter().map(|c| c.name.as_str()).collect()
            },
        }
    }

    /// Check this index against the columns of the table it is declared on
    pub fn validate(&self, columns: &[ColumnDescriptor]) -> Result<()> {
        let lookup = |name: &str| {
            columns.iter().find(|c| c.name == name).ok_or_else(|| {
                Status::schema_conflict(format!(
                    "index '{}' references unknown column '{name}'",
                    self.name()
                ))
            })
        };

        match self {
            IndexDescriptor::Genomic { chr, lo, hi, .. } => {
                if lookup(chr.as_str())?.column_type != ColumnType::String {
                    return Err(Status::schema_conflict(format!(
                        "genomic index '{}': column '{chr}' must be a string",
                        self.name()
                    )));
                }
                for coord in [lo, hi] {
                    if !lookup(coord.as_str())?.column_type.is_integer() {
                        return Err(Status::schema_conflict(format!(
                            "genomic index '{}': column '{coord}' must be an integer",
                            self.name()
                        )));
                    }
                }
            },
            IndexDescriptor::Lexicographic { columns: cols, .. } => {
                if cols.is_empty() {
                    return Err(Status::schema_conflict(format!(
                        "lexicographic index '{}' has no columns",
                        self.name()
                    )));
                }
                for col in cols {
                    lookup(col.name.as_str())?;
                }
            },
        }
        Ok(())
    }
}

/// Validate a list of indices: unique names, and each one against `columns`
pub fn validate_indices(indices: &[IndexDescriptor], columns: &[ColumnDescriptor]) -> Result<()> {
    for (i, index) in indices.iter().enumerate() {
        if indices[..i].iter().any(|other| other.name() == index.name()) {
            return Err(Status::schema_conflict(format!(
                "duplicate index '{}'",
                index.name()
            )));
        }
        index.validate(columns)?;
    }
    Ok(())
}
