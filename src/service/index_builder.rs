use std::{cmp::Ordering, collections::HashMap};

use rayon::prelude::*;

use crate::{
    schema::{ColumnDescriptor, IndexDescriptor, SortOrder, Value},
    util::{Result, Status},
};

/// Row ids of a table, in the order an index sorts them
pub type BuiltIndex = Vec<u64>;

/// Builds secondary indices over the rows of a closed table
///
/// Each index becomes a permutation of row ids. Independent indices are
/// built in parallel with rayon.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    pub enable_parallel: bool,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        IndexBuilder {
            enable_parallel: true,
        }
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        IndexBuilder::default()
    }

    /// Build every index, keyed by index name
    pub fn build(
        &self,
        columns: &[ColumnDescriptor],
        indices: &[IndexDescriptor],
        rows: &[Vec<Value>],
    ) -> Result<HashMap<String, BuiltIndex>> {
        if !self.enable_parallel || indices.len() < 2 {
            return indices
                .iter()
                .map(|index| {
                    build_one(columns, index, rows).map(|ids| (index.name().to_string(), ids))
                })
                .collect();
        }

        indices
            .par_iter()
            .map(|index| build_one(columns, index, rows).map(|ids| (index.name().to_string(), ids)))
            .collect()
    }
}

/// A sort key component: column position, direction, case folding
struct KeyPart {
    position: usize,
    order: SortOrder,
    fold_case: bool,
}

fn position(columns: &[ColumnDescriptor], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| Status::schema_conflict(format!("index references unknown column '{name}'")))
}

fn build_one(
    columns: &[ColumnDescriptor],
    index: &IndexDescriptor,
    rows: &[Vec<Value>],
) -> Result<BuiltIndex> {
    let key: Vec<KeyPart> = match index {
        IndexDescriptor::Genomic { chr, lo, hi, .. } => [chr, lo, hi]
            .into_iter()
            .map(|name| {
                position(columns, name).map(|position| KeyPart {
                    position,
                    order: SortOrder::Asc,
                    fold_case: false,
                })
            })
            .collect::<Result<_>>()?,
        IndexDescriptor::Lexicographic { columns: cols, .. } => cols
            .iter()
            .map(|col| {
                position(columns, &col.name).map(|position| KeyPart {
                    position,
                    order: col.order,
                    fold_case: col.case_sensitive == Some(false),
                })
            })
            .collect::<Result<_>>()?,
    };

    let mut ids: Vec<u64> = (0..rows.len() as u64).collect();
    // Stable sort: rows with equal keys keep their row id order
    ids.sort_by(|&a, &b| {
        let (ra, rb) = (&rows[a as usize], &rows[b as usize]);
        for part in &key {
            let ord = compare_values(&ra[part.position], &rb[part.position], part.fold_case);
            let ord = match part.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(ids)
}

/// Total order over values; values of different kinds order by kind
pub(crate) fn compare_values(a: &Value, b: &Value, fold_case: bool) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) if fold_case => {
            x.to_lowercase().cmp(&y.to_lowercase())
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let x = a.as_f64().unwrap_or_default();
            let y = b.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        },
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Int(_) | Value::Float(_) => 1,
        Value::String(_) => 2,
    }
}
