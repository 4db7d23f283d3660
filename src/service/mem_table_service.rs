use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;

use crate::{
    schema::{ColumnDescriptor, IndexDescriptor, Row, Value, validate_columns, validate_indices},
    service::{
        CreateRequest, ExtendRequest, GetRowsRequest, IndexBuilder, RemoteState, RowPage,
        RowQuery, TableDescription, TableService, TableSource,
        index_builder::{BuiltIndex, compare_values},
    },
    table::CreateOptions,
    util::{Result, Status},
};

/// One table held by a `MemTableService`
struct StoredTable {
    description: TableDescription,

    /// Uploaded parts, drained into `rows` on close
    parts: BTreeMap<u32, Vec<Vec<Value>>>,

    /// Full rows, populated on close
    rows: Vec<Vec<Value>>,

    /// Index name → row ids in index order
    built: HashMap<String, BuiltIndex>,
}

/// In-process table service
///
/// Holds every table in memory and enforces the same contract as the
/// remote service:
/// - schemas are validated on create/extend
/// - rows are uploaded as numbered parts while a table is open
/// - close concatenates parts in part order; an extended table is joined
///   with its source row by row
/// - declared indices are built on a rayon worker after close, during which
///   the table is `closing`
/// - rows are readable once the table is `closed`
///
/// # Thread Safety
///
/// The table map and each table sit behind their own RwLock, so handles on
/// different tables do not contend.
pub struct MemTableService {
    tables: RwLock<HashMap<String, Arc<RwLock<StoredTable>>>>,

    /// Next table number to allocate
    next_id: AtomicU64,

    /// Projects in which creating tables is refused
    read_only_projects: RwLock<HashSet<String>>,

    index_builder: IndexBuilder,
}

impl Default for MemTableService {
    fn default() -> Self {
        MemTableService::new()
    }
}

impl MemTableService {
    pub fn new() -> Self {
        MemTableService::with_index_builder(IndexBuilder::default())
    }

    pub fn with_index_builder(index_builder: IndexBuilder) -> Self {
        MemTableService {
            tables: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            read_only_projects: RwLock::new(HashSet::new()),
            index_builder,
        }
    }

    /// Refuse table creation in `project` with `PermissionDenied`
    pub fn set_read_only(&self, project: &str) {
        self.read_only_projects.write().insert(project.to_string());
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    fn table(&self, id: &str) -> Result<Arc<RwLock<StoredTable>>> {
        self.tables
            .read()
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| Status::not_found(format!("table {id} not found")))
    }

    fn check_project(&self, project: Option<&str>) -> Result<()> {
        match project {
            Some(p) if self.read_only_projects.read().contains(p) => Err(
                Status::permission_denied(format!("project {p} is read-only")),
            ),
            _ => Ok(()),
        }
    }

    fn insert(
        &self,
        project: Option<String>,
        columns: Vec<ColumnDescriptor>,
        indices: Vec<IndexDescriptor>,
        source: Option<TableSource>,
        metadata: CreateOptions,
    ) -> String {
        let number = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("gtable-{number:06}");

        let table = StoredTable {
            description: TableDescription {
                id: id.clone(),
                project,
                columns,
                indices,
                state: RemoteState::Open,
                length: 0,
                parts: Vec::new(),
                source,
                metadata,
            },
            parts: BTreeMap::new(),
            rows: Vec::new(),
            built: HashMap::new(),
        };

        self.tables
            .write()
            .insert(id.clone(), Arc::new(RwLock::new(table)));
        log::debug!("created table {id}");
        id
    }

    /// Schedule index building for a table that just entered `closing`
    fn spawn_index_build(&self, id: String, table: Arc<RwLock<StoredTable>>) {
        let builder = self.index_builder.clone();
        rayon::spawn(move || {
            let t = table.read();
            let result = builder.build(&t.description.columns, &t.description.indices, &t.rows);
            drop(t);

            let mut t = table.write();
            match result {
                Ok(built) => {
                    log::debug!("built {} indices for table {id}", built.len());
                    t.built = built;
                },
                Err(e) => log::error!("index build failed for table {id}: {e}"),
            }
            t.description.state = RemoteState::Closed;
        });
    }
}

impl TableService for MemTableService {
    fn describe(&self, id: &str) -> Result<TableDescription> {
        let table = self.table(id)?;
        let t = table.read();
        Ok(t.description.clone())
    }

    fn create(&self, request: CreateRequest) -> Result<String> {
        let project = request.options.project.clone();
        self.check_project(project.as_deref())?;

        let (columns, indices) = match (request.columns, request.init_from) {
            (Some(_), Some(_)) => {
                return Err(Status::invalid_argument(
                    "columns and init_from are mutually exclusive",
                ));
            },
            (None, None) => {
                return Err(Status::invalid_argument(
                    "one of columns or init_from is required",
                ));
            },
            (Some(columns), None) => (columns, request.indices.unwrap_or_default()),
            (None, Some(source_id)) => {
                let source = self.describe(&source_id)?;
                let indices = request.indices.unwrap_or(source.indices);
                (source.columns, indices)
            },
        };

        if columns.is_empty() {
            return Err(Status::invalid_argument("a table needs at least one column"));
        }
        validate_columns(&columns)?;
        validate_indices(&indices, &columns)?;

        Ok(self.insert(project, columns, indices, None, request.options))
    }

    fn extend(&self, request: ExtendRequest) -> Result<String> {
        let source = self.describe(&request.source_id)?;
        if source.state != RemoteState::Closed {
            return Err(Status::invalid_state(format!(
                "table {} must be closed before it can be extended",
                source.id
            )));
        }
        if request.columns.is_empty() {
            return Err(Status::invalid_argument("extend needs at least one new column"));
        }

        let project = request.options.project.clone().or(source.project);
        self.check_project(project.as_deref())?;

        let inherited = source.columns.len();
        let mut columns = source.columns;
        columns.extend(request.columns);
        validate_columns(&columns)?;
        validate_indices(&request.indices, &columns)?;

        let origin = TableSource {
            id: source.id,
            columns: inherited,
        };
        Ok(self.insert(
            project,
            columns,
            request.indices,
            Some(origin),
            request.options,
        ))
    }

    fn add_rows(&self, id: &str, part: u32, rows: &[Vec<Value>]) -> Result<()> {
        let table = self.table(id)?;
        let mut t = table.write();

        if t.description.state != RemoteState::Open {
            return Err(Status::invalid_state(format!(
                "table {id} is not open for writing"
            )));
        }
        if part == 0 {
            return Err(Status::invalid_argument("part numbers start at 1"));
        }
        if t.parts.contains_key(&part) {
            return Err(Status::invalid_argument(format!(
                "part {part} of table {id} was already uploaded"
            )));
        }

        let writable = t.description.writable_columns();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != writable.len() {
                return Err(Status::invalid_argument(format!(
                    "row {i} of part {part} has {} values, expected {}",
                    row.len(),
                    writable.len()
                )));
            }
            for (value, col) in row.iter().zip(writable) {
                if !col.column_type.accepts(value) {
                    return Err(Status::invalid_argument(format!(
                        "row {i} of part {part}: {value:?} is not a valid {} for column '{}'",
                        col.column_type, col.name
                    )));
                }
            }
        }

        t.parts.insert(part, rows.to_vec());
        let pos = t.description.parts.partition_point(|&p| p < part);
        t.description.parts.insert(pos, part);
        log::trace!("table {id}: stored part {part} ({} rows)", rows.len());
        Ok(())
    }

    fn get_rows(&self, id: &str, request: &GetRowsRequest) -> Result<RowPage> {
        let table = self.table(id)?;
        let t = table.read();

        if t.description.state != RemoteState::Closed {
            return Err(Status::invalid_state(format!(
                "rows of table {id} can only be read once it is closed"
            )));
        }

        let projection: Option<Vec<usize>> = match &request.columns {
            None => None,
            Some(names) => Some(
                names
                    .iter()
                    .map(|name| {
                        t.description
                            .columns
                            .iter()
                            .position(|c| &c.name == name)
                            .ok_or_else(|| {
                                Status::invalid_argument(format!("unknown column '{name}'"))
                            })
                    })
                    .collect::<Result<_>>()?,
            ),
        };

        let matched: Vec<u64> = match &request.query {
            None => (0..t.rows.len() as u64).collect(),
            Some(query) => select(&t, query)?,
        };

        let total = matched.len() as u64;
        let start = request.starting.min(total) as usize;
        let end = match request.limit {
            Some(limit) => start.saturating_add(limit).min(matched.len()),
            None => matched.len(),
        };

        let rows = matched[start..end]
            .iter()
            .map(|&row_id| {
                let values = &t.rows[row_id as usize];
                let values = match &projection {
                    None => values.clone(),
                    Some(positions) => positions.iter().map(|&p| values[p].clone()).collect(),
                };
                Row { id: row_id, values }
            })
            .collect();

        let next = if end < matched.len() {
            Some(end as u64)
        } else {
            None
        };
        Ok(RowPage { rows, next, total })
    }

    fn close(&self, id: &str) -> Result<()> {
        let table = self.table(id)?;

        // The source is immutable once closed, so it is safe to read it
        // before taking this table's write lock.
        let source_id = table.read().description.source.as_ref().map(|s| s.id.clone());
        let source_rows = match source_id {
            Some(source_id) => {
                let source = self.table(&source_id)?;
                let rows = source.read().rows.clone();
                Some(rows)
            },
            None => None,
        };

        let mut t = table.write();
        if t.description.state != RemoteState::Open {
            return Err(Status::invalid_state(format!("table {id} is already closed")));
        }

        let appended: usize = t.parts.values().map(Vec::len).sum();
        if let Some(source_rows) = &source_rows
            && source_rows.len() != appended
        {
            return Err(Status::invalid_argument(format!(
                "table {id} extends a table of {} rows but {appended} rows were appended",
                source_rows.len()
            )));
        }

        let parts = std::mem::take(&mut t.parts);
        let appended = parts.into_values().flatten();
        t.rows = match source_rows {
            None => appended.collect(),
            Some(source_rows) => source_rows
                .into_iter()
                .zip(appended)
                .map(|(mut row, new_values)| {
                    row.extend(new_values);
                    row
                })
                .collect(),
        };
        t.description.length = t.rows.len() as u64;

        if t.description.indices.is_empty() {
            t.description.state = RemoteState::Closed;
            log::debug!("closed table {id} with {} rows", t.rows.len());
        } else {
            t.description.state = RemoteState::Closing;
            log::debug!(
                "closing table {id} with {} rows, building {} indices",
                t.rows.len(),
                t.description.indices.len()
            );
            drop(t);
            self.spawn_index_build(id.to_string(), table);
        }
        Ok(())
    }
}

/// Row ids selected by `query`, in index order
fn select(table: &StoredTable, query: &RowQuery) -> Result<Vec<u64>> {
    let name = query.index();
    let index = table
        .description
        .indices
        .iter()
        .find(|idx| idx.name() == name)
        .ok_or_else(|| Status::not_found(format!("index '{name}' not found")))?;
    let order = table
        .built
        .get(name)
        .ok_or_else(|| Status::not_found(format!("index '{name}' was not built")))?;

    match query {
        RowQuery::IndexOrder { .. } => Ok(order.clone()),
        RowQuery::GenomicRange { chr, lo, hi, .. } => {
            let IndexDescriptor::Genomic {
                chr: chr_col,
                lo: lo_col,
                hi: hi_col,
                ..
            } = index
            else {
                return Err(Status::invalid_argument(format!(
                    "index '{name}' is not a genomic range index"
                )));
            };

            let columns = &table.description.columns;
            let pos = |col: &str| columns.iter().position(|c| c.name == col).unwrap_or(0);
            let (chr_pos, lo_pos, hi_pos) = (
                pos(chr_col.as_str()),
                pos(lo_col.as_str()),
                pos(hi_col.as_str()),
            );
            let chr = Value::String(chr.clone());

            Ok(order
                .iter()
                .copied()
                .filter(|&row_id| {
                    let row = &table.rows[row_id as usize];
                    let row_lo = row[lo_pos].as_i64().unwrap_or(i64::MAX);
                    let row_hi = row[hi_pos].as_i64().unwrap_or(i64::MIN);
                    compare_values(&row[chr_pos], &chr, false).is_eq()
                        && row_lo <= *hi
                        && row_hi >= *lo
                })
                .collect())
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::{schema::ColumnType, util::Code};

    fn ab_columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("a", ColumnType::String),
            ColumnDescriptor::new("b", ColumnType::Int32),
        ]
    }

    fn create(service: &MemTableService, columns: Vec<ColumnDescriptor>) -> String {
        service
            .create(CreateRequest {
                columns: Some(columns),
                indices: None,
                init_from: None,
                options: CreateOptions::default(),
            })
            .unwrap()
    }

    fn wait_closed(service: &MemTableService, id: &str) {
        for _ in 0..500 {
            if service.describe(id).unwrap().state == RemoteState::Closed {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("table {id} never closed");
    }

    #[test]
    fn test_parts_concatenate_in_part_order() {
        let service = MemTableService::new();
        let id = create(&service, ab_columns());

        service
            .add_rows(&id, 2, &[vec!["bar".into(), 7.into()]])
            .unwrap();
        service
            .add_rows(&id, 1, &[vec!["foo".into(), 23.into()]])
            .unwrap();
        assert_eq!(service.describe(&id).unwrap().parts, vec![1, 2]);

        service.close(&id).unwrap();
        let page = service.get_rows(&id, &GetRowsRequest::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.rows[0].values, vec![Value::from("foo"), Value::Int(23)]);
        assert_eq!(page.rows[1].values, vec![Value::from("bar"), Value::Int(7)]);
    }

    #[test]
    fn test_add_rows_rejections() {
        let service = MemTableService::new();
        let id = create(&service, ab_columns());

        let err = service.add_rows(&id, 0, &[]).unwrap_err();
        assert_eq!(err.code(), &Code::InvalidArgument);

        let err = service.add_rows(&id, 1, &[vec!["x".into()]]).unwrap_err();
        assert_eq!(err.code(), &Code::InvalidArgument);

        let err = service
            .add_rows(&id, 1, &[vec![1.into(), 2.into()]])
            .unwrap_err();
        assert_eq!(err.code(), &Code::InvalidArgument);

        service
            .add_rows(&id, 1, &[vec!["x".into(), 1.into()]])
            .unwrap();
        let err = service
            .add_rows(&id, 1, &[vec!["y".into(), 2.into()]])
            .unwrap_err();
        assert_eq!(err.code(), &Code::InvalidArgument);

        service.close(&id).unwrap();
        let err = service
            .add_rows(&id, 2, &[vec!["y".into(), 2.into()]])
            .unwrap_err();
        assert_eq!(err.code(), &Code::InvalidState);
    }

    #[test]
    fn test_read_requires_closed() {
        let service = MemTableService::new();
        let id = create(&service, ab_columns());
        let err = service
            .get_rows(&id, &GetRowsRequest::default())
            .unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_unknown_table() {
        let service = MemTableService::new();
        assert!(service.describe("gtable-999999").unwrap_err().is_not_found());
        assert!(service.close("gtable-999999").unwrap_err().is_not_found());
    }

    #[test]
    fn test_schema_validation() {
        let service = MemTableService::new();
        let err = service
            .create(CreateRequest {
                columns: Some(ab_columns()),
                indices: Some(vec![IndexDescriptor::genomic_range("a", "b", "c")]),
                init_from: None,
                options: CreateOptions::default(),
            })
            .unwrap_err();
        assert_eq!(err.code(), &Code::SchemaConflict);
        assert_eq!(service.table_count(), 0);
    }

    #[test]
    fn test_read_only_project() {
        let service = MemTableService::new();
        service.set_read_only("project-ro");
        let err = service
            .create(CreateRequest {
                columns: Some(ab_columns()),
                indices: None,
                init_from: None,
                options: CreateOptions {
                    project: Some("project-ro".to_string()),
                    ..Default::default()
                },
            })
            .unwrap_err();
        assert_eq!(err.code(), &Code::PermissionDenied);
    }

    #[test]
    fn test_extend_joins_with_source() {
        let service = MemTableService::new();
        let source = create(&service, ab_columns());
        service
            .add_rows(
                &source,
                1,
                &[vec!["foo".into(), 23.into()], vec!["bar".into(), 7.into()]],
            )
            .unwrap();

        let request = ExtendRequest {
            source_id: source.clone(),
            columns: vec![ColumnDescriptor::new("c", ColumnType::Double)],
            indices: Vec::new(),
            options: CreateOptions::default(),
        };
        let err = service.extend(request.clone()).unwrap_err();
        assert!(err.is_invalid_state());

        service.close(&source).unwrap();
        let id = service.extend(request).unwrap();
        let desc = service.describe(&id).unwrap();
        assert_eq!(desc.columns.len(), 3);
        assert_eq!(desc.writable_columns().len(), 1);

        service.add_rows(&id, 1, &[vec![1.5.into()]]).unwrap();
        let err = service.close(&id).unwrap_err();
        assert_eq!(err.code(), &Code::InvalidArgument);

        service.add_rows(&id, 2, &[vec![2.5.into()]]).unwrap();
        service.close(&id).unwrap();

        let page = service.get_rows(&id, &GetRowsRequest::default()).unwrap();
        assert_eq!(
            page.rows[1].values,
            vec![Value::from("bar"), Value::Int(7), Value::Float(2.5)]
        );

        // The source is untouched
        let source_page = service
            .get_rows(&source, &GetRowsRequest::default())
            .unwrap();
        assert_eq!(source_page.rows[1].values.len(), 2);
    }

    #[test]
    fn test_close_with_indices_and_query() {
        let service = MemTableService::new();
        let id = service
            .create(CreateRequest {
                columns: Some(vec![
                    ColumnDescriptor::new("chr", ColumnType::String),
                    ColumnDescriptor::new("lo", ColumnType::Int32),
                    ColumnDescriptor::new("hi", ColumnType::Int32),
                ]),
                indices: Some(vec![IndexDescriptor::genomic_range("chr", "lo", "hi")]),
                init_from: None,
                options: CreateOptions::default(),
            })
            .unwrap();

        service
            .add_rows(
                &id,
                1,
                &[
                    vec!["chr1".into(), 500.into(), 600.into()],
                    vec!["chr2".into(), 0.into(), 1000.into()],
                    vec!["chr1".into(), 100.into(), 200.into()],
                    vec!["chr1".into(), 150.into(), 550.into()],
                ],
            )
            .unwrap();
        service.close(&id).unwrap();
        wait_closed(&service, &id);

        let request = GetRowsRequest {
            query: Some(RowQuery::genomic_range("gri", "chr1", 180, 520)),
            columns: Some(vec!["lo".to_string()]),
            ..Default::default()
        };
        let page = service.get_rows(&id, &request).unwrap();
        let ids: Vec<u64> = page.rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 0]);
        assert_eq!(page.rows[0].values, vec![Value::Int(100)]);

        let missing = GetRowsRequest {
            query: Some(RowQuery::IndexOrder {
                index: "nope".to_string(),
            }),
            ..Default::default()
        };
        assert!(service.get_rows(&id, &missing).unwrap_err().is_not_found());
    }

    #[test]
    fn test_paging() {
        let service = MemTableService::new();
        let id = create(&service, ab_columns());
        let rows: Vec<Vec<Value>> = (0..5i64).map(|i| vec!["r".into(), i.into()]).collect();
        service.add_rows(&id, 1, &rows).unwrap();
        service.close(&id).unwrap();

        let page = service
            .get_rows(
                &id,
                &GetRowsRequest {
                    starting: 1,
                    limit: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.rows.len(), 3);
        assert_eq!(page.rows[0].id, 1);
        assert_eq!(page.next, Some(4));
        assert_eq!(page.total, 5);

        let tail = service
            .get_rows(
                &id,
                &GetRowsRequest {
                    starting: 4,
                    limit: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(tail.rows.len(), 1);
        assert_eq!(tail.next, None);
    }
}
