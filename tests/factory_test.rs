use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use gtable::{
    AccessMode, Code, ColumnDescriptor, ColumnType, CreateOptions, ExtendTableOptions,
    GetRowsRequest, IndexDescriptor, MemTableService, NewTableOptions, OpenOptions, RemoteState,
    RowQuery, Status, TableDescription, TableHandleFactory, TableOptions, TableService,
    TableState, Value,
    service::{CreateRequest, ExtendRequest, RowPage},
};

fn setup() -> (Arc<MemTableService>, TableHandleFactory) {
    let service = Arc::new(MemTableService::new());
    let options = TableOptions {
        close_poll_interval: Duration::from_millis(5),
        ..Default::default()
    };
    let factory = TableHandleFactory::with_options(service.clone(), options);
    (service, factory)
}

fn ab_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::parse("a", "string").unwrap(),
        ColumnDescriptor::parse("b", "int32").unwrap(),
    ]
}

/// Create, fill and close the two-row table used across these tests
fn foo_bar_table(factory: &TableHandleFactory) -> String {
    let mut table = factory
        .new_table(NewTableOptions {
            mode: Some(AccessMode::Write),
            ..NewTableOptions::with_columns(ab_columns())
        })
        .unwrap();
    table
        .append_rows(vec![
            vec!["foo".into(), 23.into()],
            vec!["bar".into(), 7.into()],
        ])
        .unwrap();
    let id = table.id().unwrap().to_string();
    table.close().unwrap();
    id
}

#[test]
fn test_create_append_close() {
    let (service, factory) = setup();
    let id = foo_bar_table(&factory);

    let desc = service.describe(&id).unwrap();
    assert_eq!(desc.state, RemoteState::Closed);
    assert_eq!(desc.length, 2);
    assert_eq!(desc.columns, ab_columns());

    let reader = factory.open_table(&id, OpenOptions::default()).unwrap();
    let rows: Vec<Vec<Value>> = reader
        .iter_rows()
        .unwrap()
        .map(|r| r.unwrap().values)
        .collect();
    assert_eq!(
        rows,
        vec![
            vec![Value::from("foo"), Value::Int(23)],
            vec![Value::from("bar"), Value::Int(7)],
        ]
    );
}

#[test]
fn test_keep_open_is_write() {
    let (_, factory) = setup();
    let mut legacy = factory
        .open_table(
            "gtable-000001",
            OpenOptions {
                keep_open: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    let mut explicit = factory
        .open_table("gtable-000001", OpenOptions::with_mode(AccessMode::Write))
        .unwrap();
    assert_eq!(legacy.mode(), explicit.mode());
    legacy.abort();
    explicit.abort();
}

#[test]
fn test_extend_scenario() {
    let (service, factory) = setup();
    let source = foo_bar_table(&factory);

    let new_cols = vec![
        ColumnDescriptor::new("newcol", ColumnType::Double),
        ColumnDescriptor::new("anothercol", ColumnType::Int32),
    ];
    let mut extended = factory
        .extend_table(
            &source,
            new_cols.clone(),
            ExtendTableOptions {
                create: CreateOptions::named("extended"),
                ..Default::default()
            },
        )
        .unwrap();

    let mut expected = ab_columns();
    expected.extend(new_cols);
    assert_eq!(extended.columns(), expected.as_slice());
    assert_ne!(extended.id(), Some(source.as_str()));

    for _ in 0..2 {
        extended
            .append_row(vec![2.5498.into(), 93.into()])
            .unwrap();
    }
    let id = extended.id().unwrap().to_string();
    extended.close().unwrap();

    let desc = service.describe(&id).unwrap();
    assert_eq!(desc.columns, expected);
    assert_eq!(desc.length, 2);
    assert_eq!(desc.metadata.name.as_deref(), Some("extended"));

    // Source keeps its identity, schema and content
    let source_desc = service.describe(&source).unwrap();
    assert_eq!(source_desc.columns, ab_columns());
    assert_eq!(source_desc.length, 2);

    let page = service.get_rows(&id, &GetRowsRequest::default()).unwrap();
    assert_eq!(
        page.rows[0].values,
        vec![
            Value::from("foo"),
            Value::Int(23),
            Value::Float(2.5498),
            Value::Int(93)
        ]
    );
}

#[test]
fn test_extend_keeps_indices_unmodified() {
    let (service, factory) = setup();
    let mut source = factory
        .new_table(NewTableOptions::with_columns(vec![
            ColumnDescriptor::new("chr", ColumnType::String),
            ColumnDescriptor::new("lo", ColumnType::Int32),
        ]))
        .unwrap();
    source
        .append_rows(vec![
            vec!["chr1".into(), 100.into()],
            vec!["chr1".into(), 10.into()],
        ])
        .unwrap();
    let source_id = source.id().unwrap().to_string();
    source.close().unwrap();

    let gri = IndexDescriptor::genomic_range("chr", "lo", "hi");
    let mut extended = factory
        .extend_table(
            &source_id,
            vec![ColumnDescriptor::new("hi", ColumnType::Int32)],
            ExtendTableOptions {
                indices: Some(vec![gri.clone()]),
                mode: Some(AccessMode::Write),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(extended.indices(), &[gri.clone()]);

    extended
        .append_rows(vec![vec![200.into()], vec![20.into()]])
        .unwrap();
    extended.close().unwrap();
    assert_eq!(extended.state(), TableState::Closing);
    extended.wait_on_close(Duration::from_secs(10)).unwrap();

    let id = extended.id().unwrap().to_string();
    assert_eq!(service.describe(&id).unwrap().indices, vec![gri]);

    let rows: Vec<u64> = extended
        .iter_rows_with(GetRowsRequest {
            query: Some(RowQuery::genomic_range("gri", "chr1", 15, 18)),
            ..Default::default()
        })
        .unwrap()
        .map(|r| r.unwrap().id)
        .collect();
    assert_eq!(rows, vec![1]);
}

#[test]
fn test_extend_row_count_mismatch() {
    let (service, factory) = setup();
    let source = foo_bar_table(&factory);

    let mut extended = factory
        .extend_table(
            &source,
            vec![ColumnDescriptor::new("c", ColumnType::Boolean)],
            ExtendTableOptions::default(),
        )
        .unwrap();
    extended.append_row(vec![true.into()]).unwrap();

    let err = extended.close().unwrap_err();
    assert_eq!(err.code(), &Code::InvalidArgument);
    assert_eq!(extended.state(), TableState::Open(AccessMode::Write));

    extended.append_row(vec![false.into()]).unwrap();
    extended.close().unwrap();
    let id = extended.id().unwrap().to_string();
    assert_eq!(service.describe(&id).unwrap().length, 2);
}

#[test]
fn test_failed_finish_reports_once() {
    let (service, factory) = setup();
    let source = foo_bar_table(&factory);

    let mut extended = factory
        .extend_table(
            &source,
            vec![ColumnDescriptor::new("c", ColumnType::Boolean)],
            ExtendTableOptions::default(),
        )
        .unwrap();
    extended.append_row(vec![true.into()]).unwrap();
    let id = extended.id().unwrap().to_string();

    let err = extended.finish().unwrap_err();
    assert_eq!(err.code(), &Code::InvalidArgument);
    assert_eq!(service.describe(&id).unwrap().state, RemoteState::Open);
}

#[test]
fn test_init_from_clones_schema() {
    let (_, factory) = setup();
    let columns = vec![
        ColumnDescriptor::new("chr", ColumnType::String),
        ColumnDescriptor::new("lo", ColumnType::Int64),
        ColumnDescriptor::new("hi", ColumnType::Int64),
    ];
    let gri = IndexDescriptor::genomic_range("chr", "lo", "hi");
    let source = factory
        .new_table(NewTableOptions {
            indices: Some(vec![gri.clone()]),
            ..NewTableOptions::with_columns(columns.clone())
        })
        .unwrap();

    let mut clone = factory
        .new_table(NewTableOptions::init_from(&source))
        .unwrap();
    assert_eq!(clone.columns(), columns.as_slice());
    assert_eq!(clone.indices(), &[gri]);
    assert_ne!(clone.id(), source.id());

    let mut bare = factory
        .new_table(NewTableOptions {
            indices: Some(Vec::new()),
            ..NewTableOptions::init_from(&source)
        })
        .unwrap();
    assert!(bare.indices().is_empty());

    clone.abort();
    bare.abort();
}

#[test]
fn test_write_to_closed_table_surfaces_service_error() {
    let (_, factory) = setup();
    let id = foo_bar_table(&factory);

    let mut writer = factory
        .open_table(&id, OpenOptions::with_mode(AccessMode::Append))
        .unwrap();
    let err = writer
        .append_row(vec!["baz".into(), 1.into()])
        .unwrap_err();
    assert!(err.is_invalid_state());
}

#[test]
fn test_open_unknown_table_fails_on_first_use() {
    let (_, factory) = setup();
    let reader = factory
        .open_table("gtable-000404", OpenOptions::default())
        .unwrap();
    let mut rows = reader.iter_rows().unwrap();
    assert!(rows.next().unwrap().unwrap_err().is_not_found());
}

/// A service whose every call fails with the same status
struct FailingService(Status);

impl TableService for FailingService {
    fn describe(&self, _id: &str) -> gtable::Result<TableDescription> {
        Err(self.0.clone())
    }

    fn create(&self, _request: CreateRequest) -> gtable::Result<String> {
        Err(self.0.clone())
    }

    fn extend(&self, _request: ExtendRequest) -> gtable::Result<String> {
        Err(self.0.clone())
    }

    fn add_rows(&self, _id: &str, _part: u32, _rows: &[Vec<Value>]) -> gtable::Result<()> {
        Err(self.0.clone())
    }

    fn get_rows(&self, _id: &str, _request: &GetRowsRequest) -> gtable::Result<RowPage> {
        Err(self.0.clone())
    }

    fn close(&self, _id: &str) -> gtable::Result<()> {
        Err(self.0.clone())
    }
}

#[test]
fn test_service_errors_are_unmodified() {
    let status = Status::permission_denied("project-x: VIEW access only");
    let factory = TableHandleFactory::new(Arc::new(FailingService(status)));

    let err = factory
        .new_table(NewTableOptions::with_columns(ab_columns()))
        .unwrap_err();
    assert_eq!(err.code(), &Code::PermissionDenied);
    assert_eq!(err.message(), Some("project-x: VIEW access only"));

    let err = factory
        .extend_table("gtable-000001", ab_columns(), ExtendTableOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), &Code::PermissionDenied);
}

#[test]
fn test_config_errors_skip_the_service() {
    let status = Status::io_error("network unreachable");
    let factory = TableHandleFactory::new(Arc::new(FailingService(status)));

    let err = factory
        .new_table(NewTableOptions {
            keep_open: Some(true),
            mode: Some(AccessMode::Append),
            ..NewTableOptions::with_columns(ab_columns())
        })
        .unwrap_err();
    assert!(err.is_config_error());
    assert_eq!(err.code(), &Code::ConflictingModeSpec);
}

/// Delegates to an in-memory service, failing the first `failures` uploads
struct FlakyUploads {
    inner: Arc<MemTableService>,
    failures: AtomicU32,
}

impl TableService for FlakyUploads {
    fn describe(&self, id: &str) -> gtable::Result<TableDescription> {
        self.inner.describe(id)
    }

    fn create(&self, request: CreateRequest) -> gtable::Result<String> {
        self.inner.create(request)
    }

    fn extend(&self, request: ExtendRequest) -> gtable::Result<String> {
        self.inner.extend(request)
    }

    fn add_rows(&self, id: &str, part: u32, rows: &[Vec<Value>]) -> gtable::Result<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Status::io_error("network blip"));
        }
        self.inner.add_rows(id, part, rows)
    }

    fn get_rows(&self, id: &str, request: &GetRowsRequest) -> gtable::Result<RowPage> {
        self.inner.get_rows(id, request)
    }

    fn close(&self, id: &str) -> gtable::Result<()> {
        self.inner.close(id)
    }
}

#[test]
fn test_upload_failures_keep_rows_once() {
    let inner = Arc::new(MemTableService::new());
    let flaky = FlakyUploads {
        inner: inner.clone(),
        failures: AtomicU32::new(1),
    };
    let options = TableOptions {
        write_buffer_rows: 1,
        ..Default::default()
    };
    let factory = TableHandleFactory::with_options(Arc::new(flaky), options);

    let mut table = factory
        .new_table(NewTableOptions::with_columns(ab_columns()))
        .unwrap();
    table.append_row(vec!["foo".into(), 23.into()]).unwrap();

    // A value the column cannot hold is refused without blocking the buffer
    let err = table
        .append_row(vec!["bar".into(), "oops".into()])
        .unwrap_err();
    assert_eq!(err.code(), &Code::InvalidArgument);

    table.append_row(vec!["bar".into(), 7.into()]).unwrap();
    let id = table.id().unwrap().to_string();
    table.finish().unwrap();

    let desc = inner.describe(&id).unwrap();
    assert_eq!(desc.state, RemoteState::Closed);
    assert_eq!(desc.length, 2);

    let page = inner.get_rows(&id, &GetRowsRequest::default()).unwrap();
    let values: Vec<Vec<Value>> = page.rows.into_iter().map(|r| r.values).collect();
    assert_eq!(
        values,
        vec![
            vec![Value::from("foo"), Value::Int(23)],
            vec![Value::from("bar"), Value::Int(7)],
        ]
    );
}
