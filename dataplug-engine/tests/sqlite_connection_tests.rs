use dataplug_engine::{
    ColumnSchema, DbValue, EngineAdapter, EngineError, NativeConnection, NativeType, ParamType,
    Row, SqliteAdapter, StandardDialect, MigrationDialect,
};
use pretty_assertions::assert_eq;

fn open_memory() -> Box<dyn NativeConnection> {
    SqliteAdapter::new().open("Data Source=:memory:").unwrap()
}

fn seed(conn: &mut dyn NativeConnection) {
    conn.execute_batch(
        "CREATE TABLE assets (id VARCHAR(36) PRIMARY KEY, name VARCHAR(64), kind INTEGER, local BOOLEAN);",
    )
    .unwrap();
    for (i, name) in ["alpha", "beta", "gamma"].iter().enumerate() {
        conn.execute(
            "INSERT INTO assets (id, name, kind, local) VALUES (@id, @name, @kind, @local)",
            &[
                DbValue::Text(format!("id-{i}")),
                DbValue::Text(name.to_string()),
                DbValue::Int(i as i64),
                DbValue::Bool(i % 2 == 0),
            ],
        )
        .unwrap();
    }
}

// ── Execute / query ──────────────────────────────────────────────

#[test]
fn query_streams_rows_with_column_names() {
    let mut conn = open_memory();
    seed(conn.as_mut());

    let mut names = Vec::new();
    let delivered = conn
        .query(
            "SELECT name, kind FROM assets ORDER BY kind",
            &[],
            false,
            &mut |row: &Row| {
                assert_eq!(row.columns(), ["name".to_string(), "kind".to_string()]);
                names.push(row.text("NAME").unwrap().to_string());
                true
            },
        )
        .unwrap();

    assert_eq!(delivered, 3);
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
}

#[test]
fn callback_false_stops_early_and_counts_the_stopping_row() {
    let mut conn = open_memory();
    seed(conn.as_mut());

    let delivered = conn
        .query("SELECT id FROM assets", &[], false, &mut |_row: &Row| false)
        .unwrap();
    assert_eq!(delivered, 1);
}

#[test]
fn repeated_named_parameter_binds_once() {
    let mut conn = open_memory();
    seed(conn.as_mut());

    let mut found = Vec::new();
    conn.query(
        "SELECT name FROM assets WHERE kind = @k OR kind = @k + 2 ORDER BY name",
        &[DbValue::Int(0)],
        false,
        &mut |row: &Row| {
            found.push(row.text("name").unwrap().to_string());
            true
        },
    )
    .unwrap();
    assert_eq!(found, vec!["alpha", "gamma"]);
}

#[test]
fn execute_reports_affected_rows() {
    let mut conn = open_memory();
    seed(conn.as_mut());
    let affected = conn
        .execute("DELETE FROM assets WHERE kind >= @min", &[DbValue::Int(1)])
        .unwrap();
    assert_eq!(affected, 2);
}

#[test]
fn bool_and_null_values_round_through_storage() {
    let mut conn = open_memory();
    seed(conn.as_mut());
    conn.execute(
        "UPDATE assets SET name = @name WHERE id = @id",
        &[DbValue::Null, DbValue::Text("id-1".into())],
    )
    .unwrap();

    let adapter = SqliteAdapter::new();
    let mut seen = None;
    conn.query(
        "SELECT name, local FROM assets WHERE id = 'id-1'",
        &[],
        true,
        &mut |row: &Row| {
            seen = Some((
                row.value("name").cloned(),
                adapter.storage_to_bool(row.value("local").unwrap()).unwrap(),
            ));
            false
        },
    )
    .unwrap();
    assert_eq!(seen, Some((Some(DbValue::Null), false)));
}

// ── Schema ───────────────────────────────────────────────────────

#[test]
fn table_schema_reports_declared_columns() {
    let mut conn = open_memory();
    seed(conn.as_mut());

    let schema = conn.table_schema("assets").unwrap();
    assert_eq!(schema.len(), 4);
    let id = schema.column("ID").unwrap();
    assert_eq!(id.type_name, "VARCHAR");
    assert_eq!(id.size, Some(36));

    let adapter = SqliteAdapter::new();
    let param = adapter.build_parameter("kind", ParamType::String, schema.column("kind"));
    assert_eq!(param.native_type, NativeType::Int32);
    assert!(param.from_schema);
}

#[test]
fn table_schema_of_missing_table_is_unknown_table() {
    let mut conn = open_memory();
    let err = conn.table_schema("nope").unwrap_err();
    assert!(matches!(err, EngineError::UnknownTable(t) if t == "nope"));
}

// ── Adapter behaviour ────────────────────────────────────────────

#[test]
fn busy_and_locked_errors_are_worth_a_reconnect() {
    let adapter = SqliteAdapter::new();
    let busy = EngineError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        None,
    ));
    assert!(adapter.needs_reconnect("SELECT 1", &busy));

    let constraint = EngineError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
        None,
    ));
    assert!(!adapter.needs_reconnect("INSERT", &constraint));
}

#[test]
fn uuid_is_stored_as_text() {
    let adapter = SqliteAdapter::new();
    let id = uuid::Uuid::new_v4();
    assert_eq!(adapter.uuid_to_storage(id), DbValue::Text(id.to_string()));
    assert_eq!(adapter.uuid_native_type(), NativeType::VarChar);
}

#[test]
fn uuid_declared_columns_are_guid_typed_and_validate_text() {
    let adapter = SqliteAdapter::new();
    for declared in ["UUID", "guid", "UNIQUEIDENTIFIER"] {
        let column = ColumnSchema::from_declared("id", declared, false);
        let param = adapter.build_parameter("id", ParamType::String, Some(&column));
        assert_eq!(param.native_type, NativeType::Guid, "{declared}");
    }

    let column = ColumnSchema::from_declared("id", "UUID", false);
    let param = adapter.build_parameter("id", ParamType::Uuid, Some(&column));
    let err = adapter
        .set_parameter_value(&param, DbValue::Text("not-a-uuid".into()))
        .unwrap_err();
    assert!(matches!(err, EngineError::Format(_)));

    let id = uuid::Uuid::new_v4();
    let upper = DbValue::Text(id.to_string().to_uppercase());
    assert_eq!(adapter.set_parameter_value(&param, upper).unwrap(), DbValue::Uuid(id));
}

#[test]
fn binary_columns_are_distinct_from_blobs() {
    let adapter = SqliteAdapter::new();
    let typed = |declared: &str| {
        let column = ColumnSchema::from_declared("data", declared, true);
        adapter
            .build_parameter("data", ParamType::Bytes, Some(&column))
            .native_type
    };
    assert_eq!(typed("BINARY(16)"), NativeType::Binary);
    assert_eq!(typed("VARBINARY(16)"), NativeType::Binary);
    assert_eq!(typed("BLOB"), NativeType::Blob);
}

#[test]
fn guid_column_stores_uuid_text_and_binary_column_stores_bytes() {
    let mut conn = open_memory();
    conn.execute_batch("CREATE TABLE refs (id UUID NOT NULL, raw VARBINARY(16));")
        .unwrap();
    let schema = conn.table_schema("refs").unwrap();
    let adapter = SqliteAdapter::new();
    let id_param = adapter.build_parameter("id", ParamType::Uuid, schema.column("id"));
    let raw_param = adapter.build_parameter("raw", ParamType::Uuid, schema.column("raw"));

    let id = uuid::Uuid::new_v4();
    let values = [
        adapter.set_parameter_value(&id_param, DbValue::Uuid(id)).unwrap(),
        adapter.set_parameter_value(&raw_param, DbValue::Uuid(id)).unwrap(),
    ];
    conn.execute("INSERT INTO refs (id, raw) VALUES (@id, @raw)", &values)
        .unwrap();

    let mut stored = None;
    conn.query(
        "SELECT typeof(id) AS id_kind, id, raw FROM refs",
        &[],
        true,
        &mut |row: &Row| {
            stored = Some((
                row.text("id_kind").unwrap().to_string(),
                adapter.storage_to_uuid(row.value("id").unwrap()).unwrap(),
                adapter.storage_to_uuid(row.value("raw").unwrap()).unwrap(),
            ));
            false
        },
    )
    .unwrap();
    assert_eq!(stored, Some(("text".to_string(), id, id)));
}

#[test]
fn standard_dialect_without_metadata_table_is_zero() {
    let mut conn = open_memory();
    assert_eq!(StandardDialect.find_version(conn.as_mut(), "anything"), 0);
}

#[test]
fn on_disk_database_persists_between_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");
    let conn_str = format!("Data Source={}", path.display());
    let adapter = SqliteAdapter::new();

    {
        let mut conn = adapter.open(&conn_str).unwrap();
        seed(conn.as_mut());
    }

    let mut conn = adapter.open(&conn_str).unwrap();
    let delivered = conn
        .query("SELECT * FROM assets", &[], false, &mut |_row: &Row| true)
        .unwrap();
    assert_eq!(delivered, 3);
}
