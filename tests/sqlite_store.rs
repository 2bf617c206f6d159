use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};

use mde_outbox_lib::db::open_outbox_database;

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[test]
fn migrations_create_outbox_schema() {
    let mut conn = open_outbox_database(":memory:").expect("failed to open in-memory database");

    let rows: Vec<NameRow> = sql_query(
        "
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
          AND name = 'outbox_records'
        ",
    )
    .load(&mut conn)
    .expect("failed to query sqlite_master");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "outbox_records");
}

#[test]
fn migrations_create_drain_lookup_index() {
    let mut conn = open_outbox_database(":memory:").expect("failed to open in-memory database");

    let index_count: CountRow = sql_query(
        "
        SELECT COUNT(*) AS count
        FROM sqlite_master
        WHERE type = 'index'
          AND name = 'idx_outbox_kind_state_created'
        ",
    )
    .get_result(&mut conn)
    .expect("failed to query sqlite index metadata");

    assert_eq!(
        index_count.count, 1,
        "expected idx_outbox_kind_state_created index to exist"
    );
}

#[test]
fn schema_enforces_kind_and_state_checks() {
    let mut conn = open_outbox_database(":memory:").expect("failed to open in-memory database");

    let bad_kind = sql_query(
        "
        INSERT INTO outbox_records (id, kind, payload, created_at_ms)
        VALUES ('1-aaaa', 'not_real', '{}', 1)
        ",
    )
    .execute(&mut conn)
    .expect_err("expected kind check constraint to fail");
    assert!(
        bad_kind.to_string().contains("CHECK constraint failed"),
        "unexpected sqlite error: {bad_kind}"
    );

    let bad_state = sql_query(
        "
        INSERT INTO outbox_records (id, kind, payload, created_at_ms, sync_state)
        VALUES ('1-bbbb', 'operation', '{}', 1, 'in_flight')
        ",
    )
    .execute(&mut conn)
    .expect_err("expected state check constraint to fail");
    assert!(
        bad_state.to_string().contains("CHECK constraint failed"),
        "unexpected sqlite error: {bad_state}"
    );
}

#[test]
fn schema_rejects_duplicate_record_ids() {
    let mut conn = open_outbox_database(":memory:").expect("failed to open in-memory database");

    sql_query(
        "
        INSERT INTO outbox_records (id, kind, payload, created_at_ms)
        VALUES ('1-cccc', 'scan_result', '{}', 1)
        ",
    )
    .execute(&mut conn)
    .expect("first insert should succeed");

    let duplicate = sql_query(
        "
        INSERT INTO outbox_records (id, kind, payload, created_at_ms)
        VALUES ('1-cccc', 'scan_result', '{}', 2)
        ",
    )
    .execute(&mut conn)
    .expect_err("expected primary key violation");
    assert!(
        duplicate.to_string().contains("UNIQUE constraint failed"),
        "unexpected sqlite error: {duplicate}"
    );
}

#[test]
fn migrations_are_idempotent_across_reopens() {
    // Two sequential opens of the same file must not re-run the migration.
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or_default();
    let path = std::env::temp_dir().join(format!(
        "mde_outbox_migrate_{}_{nanos}.sqlite3",
        std::process::id()
    ));
    let path_str = path.to_str().expect("temp path is valid utf-8");

    drop(open_outbox_database(path_str).expect("first open failed"));
    drop(open_outbox_database(path_str).expect("second open failed"));

    let _ = std::fs::remove_file(&path);
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(std::path::PathBuf::from(sidecar));
    }
}
