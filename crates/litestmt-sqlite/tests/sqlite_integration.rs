use std::path::PathBuf;
use std::time::{Duration, Instant};

use litestmt_sqlite::{
    Database, Encoding, Error, OpenMode, OpenOptions, SqlErrorKind, Step, Value, params,
};
use tempfile::TempDir;

fn temp_db_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn roundtrip(db: &Database, value: Value) -> Value {
    db.get_first_value("SELECT ?", &[value])
        .unwrap()
        .expect("one row")
}

#[test]
fn open_modes_on_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "missing.db");

    for mode in ["r", "r+"] {
        match Database::open_mode(&path, mode) {
            Err(Error::Open(e)) => assert_eq!(e.kind, SqlErrorKind::CantOpen, "mode {mode}"),
            other => panic!("mode {mode}: expected Open error, got {other:?}"),
        }
    }
    assert!(!path.exists());

    let db = Database::open_mode(&path, "w+").unwrap();
    db.execute_batch("CREATE TABLE t (x)", &[]).unwrap();
    db.close();
    assert!(path.exists());
}

#[test]
fn invalid_mode_does_not_touch_file() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "never.db");
    let err = Database::open_mode(&path, "a").unwrap_err();
    assert!(matches!(err, Error::InvalidMode(_)));
    assert!(!path.exists());
}

#[test]
fn read_only_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "ro.db");
    {
        let db = Database::open_file(&path).unwrap();
        db.execute_batch("CREATE TABLE t (x); INSERT INTO t VALUES (1);", &[])
            .unwrap();
    }

    let db = Database::open_mode(&path, "r").unwrap();
    assert_eq!(db.mode(), OpenMode::ReadOnly);
    assert_eq!(
        db.get_first_value("SELECT x FROM t", &[]).unwrap(),
        Some(Value::Int(1))
    );

    match db.execute("INSERT INTO t VALUES (2)", &[]) {
        Err(Error::Execution(e)) => assert_eq!(e.kind, SqlErrorKind::ReadOnly),
        other => panic!("expected read-only failure, got {other:?}"),
    }
}

#[test]
fn read_write_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "rw.db");
    Database::open_file(&path)
        .unwrap()
        .execute_batch("CREATE TABLE t (x)", &[])
        .unwrap();

    let db = Database::open_mode(&path, "r+").unwrap();
    db.execute("INSERT INTO t VALUES (?)", &params![5]).unwrap();
    assert_eq!(db.changes().unwrap(), 1);
}

#[test]
fn busy_timeout_applied_at_open() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "busy.db");

    let writer = Database::open_file(&path).unwrap();
    writer.execute_batch("CREATE TABLE t (x)", &[]).unwrap();
    writer.execute_batch("BEGIN IMMEDIATE", &[]).unwrap();

    // No timeout: the lock conflict is reported immediately
    let impatient = Database::open(&path, &OpenOptions::new().busy_timeout(0)).unwrap();
    let started = Instant::now();
    let err = impatient
        .execute("INSERT INTO t VALUES (1)", &[])
        .unwrap_err();
    assert!(err.is_busy(), "{err:?}");
    assert_eq!(err.code(), Some(litestmt_sqlite::ffi::SQLITE_BUSY));
    assert!(started.elapsed() < Duration::from_millis(250));

    // With a timeout the engine retries before giving up
    let patient = Database::open(&path, &OpenOptions::new().busy_timeout(300)).unwrap();
    let started = Instant::now();
    let err = patient.execute("INSERT INTO t VALUES (1)", &[]).unwrap_err();
    assert!(err.is_busy(), "{err:?}");
    assert!(started.elapsed() >= Duration::from_millis(250));

    writer.execute_batch("COMMIT", &[]).unwrap();
    impatient.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
}

#[test]
fn scalar_roundtrips() {
    let db = Database::open_memory().unwrap();

    assert_eq!(roundtrip(&db, Value::Null), Value::Null);
    assert_eq!(roundtrip(&db, Value::Int(i64::MAX)), Value::Int(i64::MAX));
    assert_eq!(roundtrip(&db, Value::Int(i64::MIN)), Value::Int(i64::MIN));
    assert_eq!(roundtrip(&db, Value::Float(3.25)), Value::Float(3.25));
    assert_eq!(roundtrip(&db, Value::Float(-0.5e-300)), Value::Float(-0.5e-300));

    // Without a BOOLEAN declared type, a bool comes back as its integer form
    assert_eq!(roundtrip(&db, Value::Bool(true)), Value::Int(1));
    assert_eq!(roundtrip(&db, Value::Bool(false)), Value::Int(0));
}

#[test]
fn text_roundtrips_preserve_bytes() {
    let db = Database::open_memory().unwrap();
    for text in ["", "plain", "a\0b", "日本語 🎉", "trailing\0"] {
        let back = roundtrip(&db, Value::from(text));
        assert_eq!(back, Value::Text(text.to_string()), "{text:?}");
    }

    let len = db
        .get_first_value("SELECT length(CAST(? AS BLOB))", &params!["a\0b"])
        .unwrap();
    assert_eq!(len, Some(Value::Int(3)));
}

#[test]
fn blob_roundtrips() {
    let db = Database::open_memory().unwrap();
    let bytes = vec![0u8, 255, 0, 1, 2];
    assert_eq!(roundtrip(&db, Value::Blob(bytes.clone())), Value::Blob(bytes));

    // Empty blobs stay blobs, not NULL
    assert_eq!(roundtrip(&db, Value::Blob(Vec::new())), Value::Blob(Vec::new()));
    assert_eq!(
        db.get_first_value("SELECT typeof(?)", &params![Vec::<u8>::new()])
            .unwrap(),
        Some(Value::from("blob"))
    );
}

#[test]
fn boolean_columns_read_back_as_bool() {
    let db = Database::open_memory().unwrap();
    db.execute_batch("CREATE TABLE flags (id INTEGER PRIMARY KEY, on_ BOOLEAN, n INTEGER)", &[])
        .unwrap();
    db.execute("INSERT INTO flags (on_, n) VALUES (?, ?)", &params![true, true])
        .unwrap();
    db.execute("INSERT INTO flags (on_, n) VALUES (?, ?)", &params![false, false])
        .unwrap();

    let rows = db.execute("SELECT on_, n FROM flags ORDER BY id", &[]).unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Bool(true)));
    assert_eq!(rows[0].get(1), Some(&Value::Int(1)));
    assert_eq!(rows[1].get(0), Some(&Value::Bool(false)));
    assert!(!rows[1].get_named::<bool>("on_").unwrap());
}

#[test]
fn optional_values_bind_as_null() {
    let db = Database::open_memory().unwrap();
    let none: Option<i64> = None;
    assert_eq!(roundtrip(&db, Value::from(none)), Value::Null);
    assert_eq!(roundtrip(&db, Value::from(Some(7i64))), Value::Int(7));
}

#[test]
fn wide_integers_are_unsupported() {
    match Value::try_from(u64::MAX) {
        Err(Error::UnsupportedType(e)) => assert_eq!(e.type_name, "u64"),
        other => panic!("expected UnsupportedType, got {other:?}"),
    }
    assert_eq!(Value::try_from(42u64).unwrap(), Value::Int(42));
    assert!(Value::try_from(serde_json::json!({"a": 1})).is_err());
}

#[test]
fn bind_count_mismatch() {
    let db = Database::open_memory().unwrap();
    let err = db.execute("SELECT ?, ?", &params![1, 2, 3]).unwrap_err();
    assert!(matches!(err, Error::Bind(_)), "{err:?}");

    let rows = db.execute("SELECT ?, ?", &params![1]).unwrap();
    assert_eq!(rows[0].get(1), Some(&Value::Null));
}

#[test]
fn batch_with_and_without_trailing_semicolon() {
    let db = Database::open_memory().unwrap();
    assert_eq!(
        db.execute_batch("CREATE TABLE a (x); CREATE TABLE b (x);", &[])
            .unwrap(),
        2
    );
    assert_eq!(
        db.execute_batch("INSERT INTO a VALUES (1); INSERT INTO b VALUES (2)", &[])
            .unwrap(),
        2
    );
    assert_eq!(
        db.get_first_value("SELECT x FROM b", &[]).unwrap(),
        Some(Value::Int(2))
    );
}

#[test]
fn batch_runs_trigger_bodies_as_one_statement() {
    let db = Database::open_memory().unwrap();
    let n = db
        .execute_batch(
            "CREATE TABLE t (x);
             CREATE TABLE log (x);
             CREATE TRIGGER t_ins AFTER INSERT ON t BEGIN
                 INSERT INTO log VALUES (new.x);
                 INSERT INTO log VALUES (new.x * 10);
             END;
             INSERT INTO t VALUES (4);",
            &[],
        )
        .unwrap();
    assert_eq!(n, 4);
    assert_eq!(
        db.get_first_value("SELECT sum(x) FROM log", &[]).unwrap(),
        Some(Value::Int(44))
    );
}

#[test]
fn batch_rejects_incomplete_trigger() {
    let db = Database::open_memory().unwrap();
    db.execute_batch("CREATE TABLE t (x)", &[]).unwrap();
    let err = db
        .execute_batch(
            "CREATE TRIGGER tr AFTER INSERT ON t BEGIN SELECT 1;",
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Syntax(_)), "{err:?}");
}

#[test]
fn streaming_large_result() {
    let db = Database::open_memory().unwrap();
    let mut count = 0u64;
    let mut sum = 0i64;
    db.execute_each(
        "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?)
         SELECT n FROM seq",
        &params![100_000],
        |row| -> litestmt_sqlite::Result<()> {
            count += 1;
            sum += row.get_as::<i64>(0)?;
            Ok(())
        },
    )
    .unwrap();
    assert_eq!(count, 100_000);
    assert_eq!(sum, 100_000 * 100_001 / 2);
}

#[derive(Debug)]
enum StreamError {
    Enough,
    Db(Error),
}

impl From<Error> for StreamError {
    fn from(e: Error) -> Self {
        StreamError::Db(e)
    }
}

#[test]
fn streaming_stops_at_consumer_error() {
    let db = Database::open_memory().unwrap();
    let mut seen = 0;
    // Unbounded sequence; only the early exit ends it
    let result = db.execute_each(
        "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq)
         SELECT n FROM seq",
        &[],
        |_row| {
            seen += 1;
            if seen == 1_000 {
                return Err(StreamError::Enough);
            }
            Ok(())
        },
    );
    assert!(matches!(result, Err(StreamError::Enough)));
    assert_eq!(seen, 1_000);

    // The statement was closed on the error path; the connection is reusable
    assert_eq!(
        db.get_first_value("SELECT 1", &[]).unwrap(),
        Some(Value::Int(1))
    );
}

#[test]
fn reads_do_not_move_last_insert_rowid() {
    let db = Database::open_memory().unwrap();
    db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
        .unwrap();
    db.execute("INSERT INTO t (v) VALUES ('x')", &[]).unwrap();
    let id = db.last_insert_rowid().unwrap();

    let mut stmt = db.prepare("SELECT * FROM t").unwrap();
    while stmt.step().unwrap() == Step::Row {}
    assert_eq!(db.last_insert_rowid().unwrap(), id);
}

#[test]
fn closing_database_invalidates_statements() {
    let db = Database::open_memory().unwrap();
    let mut stmt = db.prepare("SELECT 1").unwrap();
    db.close();
    db.close();

    assert!(matches!(stmt.next_row(), Err(Error::DatabaseClosed)));
    assert!(matches!(stmt.reset(), Err(Error::DatabaseClosed)));
    stmt.close();
    stmt.close();
    assert!(matches!(stmt.step(), Err(Error::StatementClosed)));
}

#[test]
fn utf16_database_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "wide.db");

    {
        let db = Database::open(&path, &OpenOptions::new().utf16(true)).unwrap();
        assert!(db.is_utf16().unwrap());
        db.execute_batch("CREATE TABLE t (s TEXT)", &[]).unwrap();
        db.execute("INSERT INTO t VALUES (?)", &params!["héllo 世界"])
            .unwrap();
        assert_eq!(
            db.get_first_value("SELECT s FROM t", &[]).unwrap(),
            Some(Value::from("héllo 世界"))
        );
    }

    // Reopening keeps the stored encoding regardless of options
    let db = Database::open_file(&path).unwrap();
    assert_ne!(db.encoding().unwrap(), Encoding::Utf8);
    assert_eq!(
        db.get_first_value("SELECT s FROM t", &[]).unwrap(),
        Some(Value::from("héllo 世界"))
    );
}

#[test]
fn utf16_flag_ignored_for_existing_mode() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "plain.db");
    Database::open_file(&path)
        .unwrap()
        .execute_batch("CREATE TABLE t (x)", &[])
        .unwrap();

    let opts = OpenOptions::new().mode(OpenMode::ReadWrite).utf16(true);
    let db = Database::open(&path, &opts).unwrap();
    assert_eq!(db.encoding().unwrap(), Encoding::Utf8);
}

#[test]
fn transaction_rolls_back_on_panic() {
    let db = Database::open_memory().unwrap();
    db.execute_batch("CREATE TABLE t (x)", &[]).unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: litestmt_sqlite::Result<()> = db.transaction(|db| {
            db.execute("INSERT INTO t VALUES (1)", &[])?;
            panic!("boom");
        });
    }));
    assert!(result.is_err());
    assert!(db.is_autocommit().unwrap());
    assert_eq!(
        db.get_first_value("SELECT count(*) FROM t", &[]).unwrap(),
        Some(Value::Int(0))
    );
}

#[test]
fn duplicate_column_names_resolve_to_first() {
    let db = Database::open_memory().unwrap();
    let row = db
        .get_first_row("SELECT 1 AS a, 2 AS a", &[])
        .unwrap()
        .unwrap();
    assert_eq!(row.get_named::<i64>("a").unwrap(), 1);
    assert_eq!(row.len(), 2);
}
