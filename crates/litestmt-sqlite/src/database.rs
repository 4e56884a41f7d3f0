//! SQLite database connections.
//!
//! A [`Database`] owns one native connection handle. It is `Send` but not
//! `Sync`: move it between threads freely, but share it only by reference
//! within one thread. Statements borrow the database, so the borrow checker
//! keeps them from outliving it; closing it early is still allowed and turns
//! later statement calls into [`Error::DatabaseClosed`].

use crate::codec::Encoding;
use crate::config::{OpenMode, OpenOptions};
use crate::ffi;
use crate::statement::{Statement, Step};
use litestmt_core::{Error, Result, Row, SqlError, Value};
use std::cell::{OnceCell, RefCell};
use std::ffi::{CString, c_int};
use std::fmt;
use std::path::Path;
use std::ptr::{self, NonNull};

/// Owned native connection handle, closed on drop.
struct RawConnection {
    ptr: NonNull<ffi::sqlite3>,
}

// SAFETY: the handle is only ever used from the thread that currently owns
// the Database; Database is not Sync, so no two threads can reach it at once.
unsafe impl Send for RawConnection {}

impl RawConnection {
    fn as_ptr(&self) -> *mut ffi::sqlite3 {
        self.ptr.as_ptr()
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        // close_v2 defers the release while statements are still unfinalized
        // SAFETY: we own the handle and close it exactly once
        let rc = unsafe { ffi::sqlite3_close_v2(self.ptr.as_ptr()) };
        if rc != ffi::SQLITE_OK {
            tracing::warn!(code = rc, error = ffi::error_string(rc), "failed to close database");
        }
    }
}

/// A connection to a SQLite database.
pub struct Database {
    conn: RefCell<Option<RawConnection>>,
    path: String,
    mode: OpenMode,
    encoding: OnceCell<Encoding>,
}

impl Database {
    /// Open a database with the given options.
    ///
    /// With `options.utf16` set and mode `"w+"`, the file is opened through
    /// the UTF-16 entry point so a newly created database stores text as
    /// UTF-16. Existing files keep their encoding.
    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let Some(path_str) = path.to_str() else {
            return Err(open_error(ffi::SQLITE_CANTOPEN, "path is not valid UTF-8"));
        };
        if path_str.contains('\0') {
            return Err(open_error(ffi::SQLITE_CANTOPEN, "path contains a NUL byte"));
        }

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let rc = if options.utf16 && options.mode.creates() {
            let wide: Vec<u16> = path_str.encode_utf16().chain(std::iter::once(0)).collect();
            // SAFETY: wide is NUL-terminated UTF-16 and outlives the call
            unsafe { ffi::sqlite3_open16(wide.as_ptr().cast(), &mut db) }
        } else {
            let c_path = CString::new(path_str)
                .map_err(|_| open_error(ffi::SQLITE_CANTOPEN, "path contains a NUL byte"))?;
            // SAFETY: all pointers are valid for the duration of the call
            unsafe {
                ffi::sqlite3_open_v2(
                    c_path.as_ptr(),
                    &mut db,
                    options.mode.to_sqlite_flags(),
                    ptr::null(),
                )
            }
        };

        // A handle is usually allocated even on failure and must be closed
        let conn = NonNull::new(db).map(|ptr| RawConnection { ptr });
        if rc != ffi::SQLITE_OK {
            let err = match &conn {
                // SAFETY: the handle carries the open error
                Some(conn) => unsafe { connection_error(conn.as_ptr(), rc) },
                None => SqlError::new(rc, rc, ffi::error_string(rc)),
            };
            drop(conn);
            tracing::debug!(code = err.code, error = %err.message, "open failed");
            return Err(Error::Open(err));
        }
        let Some(conn) = conn else {
            return Err(open_error(ffi::SQLITE_NOMEM, ffi::error_string(ffi::SQLITE_NOMEM)));
        };

        if options.busy_timeout_ms > 0 {
            let ms = c_int::try_from(options.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: conn is open
            unsafe {
                ffi::sqlite3_busy_timeout(conn.as_ptr(), ms);
            }
        }

        tracing::debug!(mode = %options.mode, utf16 = options.utf16, "opened database");

        Ok(Self {
            conn: RefCell::new(Some(conn)),
            path: path_str.to_string(),
            mode: options.mode,
            encoding: OnceCell::new(),
        })
    }

    /// Open (or create) a database file read-write with default options.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, &OpenOptions::default())
    }

    /// Open with a mode string: `"r"`, `"r+"` or `"w+"`.
    ///
    /// Unknown modes fail with [`Error::InvalidMode`] before the file is
    /// touched.
    pub fn open_mode(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let options = OpenOptions::new().mode_str(mode)?;
        Self::open(path, &options)
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(":memory:", &OpenOptions::default())
    }

    /// Release the connection. Calling this again does nothing.
    ///
    /// Statements prepared on this database stay valid objects, but every
    /// operation on them now fails with [`Error::DatabaseClosed`].
    pub fn close(&self) {
        if self.conn.borrow_mut().take().is_some() {
            tracing::debug!(path = %self.path, "closed database");
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.borrow().is_some()
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Path the database was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub(crate) fn handle(&self) -> Result<*mut ffi::sqlite3> {
        self.conn
            .borrow()
            .as_ref()
            .map(RawConnection::as_ptr)
            .ok_or(Error::DatabaseClosed)
    }

    /// Build an engine error from `rc` and the connection's error state.
    pub(crate) fn last_error(&self, rc: c_int) -> SqlError {
        match self.handle() {
            // SAFETY: handle is open
            Ok(db) => unsafe { connection_error(db, rc) },
            Err(_) => SqlError::new(rc, rc, ffi::error_string(rc)),
        }
    }

    /// Whether no explicit transaction is open.
    pub fn is_autocommit(&self) -> Result<bool> {
        let db = self.handle()?;
        // SAFETY: db is open
        Ok(unsafe { ffi::sqlite3_get_autocommit(db) } != 0)
    }

    /// Rowid of the most recent successful INSERT on this connection.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let db = self.handle()?;
        // SAFETY: db is open
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(db) })
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> Result<u64> {
        let db = self.handle()?;
        // SAFETY: db is open
        let n = unsafe { ffi::sqlite3_changes(db) };
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Rows changed since the connection was opened.
    pub fn total_changes(&self) -> Result<u64> {
        let db = self.handle()?;
        // SAFETY: db is open
        let n = unsafe { ffi::sqlite3_total_changes(db) };
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Text encoding of the database, read once and cached.
    pub fn encoding(&self) -> Result<Encoding> {
        if let Some(encoding) = self.encoding.get() {
            return Ok(*encoding);
        }
        let mut stmt = self.prepare("PRAGMA encoding")?;
        // Pragma text is asked for as UTF-8 regardless of storage encoding
        let name = stmt
            .next_row_in(Encoding::Utf8)?
            .and_then(|row| row.get(0).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        stmt.close();

        let encoding = Encoding::from_pragma(&name);
        tracing::trace!(%encoding, "read database encoding");
        Ok(*self.encoding.get_or_init(|| encoding))
    }

    pub fn is_utf16(&self) -> Result<bool> {
        Ok(self.encoding()?.is_utf16())
    }

    /// Compile the first statement in `sql`.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        Statement::prepare(self, sql)
    }

    /// Prepare `sql`, hand the statement to `f`, and close it afterwards
    /// whether `f` succeeds or not. Returns whatever `f` returns.
    pub fn prepare_with<T, E, F>(&self, sql: &str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Statement<'_>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut stmt = self.prepare(sql)?;
        let result = f(&mut stmt);
        stmt.close();
        result
    }

    /// Run one statement with `params` and collect its rows.
    ///
    /// There is no separate "no result" value: a statement that produces no
    /// rows (DDL, INSERT, an empty SELECT) returns an empty vector. Use
    /// [`execute_each`](Self::execute_each) to stream instead.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.prepare_with(sql, |stmt| {
            stmt.bind(params)?;
            stmt.all_rows()
        })
    }

    /// Run one statement with `params`, feeding rows to `consumer` as they
    /// are produced.
    pub fn execute_each<F, E>(
        &self,
        sql: &str,
        params: &[Value],
        consumer: F,
    ) -> std::result::Result<(), E>
    where
        F: FnMut(Row) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        self.prepare_with(sql, |stmt| {
            stmt.bind(params)?;
            stmt.each(consumer)
        })
    }

    /// First row of `sql`, if any.
    pub fn get_first_row(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.prepare_with(sql, |stmt| {
            stmt.bind(params)?;
            stmt.next_row()
        })
    }

    /// First column of the first row of `sql`, if any.
    pub fn get_first_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self
            .get_first_row(sql, params)?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// Run every statement in `sql` in order and return how many ran.
    ///
    /// Each statement gets `params` bound (skipped when `params` is empty)
    /// and its rows are discarded. The first failure aborts the batch;
    /// statements before it stay executed. A trailing fragment that is not a
    /// complete statement fails with [`Error::Syntax`]; a missing final `;`
    /// is accepted.
    #[tracing::instrument(level = "debug", skip(self, sql, params), fields(params = params.len()))]
    pub fn execute_batch(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let mut count = 0;
        let result = self.run_batch(sql, params, &mut count);
        match result {
            Ok(()) => {
                tracing::debug!(statements = count, "batch complete");
                Ok(count)
            }
            Err(e) => {
                tracing::debug!(executed = count, error = %e, "batch aborted");
                Err(e)
            }
        }
    }

    fn run_batch(&self, sql: &str, params: &[Value], count: &mut usize) -> Result<()> {
        let mut pending = sql.trim_start().to_string();
        while !pending.is_empty() {
            let mut stmt = self.prepare(&pending)?;

            // Whatever the engine consumed (or the whole remainder, when it
            // compiled to nothing) must be lexically complete. The appended
            // terminator lets a final statement without `;` pass.
            let consumed = if stmt.is_empty() {
                pending.as_str()
            } else {
                stmt.sql()
            };
            if !Self::complete(&format!("{consumed}\n;")) {
                return Err(Error::Syntax(
                    SqlError::new(ffi::SQLITE_ERROR, ffi::SQLITE_ERROR, "incomplete SQL statement")
                        .with_sql(consumed),
                ));
            }

            if stmt.is_empty() {
                break;
            }
            if !params.is_empty() {
                stmt.bind(params)?;
            }
            while stmt.step()? == Step::Row {}
            *count += 1;
            pending = stmt.take_remaining_sql();
        }
        Ok(())
    }

    /// Run `f` inside `BEGIN`/`COMMIT`.
    ///
    /// The transaction is rolled back if `f` returns an error, if the commit
    /// fails, or if `f` panics.
    #[tracing::instrument(level = "debug", skip(self, f))]
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.execute_batch("BEGIN", &[])?;
        let mut guard = Transaction {
            db: self,
            finished: false,
        };
        let value = f(self)?;
        self.execute_batch("COMMIT", &[])?;
        guard.finished = true;
        Ok(value)
    }

    /// Lexical check: does `sql` end with a complete statement?
    ///
    /// Only looks for a terminating `;` outside literals, comments and
    /// trigger bodies; it does not validate the SQL.
    pub fn complete(sql: &str) -> bool {
        CString::new(sql).is_ok_and(|c| ffi::complete(&c))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Rolls back an open transaction unless marked finished.
struct Transaction<'db> {
    db: &'db Database,
    finished: bool,
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || self.db.is_autocommit().unwrap_or(true) {
            return;
        }
        if let Err(e) = self.db.execute_batch("ROLLBACK", &[]) {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn connection_error(db: *mut ffi::sqlite3, rc: c_int) -> SqlError {
    // SAFETY: guaranteed by the caller
    unsafe {
        let extended = ffi::sqlite3_extended_errcode(db);
        SqlError::new(rc & 0xff, extended, ffi::errmsg(db))
    }
}

fn open_error(rc: c_int, message: &str) -> Error {
    Error::Open(SqlError::new(rc, rc, message))
}
