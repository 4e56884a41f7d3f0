//! Prepared statements.
//!
//! A [`Statement`] owns one native statement handle and borrows the
//! [`Database`] it was prepared on, so it can never outlive the connection
//! object. Closing the database while statements exist is still allowed:
//! every statement operation then fails with [`Error::DatabaseClosed`].

use crate::binder;
use crate::codec::Encoding;
use crate::database::Database;
use crate::ffi;
use crate::reader;
use litestmt_core::{BindError, ColumnInfo, Error, Result, Row, SqlError, Value};
use std::ffi::{c_char, c_int};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Owned native statement handle, finalized on drop.
pub(crate) struct RawStatement {
    ptr: NonNull<ffi::sqlite3_stmt>,
}

impl RawStatement {
    pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.ptr.as_ptr()
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        // SAFETY: we own the handle and it is finalized exactly once. The
        // return code repeats the last step error, already reported.
        unsafe {
            ffi::sqlite3_finalize(self.ptr.as_ptr());
        }
    }
}

/// Outcome of a single [`Statement::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A result row is available.
    Row,
    /// The statement has run to completion.
    Done,
}

/// Lifecycle state of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Freshly prepared or reset with no bindings.
    Prepared,
    /// Parameters bound, not yet stepped.
    Bound,
    /// At least one row has been produced.
    Stepped,
    /// Execution finished; further steps report [`Step::Done`].
    Done,
    /// Native handle released.
    Closed,
}

/// A compiled SQL statement.
pub struct Statement<'db> {
    db: &'db Database,
    /// `None` when the SQL held only whitespace or comments, or after close.
    raw: Option<RawStatement>,
    state: StatementState,
    has_bindings: bool,
    sql: String,
    remaining_sql: String,
    columns: Arc<ColumnInfo>,
}

impl<'db> Statement<'db> {
    /// Compile the first statement in `sql`.
    ///
    /// Text after the first complete statement is kept, trimmed, as
    /// [`remaining_sql`](Self::remaining_sql).
    pub(crate) fn prepare(db: &'db Database, sql: &str) -> Result<Self> {
        let handle = db.handle()?;
        let len = c_int::try_from(sql.len()).map_err(|_| {
            Error::Syntax(
                SqlError::new(ffi::SQLITE_TOOBIG, ffi::SQLITE_TOOBIG, "SQL text too long")
                    .with_sql(sql),
            )
        })?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();

        // SAFETY: handle is open; sql is valid for `len` bytes and SQLite
        // reads no further
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(handle, sql.as_ptr().cast(), len, &mut stmt, &mut tail)
        };
        if rc != ffi::SQLITE_OK {
            return Err(Error::Syntax(db.last_error(rc).with_sql(sql)));
        }

        let consumed = if tail.is_null() {
            sql.len()
        } else {
            (tail as usize).saturating_sub(sql.as_ptr() as usize)
        };
        let head = sql.get(..consumed).unwrap_or(sql);
        let rest = sql.get(consumed..).unwrap_or("");

        let raw = NonNull::new(stmt).map(|ptr| RawStatement { ptr });
        let columns = match &raw {
            // SAFETY: the handle was just prepared
            Some(raw) => unsafe { reader::column_info(raw.as_ptr()) },
            None => ColumnInfo::new(Vec::new()),
        };

        tracing::trace!(
            sql = head.trim(),
            columns = columns.len(),
            remaining = rest.len(),
            "prepared statement"
        );

        Ok(Self {
            db,
            raw,
            state: StatementState::Prepared,
            has_bindings: false,
            sql: head.trim().to_string(),
            remaining_sql: rest.trim_start().to_string(),
            columns: Arc::new(columns),
        })
    }

    /// Handle of a usable statement; `None` for an empty statement.
    fn live(&self) -> Result<Option<*mut ffi::sqlite3_stmt>> {
        if self.state == StatementState::Closed {
            return Err(Error::StatementClosed);
        }
        self.db.handle()?;
        Ok(self.raw.as_ref().map(RawStatement::as_ptr))
    }

    /// Bind `values` to positions `1..=values.len()`.
    ///
    /// The statement is reset and earlier bindings are cleared first, so
    /// parameters not covered by `values` read as NULL. Supplying more values
    /// than the statement has parameters fails with [`Error::Bind`].
    pub fn bind(&mut self, values: &[Value]) -> Result<()> {
        let Some(stmt) = self.live()? else {
            if values.is_empty() {
                return Ok(());
            }
            return Err(BindError::too_many(0, values.len()).into());
        };

        // SAFETY: stmt is a live handle owned by self
        unsafe {
            binder::check_count(stmt, values.len())?;
            binder::clear(stmt);
        }
        self.state = StatementState::Prepared;
        self.has_bindings = false;

        // SAFETY: as above; the statement was just reset
        unsafe { binder::bind_positional(stmt, values) }?;
        self.has_bindings = !values.is_empty();
        self.state = StatementState::Bound;
        Ok(())
    }

    /// Bind by parameter name (`:name`, `@name` or `$name`).
    ///
    /// Unknown names fail with [`Error::Bind`] before anything is bound.
    pub fn bind_named(&mut self, pairs: &[(&str, Value)]) -> Result<()> {
        let Some(stmt) = self.live()? else {
            return match pairs.first() {
                None => Ok(()),
                Some((name, _)) => Err(Error::Bind(BindError {
                    index: None,
                    name: Some((*name).to_string()),
                    message: "statement has no parameters".to_string(),
                })),
            };
        };

        // SAFETY: stmt is a live handle owned by self
        let resolved = unsafe { binder::resolve_names(stmt, pairs) }?;
        // SAFETY: as above
        unsafe { binder::clear(stmt) };
        self.state = StatementState::Prepared;
        self.has_bindings = false;

        // SAFETY: positions were resolved against this handle, now reset
        unsafe { binder::bind_resolved(stmt, &resolved) }?;
        self.has_bindings = !pairs.is_empty();
        self.state = StatementState::Bound;
        Ok(())
    }

    /// Advance to the next result row.
    ///
    /// Once [`Step::Done`] has been returned, further calls keep returning it
    /// without touching the engine until the statement is reset or rebound.
    pub fn step(&mut self) -> Result<Step> {
        let Some(stmt) = self.live()? else {
            self.state = StatementState::Done;
            return Ok(Step::Done);
        };
        if self.state == StatementState::Done {
            return Ok(Step::Done);
        }

        // SAFETY: stmt is a live handle owned by self
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                self.state = StatementState::Stepped;
                Ok(Step::Row)
            }
            ffi::SQLITE_DONE => {
                self.state = StatementState::Done;
                Ok(Step::Done)
            }
            _ => {
                self.state = StatementState::Done;
                let err = self.db.last_error(rc).with_sql(&self.sql);
                tracing::debug!(code = err.code, error = %err.message, "step failed");
                Err(Error::Execution(err))
            }
        }
    }

    /// Step and read the next row, `None` once the statement is done.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        self.live()?;
        let encoding = self.db.encoding()?;
        self.next_row_in(encoding)
    }

    pub(crate) fn next_row_in(&mut self, encoding: Encoding) -> Result<Option<Row>> {
        match self.step()? {
            Step::Row => Ok(self.read_current(encoding)),
            Step::Done => Ok(None),
        }
    }

    /// The row produced by the last [`step`](Self::step), if it returned
    /// [`Step::Row`].
    pub fn row(&self) -> Result<Option<Row>> {
        self.live()?;
        let encoding = self.db.encoding()?;
        Ok(self.read_current(encoding))
    }

    fn read_current(&self, encoding: Encoding) -> Option<Row> {
        if self.state != StatementState::Stepped {
            return None;
        }
        let raw = self.raw.as_ref()?;
        // SAFETY: the last step returned SQLITE_ROW and columns were captured
        // from this handle
        Some(unsafe { reader::read_row(raw.as_ptr(), &self.columns, encoding) })
    }

    /// Iterate over the remaining rows.
    pub fn rows(&mut self) -> Rows<'_, 'db> {
        Rows {
            stmt: self,
            finished: false,
        }
    }

    /// Collect every remaining row.
    pub fn all_rows(&mut self) -> Result<Vec<Row>> {
        self.rows().collect()
    }

    /// Feed each remaining row to `consumer`, stopping at the first error.
    pub fn each<F, E>(&mut self, mut consumer: F) -> std::result::Result<(), E>
    where
        F: FnMut(Row) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        while let Some(row) = self.next_row()? {
            consumer(row)?;
        }
        Ok(())
    }

    /// Rewind so the statement can run again; bindings are kept.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(stmt) = self.live()? {
            // SAFETY: stmt is a live handle owned by self
            unsafe {
                ffi::sqlite3_reset(stmt);
            }
        }
        self.state = if self.has_bindings {
            StatementState::Bound
        } else {
            StatementState::Prepared
        };
        Ok(())
    }

    /// Reset and set every parameter back to NULL.
    pub fn clear_bindings(&mut self) -> Result<()> {
        if let Some(stmt) = self.live()? {
            // SAFETY: stmt is a live handle owned by self
            unsafe { binder::clear(stmt) };
        }
        self.has_bindings = false;
        self.state = StatementState::Prepared;
        Ok(())
    }

    /// Release the native handle. Calling this again does nothing.
    pub fn close(&mut self) {
        if self.state == StatementState::Closed {
            return;
        }
        self.raw = None;
        self.state = StatementState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == StatementState::Closed
    }

    pub fn is_done(&self) -> bool {
        self.state == StatementState::Done
    }

    /// Whether the SQL compiled to nothing (only whitespace or comments).
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && !self.is_closed()
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    /// The SQL of this statement, without trailing text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Unparsed text after this statement, leading whitespace removed.
    pub fn remaining_sql(&self) -> &str {
        &self.remaining_sql
    }

    pub(crate) fn take_remaining_sql(&mut self) -> String {
        std::mem::take(&mut self.remaining_sql)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    /// Shared column metadata, the same `Arc` every row carries.
    pub fn columns(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Number of parameter slots in the statement.
    pub fn bind_parameter_count(&self) -> Result<usize> {
        match self.live()? {
            // SAFETY: stmt is a live handle owned by self
            Some(stmt) => Ok(unsafe { binder::parameter_count(stmt) }),
            None => Ok(0),
        }
    }
}

impl fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("state", &self.state)
            .field("columns", &self.columns.names())
            .finish_non_exhaustive()
    }
}

/// Iterator over the remaining rows of a [`Statement`].
///
/// Yields `Err` at most once, then stops.
pub struct Rows<'s, 'db> {
    stmt: &'s mut Statement<'db>,
    finished: bool,
}

impl Iterator for Rows<'_, '_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.stmt.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
