//! Column reading for the current result row.

use crate::codec::{self, Encoding};
use crate::ffi;
use litestmt_core::{ColumnInfo, Row};
use std::ffi::c_int;
use std::sync::Arc;

/// Capture column names and declared types of a prepared statement.
///
/// Both are fixed once the statement is prepared, so this runs once per
/// statement and the result is shared by every row it produces.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn column_info(stmt: *mut ffi::sqlite3_stmt) -> ColumnInfo {
    // SAFETY: guaranteed by the caller
    let count = unsafe { ffi::sqlite3_column_count(stmt) };
    let mut names = Vec::with_capacity(count as usize);
    let mut decl_types = Vec::with_capacity(count as usize);
    for i in 0..count {
        // SAFETY: i is within [0, column_count)
        let name = unsafe { codec::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i));
        names.push(name);
        // SAFETY: as above
        decl_types.push(unsafe { codec::column_decltype(stmt, i) });
    }
    ColumnInfo::with_decl_types(names, decl_types)
}

/// Read every column of the current row.
///
/// # Safety
/// `stmt` must be a valid prepared statement whose last step returned
/// `SQLITE_ROW`, and `columns` must describe that statement.
pub unsafe fn read_row(
    stmt: *mut ffi::sqlite3_stmt,
    columns: &Arc<ColumnInfo>,
    encoding: Encoding,
) -> Row {
    let values = (0..columns.len())
        .map(|i| {
            let index = i as c_int;
            // SAFETY: guaranteed by the caller; index < column_count
            unsafe { codec::read_column(stmt, index, columns.decl_type_at(i), encoding) }
        })
        .collect();
    Row::with_columns(Arc::clone(columns), values)
}
