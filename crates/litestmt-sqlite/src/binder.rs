//! Parameter binding for prepared statements.
//!
//! Positions are 1-based. Unbound positions read as NULL, so binding fewer
//! values than the statement declares is allowed; binding more is not.

use crate::codec;
use crate::ffi;
use litestmt_core::{BindError, Error, Result, Value};
use std::ffi::{CString, c_int};

/// Number of parameter slots the statement declares.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn parameter_count(stmt: *mut ffi::sqlite3_stmt) -> usize {
    // SAFETY: guaranteed by the caller
    let count = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };
    usize::try_from(count).unwrap_or(0)
}

/// Reject value lists longer than the statement's parameter slots.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn check_count(stmt: *mut ffi::sqlite3_stmt, supplied: usize) -> Result<()> {
    // SAFETY: guaranteed by the caller
    let expected = unsafe { parameter_count(stmt) };
    if supplied > expected {
        return Err(BindError::too_many(expected, supplied).into());
    }
    Ok(())
}

/// Rewind the statement and drop all previous bindings.
///
/// The reset return code repeats the last step error, which was already
/// reported to the caller, so it is not inspected.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn clear(stmt: *mut ffi::sqlite3_stmt) {
    // SAFETY: guaranteed by the caller
    unsafe {
        ffi::sqlite3_reset(stmt);
        ffi::sqlite3_clear_bindings(stmt);
    }
}

/// Bind `values` to positions `1..=values.len()`.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle that is not mid-step
/// (call [`clear`] first).
pub unsafe fn bind_positional(stmt: *mut ffi::sqlite3_stmt, values: &[Value]) -> Result<()> {
    for (i, value) in values.iter().enumerate() {
        let index = i + 1;
        let pos = c_int::try_from(index).map_err(|_| BindError::too_many(i, values.len()))?;
        // SAFETY: guaranteed by the caller; pos is within the checked count
        let rc = unsafe { codec::bind_value(stmt, pos, value) };
        if rc != ffi::SQLITE_OK {
            return Err(bind_failure(rc, Some(index), None));
        }
    }
    Ok(())
}

/// Resolve `(name, value)` pairs to parameter positions.
///
/// A bare name (`id`) matches `:id`, `@id` or `$id`; a prefixed name is used
/// as written.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn resolve_names<'a>(
    stmt: *mut ffi::sqlite3_stmt,
    pairs: &'a [(&'a str, Value)],
) -> Result<Vec<(c_int, &'a str, &'a Value)>> {
    pairs
        .iter()
        .map(|(name, value)| {
            // SAFETY: guaranteed by the caller
            let index = unsafe { parameter_index(stmt, name) }?;
            Ok((index, *name, value))
        })
        .collect()
}

/// Bind values at positions produced by [`resolve_names`].
///
/// # Safety
/// `stmt` must be the handle the positions were resolved against, not
/// mid-step (call [`clear`] first).
pub unsafe fn bind_resolved(
    stmt: *mut ffi::sqlite3_stmt,
    resolved: &[(c_int, &str, &Value)],
) -> Result<()> {
    for (index, name, value) in resolved {
        // SAFETY: index was reported by sqlite3_bind_parameter_index
        let rc = unsafe { codec::bind_value(stmt, *index, value) };
        if rc != ffi::SQLITE_OK {
            return Err(bind_failure(rc, usize::try_from(*index).ok(), Some(name)));
        }
    }
    Ok(())
}

unsafe fn parameter_index(stmt: *mut ffi::sqlite3_stmt, name: &str) -> Result<c_int> {
    let candidates: Vec<String> = if name.starts_with([':', '@', '$', '?']) {
        vec![name.to_string()]
    } else {
        [":", "@", "$"].iter().map(|p| format!("{p}{name}")).collect()
    };

    for candidate in candidates {
        let Ok(c_name) = CString::new(candidate) else {
            break;
        };
        // SAFETY: guaranteed by the caller; c_name is NUL-terminated
        let index = unsafe { ffi::sqlite3_bind_parameter_index(stmt, c_name.as_ptr()) };
        if index > 0 {
            return Ok(index);
        }
    }

    Err(Error::Bind(BindError {
        index: None,
        name: Some(name.to_string()),
        message: "no such parameter in statement".to_string(),
    }))
}

fn bind_failure(rc: c_int, index: Option<usize>, name: Option<&str>) -> Error {
    Error::Bind(BindError {
        index,
        name: name.map(str::to_string),
        message: ffi::error_string(rc).to_string(),
    })
}
