//! Value encoding and decoding between Rust and SQLite.
//!
//! SQLite has a simple type system with 5 storage classes:
//! - INTEGER: Signed integer (1, 2, 3, 4, 6, or 8 bytes)
//! - REAL: 8-byte IEEE floating point
//! - TEXT: UTF-8 or UTF-16 string
//! - BLOB: Binary data
//! - NULL: The NULL value
//!
//! We map these to/from litestmt-core's `Value`. Text and blobs are always
//! passed with an explicit byte length, so embedded NUL bytes survive.

use crate::ffi;
use litestmt_core::Value;
use std::ffi::{CStr, c_int};
use std::fmt;

/// Text encoding of a database, as reported by `PRAGMA encoding`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16le,
    Utf16be,
}

impl Encoding {
    /// Parse the result of `PRAGMA encoding`; unknown names fall back to UTF-8.
    pub fn from_pragma(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "UTF-16LE" => Encoding::Utf16le,
            "UTF-16BE" => Encoding::Utf16be,
            "UTF-16" if cfg!(target_endian = "little") => Encoding::Utf16le,
            "UTF-16" => Encoding::Utf16be,
            _ => Encoding::Utf8,
        }
    }

    /// Name as SQLite spells it.
    pub const fn as_str(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16le => "UTF-16le",
            Encoding::Utf16be => "UTF-16be",
        }
    }

    pub const fn is_utf16(self) -> bool {
        !matches!(self, Encoding::Utf8)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bind a Value to a prepared statement parameter.
///
/// Returns the SQLite result code. Buffers longer than `c_int::MAX` bytes
/// yield `SQLITE_TOOBIG` without calling into SQLite.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: the caller guarantees `stmt` is valid; text and blob buffers
    // are copied by SQLite (SQLITE_TRANSIENT) before the call returns
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),

            Value::Bool(b) => ffi::sqlite3_bind_int64(stmt, index, i64::from(*b)),

            Value::Int(v) => ffi::sqlite3_bind_int64(stmt, index, *v),

            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, *v),

            Value::Text(s) => {
                let Ok(len) = c_int::try_from(s.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    s.as_ptr().cast(),
                    len,
                    ffi::SQLITE_TRANSIENT,
                )
            }

            // An empty Vec still has a non-null dangling pointer, so an empty
            // blob binds as a zero-length blob rather than NULL.
            Value::Blob(b) => {
                let Ok(len) = c_int::try_from(b.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_blob(stmt, index, b.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT)
            }
        }
    }
}

/// Read a column value from the current result row.
///
/// `decl_type` is the column's declared type; INTEGER values in `BOOL` or
/// `BOOLEAN` columns decode as `Value::Bool`. Text is read in the
/// database's own encoding.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(
    stmt: *mut ffi::sqlite3_stmt,
    index: c_int,
    decl_type: Option<&str>,
    encoding: Encoding,
) -> Value {
    // SAFETY: the caller guarantees `stmt` is positioned on a row; pointers
    // returned by column_text/blob stay valid until the next step/reset, and
    // we copy out of them before returning
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_NULL => Value::Null,

            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                if decl_type.is_some_and(is_boolean_decl) {
                    Value::Bool(v != 0)
                } else {
                    Value::Int(v)
                }
            }

            ffi::SQLITE_FLOAT => Value::Float(ffi::sqlite3_column_double(stmt, index)),

            ffi::SQLITE_TEXT if encoding.is_utf16() => {
                let ptr = ffi::sqlite3_column_text16(stmt, index);
                let len = ffi::sqlite3_column_bytes16(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    // Not necessarily 2-byte aligned; read as bytes
                    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Text(decode_utf16_ne(bytes))
                }
            }

            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let slice = std::slice::from_raw_parts(ptr, len as usize);
                    Value::Text(String::from_utf8_lossy(slice).into_owned())
                }
            }

            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    Value::Blob(Vec::new())
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Blob(slice.to_vec())
                }
            }

            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: the caller guarantees `stmt` and `index` are valid
    let ptr = unsafe { ffi::sqlite3_column_name(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null column names are NUL-terminated UTF-8
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Get the declared type of a result column, `None` for expressions.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_decltype(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: the caller guarantees `stmt` and `index` are valid
    let ptr = unsafe { ffi::sqlite3_column_decltype(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null declared types are NUL-terminated UTF-8
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Decode native-endian UTF-16 from a byte buffer of any alignment.
fn decode_utf16_ne(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn is_boolean_decl(decl: &str) -> bool {
    let decl = decl.trim();
    decl.eq_ignore_ascii_case("BOOLEAN") || decl.eq_ignore_ascii_case("BOOL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_from_pragma() {
        assert_eq!(Encoding::from_pragma("UTF-8"), Encoding::Utf8);
        assert_eq!(Encoding::from_pragma("UTF-16le"), Encoding::Utf16le);
        assert_eq!(Encoding::from_pragma("UTF-16be"), Encoding::Utf16be);
        assert_eq!(Encoding::from_pragma("garbage"), Encoding::Utf8);
        assert!(Encoding::from_pragma("UTF-16").is_utf16());
    }

    #[test]
    fn test_encoding_display() {
        assert_eq!(Encoding::Utf8.to_string(), "UTF-8");
        assert_eq!(Encoding::Utf16le.to_string(), "UTF-16le");
        assert!(!Encoding::Utf8.is_utf16());
    }

    #[test]
    fn test_decode_utf16_unaligned() {
        let mut buf = vec![0u8];
        for unit in "héllo 🎉".encode_utf16() {
            buf.extend_from_slice(&unit.to_ne_bytes());
        }
        // Start at an odd offset so the units are misaligned
        assert_eq!(decode_utf16_ne(&buf[1..]), "héllo 🎉");

        // Lone surrogate is replaced, odd trailing byte ignored
        let mut bad = 0xD800u16.to_ne_bytes().to_vec();
        bad.push(b'x');
        assert_eq!(decode_utf16_ne(&bad), "\u{FFFD}");
    }

    #[test]
    fn test_boolean_decl() {
        assert!(is_boolean_decl("BOOLEAN"));
        assert!(is_boolean_decl("bool"));
        assert!(is_boolean_decl(" Boolean "));
        assert!(!is_boolean_decl("INTEGER"));
        assert!(!is_boolean_decl("BOOLEANS"));
    }
}
