//! SQLite statement layer for litestmt.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate wraps libsqlite3 with a small, typed surface: open a
//! [`Database`], compile SQL into [`Statement`]s, bind [`Value`]s, and step
//! through [`Row`]s. Multi-statement scripts run through
//! [`Database::execute_batch`].
//!
//! # Example
//!
//! ```rust,no_run
//! use litestmt_sqlite::{Database, params};
//!
//! let db = Database::open_memory()?;
//! db.execute_batch(
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
//!      INSERT INTO users (name) VALUES ('Alice');",
//!     &[],
//! )?;
//!
//! let mut stmt = db.prepare("SELECT name FROM users WHERE id = ?")?;
//! stmt.bind(&params![1])?;
//! while let Some(row) = stmt.next_row()? {
//!     let name: String = row.get_named("name")?;
//!     println!("{name}");
//! }
//! # Ok::<(), litestmt_sqlite::Error>(())
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1); read back as `bool` from BOOL/BOOLEAN columns |
//! | `i8` .. `i64`, `u8` .. `u32` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `String`, `&str` | TEXT |
//! | `Vec<u8>`, `&[u8]` | BLOB |
//! | `Option<T>` | NULL or T |
//!
//! `u64`, `usize` and 128-bit integers convert only when they fit in `i64`.
//!
//! # Thread Safety
//!
//! `Database` is `Send` but not `Sync`. Statements borrow their database
//! and stay on its thread.

// Links the bundled SQLite build that the hand-written bindings call into.
use libsqlite3_sys as _;

mod binder;
mod codec;
pub mod config;
pub mod database;
pub mod ffi;
mod reader;
pub mod statement;

pub use codec::Encoding;
pub use config::{OpenMode, OpenOptions};
pub use database::Database;
pub use statement::{Rows, Statement, StatementState, Step};

pub use litestmt_core::{
    BindError, ColumnInfo, Error, FromValue, Result, Row, SqlError, SqlErrorKind, TypeError,
    UnsupportedTypeError, Value, params,
};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
