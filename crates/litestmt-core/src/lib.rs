//! Core types for litestmt.
//!
//! This crate provides the driver-independent half of the statement layer:
//!
//! - `Value`, the dynamically-typed SQL value used for binding and fetching
//! - `Row` and `ColumnInfo`, with positional and name-indexed access
//! - `Error`, the typed error taxonomy shared by every driver
//! - the `params!` macro for building bind lists

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    BindError, Error, Result, SqlError, SqlErrorKind, TypeError, UnsupportedTypeError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
