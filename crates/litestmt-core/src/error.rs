//! Error types for litestmt operations.

use std::fmt;

/// The primary error type for all litestmt operations.
#[derive(Debug)]
pub enum Error {
    /// Open mode string outside `"r"`, `"r+"`, `"w+"`
    InvalidMode(String),
    /// The engine refused to open the database file
    Open(SqlError),
    /// The engine rejected the SQL text while preparing
    Syntax(SqlError),
    /// Parameter count or native bind failure
    Bind(BindError),
    /// A host value has no native mapping
    UnsupportedType(UnsupportedTypeError),
    /// Native failure while stepping or executing a statement
    Execution(SqlError),
    /// The owning database has been closed
    DatabaseClosed,
    /// The statement has been closed
    StatementClosed,
    /// Row value conversion errors
    Type(TypeError),
}

/// Engine-reported failure with its result codes.
#[derive(Debug, Clone)]
pub struct SqlError {
    pub kind: SqlErrorKind,
    /// Primary result code (`SQLITE_CONSTRAINT`, `SQLITE_BUSY`, ...)
    pub code: i32,
    /// Extended result code (`SQLITE_CONSTRAINT_UNIQUE`, ...)
    pub extended_code: i32,
    pub message: String,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlErrorKind {
    /// Constraint violation (unique, not null, foreign key, check)
    Constraint,
    /// Database file locked by another connection
    Busy,
    /// Write attempted on a read-only connection
    ReadOnly,
    /// Access denied by the engine or an authorizer
    Permission,
    /// Table, column or file not found
    NotFound,
    /// String or blob exceeds the engine's size limit
    TooBig,
    /// Interrupted by `sqlite3_interrupt`
    Interrupted,
    /// The database file could not be opened
    CantOpen,
    /// API called out of sequence
    Misuse,
    /// Any other engine error
    Other,
}

#[derive(Debug, Clone)]
pub struct BindError {
    /// 1-based parameter position, when a single parameter failed
    pub index: Option<usize>,
    /// Parameter name, for named binds
    pub name: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct UnsupportedTypeError {
    /// Host type that could not be mapped
    pub type_name: &'static str,
    pub reason: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Primary engine result code, for errors that came from the engine.
    pub fn code(&self) -> Option<i32> {
        self.sql_error().map(|e| e.code)
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        self.sql_error().and_then(|e| e.sql.as_deref())
    }

    /// Is this a lock contention error?
    pub fn is_busy(&self) -> bool {
        self.sql_error()
            .is_some_and(|e| e.kind == SqlErrorKind::Busy)
    }

    /// Is this a constraint violation?
    pub fn is_constraint_violation(&self) -> bool {
        self.sql_error()
            .is_some_and(|e| e.kind == SqlErrorKind::Constraint)
    }

    /// Use-after-close on either the database or the statement.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::DatabaseClosed | Error::StatementClosed)
    }

    fn sql_error(&self) -> Option<&SqlError> {
        match self {
            Error::Open(e) | Error::Syntax(e) | Error::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl SqlError {
    /// Build an error from engine result codes.
    pub fn new(code: i32, extended_code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: SqlErrorKind::from_code(code),
            code,
            extended_code,
            message: message.into(),
            sql: None,
        }
    }

    /// Attach the SQL text that triggered the error.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl SqlErrorKind {
    /// Classify a primary SQLite result code.
    ///
    /// The numeric codes are part of SQLite's stable ABI.
    pub fn from_code(code: i32) -> Self {
        match code & 0xff {
            19 => SqlErrorKind::Constraint,
            5 | 6 => SqlErrorKind::Busy,
            8 => SqlErrorKind::ReadOnly,
            3 | 23 => SqlErrorKind::Permission,
            12 => SqlErrorKind::NotFound,
            18 => SqlErrorKind::TooBig,
            9 => SqlErrorKind::Interrupted,
            14 => SqlErrorKind::CantOpen,
            21 => SqlErrorKind::Misuse,
            _ => SqlErrorKind::Other,
        }
    }
}

impl BindError {
    /// Error for a statement given more values than it has parameter slots.
    pub fn too_many(expected: usize, actual: usize) -> Self {
        Self {
            index: None,
            name: None,
            message: format!(
                "too many bind values: statement takes {} parameter(s), got {}",
                expected, actual
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidMode(mode) => write!(
                f,
                "Invalid open mode '{}': expected one of \"r\", \"r+\", \"w+\"",
                mode
            ),
            Error::Open(e) => write!(f, "Unable to open database: {}", e),
            Error::Syntax(e) => write!(f, "SQL syntax error: {}", e),
            Error::Bind(e) => write!(f, "Bind error: {}", e),
            Error::UnsupportedType(e) => write!(f, "Unsupported type: {}", e),
            Error::Execution(e) => write!(f, "SQL execution error: {}", e),
            Error::DatabaseClosed => write!(f, "Database is closed"),
            Error::StatementClosed => write!(f, "Statement is closed"),
            Error::Type(e) => write!(f, "Type error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open(e) | Error::Syntax(e) | Error::Execution(e) => Some(e),
            Error::Bind(e) => Some(e),
            Error::UnsupportedType(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.extended_code)
    }
}

impl std::error::Error for SqlError {}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.index) {
            (Some(name), _) => write!(f, "parameter '{}': {}", name, self.message),
            (None, Some(index)) => write!(f, "parameter {}: {}", index, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BindError {}

impl fmt::Display for UnsupportedTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} has no SQLite mapping: {}", self.type_name, self.reason)
    }
}

impl std::error::Error for UnsupportedTypeError {}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<BindError> for Error {
    fn from(err: BindError) -> Self {
        Error::Bind(err)
    }
}

impl From<UnsupportedTypeError> for Error {
    fn from(err: UnsupportedTypeError) -> Self {
        Error::UnsupportedType(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for litestmt operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_helpers() {
        // SQLITE_CONSTRAINT_UNIQUE = 2067
        let err = Error::Execution(
            SqlError::new(19, 2067, "UNIQUE constraint failed: t.id")
                .with_sql("INSERT INTO t VALUES (1)"),
        );

        assert!(err.is_constraint_violation());
        assert!(!err.is_busy());
        assert_eq!(err.code(), Some(19));
        assert_eq!(err.sql(), Some("INSERT INTO t VALUES (1)"));
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn kind_from_extended_code() {
        // SQLITE_BUSY_SNAPSHOT = 517
        assert_eq!(SqlErrorKind::from_code(517), SqlErrorKind::Busy);
        assert_eq!(SqlErrorKind::from_code(14), SqlErrorKind::CantOpen);
        assert_eq!(SqlErrorKind::from_code(1), SqlErrorKind::Other);
    }

    #[test]
    fn closed_errors() {
        assert!(Error::DatabaseClosed.is_closed());
        assert!(Error::StatementClosed.is_closed());
        assert!(!Error::InvalidMode("rw".into()).is_closed());
        assert_eq!(Error::StatementClosed.code(), None);
    }

    #[test]
    fn bind_error_display() {
        let err = Error::from(BindError::too_many(1, 3));
        assert_eq!(
            err.to_string(),
            "Bind error: too many bind values: statement takes 1 parameter(s), got 3"
        );

        let named = BindError {
            index: None,
            name: Some(":missing".into()),
            message: "no such parameter".into(),
        };
        assert_eq!(named.to_string(), "parameter ':missing': no such parameter");
    }

    #[test]
    fn invalid_mode_display() {
        let err = Error::InvalidMode("a+".into());
        assert!(err.to_string().contains("'a+'"));
    }
}
