//! Open modes and connection options.

use crate::ffi;
use litestmt_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::c_int;
use std::fmt;
use std::str::FromStr;

/// How a database file is opened.
///
/// Parsed from the mode strings `"r"`, `"r+"` and `"w+"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// `"r"`: read-only; the file must exist.
    #[serde(rename = "r")]
    ReadOnly,
    /// `"r+"`: read-write; the file must exist.
    #[serde(rename = "r+")]
    ReadWrite,
    /// `"w+"`: read-write, creating the file if it is absent.
    #[default]
    #[serde(rename = "w+")]
    ReadWriteCreate,
}

impl OpenMode {
    /// The mode string this variant is parsed from.
    pub const fn as_str(self) -> &'static str {
        match self {
            OpenMode::ReadOnly => "r",
            OpenMode::ReadWrite => "r+",
            OpenMode::ReadWriteCreate => "w+",
        }
    }

    /// Whether opening in this mode may create the file.
    pub const fn creates(self) -> bool {
        matches!(self, OpenMode::ReadWriteCreate)
    }

    pub(crate) fn to_sqlite_flags(self) -> c_int {
        match self {
            OpenMode::ReadOnly => ffi::SQLITE_OPEN_READONLY,
            OpenMode::ReadWrite => ffi::SQLITE_OPEN_READWRITE,
            OpenMode::ReadWriteCreate => ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
        }
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(OpenMode::ReadOnly),
            "r+" => Ok(OpenMode::ReadWrite),
            "w+" => Ok(OpenMode::ReadWriteCreate),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for opening a [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Open mode (read-only, read-write, read-write-create).
    pub mode: OpenMode,
    /// Create new databases with UTF-16 text encoding.
    ///
    /// Only honored when the file is created; an existing file keeps its
    /// encoding.
    pub utf16: bool,
    /// Busy timeout in milliseconds, 0 to disable.
    pub busy_timeout_ms: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            mode: OpenMode::default(),
            utf16: false,
            busy_timeout_ms: 5000,
        }
    }
}

impl OpenOptions {
    /// Default options: mode `"w+"`, UTF-8, 5s busy timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the open mode.
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the open mode from its string form, rejecting unknown modes.
    pub fn mode_str(self, mode: &str) -> Result<Self> {
        Ok(self.mode(mode.parse()?))
    }

    /// Request UTF-16 encoding for newly created databases.
    pub fn utf16(mut self, utf16: bool) -> Self {
        self.utf16 = utf16;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::ReadOnly);
        assert_eq!("r+".parse::<OpenMode>().unwrap(), OpenMode::ReadWrite);
        assert_eq!("w+".parse::<OpenMode>().unwrap(), OpenMode::ReadWriteCreate);
    }

    #[test]
    fn test_reject_unknown_modes() {
        for bad in ["", "w", "rw", "a+", "R", "r+ ", "w+b"] {
            match bad.parse::<OpenMode>() {
                Err(Error::InvalidMode(m)) => assert_eq!(m, bad),
                other => panic!("expected InvalidMode for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_mode_display_roundtrip() {
        for mode in [
            OpenMode::ReadOnly,
            OpenMode::ReadWrite,
            OpenMode::ReadWriteCreate,
        ] {
            assert_eq!(mode.to_string().parse::<OpenMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_flags() {
        assert_eq!(
            OpenMode::ReadOnly.to_sqlite_flags(),
            ffi::SQLITE_OPEN_READONLY
        );
        assert_eq!(
            OpenMode::ReadWriteCreate.to_sqlite_flags(),
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        );
        assert!(OpenMode::ReadWriteCreate.creates());
        assert!(!OpenMode::ReadWrite.creates());
    }

    #[test]
    fn test_options_builder() {
        let opts = OpenOptions::new()
            .mode_str("r+")
            .unwrap()
            .utf16(true)
            .busy_timeout(0);
        assert_eq!(opts.mode, OpenMode::ReadWrite);
        assert!(opts.utf16);
        assert_eq!(opts.busy_timeout_ms, 0);

        assert!(OpenOptions::new().mode_str("x").is_err());
    }

    #[test]
    fn test_options_from_json() {
        let opts: OpenOptions = serde_json::from_str(r#"{"mode": "r", "utf16": true}"#).unwrap();
        assert_eq!(opts.mode, OpenMode::ReadOnly);
        assert!(opts.utf16);
        assert_eq!(opts.busy_timeout_ms, 5000);

        let defaults: OpenOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, OpenOptions::default());
    }
}
