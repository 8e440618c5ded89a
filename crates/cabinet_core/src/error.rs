//! Error types for the binding.

use std::ffi::{c_int, CStr};
use thiserror::Error;

/// Result type for binding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Category of an engine failure.
///
/// Engine codes 1 through 22 map onto the variants in order. Every other
/// code, and every failure raised by the binding itself, is [`ErrorKind::Misc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Threading error.
    Thread = 1,
    /// Invalid operation.
    Invalid,
    /// File not found.
    NoFile,
    /// No permission.
    NoPerm,
    /// Invalid meta data.
    Meta,
    /// Invalid record header.
    RHead,
    /// Open error.
    Open,
    /// Close error.
    Close,
    /// Truncate error.
    Trunc,
    /// Sync error.
    Sync,
    /// Stat error.
    Stat,
    /// Seek error.
    Seek,
    /// Read error.
    Read,
    /// Write error.
    Write,
    /// Mmap error.
    Mmap,
    /// Lock error.
    Lock,
    /// Unlink error.
    Unlink,
    /// Rename error.
    Rename,
    /// Mkdir error.
    Mkdir,
    /// Rmdir error.
    Rmdir,
    /// Existing record.
    Keep,
    /// No record found.
    NoRecord,
    /// Anything else.
    Misc,
}

impl ErrorKind {
    /// Maps an engine error code to its kind.
    pub fn from_code(code: c_int) -> Self {
        use ErrorKind::*;
        match code {
            1 => Thread,
            2 => Invalid,
            3 => NoFile,
            4 => NoPerm,
            5 => Meta,
            6 => RHead,
            7 => Open,
            8 => Close,
            9 => Trunc,
            10 => Sync,
            11 => Stat,
            12 => Seek,
            13 => Read,
            14 => Write,
            15 => Mmap,
            16 => Lock,
            17 => Unlink,
            18 => Rename,
            19 => Mkdir,
            20 => Rmdir,
            21 => Keep,
            22 => NoRecord,
            _ => Misc,
        }
    }
}

/// A failed engine or binding operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{function}: {message} ({kind:?})")]
pub struct Error {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The operation that failed, for example `tcbdbput`.
    pub function: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl Error {
    /// Creates an error from an engine error code, using the engine's message.
    pub fn engine(code: c_int, function: &'static str) -> Self {
        // tcerrmsg returns a static string for every code.
        let message = unsafe { CStr::from_ptr(cabinet_sys::tcerrmsg(code)) }
            .to_string_lossy()
            .into_owned();
        Self {
            kind: ErrorKind::from_code(code),
            function,
            message,
        }
    }

    /// Creates a binding-side error.
    pub fn binding(function: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Misc,
            function,
            message: message.into(),
        }
    }

    /// Returns true if the error means the record does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NoRecord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_contiguous() {
        for code in 1..=22 {
            assert_eq!(ErrorKind::from_code(code) as i32, code);
        }
        assert_eq!(ErrorKind::from_code(0), ErrorKind::Misc);
        assert_eq!(ErrorKind::from_code(23), ErrorKind::Misc);
        assert_eq!(ErrorKind::from_code(cabinet_sys::TCEMISC), ErrorKind::Misc);
    }

    #[test]
    fn engine_error_message() {
        let err = Error::engine(cabinet_sys::TCENOREC, "tcbdbget");
        assert!(err.is_not_found());
        assert_eq!(err.message, "no record found");
        assert_eq!(err.to_string(), "tcbdbget: no record found (NoRecord)");
    }

    #[test]
    fn binding_error_is_misc() {
        let err = Error::binding("open", "path contains a NUL byte");
        assert_eq!(err.kind, ErrorKind::Misc);
        assert!(!err.is_not_found());
    }
}
