//! # Cabinet Core
//!
//! Safe binding over the cabinet embedded key-value engine.
//!
//! This crate provides:
//! - Hash databases ([`Hdb`])
//! - B-tree databases with duplicate values, range scans and custom key
//!   ordering ([`Bdb`], [`Comparator`])
//! - Cursors over B-trees that keep their database alive ([`Cursor`])
//! - Abstract databases selected by name ([`Adb`])
//! - Engine-owned buffers and lists ([`NativeBuf`], [`List`])
//! - A typed error taxonomy over engine error codes ([`Error`], [`ErrorKind`])
//! - Release of a host execution permit around blocking engine calls
//!   ([`permit`])
//!
//! ## Example
//!
//! ```
//! use cabinet_core::{Bdb, Comparator, OpenMode};
//!
//! let dir = tempfile::tempdir()?;
//! let db = Bdb::new()?;
//! db.set_comparator(Comparator::raw(|a, b| b.cmp(a)))?;
//! db.open(dir.path().join("casket.tcb"), OpenMode::WRITE_CREATE)?;
//!
//! db.put(b"apple", b"red")?;
//! db.put(b"cherry", b"dark red")?;
//! let keys = db.range(None, true, None, true, None)?;
//! assert_eq!(keys.get(0), Some(&b"cherry"[..]));
//!
//! db.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

mod adb;
mod bdb;
mod buffer;
mod comparator;
mod config;
mod cursor;
mod error;
mod hdb;
mod list;
pub mod permit;

pub use adb::Adb;
pub use bdb::Bdb;
pub use buffer::NativeBuf;
pub use comparator::{CompareFn, Comparator, RawCompareFn};
pub use config::{BdbCache, BdbTuning, HdbTuning, OpenMode, TuneOpt};
pub use cursor::{Cursor, CursorPut};
pub use error::{Error, ErrorKind, Result};
pub use hdb::Hdb;
pub use list::{Iter as ListIter, List};

use std::ffi::CString;
use std::path::Path;

/// Converts a path for the engine. Paths must be valid UTF-8 without NUL bytes.
pub(crate) fn path_to_cstring(path: &Path, function: &'static str) -> Result<CString> {
    let path = path
        .to_str()
        .ok_or_else(|| Error::binding(function, "path is not valid UTF-8"))?;
    CString::new(path).map_err(|_| Error::binding(function, "path contains a NUL byte"))
}
