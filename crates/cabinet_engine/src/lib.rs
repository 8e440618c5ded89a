//! # Cabinet Engine
//!
//! An in-process stand-in for the native key-value engine, exporting the same
//! handle-based C ABI. `cabinet_sys` resolves its declarations here when built
//! with the `stand-in` feature, which is how the test suites run without the
//! native library installed. Not meant to be shipped.
//!
//! This crate provides:
//! - Hash database handles (`TCHDB`)
//! - B-tree database handles with duplicate values and cursors (`TCBDB`, `BDBCUR`)
//! - An abstract database dispatching on its open name (`TCADB`)
//! - A variable-length list container (`TCLIST`)
//! - Built-in key comparators and the `TCCMP` callback type
//! - Per-handle error codes and their messages
//!
//! ## Memory ownership
//!
//! - Record buffers returned by `*get`, `*iternext`, `*curkey` and `*curval`
//!   are allocated with the C allocator and must be released with [`tcfree`].
//! - Strings returned by `*path` and [`tcerrmsg`] are borrowed from the engine.
//! - Lists returned by the engine are owned by the caller and released with
//!   [`tclistdel`].
//! - Every byte buffer crosses the boundary as a (pointer, length) pair, so
//!   keys and values may contain zero bytes.

#![allow(non_camel_case_types)]
#![warn(missing_docs)]

use std::ffi::c_int;

mod adb;
mod alloc;
mod bdb;
mod cmp;
mod ecode;
mod file;
mod hdb;
mod list;
mod store;

pub use adb::*;
pub use alloc::tcfree;
pub use bdb::*;
pub use cmp::{tccmpdecimal, tccmpint32, tccmpint64, tccmplexical, TCCMP};
pub use ecode::*;
pub use hdb::*;
pub use list::*;

/// Open as a reader.
pub const BDBOREADER: c_int = 1 << 0;
/// Open as a writer.
pub const BDBOWRITER: c_int = 1 << 1;
/// Create the database file if it does not exist.
pub const BDBOCREAT: c_int = 1 << 2;
/// Truncate the database file.
pub const BDBOTRUNC: c_int = 1 << 3;
/// Open without file locking.
pub const BDBONOLCK: c_int = 1 << 4;
/// Lock without blocking.
pub const BDBOLCKNB: c_int = 1 << 5;
/// Synchronize every transaction.
pub const BDBOTSYNC: c_int = 1 << 6;

/// Open as a reader.
pub const HDBOREADER: c_int = BDBOREADER;
/// Open as a writer.
pub const HDBOWRITER: c_int = BDBOWRITER;
/// Create the database file if it does not exist.
pub const HDBOCREAT: c_int = BDBOCREAT;
/// Truncate the database file.
pub const HDBOTRUNC: c_int = BDBOTRUNC;
/// Open without file locking.
pub const HDBONOLCK: c_int = BDBONOLCK;
/// Lock without blocking.
pub const HDBOLCKNB: c_int = BDBOLCKNB;
/// Synchronize every transaction.
pub const HDBOTSYNC: c_int = BDBOTSYNC;

/// Use 64-bit bucket arrays.
pub const BDBTLARGE: u8 = 1 << 0;
/// Compress pages with Deflate.
pub const BDBTDEFLATE: u8 = 1 << 1;
/// Compress pages with BZIP2.
pub const BDBTBZIP: u8 = 1 << 2;
/// Compress pages with TCBS.
pub const BDBTTCBS: u8 = 1 << 3;

/// Use 64-bit bucket arrays.
pub const HDBTLARGE: u8 = BDBTLARGE;
/// Compress records with Deflate.
pub const HDBTDEFLATE: u8 = BDBTDEFLATE;
/// Compress records with BZIP2.
pub const HDBTBZIP: u8 = BDBTBZIP;
/// Compress records with TCBS.
pub const HDBTTCBS: u8 = BDBTTCBS;

/// Option bitmask meaning "keep the current options".
pub const OPTS_UNCHANGED: u8 = u8::MAX;

/// Overwrite the value under the cursor.
pub const BDBCPCURRENT: c_int = 0;
/// Insert before the value under the cursor.
pub const BDBCPBEFORE: c_int = 1;
/// Insert after the value under the cursor.
pub const BDBCPAFTER: c_int = 2;
