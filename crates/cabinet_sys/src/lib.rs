//! # Cabinet Sys
//!
//! Raw declarations for the Tokyo Cabinet C API: hash (`TCHDB`), B-tree
//! (`TCBDB`, `BDBCUR`) and abstract (`TCADB`) databases, the `TCLIST`
//! container, the built-in comparators and the error codes.
//!
//! ## Linking
//!
//! The build script links `libtokyocabinet`; set `TOKYOCABINET_LIB_DIR` to
//! add a search path. With the `stand-in` feature every declaration resolves
//! to `cabinet_engine` instead, an in-process engine for the test suites.
//!
//! ## Memory ownership
//!
//! - Record buffers returned by `*get`, `*iternext`, `*curkey` and `*curval`
//!   are allocated with the C allocator and must be released with [`tcfree`].
//! - Strings returned by `*path` are borrowed from the handle and stay valid
//!   until it is closed. [`tcerrmsg`] strings are static.
//! - Lists returned by the engine are owned by the caller and released with
//!   [`tclistdel`].
//! - Every byte buffer crosses the boundary as a (pointer, length) pair.

#![allow(non_camel_case_types)]

use std::ffi::c_int;

#[cfg(not(feature = "stand-in"))]
mod native;

#[cfg(not(feature = "stand-in"))]
pub use native::*;

// Items defined below shadow the glob, so the constants are always these.
#[cfg(feature = "stand-in")]
pub use cabinet_engine::*;

/// Success.
pub const TCESUCCESS: c_int = 0;
/// Threading error.
pub const TCETHREAD: c_int = 1;
/// Invalid operation.
pub const TCEINVALID: c_int = 2;
/// File not found.
pub const TCENOFILE: c_int = 3;
/// No permission.
pub const TCENOPERM: c_int = 4;
/// Invalid meta data.
pub const TCEMETA: c_int = 5;
/// Invalid record header.
pub const TCERHEAD: c_int = 6;
/// Open error.
pub const TCEOPEN: c_int = 7;
/// Close error.
pub const TCECLOSE: c_int = 8;
/// Truncate error.
pub const TCETRUNC: c_int = 9;
/// Sync error.
pub const TCESYNC: c_int = 10;
/// Stat error.
pub const TCESTAT: c_int = 11;
/// Seek error.
pub const TCESEEK: c_int = 12;
/// Read error.
pub const TCEREAD: c_int = 13;
/// Write error.
pub const TCEWRITE: c_int = 14;
/// Mmap error.
pub const TCEMMAP: c_int = 15;
/// Lock error.
pub const TCELOCK: c_int = 16;
/// Unlink error.
pub const TCEUNLINK: c_int = 17;
/// Rename error.
pub const TCERENAME: c_int = 18;
/// Mkdir error.
pub const TCEMKDIR: c_int = 19;
/// Rmdir error.
pub const TCERMDIR: c_int = 20;
/// Existing record.
pub const TCEKEEP: c_int = 21;
/// No record found.
pub const TCENOREC: c_int = 22;
/// Miscellaneous error.
pub const TCEMISC: c_int = 9999;

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

#[cfg(all(test, feature = "stand-in"))]
mod tests {
    use super::*;

    #[test]
    fn stand_in_agrees_on_constants() {
        assert_eq!(TCEINVALID, cabinet_engine::TCEINVALID);
        assert_eq!(TCEKEEP, cabinet_engine::TCEKEEP);
        assert_eq!(TCENOREC, cabinet_engine::TCENOREC);
        assert_eq!(TCEMISC, cabinet_engine::TCEMISC);
        assert_eq!(BDBOWRITER | BDBOCREAT, cabinet_engine::BDBOWRITER | cabinet_engine::BDBOCREAT);
        assert_eq!(BDBOLCKNB, cabinet_engine::BDBOLCKNB);
        assert_eq!(BDBTBZIP, cabinet_engine::BDBTBZIP);
        assert_eq!(BDBCPAFTER, cabinet_engine::BDBCPAFTER);
        assert_eq!(OPTS_UNCHANGED, cabinet_engine::OPTS_UNCHANGED);
    }
}
