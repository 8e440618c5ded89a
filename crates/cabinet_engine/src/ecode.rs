//! Error codes and their messages.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, CStr};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

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

/// Returns the message for an error code.
///
/// The returned string is static and must not be freed.
#[no_mangle]
pub extern "C" fn tcerrmsg(ecode: c_int) -> *const c_char {
    message(ecode).as_ptr()
}

fn message(ecode: c_int) -> &'static CStr {
    match ecode {
        TCESUCCESS => c"success",
        TCETHREAD => c"threading error",
        TCEINVALID => c"invalid operation",
        TCENOFILE => c"file not found",
        TCENOPERM => c"no permission",
        TCEMETA => c"invalid meta data",
        TCERHEAD => c"invalid record header",
        TCEOPEN => c"open error",
        TCECLOSE => c"close error",
        TCETRUNC => c"trunc error",
        TCESYNC => c"sync error",
        TCESTAT => c"stat error",
        TCESEEK => c"seek error",
        TCEREAD => c"read error",
        TCEWRITE => c"write error",
        TCEMMAP => c"mmap error",
        TCELOCK => c"lock error",
        TCEUNLINK => c"unlink error",
        TCERENAME => c"rename error",
        TCEMKDIR => c"mkdir error",
        TCERMDIR => c"rmdir error",
        TCEKEEP => c"existing record",
        TCENOREC => c"no record found",
        TCEMISC => c"miscellaneous error",
        _ => c"unknown error",
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CODES: RefCell<HashMap<u64, c_int>> = RefCell::new(HashMap::new());
}

/// Last error code of a database handle.
///
/// Once the handle's mutex is enabled the code is kept per thread, so each
/// thread sharing the handle reads the outcome of its own last call.
#[derive(Debug)]
pub(crate) struct Ecode {
    id: u64,
    shared: AtomicI32,
    per_thread: AtomicBool,
}

impl Default for Ecode {
    fn default() -> Self {
        Self {
            id: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            shared: AtomicI32::new(TCESUCCESS),
            per_thread: AtomicBool::new(false),
        }
    }
}

impl Ecode {
    pub(crate) fn make_per_thread(&self) {
        self.per_thread.store(true, Ordering::Release);
    }

    fn is_per_thread(&self) -> bool {
        self.per_thread.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, ecode: c_int) {
        if self.is_per_thread() {
            THREAD_CODES.with(|codes| codes.borrow_mut().insert(self.id, ecode));
        } else {
            self.shared.store(ecode, Ordering::Release);
        }
    }

    pub(crate) fn get(&self) -> c_int {
        if self.is_per_thread() {
            THREAD_CODES.with(|codes| codes.borrow().get(&self.id).copied().unwrap_or(TCESUCCESS))
        } else {
            self.shared.load(Ordering::Acquire)
        }
    }
}

impl Drop for Ecode {
    fn drop(&mut self) {
        // Codes left on other threads are unreachable once the id is gone.
        let _ = THREAD_CODES.try_with(|codes| codes.borrow_mut().remove(&self.id));
    }
}
