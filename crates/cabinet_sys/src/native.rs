//! Declarations resolved against libtokyocabinet.

use std::ffi::{c_char, c_int, c_void};
use std::marker::{PhantomData, PhantomPinned};

macro_rules! opaque {
    ($($(#[$doc:meta])* $name:ident;)+) => {$(
        $(#[$doc])*
        #[repr(C)]
        pub struct $name {
            _data: [u8; 0],
            _marker: PhantomData<(*mut u8, PhantomPinned)>,
        }
    )+};
}

opaque! {
    /// A hash database handle.
    TCHDB;
    /// A B-tree database handle.
    TCBDB;
    /// A B-tree cursor.
    BDBCUR;
    /// An abstract database handle.
    TCADB;
    /// A list of byte buffers.
    TCLIST;
}

/// A key comparison callback: both keys as (pointer, length) pairs plus the
/// opaque pointer registered with it. Must not unwind.
pub type TCCMP = unsafe extern "C" fn(
    aptr: *const c_char,
    asiz: c_int,
    bptr: *const c_char,
    bsiz: c_int,
    op: *mut c_void,
) -> c_int;

#[allow(missing_docs)]
unsafe extern "C" {
    pub safe fn tcerrmsg(ecode: c_int) -> *const c_char;
    pub fn tcfree(ptr: *mut c_void);

    pub fn tccmplexical(aptr: *const c_char, asiz: c_int, bptr: *const c_char, bsiz: c_int, op: *mut c_void) -> c_int;
    pub fn tccmpdecimal(aptr: *const c_char, asiz: c_int, bptr: *const c_char, bsiz: c_int, op: *mut c_void) -> c_int;
    pub fn tccmpint32(aptr: *const c_char, asiz: c_int, bptr: *const c_char, bsiz: c_int, op: *mut c_void) -> c_int;
    pub fn tccmpint64(aptr: *const c_char, asiz: c_int, bptr: *const c_char, bsiz: c_int, op: *mut c_void) -> c_int;

    pub safe fn tclistnew() -> *mut TCLIST;
    pub safe fn tclistnew2(anum: c_int) -> *mut TCLIST;
    pub fn tclistdel(list: *mut TCLIST);
    pub fn tclistnum(list: *const TCLIST) -> c_int;
    pub fn tclistval(list: *const TCLIST, index: c_int, sp: *mut c_int) -> *const c_void;
    pub fn tclistpush(list: *mut TCLIST, ptr: *const c_void, size: c_int);
    pub fn tclistlsearch(list: *const TCLIST, ptr: *const c_void, size: c_int) -> c_int;
    pub fn tclistbsearch(list: *const TCLIST, ptr: *const c_void, size: c_int) -> c_int;

    // Hash database
    pub safe fn tchdbnew() -> *mut TCHDB;
    pub fn tchdbdel(hdb: *mut TCHDB);
    pub fn tchdbecode(hdb: *mut TCHDB) -> c_int;
    pub fn tchdbsetmutex(hdb: *mut TCHDB) -> bool;
    pub fn tchdbtune(hdb: *mut TCHDB, bnum: i64, apow: i8, fpow: i8, opts: u8) -> bool;
    pub fn tchdbsetcache(hdb: *mut TCHDB, rcnum: i32) -> bool;
    pub fn tchdbsetxmsiz(hdb: *mut TCHDB, xmsiz: i64) -> bool;
    pub fn tchdbsetdfunit(hdb: *mut TCHDB, dfunit: i32) -> bool;
    pub fn tchdbopen(hdb: *mut TCHDB, path: *const c_char, omode: c_int) -> bool;
    pub fn tchdbclose(hdb: *mut TCHDB) -> bool;
    pub fn tchdbput(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tchdbputkeep(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tchdbputcat(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tchdbout(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int) -> bool;
    pub fn tchdbget(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, sp: *mut c_int) -> *mut c_void;
    pub fn tchdbvsiz(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int) -> c_int;
    pub fn tchdbiterinit(hdb: *mut TCHDB) -> bool;
    pub fn tchdbiternext(hdb: *mut TCHDB, sp: *mut c_int) -> *mut c_void;
    pub fn tchdbfwmkeys(hdb: *mut TCHDB, pbuf: *const c_void, psiz: c_int, max: c_int) -> *mut TCLIST;
    pub fn tchdbaddint(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, num: c_int) -> c_int;
    pub fn tchdbadddouble(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, num: f64) -> f64;
    pub fn tchdbsync(hdb: *mut TCHDB) -> bool;
    pub fn tchdboptimize(hdb: *mut TCHDB, bnum: i64, apow: i8, fpow: i8, opts: u8) -> bool;
    pub fn tchdbvanish(hdb: *mut TCHDB) -> bool;
    pub fn tchdbcopy(hdb: *mut TCHDB, path: *const c_char) -> bool;
    pub fn tchdbtranbegin(hdb: *mut TCHDB) -> bool;
    pub fn tchdbtrancommit(hdb: *mut TCHDB) -> bool;
    pub fn tchdbtranabort(hdb: *mut TCHDB) -> bool;
    pub fn tchdbpath(hdb: *mut TCHDB) -> *const c_char;
    pub fn tchdbrnum(hdb: *mut TCHDB) -> u64;
    pub fn tchdbfsiz(hdb: *mut TCHDB) -> u64;

    // B-tree database
    pub safe fn tcbdbnew() -> *mut TCBDB;
    pub fn tcbdbdel(bdb: *mut TCBDB);
    pub fn tcbdbecode(bdb: *mut TCBDB) -> c_int;
    pub fn tcbdbsetmutex(bdb: *mut TCBDB) -> bool;
    pub fn tcbdbsetcmpfunc(bdb: *mut TCBDB, cmp: TCCMP, op: *mut c_void) -> bool;
    pub fn tcbdbtune(bdb: *mut TCBDB, lmemb: i32, nmemb: i32, bnum: i64, apow: i8, fpow: i8, opts: u8) -> bool;
    pub fn tcbdbsetcache(bdb: *mut TCBDB, lcnum: i32, ncnum: i32) -> bool;
    pub fn tcbdbsetxmsiz(bdb: *mut TCBDB, xmsiz: i64) -> bool;
    pub fn tcbdbsetdfunit(bdb: *mut TCBDB, dfunit: i32) -> bool;
    pub fn tcbdbopen(bdb: *mut TCBDB, path: *const c_char, omode: c_int) -> bool;
    pub fn tcbdbclose(bdb: *mut TCBDB) -> bool;
    pub fn tcbdbput(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tcbdbputkeep(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tcbdbputcat(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tcbdbputdup(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tcbdbputdup3(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, vals: *const TCLIST) -> bool;
    pub fn tcbdbout(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> bool;
    pub fn tcbdbout3(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> bool;
    pub fn tcbdbget(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, sp: *mut c_int) -> *mut c_void;
    pub fn tcbdbget4(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> *mut TCLIST;
    pub fn tcbdbvnum(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> c_int;
    pub fn tcbdbvsiz(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> c_int;
    pub fn tcbdbrange(
        bdb: *mut TCBDB,
        bkbuf: *const c_void,
        bksiz: c_int,
        binc: bool,
        ekbuf: *const c_void,
        eksiz: c_int,
        einc: bool,
        max: c_int,
    ) -> *mut TCLIST;
    pub fn tcbdbfwmkeys(bdb: *mut TCBDB, pbuf: *const c_void, psiz: c_int, max: c_int) -> *mut TCLIST;
    pub fn tcbdbaddint(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, num: c_int) -> c_int;
    pub fn tcbdbadddouble(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, num: f64) -> f64;
    pub fn tcbdbsync(bdb: *mut TCBDB) -> bool;
    pub fn tcbdboptimize(bdb: *mut TCBDB, lmemb: i32, nmemb: i32, bnum: i64, apow: i8, fpow: i8, opts: u8) -> bool;
    pub fn tcbdbvanish(bdb: *mut TCBDB) -> bool;
    pub fn tcbdbcopy(bdb: *mut TCBDB, path: *const c_char) -> bool;
    pub fn tcbdbtranbegin(bdb: *mut TCBDB) -> bool;
    pub fn tcbdbtrancommit(bdb: *mut TCBDB) -> bool;
    pub fn tcbdbtranabort(bdb: *mut TCBDB) -> bool;
    pub fn tcbdbpath(bdb: *mut TCBDB) -> *const c_char;
    pub fn tcbdbrnum(bdb: *mut TCBDB) -> u64;
    pub fn tcbdbfsiz(bdb: *mut TCBDB) -> u64;

    // B-tree cursors
    pub fn tcbdbcurnew(bdb: *mut TCBDB) -> *mut BDBCUR;
    pub fn tcbdbcurdel(cur: *mut BDBCUR);
    pub fn tcbdbcurfirst(cur: *mut BDBCUR) -> bool;
    pub fn tcbdbcurlast(cur: *mut BDBCUR) -> bool;
    pub fn tcbdbcurjump(cur: *mut BDBCUR, kbuf: *const c_void, ksiz: c_int) -> bool;
    pub fn tcbdbcurnext(cur: *mut BDBCUR) -> bool;
    pub fn tcbdbcurprev(cur: *mut BDBCUR) -> bool;
    pub fn tcbdbcurput(cur: *mut BDBCUR, vbuf: *const c_void, vsiz: c_int, cpmode: c_int) -> bool;
    pub fn tcbdbcurout(cur: *mut BDBCUR) -> bool;
    pub fn tcbdbcurkey(cur: *mut BDBCUR, sp: *mut c_int) -> *mut c_void;
    pub fn tcbdbcurval(cur: *mut BDBCUR, sp: *mut c_int) -> *mut c_void;

    // Abstract database
    pub safe fn tcadbnew() -> *mut TCADB;
    pub fn tcadbdel(adb: *mut TCADB);
    pub fn tcadbopen(adb: *mut TCADB, name: *const c_char) -> bool;
    pub fn tcadbclose(adb: *mut TCADB) -> bool;
    pub fn tcadbput(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tcadbputkeep(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tcadbputcat(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, vbuf: *const c_void, vsiz: c_int) -> bool;
    pub fn tcadbout(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int) -> bool;
    pub fn tcadbget(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, sp: *mut c_int) -> *mut c_void;
    pub fn tcadbvsiz(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int) -> c_int;
    pub fn tcadbiterinit(adb: *mut TCADB) -> bool;
    pub fn tcadbiternext(adb: *mut TCADB, sp: *mut c_int) -> *mut c_void;
    pub fn tcadbfwmkeys(adb: *mut TCADB, pbuf: *const c_void, psiz: c_int, max: c_int) -> *mut TCLIST;
    pub fn tcadbaddint(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, num: c_int) -> c_int;
    pub fn tcadbadddouble(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, num: f64) -> f64;
    pub fn tcadbsync(adb: *mut TCADB) -> bool;
    pub fn tcadboptimize(adb: *mut TCADB, params: *const c_char) -> bool;
    pub fn tcadbvanish(adb: *mut TCADB) -> bool;
    pub fn tcadbcopy(adb: *mut TCADB, path: *const c_char) -> bool;
    pub fn tcadbtranbegin(adb: *mut TCADB) -> bool;
    pub fn tcadbtrancommit(adb: *mut TCADB) -> bool;
    pub fn tcadbtranabort(adb: *mut TCADB) -> bool;
    pub fn tcadbpath(adb: *mut TCADB) -> *const c_char;
    pub fn tcadbrnum(adb: *mut TCADB) -> u64;
    pub fn tcadbsize(adb: *mut TCADB) -> u64;
    pub fn tcadbmisc(adb: *mut TCADB, name: *const c_char, args: *const TCLIST) -> *mut TCLIST;
}
