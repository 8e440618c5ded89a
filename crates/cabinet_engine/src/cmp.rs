//! Key comparators.

use crate::alloc::borrow;
use std::cmp::Ordering;
use std::ffi::{c_char, c_int, c_void};
use std::ptr;

/// A key comparison callback.
///
/// Receives both keys as (pointer, length) pairs plus the opaque pointer
/// registered alongside the callback. Returns a negative, zero or positive
/// value. The callback must not unwind.
pub type TCCMP = unsafe extern "C" fn(
    aptr: *const c_char,
    asiz: c_int,
    bptr: *const c_char,
    bsiz: c_int,
    op: *mut c_void,
) -> c_int;

/// Compares keys in lexical byte order.
///
/// # Safety
///
/// Both pointers must reference readable regions of the given sizes.
#[no_mangle]
pub unsafe extern "C" fn tccmplexical(
    aptr: *const c_char,
    asiz: c_int,
    bptr: *const c_char,
    bsiz: c_int,
    _op: *mut c_void,
) -> c_int {
    sign(key(aptr, asiz).cmp(key(bptr, bsiz)))
}

/// Compares keys as decimal numeric strings.
///
/// Keys with the same numeric value fall back to lexical order.
///
/// # Safety
///
/// Both pointers must reference readable regions of the given sizes.
#[no_mangle]
pub unsafe extern "C" fn tccmpdecimal(
    aptr: *const c_char,
    asiz: c_int,
    bptr: *const c_char,
    bsiz: c_int,
    _op: *mut c_void,
) -> c_int {
    let (a, b) = (key(aptr, asiz), key(bptr, bsiz));
    let order = decimal(a)
        .partial_cmp(&decimal(b))
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.cmp(b));
    sign(order)
}

/// Compares keys as native-endian 32-bit integers.
///
/// Keys of another size compare as zero.
///
/// # Safety
///
/// Both pointers must reference readable regions of the given sizes.
#[no_mangle]
pub unsafe extern "C" fn tccmpint32(
    aptr: *const c_char,
    asiz: c_int,
    bptr: *const c_char,
    bsiz: c_int,
    _op: *mut c_void,
) -> c_int {
    let num = |k: &[u8]| <[u8; 4]>::try_from(k).map_or(0, i32::from_ne_bytes);
    sign(num(key(aptr, asiz)).cmp(&num(key(bptr, bsiz))))
}

/// Compares keys as native-endian 64-bit integers.
///
/// Keys of another size compare as zero.
///
/// # Safety
///
/// Both pointers must reference readable regions of the given sizes.
#[no_mangle]
pub unsafe extern "C" fn tccmpint64(
    aptr: *const c_char,
    asiz: c_int,
    bptr: *const c_char,
    bsiz: c_int,
    _op: *mut c_void,
) -> c_int {
    let num = |k: &[u8]| <[u8; 8]>::try_from(k).map_or(0, i64::from_ne_bytes);
    sign(num(key(aptr, asiz)).cmp(&num(key(bptr, bsiz))))
}

unsafe fn key<'a>(ptr: *const c_char, size: c_int) -> &'a [u8] {
    borrow(ptr.cast(), size)
}

fn sign(order: Ordering) -> c_int {
    order as c_int
}

/// Parses the leading decimal number of a key.
///
/// Accepts leading whitespace, a sign, digits and a fractional part; stops at
/// the first other byte. Keys without digits are zero.
fn decimal(key: &[u8]) -> f64 {
    let mut rest = key;
    while let [b' ' | b'\t', tail @ ..] = rest {
        rest = tail;
    }
    let mut end = 0;
    if matches!(rest.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    while let Some(&c) = rest.get(end) {
        match c {
            b'0'..=b'9' => {}
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    std::str::from_utf8(&rest[..end])
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// The ordering of a B-tree: a comparator plus its opaque pointer.
#[derive(Clone, Copy)]
pub(crate) struct KeyOrder {
    func: TCCMP,
    op: *mut c_void,
}

impl KeyOrder {
    pub(crate) fn new(func: TCCMP, op: *mut c_void) -> Self {
        Self { func, op }
    }

    pub(crate) fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let r = unsafe {
            (self.func)(
                a.as_ptr().cast(),
                a.len() as c_int,
                b.as_ptr().cast(),
                b.len() as c_int,
                self.op,
            )
        };
        r.cmp(&0)
    }
}

impl Default for KeyOrder {
    fn default() -> Self {
        Self::new(tccmplexical, ptr::null_mut())
    }
}
