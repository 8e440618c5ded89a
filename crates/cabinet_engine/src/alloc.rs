//! Buffers handed across the C ABI.

use std::ffi::{c_int, c_void};
use std::ptr;
use std::slice;

/// Frees a buffer returned by the engine.
///
/// # Safety
///
/// `ptr` must be null or a buffer returned by an engine function documented
/// as caller-owned. It must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn tcfree(ptr: *mut c_void) {
    if !ptr.is_null() {
        libc::free(ptr);
    }
}

/// Copies `data` into a fresh C allocation and stores its length in `sp`.
///
/// The region carries a trailing zero byte that is not counted in the length.
/// Returns null if allocation fails.
pub(crate) unsafe fn copy_out(data: &[u8], sp: *mut c_int) -> *mut c_void {
    let buf = libc::malloc(data.len() + 1).cast::<u8>();
    if buf.is_null() {
        return ptr::null_mut();
    }
    ptr::copy_nonoverlapping(data.as_ptr(), buf, data.len());
    *buf.add(data.len()) = 0;
    if !sp.is_null() {
        *sp = data.len() as c_int;
    }
    buf.cast()
}

/// Borrows a (pointer, length) pair as a slice.
///
/// A null pointer or non-positive length yields an empty slice.
pub(crate) unsafe fn borrow<'a>(ptr: *const c_void, len: c_int) -> &'a [u8] {
    if ptr.is_null() || len <= 0 {
        return &[];
    }
    slice::from_raw_parts(ptr.cast::<u8>(), len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_out_and_free() {
        let mut len: c_int = -1;
        unsafe {
            let buf = copy_out(b"ab\0cd", &mut len);
            assert!(!buf.is_null());
            assert_eq!(len, 5);
            assert_eq!(borrow(buf, len), b"ab\0cd");
            assert_eq!(*buf.cast::<u8>().add(5), 0);
            tcfree(buf);
        }
    }

    #[test]
    fn borrow_null_is_empty() {
        let data = unsafe { borrow(ptr::null(), 10) };
        assert!(data.is_empty());
    }

    #[test]
    fn free_null_is_noop() {
        unsafe { tcfree(ptr::null_mut()) };
    }
}
