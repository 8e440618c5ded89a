//! Variable-length list container.

use crate::alloc::borrow;
use std::ffi::{c_int, c_void};
use std::ptr;

/// An ordered list of byte buffers.
///
/// Opaque to C callers; create with [`tclistnew`] or [`tclistnew2`] and
/// release with [`tclistdel`].
#[derive(Debug, Default)]
pub struct TCLIST {
    items: Vec<Vec<u8>>,
}

impl TCLIST {
    pub(crate) fn into_raw(items: Vec<Vec<u8>>) -> *mut TCLIST {
        Box::into_raw(Box::new(TCLIST { items }))
    }

    pub(crate) unsafe fn items<'a>(list: *const TCLIST) -> &'a [Vec<u8>] {
        match list.as_ref() {
            Some(list) => &list.items,
            None => &[],
        }
    }
}

/// Creates an empty list.
#[no_mangle]
pub extern "C" fn tclistnew() -> *mut TCLIST {
    TCLIST::into_raw(Vec::new())
}

/// Creates an empty list with room for `anum` elements.
#[no_mangle]
pub extern "C" fn tclistnew2(anum: c_int) -> *mut TCLIST {
    TCLIST::into_raw(Vec::with_capacity(anum.max(0) as usize))
}

/// Deletes a list.
///
/// # Safety
///
/// `list` must be null or a list created by the engine, not yet deleted.
#[no_mangle]
pub unsafe extern "C" fn tclistdel(list: *mut TCLIST) {
    if !list.is_null() {
        drop(Box::from_raw(list));
    }
}

/// Returns the number of elements.
///
/// # Safety
///
/// `list` must be a valid list.
#[no_mangle]
pub unsafe extern "C" fn tclistnum(list: *const TCLIST) -> c_int {
    TCLIST::items(list).len() as c_int
}

/// Returns the element at `index`, storing its length in `sp`.
///
/// The region is owned by the list and stays valid until the list is
/// modified or deleted. Returns null when `index` is out of range.
///
/// # Safety
///
/// `list` must be a valid list; `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tclistval(
    list: *const TCLIST,
    index: c_int,
    sp: *mut c_int,
) -> *const c_void {
    let items = TCLIST::items(list);
    match usize::try_from(index).ok().and_then(|i| items.get(i)) {
        Some(item) => {
            if !sp.is_null() {
                *sp = item.len() as c_int;
            }
            item.as_ptr().cast()
        }
        None => ptr::null(),
    }
}

/// Appends a copy of a buffer.
///
/// # Safety
///
/// `list` must be a valid list; `ptr` must point to `size` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn tclistpush(list: *mut TCLIST, ptr: *const c_void, size: c_int) {
    if let Some(list) = list.as_mut() {
        list.items.push(borrow(ptr, size).to_vec());
    }
}

/// Finds the first element equal to a buffer by linear search.
///
/// Returns the index or -1.
///
/// # Safety
///
/// `list` must be a valid list; `ptr` must point to `size` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn tclistlsearch(
    list: *const TCLIST,
    ptr: *const c_void,
    size: c_int,
) -> c_int {
    let needle = borrow(ptr, size);
    TCLIST::items(list)
        .iter()
        .position(|item| item.as_slice() == needle)
        .map_or(-1, |i| i as c_int)
}

/// Finds an element equal to a buffer by binary search.
///
/// The list must already be sorted in lexical order. Returns the index or -1.
///
/// # Safety
///
/// `list` must be a valid list; `ptr` must point to `size` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn tclistbsearch(
    list: *const TCLIST,
    ptr: *const c_void,
    size: c_int,
) -> c_int {
    let needle = borrow(ptr, size);
    TCLIST::items(list)
        .binary_search_by(|item| item.as_slice().cmp(needle))
        .map_or(-1, |i| i as c_int)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(list: *mut TCLIST, data: &[u8]) {
        unsafe { tclistpush(list, data.as_ptr().cast(), data.len() as c_int) };
    }

    #[test]
    fn push_and_index() {
        let list = tclistnew2(4);
        push(list, b"one");
        push(list, b"t\0o");

        unsafe {
            assert_eq!(tclistnum(list), 2);
            let mut len = 0;
            let val = tclistval(list, 1, &mut len);
            assert_eq!(borrow(val, len), b"t\0o");
            assert!(tclistval(list, 2, &mut len).is_null());
            assert!(tclistval(list, -1, &mut len).is_null());
            tclistdel(list);
        }
    }

    #[test]
    fn searches() {
        let list = tclistnew();
        for item in [&b"a"[..], b"b", b"d"] {
            push(list, item);
        }

        unsafe {
            assert_eq!(tclistlsearch(list, b"d".as_ptr().cast(), 1), 2);
            assert_eq!(tclistlsearch(list, b"c".as_ptr().cast(), 1), -1);
            assert_eq!(tclistbsearch(list, b"b".as_ptr().cast(), 1), 1);
            assert_eq!(tclistbsearch(list, b"c".as_ptr().cast(), 1), -1);
            tclistdel(list);
        }
    }
}
