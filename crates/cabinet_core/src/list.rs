//! Native list container.

use crate::buffer::c_buf;
use crate::error::{Error, Result};
use cabinet_sys::TCLIST;
use std::ffi::c_int;
use std::fmt;
use std::ptr::NonNull;

/// An ordered list of byte buffers owned by the engine.
///
/// Used for multi-value results, key listings and `misc` arguments.
pub struct List {
    raw: NonNull<TCLIST>,
}

// A list is a plain owned container with no thread affinity.
unsafe impl Send for List {}
unsafe impl Sync for List {}

impl List {
    /// Creates an empty list.
    pub fn new() -> Result<Self> {
        Self::with_capacity(0)
    }

    /// Creates an empty list with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let anum = c_int::try_from(capacity).unwrap_or(c_int::MAX);
        let raw = NonNull::new(cabinet_sys::tclistnew2(anum))
            .ok_or_else(|| Error::binding("tclistnew2", "failed to allocate a list"))?;
        Ok(Self { raw })
    }

    /// Creates a list holding a copy of every item.
    pub fn from_items<I>(items: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let items = items.into_iter();
        let mut list = Self::with_capacity(items.size_hint().0)?;
        for item in items {
            list.push(item)?;
        }
        Ok(list)
    }

    /// Takes ownership of a list returned by the engine.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a caller-owned list not owned by anything else.
    pub(crate) unsafe fn from_raw(raw: *mut TCLIST) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self { raw })
    }

    pub(crate) fn as_ptr(&self) -> *const TCLIST {
        self.raw.as_ptr()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        unsafe { cabinet_sys::tclistnum(self.raw.as_ptr()) as usize }
    }

    /// Returns true if the list holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let index = c_int::try_from(index).ok()?;
        let mut len: c_int = 0;
        let ptr = unsafe { cabinet_sys::tclistval(self.raw.as_ptr(), index, &mut len) };
        if ptr.is_null() {
            return None;
        }
        // The element lives as long as the list is not modified, and
        // modification needs `&mut self`.
        Some(unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize) })
    }

    /// Appends a copy of `data`.
    pub fn push(&mut self, data: impl AsRef<[u8]>) -> Result<()> {
        let (ptr, len) = c_buf(data.as_ref(), "tclistpush")?;
        unsafe { cabinet_sys::tclistpush(self.raw.as_ptr(), ptr, len) };
        Ok(())
    }

    /// Finds the first element equal to `data` by linear search.
    pub fn lsearch(&self, data: &[u8]) -> Option<usize> {
        let (ptr, len) = c_buf(data, "tclistlsearch").ok()?;
        let index = unsafe { cabinet_sys::tclistlsearch(self.raw.as_ptr(), ptr, len) };
        usize::try_from(index).ok()
    }

    /// Finds an element equal to `data` by binary search.
    ///
    /// The list must already be sorted in lexical byte order; otherwise the
    /// result is unspecified.
    pub fn bsearch(&self, data: &[u8]) -> Option<usize> {
        let (ptr, len) = c_buf(data, "tclistbsearch").ok()?;
        let index = unsafe { cabinet_sys::tclistbsearch(self.raw.as_ptr(), ptr, len) };
        usize::try_from(index).ok()
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> Iter<'_> {
        Iter { list: self, next: 0 }
    }

    /// Copies every element into a `Vec`.
    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.iter().map(<[u8]>::to_vec).collect()
    }
}

impl Drop for List {
    fn drop(&mut self) {
        unsafe { cabinet_sys::tclistdel(self.raw.as_ptr()) };
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl From<List> for Vec<Vec<u8>> {
    fn from(list: List) -> Self {
        list.to_vec()
    }
}

/// Iterator over the elements of a [`List`].
pub struct Iter<'a> {
    list: &'a List,
    next: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let item = self.list.get(self.next)?;
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a List {
    type Item = &'a [u8];
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
