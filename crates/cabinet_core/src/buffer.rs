//! Byte buffers exchanged with the engine.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::ffi::{c_int, c_void};
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::slice;

/// A record buffer allocated by the engine.
///
/// Released through the engine's allocator exactly once, on drop.
pub struct NativeBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// The buffer is uniquely owned and never aliased by the engine.
unsafe impl Send for NativeBuf {}
unsafe impl Sync for NativeBuf {}

impl NativeBuf {
    /// Takes ownership of an engine buffer. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a caller-owned buffer returned by the engine,
    /// holding `len` readable bytes, not owned by anything else.
    pub(crate) unsafe fn from_raw(ptr: *mut c_void, len: c_int) -> Option<Self> {
        let ptr = NonNull::new(ptr.cast::<u8>())?;
        Some(Self {
            ptr,
            len: usize::try_from(len).unwrap_or(0),
        })
    }

    /// Copies the contents into a `Vec`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }

    /// Copies the contents into a `Bytes`.
    pub fn into_bytes(self) -> Bytes {
        Bytes::copy_from_slice(&self)
    }
}

impl Deref for NativeBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl AsRef<[u8]> for NativeBuf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl PartialEq<[u8]> for NativeBuf {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

impl PartialEq<&[u8]> for NativeBuf {
    fn eq(&self, other: &&[u8]) -> bool {
        **self == **other
    }
}

impl fmt::Debug for NativeBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuf").field("len", &self.len).finish()
    }
}

impl From<NativeBuf> for Vec<u8> {
    fn from(buf: NativeBuf) -> Self {
        buf.to_vec()
    }
}

impl From<NativeBuf> for Bytes {
    fn from(buf: NativeBuf) -> Self {
        buf.into_bytes()
    }
}

impl Drop for NativeBuf {
    fn drop(&mut self) {
        unsafe { cabinet_sys::tcfree(self.ptr.as_ptr().cast()) };
    }
}

/// Converts a buffer length to the engine's length type.
pub(crate) fn c_len(data: &[u8], function: &'static str) -> Result<c_int> {
    c_int::try_from(data.len()).map_err(|_| Error::binding(function, "buffer exceeds the engine's size limit"))
}

/// A byte buffer as an engine (pointer, length) pair.
pub(crate) fn c_buf(data: &[u8], function: &'static str) -> Result<(*const c_void, c_int)> {
    Ok((data.as_ptr().cast(), c_len(data, function)?))
}
