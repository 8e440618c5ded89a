//! B-tree key comparators.
//!
//! A comparator is either one of the engine's built-in orderings or a host
//! function. Host functions are reached through [`trampoline`], which the
//! engine calls with the address of the owning handle's [`ComparatorSlot`].

use crate::permit;
use bytes::Bytes;
use cabinet_sys::TCCMP;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cmp::Ordering;
use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Host comparison over copied keys.
pub type CompareFn = Arc<dyn Fn(Bytes, Bytes) -> Ordering + Send + Sync>;

/// Host comparison over keys borrowed from the engine for the call only.
pub type RawCompareFn = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Key ordering of a B-tree database.
#[derive(Clone, Default)]
pub enum Comparator {
    /// Lexical byte order.
    #[default]
    Lexical,
    /// Order of the leading decimal number, then lexical.
    Decimal,
    /// Native-endian 32-bit integers.
    Int32,
    /// Native-endian 64-bit integers.
    Int64,
    /// A host function receiving copies of both keys.
    Custom(CompareFn),
    /// A host function receiving borrowed keys.
    Raw(RawCompareFn),
}

impl Comparator {
    /// Wraps a host function receiving copies of both keys.
    pub fn custom(f: impl Fn(Bytes, Bytes) -> Ordering + Send + Sync + 'static) -> Self {
        Comparator::Custom(Arc::new(f))
    }

    /// Wraps a host function receiving borrowed keys.
    pub fn raw(f: impl Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static) -> Self {
        Comparator::Raw(Arc::new(f))
    }

    /// The engine's built-in function, if this is a built-in ordering.
    pub(crate) fn builtin(&self) -> Option<TCCMP> {
        match self {
            Comparator::Lexical => Some(cabinet_sys::tccmplexical),
            Comparator::Decimal => Some(cabinet_sys::tccmpdecimal),
            Comparator::Int32 => Some(cabinet_sys::tccmpint32),
            Comparator::Int64 => Some(cabinet_sys::tccmpint64),
            Comparator::Custom(_) | Comparator::Raw(_) => None,
        }
    }

    pub(crate) fn host(self) -> Option<HostCompare> {
        match self {
            Comparator::Custom(f) => Some(HostCompare::Copying(f)),
            Comparator::Raw(f) => Some(HostCompare::Raw(f)),
            _ => None,
        }
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Comparator::Lexical => "Lexical",
            Comparator::Decimal => "Decimal",
            Comparator::Int32 => "Int32",
            Comparator::Int64 => "Int64",
            Comparator::Custom(_) => "Custom",
            Comparator::Raw(_) => "Raw",
        };
        f.write_str(name)
    }
}

/// An installed host comparison function.
#[derive(Clone)]
pub(crate) enum HostCompare {
    Copying(CompareFn),
    Raw(RawCompareFn),
}

impl HostCompare {
    fn call(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            HostCompare::Copying(f) => f(Bytes::copy_from_slice(a), Bytes::copy_from_slice(b)),
            HostCompare::Raw(f) => f(a, b),
        }
    }
}

/// The host comparator of one B-tree handle, plus the last fault it raised.
///
/// The slot's address is handed to the engine, so it must not move while a
/// host comparator is installed.
#[derive(Default)]
pub(crate) struct ComparatorSlot {
    host: RwLock<Option<HostCompare>>,
    fault: Mutex<Option<String>>,
}

impl ComparatorSlot {
    /// Swaps the host function, returning the previous one.
    pub(crate) fn replace(&self, host: Option<HostCompare>) -> Option<HostCompare> {
        std::mem::replace(&mut *self.host.write(), host)
    }

    pub(crate) fn is_set(&self) -> bool {
        self.host.read().is_some()
    }

    pub(crate) fn take_fault(&self) -> Option<String> {
        self.fault.lock().take()
    }

    /// The opaque pointer passed to [`trampoline`].
    pub(crate) fn as_op(&self) -> *mut c_void {
        (self as *const ComparatorSlot).cast_mut().cast()
    }

    fn record_fault(&self, message: String) {
        let mut fault = self.fault.lock();
        // Keep the first fault until it is taken.
        if fault.is_none() {
            *fault = Some(message);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "comparator panicked".to_string()
    }
}

/// Engine entry point for host comparators.
///
/// Takes the execution permit back for the duration of the host call. A
/// panicking comparator is recorded on the slot and the keys compare equal.
pub(crate) unsafe extern "C" fn trampoline(
    aptr: *const c_char,
    asiz: c_int,
    bptr: *const c_char,
    bsiz: c_int,
    op: *mut c_void,
) -> c_int {
    let a = key(aptr, asiz);
    let b = key(bptr, bsiz);
    let Some(slot) = op.cast::<ComparatorSlot>().cast_const().as_ref() else {
        return a.cmp(b) as c_int;
    };
    let Some(host) = slot.host.read().clone() else {
        return a.cmp(b) as c_int;
    };

    let _permit = permit::reentrant();
    match panic::catch_unwind(AssertUnwindSafe(|| host.call(a, b))) {
        Ok(order) => order as c_int,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(%message, "B-tree comparator panicked; treating keys as equal");
            slot.record_fault(message);
            0
        }
    }
}

unsafe fn key<'a>(ptr: *const c_char, len: c_int) -> &'a [u8] {
    if ptr.is_null() || len <= 0 {
        return &[];
    }
    std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    unsafe fn call(slot: &ComparatorSlot, a: &[u8], b: &[u8]) -> c_int {
        trampoline(
            a.as_ptr().cast(),
            a.len() as c_int,
            b.as_ptr().cast(),
            b.len() as c_int,
            slot.as_op(),
        )
    }

    #[test]
    fn empty_slot_is_lexical() {
        let slot = ComparatorSlot::default();
        assert_eq!(unsafe { call(&slot, b"a", b"b") }, -1);
        assert_eq!(unsafe { call(&slot, b"b", b"b") }, 0);
    }

    #[test]
    fn host_function_is_called() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let slot = ComparatorSlot::default();
        let reversed = Comparator::raw(move |a, b| {
            counted.fetch_add(1, AtomicOrdering::SeqCst);
            b.cmp(a)
        });
        slot.replace(reversed.host());

        assert_eq!(unsafe { call(&slot, b"a", b"b") }, 1);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert!(slot.replace(None).is_some());
        assert!(!slot.is_set());
    }

    #[test]
    fn copying_function_gets_bytes() {
        let slot = ComparatorSlot::default();
        slot.replace(Comparator::custom(|a: Bytes, b: Bytes| a.len().cmp(&b.len())).host());
        assert_eq!(unsafe { call(&slot, b"zz", b"a\0a") }, -1);
    }

    #[test]
    fn panic_is_recorded_as_equal() {
        let slot = ComparatorSlot::default();
        slot.replace(Comparator::raw(|_, _| panic!("bad key")).host());

        assert_eq!(unsafe { call(&slot, b"a", b"b") }, 0);
        assert_eq!(unsafe { call(&slot, b"c", b"d") }, 0);
        assert_eq!(slot.take_fault().as_deref(), Some("bad key"));
        assert_eq!(slot.take_fault(), None);
    }

    #[test]
    fn builtins_have_native_functions() {
        assert!(Comparator::Decimal.builtin().is_some());
        assert!(Comparator::custom(|a, b| a.cmp(&b)).builtin().is_none());
        assert!(Comparator::Int64.host().is_none());
    }
}
