//! Host execution permit.
//!
//! A host runtime may allow only one thread at a time to run host code. The
//! thread holding that permit must give it up while it waits on the engine,
//! and an engine thread must take it back before calling into host code
//! (comparators). This module holds the process-wide permit the binding
//! honors, if any.
//!
//! ```
//! use cabinet_core::permit::{self, HostLock};
//! use std::sync::Arc;
//!
//! let lock = Arc::new(HostLock::new());
//! permit::install(lock.clone());
//! let _held = lock.enter();
//! // Engine calls made here release `lock` while they block.
//! # drop(_held);
//! # permit::uninstall();
//! ```

use parking_lot::lock_api::RawMutex as _;
use parking_lot::{RawMutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A permit that a thread must hold to run host code.
pub trait ExecutionPermit: Send + Sync {
    /// Gives up the permit held by the calling thread.
    ///
    /// Returns false if the calling thread does not hold it.
    fn release(&self) -> bool;

    /// Takes the permit for the calling thread, waiting until it is free.
    ///
    /// Returns false if the calling thread already holds it.
    fn acquire(&self) -> bool;
}

static PERMIT: RwLock<Option<Arc<dyn ExecutionPermit>>> = parking_lot::const_rwlock(None);

/// Installs the process-wide permit, returning the previous one.
pub fn install(permit: Arc<dyn ExecutionPermit>) -> Option<Arc<dyn ExecutionPermit>> {
    PERMIT.write().replace(permit)
}

/// Removes the process-wide permit, returning it.
pub fn uninstall() -> Option<Arc<dyn ExecutionPermit>> {
    PERMIT.write().take()
}

/// Returns the installed permit.
pub fn installed() -> Option<Arc<dyn ExecutionPermit>> {
    PERMIT.read().clone()
}

/// Permit state to restore when a guard is dropped.
#[must_use]
pub(crate) struct PermitGuard {
    permit: Option<Arc<dyn ExecutionPermit>>,
    restore: fn(&dyn ExecutionPermit) -> bool,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            (self.restore)(permit.as_ref());
        }
    }
}

/// Releases the permit for a call that may block.
///
/// The permit is taken back when the guard drops, unless the calling thread
/// did not hold it to begin with.
pub(crate) fn blocking() -> PermitGuard {
    let permit = installed().filter(|p| p.release());
    if permit.is_some() {
        tracing::trace!("execution permit released");
    }
    PermitGuard {
        permit,
        restore: |p| {
            tracing::trace!("execution permit reacquired");
            p.acquire()
        },
    }
}

/// Takes the permit for a call back into host code.
///
/// Given up again when the guard drops, unless the calling thread already
/// held it.
pub(crate) fn reentrant() -> PermitGuard {
    PermitGuard {
        permit: installed().filter(|p| p.acquire()),
        restore: |p| p.release(),
    }
}

/// Runs a blocking engine call with the permit released.
pub(crate) fn released<T>(call: impl FnOnce() -> T) -> T {
    let _guard = blocking();
    call()
}

static NEXT_THREAD: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD.fetch_add(1, Ordering::Relaxed);
}

fn current_thread() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// A single-owner lock used as an [`ExecutionPermit`].
///
/// At most one thread owns it at a time. Ownership is tracked per thread, so
/// a thread that already owns it cannot take it again and a thread that does
/// not own it cannot give it up.
pub struct HostLock {
    raw: RawMutex,
    owner: AtomicU64,
}

impl HostLock {
    /// Creates an unowned lock.
    pub const fn new() -> Self {
        Self {
            raw: RawMutex::INIT,
            owner: AtomicU64::new(0),
        }
    }

    /// Returns true if the calling thread owns the lock.
    pub fn is_held(&self) -> bool {
        self.owner.load(Ordering::Acquire) == current_thread()
    }

    /// Takes the lock for the calling thread until the guard drops.
    ///
    /// If the thread already owns the lock, the guard leaves it owned.
    pub fn enter(&self) -> HostGuard<'_> {
        let acquired = self.acquire();
        HostGuard { lock: self, acquired }
    }
}

impl Default for HostLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLock").field("held", &self.is_held()).finish()
    }
}

impl ExecutionPermit for HostLock {
    fn release(&self) -> bool {
        if !self.is_held() {
            return false;
        }
        self.owner.store(0, Ordering::Release);
        // The calling thread owns the mutex.
        unsafe { self.raw.unlock() };
        true
    }

    fn acquire(&self) -> bool {
        if self.is_held() {
            return false;
        }
        self.raw.lock();
        self.owner.store(current_thread(), Ordering::Release);
        true
    }
}

/// Ownership of a [`HostLock`] for a scope.
#[must_use]
pub struct HostGuard<'a> {
    lock: &'a HostLock,
    acquired: bool,
}

impl Drop for HostGuard<'_> {
    fn drop(&mut self) {
        if self.acquired {
            self.lock.release();
        }
    }
}
