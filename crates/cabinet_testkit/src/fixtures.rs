//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use cabinet_core::permit::{ExecutionPermit, HostLock};
use cabinet_core::{Adb, Bdb, Comparator, Hdb, OpenMode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use tempfile::TempDir;

/// A B-tree database in a temporary directory, removed on drop.
pub struct TestBdb {
    /// The database handle.
    pub db: Bdb,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestBdb {
    /// Opens a new B-tree file with lexical ordering.
    pub fn new() -> Self {
        Self::with_comparator(Comparator::Lexical)
    }

    /// Opens a new B-tree file ordered by `comparator`.
    pub fn with_comparator(comparator: Comparator) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.tcb");
        let db = Bdb::new().expect("Failed to create B-tree handle");
        db.set_comparator(comparator).expect("Failed to set comparator");
        db.open(&path, OpenMode::WRITE_CREATE)
            .expect("Failed to open B-tree database");
        Self {
            db,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TestBdb {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestBdb {
    type Target = Bdb;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// A hash database in a temporary directory, removed on drop.
pub struct TestHdb {
    /// The database handle.
    pub db: Hdb,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestHdb {
    /// Opens a new hash database file.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.tch");
        let db = Hdb::new().expect("Failed to create hash handle");
        db.open(&path, OpenMode::WRITE_CREATE)
            .expect("Failed to open hash database");
        Self {
            db,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TestHdb {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestHdb {
    type Target = Hdb;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary B-tree database.
pub fn with_temp_bdb<F, R>(f: F) -> R
where
    F: FnOnce(&Bdb) -> R,
{
    let test_db = TestBdb::new();
    f(&test_db.db)
}

/// Runs a test with a temporary hash database.
pub fn with_temp_hdb<F, R>(f: F) -> R
where
    F: FnOnce(&Hdb) -> R,
{
    let test_db = TestHdb::new();
    f(&test_db.db)
}

/// Runs a test with an abstract database opened on `name`, e.g. `*` or `+`.
pub fn with_memory_adb<F, R>(name: &str, f: F) -> R
where
    F: FnOnce(&Adb) -> R,
{
    let db = Adb::new().expect("Failed to create abstract handle");
    db.open(name).expect("Failed to open abstract database");
    f(&db)
}

/// Installs a log subscriber for tests, once per process.
///
/// Honors `RUST_LOG`; defaults to `cabinet_core=debug`.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cabinet_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A [`HostLock`] that counts how often the binding gives it up and takes
/// it back.
#[derive(Debug, Default)]
pub struct CountingPermit {
    lock: HostLock,
    releases: AtomicUsize,
    acquires: AtomicUsize,
}

impl CountingPermit {
    /// Creates an unowned permit.
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying lock.
    pub fn lock(&self) -> &HostLock {
        &self.lock
    }

    /// Successful releases so far.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Successful acquisitions so far.
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }
}

impl ExecutionPermit for CountingPermit {
    fn release(&self) -> bool {
        let released = self.lock.release();
        if released {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        released
    }

    fn acquire(&self) -> bool {
        let acquired = self.lock.acquire();
        if acquired {
            self.acquires.fetch_add(1, Ordering::SeqCst);
        }
        acquired
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Key of the `i`th record written by [`populated_bdb`].
    pub fn key(i: usize) -> Vec<u8> {
        format!("key{i:05}").into_bytes()
    }

    /// Value of the `i`th record written by [`populated_bdb`].
    pub fn value(i: usize) -> Vec<u8> {
        format!("value{i}").into_bytes()
    }

    /// Creates a B-tree with `count` records.
    pub fn populated_bdb(count: usize) -> TestBdb {
        let db = TestBdb::new();
        for i in 0..count {
            db.put(&key(i), &value(i)).expect("Failed to put record");
        }
        db
    }

    /// Creates a hash database with `count` records.
    pub fn populated_hdb(count: usize) -> TestHdb {
        let db = TestHdb::new();
        for i in 0..count {
            db.put(&key(i), &value(i)).expect("Failed to put record");
        }
        db
    }
}
