//! Execution permit handling around engine calls.
//!
//! The permit is process-wide, so these tests run one at a time.

use cabinet_core::permit::{self, ExecutionPermit};
use cabinet_core::{BdbTuning, Comparator};
use cabinet_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Installed(Arc<CountingPermit>);

impl Installed {
    fn new() -> Self {
        let counting = Arc::new(CountingPermit::new());
        permit::install(counting.clone());
        Self(counting)
    }
}

impl Drop for Installed {
    fn drop(&mut self) {
        permit::uninstall();
    }
}

#[test]
fn blocking_calls_release_and_reacquire() {
    let _serial = serial();
    let db = TestHdb::new();
    let installed = Installed::new();
    let counting = &installed.0;

    assert!(counting.acquire());
    let (acquires, releases) = (counting.acquires(), counting.releases());
    db.put(b"k", b"v").unwrap();
    db.get(b"k").unwrap();

    assert_eq!(counting.releases(), releases + 2);
    assert_eq!(counting.acquires(), acquires + 2);
    assert!(counting.lock().is_held());
    assert!(counting.release());
}

#[test]
fn unheld_permit_is_left_alone() {
    let _serial = serial();
    let db = TestHdb::new();
    let installed = Installed::new();

    db.put(b"k", b"v").unwrap();
    assert_eq!(installed.0.releases(), 0);
    assert_eq!(installed.0.acquires(), 0);
    assert!(!installed.0.lock().is_held());
}

#[test]
fn failed_calls_restore_the_permit() {
    let _serial = serial();
    let db = TestHdb::new();
    let installed = Installed::new();
    let counting = &installed.0;

    assert!(counting.acquire());
    assert!(db.get(b"missing").unwrap_err().is_not_found());
    assert!(counting.lock().is_held());
    assert!(counting.release());
}

#[test]
fn comparator_reacquires_the_permit() {
    let _serial = serial();
    let installed = Installed::new();
    let counting = installed.0.clone();
    let unheld = Arc::new(AtomicUsize::new(0));

    let db = {
        let counting = counting.clone();
        let unheld = unheld.clone();
        TestBdb::with_comparator(Comparator::raw(move |a, b| {
            if !counting.lock().is_held() {
                unheld.fetch_add(1, Ordering::SeqCst);
            }
            a.cmp(b)
        }))
    };
    db.put(b"a", b"").unwrap();

    assert!(counting.acquire());
    let acquires = counting.acquires();
    db.put(b"b", b"").unwrap();

    // One reacquire after the call, at least one per comparison inside it.
    assert!(counting.acquires() >= acquires + 2);
    assert_eq!(counting.acquires(), counting.releases() + 1);
    assert_eq!(unheld.load(Ordering::SeqCst), 0);
    assert!(counting.lock().is_held());
    assert!(counting.release());
}

#[test]
fn comparator_on_another_thread_waits_for_the_permit() {
    let _serial = serial();
    let db = TestBdb::with_comparator(Comparator::raw(|a, b| a.cmp(b)));
    let installed = Installed::new();
    let counting = installed.0.clone();

    assert!(counting.acquire());
    let writer = {
        let db = db.db.clone();
        thread::spawn(move || {
            for i in 0..50u8 {
                db.put(&[b'w', i], b"").unwrap();
            }
        })
    };
    // Every call here gives the permit up, letting the writer's comparator run.
    for i in 0..50u8 {
        db.put(&[b'm', i], b"").unwrap();
    }
    assert!(counting.release());
    writer.join().unwrap();

    assert_eq!(db.rnum().unwrap(), 100);
}

#[test]
fn permit_holder_waiting_on_the_engine_lets_a_comparator_finish() {
    let _serial = serial();
    let db = TestBdb::with_comparator(Comparator::raw(|a, b| a.cmp(b)));
    db.put(b"a", b"").unwrap();
    let installed = Installed::new();
    let counting = installed.0.clone();
    let (done, finished) = mpsc::channel();

    let holder = {
        let db = db.db.clone();
        thread::spawn(move || {
            assert!(counting.acquire());
            // Takes the engine lock, then blocks in its comparator on the permit.
            let writer = {
                let db = db.clone();
                thread::spawn(move || db.put(b"b", b"").unwrap())
            };
            thread::sleep(Duration::from_millis(50));

            let rnum = db.rnum().unwrap();
            db.path().unwrap();
            db.tune(&BdbTuning::new()).unwrap_err();
            assert!(counting.lock().is_held());
            assert!(counting.release());
            writer.join().unwrap();
            done.send(rnum).unwrap();
        })
    };

    let rnum = finished
        .recv_timeout(Duration::from_secs(10))
        .expect("engine call blocked while holding the permit");
    holder.join().unwrap();
    assert!(rnum >= 1);
    assert_eq!(db.rnum().unwrap(), 2);
}
