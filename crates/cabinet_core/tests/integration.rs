//! End-to-end tests over every handle type.

use cabinet_core::{Adb, Bdb, Comparator, CursorPut, ErrorKind, Hdb, List, OpenMode};
use cabinet_testkit::prelude::*;
use proptest::prelude::*;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;

fn collect_forward(db: &Bdb) -> Vec<Vec<u8>> {
    let mut cur = db.cursor().unwrap();
    let mut keys = Vec::new();
    if cur.first().is_err() {
        return keys;
    }
    loop {
        keys.push(cur.key().unwrap().to_vec());
        if cur.next().is_err() {
            return keys;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn bdb_round_trip_is_binary_safe(key in nul_key_strategy(), value in value_strategy()) {
        let db = TestBdb::new();
        db.put(&key, &value).unwrap();
        prop_assert_eq!(db.get(&key).unwrap().to_vec(), value.clone());
        prop_assert_eq!(db.vsiz(&key).unwrap(), value.len());
    }

    #[test]
    fn hdb_round_trip_is_binary_safe(records in records_strategy(16)) {
        let db = TestHdb::new();
        for (k, v) in &records {
            db.put(k, v).unwrap();
        }
        prop_assert_eq!(db.rnum().unwrap(), records.len() as u64);
        for (k, v) in &records {
            prop_assert_eq!(&*db.get(k).unwrap(), &v[..]);
        }
    }

    #[test]
    fn adb_round_trip_is_binary_safe(key in key_strategy(), value in value_strategy()) {
        with_memory_adb("*", |db| {
            db.put(&key, &value).unwrap();
            assert_eq!(db.get(&key).unwrap().to_vec(), value);
        });
    }

    #[test]
    fn hdb_matches_model(ops in ops_strategy(40)) {
        let db = TestHdb::new();
        for op in &ops {
            // Keep conflicts and missing keys fail; the model skips them too.
            let _ = match op {
                Op::Put(k, v) => db.put(k, v),
                Op::PutKeep(k, v) => db.putkeep(k, v),
                Op::PutCat(k, v) => db.putcat(k, v),
                Op::Out(k) => db.out(k),
            };
        }
        let model = apply_to_model(&ops);
        prop_assert_eq!(db.rnum().unwrap(), model.len() as u64);
        for (k, v) in &model {
            prop_assert_eq!(db.get(k).unwrap().to_vec(), v.clone());
        }
    }

    #[test]
    fn fwmkeys_respects_prefix_and_limit(
        keys in prop::collection::vec(prefixed_key_strategy(), 0..30),
        max in 0usize..8,
    ) {
        let db = TestBdb::new();
        for k in &keys {
            db.put(k, b"").unwrap();
        }
        let found = db.fwmkeys(b"app", Some(max)).unwrap().to_vec();
        prop_assert!(found.len() <= max);
        prop_assert!(found.iter().all(|k| k.starts_with(b"app")));
        let mut sorted = found.clone();
        sorted.sort();
        prop_assert_eq!(found, sorted);
    }
}

#[test]
fn missing_and_removed_keys_are_not_found() {
    with_temp_bdb(|db| {
        assert!(db.get(b"never").unwrap_err().is_not_found());
        db.put(b"gone", b"soon").unwrap();
        db.out(b"gone").unwrap();
        let err = db.get(b"gone").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoRecord);
        assert_eq!(err.function, "tcbdbget");
    });
    with_temp_hdb(|db| {
        assert!(db.get(b"never").unwrap_err().is_not_found());
        assert!(db.vsiz(b"never").unwrap_err().is_not_found());
    });
}

#[test]
fn host_comparator_orders_cursor_walk() {
    init_logging();
    let db = TestBdb::with_comparator(Comparator::custom(|a, b| b.cmp(&a)));
    for key in [&b"b"[..], b"a", b"c"] {
        db.put(key, key).unwrap();
    }

    let mut cur = db.cursor().unwrap();
    cur.first().unwrap();
    assert_eq!(&*cur.key().unwrap(), b"c");
    cur.next().unwrap();
    assert_eq!(&*cur.key().unwrap(), b"b");
    cur.next().unwrap();
    assert_eq!(&*cur.key().unwrap(), b"a");
    assert!(cur.next().unwrap_err().is_not_found());
}

#[test]
fn builtin_decimal_order() {
    let db = TestBdb::with_comparator(Comparator::Decimal);
    for key in ["10", "9", "100", "-1"] {
        db.put(key.as_bytes(), b"").unwrap();
    }
    let keys: Vec<_> = collect_forward(&db).into_iter().map(|k| String::from_utf8(k).unwrap()).collect();
    assert_eq!(keys, ["-1", "9", "10", "100"]);
}

#[test]
fn builtin_int32_order() {
    let db = TestBdb::with_comparator(Comparator::Int32);
    for n in [300i32, -5, 7] {
        db.put(&n.to_ne_bytes(), b"").unwrap();
    }
    let keys: Vec<i32> = collect_forward(&db)
        .into_iter()
        .map(|k| i32::from_ne_bytes(k.try_into().unwrap()))
        .collect();
    assert_eq!(keys, [-5, 7, 300]);
}

#[test]
fn cursor_keeps_database_alive() {
    let dir = tempfile::tempdir().unwrap();
    let db = Bdb::new().unwrap();
    db.open(dir.path().join("alive.tcb"), OpenMode::WRITE_CREATE).unwrap();
    db.put(b"k", b"v").unwrap();

    let mut cur = db.cursor().unwrap();
    assert_eq!(db.ref_count(), 2);
    drop(db);

    cur.first().unwrap();
    assert_eq!(&*cur.val().unwrap(), b"v");
    let db = cur.db();
    assert!(db.is_open());
    assert_eq!(db.ref_count(), 2);
}

#[test]
fn replaced_comparator_is_released() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cmp.tcb");

    let db = Bdb::new().unwrap();
    let counted = calls.clone();
    db.set_comparator(Comparator::raw(move |a, b| {
        counted.fetch_add(1, AtomicOrdering::SeqCst);
        a.cmp(b)
    }))
    .unwrap();
    assert_eq!(Arc::strong_count(&calls), 2);

    db.open(&path, OpenMode::WRITE_CREATE).unwrap();
    for key in [&b"x"[..], b"y", b"z"] {
        db.put(key, b"").unwrap();
    }
    let used = calls.load(AtomicOrdering::SeqCst);
    assert!(used > 0);
    db.close().unwrap();
    assert_eq!(Arc::strong_count(&calls), 1);

    db.set_comparator(Comparator::raw(|a, b| b.cmp(a))).unwrap();
    db.open(&path, OpenMode::WRITE_CREATE).unwrap();
    db.put(b"w", b"").unwrap();
    assert_eq!(collect_forward(&db), vec![b"z".to_vec(), b"y".to_vec(), b"x".to_vec(), b"w".to_vec()]);
    assert_eq!(calls.load(AtomicOrdering::SeqCst), used);
}

#[test]
fn replacing_before_open_releases_previous() {
    let marker = Arc::new(());
    let db = Bdb::new().unwrap();
    let held = marker.clone();
    db.set_comparator(Comparator::custom(move |a, b| {
        let _ = &held;
        a.cmp(&b)
    }))
    .unwrap();
    assert_eq!(Arc::strong_count(&marker), 2);
    db.clear_comparator().unwrap();
    assert_eq!(Arc::strong_count(&marker), 1);
}

#[test]
fn panicking_comparator_is_recorded() {
    init_logging();
    let db = TestBdb::with_comparator(Comparator::raw(|a, b| {
        if a == b"boom" || b == b"boom" {
            panic!("cannot order boom");
        }
        a.cmp(b)
    }));
    db.put(b"a", b"1").unwrap();
    assert!(db.take_comparator_fault().is_none());

    // Compared as equal to an existing key, so the put overwrites it.
    db.put(b"boom", b"2").unwrap();
    let fault = db.take_comparator_fault().unwrap();
    assert_eq!(fault.kind, ErrorKind::Misc);
    assert!(fault.message.contains("cannot order boom"));
    assert!(db.take_comparator_fault().is_none());
}

#[test]
fn addint_failure_is_an_error() {
    with_temp_bdb(|db| {
        db.put(b"text", b"not a number").unwrap();
        let err = db.addint(b"text", 1).unwrap_err();
        assert_eq!(err.function, "tcbdbaddint");
        assert_eq!(db.addint(b"n", 41).unwrap(), 41);
        assert_eq!(db.addint(b"n", 1).unwrap(), 42);
    });
    with_memory_adb("*", |db| {
        db.put(b"text", b"xyz").unwrap();
        assert_eq!(db.addint(b"text", 1).unwrap_err().kind, ErrorKind::Misc);
    });
}

#[test]
fn fwmkeys_limit() {
    let db = scenarios::populated_bdb(50);
    let keys = db.fwmkeys(b"key0000", Some(3)).unwrap();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys.get(0), Some(&scenarios::key(0)[..]));
    assert_eq!(db.fwmkeys(b"key0000", None).unwrap().len(), 10);
    assert_eq!(db.fwmkeys(b"key", None).unwrap().len(), 50);
    assert!(db.fwmkeys(b"nothing", None).unwrap().is_empty());
}

#[test]
fn range_bounds() {
    let db = scenarios::populated_bdb(10);
    let k = scenarios::key;
    let all = db.range(None, true, None, true, None).unwrap();
    assert_eq!(all.len(), 10);

    let inner = db.range(Some(&k(2)[..]), false, Some(&k(5)[..]), true, None).unwrap();
    assert_eq!(inner.to_vec(), vec![k(3), k(4), k(5)]);

    let limited = db.range(Some(&k(2)[..]), true, None, true, Some(2)).unwrap();
    assert_eq!(limited.to_vec(), vec![k(2), k(3)]);
}

#[test]
fn cursor_fails_after_close() {
    let db = scenarios::populated_bdb(3);
    let mut cur = db.cursor().unwrap();
    cur.first().unwrap();
    db.close().unwrap();
    let err = cur.next().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Invalid);
    assert_eq!(err.function, "tcbdbcurnext");
    assert!(cur.put(b"v", CursorPut::Current).is_err());
}

#[test]
fn empty_open_database_reports_zero() {
    with_temp_bdb(|db| assert_eq!(db.rnum().unwrap(), 0));
    with_temp_hdb(|db| assert_eq!(db.rnum().unwrap(), 0));
    with_memory_adb("+", |db| assert_eq!(db.rnum().unwrap(), 0));
}

#[test]
fn reader_cannot_write() {
    let fixture = scenarios::populated_hdb(2);
    let path = fixture.path().to_path_buf();
    fixture.close().unwrap();

    let db = Hdb::new().unwrap();
    db.open(&path, &[]).unwrap();
    assert_eq!(db.rnum().unwrap(), 2);
    assert_eq!(db.put(b"k", b"v").unwrap_err().kind, ErrorKind::Invalid);
}

#[test]
fn nonblocking_lock_conflict() {
    let fixture = TestBdb::new();
    let other = Bdb::new().unwrap();
    let err = other
        .open(fixture.path(), &[OpenMode::Writer, OpenMode::LockNonBlocking])
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lock);
}

#[test]
fn transactions_roll_back() {
    with_temp_bdb(|db| {
        db.put(b"keep", b"1").unwrap();
        db.tranbegin().unwrap();
        db.put(b"drop", b"2").unwrap();
        db.out(b"keep").unwrap();
        db.tranabort().unwrap();
        assert_eq!(&*db.get(b"keep").unwrap(), b"1");
        assert!(db.get(b"drop").unwrap_err().is_not_found());

        db.tranbegin().unwrap();
        db.put(b"drop", b"2").unwrap();
        db.trancommit().unwrap();
        assert_eq!(db.rnum().unwrap(), 2);
    });
}

#[test]
fn vanish_and_copy() {
    let db = scenarios::populated_bdb(5);
    let dest = db.path().with_file_name("copy.tcb");
    db.copy(&dest).unwrap();
    db.vanish().unwrap();
    assert_eq!(db.rnum().unwrap(), 0);

    let copy = Bdb::new().unwrap();
    copy.open(&dest, &[OpenMode::Reader]).unwrap();
    assert_eq!(copy.rnum().unwrap(), 5);
}

#[test]
fn shared_across_threads() {
    let db = TestBdb::new();
    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let db = db.db.clone();
            thread::spawn(move || {
                for i in 0..25u8 {
                    db.put(&[t, i], &[i]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(db.rnum().unwrap(), 100);
}

#[test]
fn clones_report_their_own_failures() {
    let db = TestBdb::new();
    db.put(b"exists", b"1").unwrap();
    thread::scope(|s| {
        let other = db.db.clone();
        s.spawn(move || {
            for _ in 0..5_000 {
                assert_eq!(other.putkeep(b"exists", b"2").unwrap_err().kind, ErrorKind::Keep);
            }
        });
        for _ in 0..5_000 {
            assert_eq!(db.get(b"missing").unwrap_err().kind, ErrorKind::NoRecord);
        }
    });
}

#[test]
fn shared_hash_handle_reports_each_threads_failure() {
    let db = TestHdb::new();
    db.put(b"exists", b"1").unwrap();
    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..5_000 {
                assert_eq!(db.putkeep(b"exists", b"2").unwrap_err().kind, ErrorKind::Keep);
            }
        });
        for _ in 0..5_000 {
            assert!(db.get(b"missing").unwrap_err().is_not_found());
        }
    });
}

#[test]
fn path_races_close_on_clones() {
    let db = TestBdb::new();
    let path = db.path().to_path_buf();
    thread::scope(|s| {
        let reader = db.db.clone();
        s.spawn(move || {
            for _ in 0..200 {
                if let Ok(p) = reader.path() {
                    assert!(p.ends_with("test.tcb"));
                }
            }
        });
        for _ in 0..50 {
            db.close().unwrap();
            db.open(&path, OpenMode::WRITE_CREATE).unwrap();
        }
    });
}

#[test]
fn cursor_moves_to_another_thread() {
    let db = scenarios::populated_bdb(4);
    let mut cur = db.cursor().unwrap();
    let count = thread::spawn(move || {
        let mut n = 0;
        if cur.first().is_ok() {
            n += 1;
            while cur.next().is_ok() {
                n += 1;
            }
        }
        n
    })
    .join()
    .unwrap();
    assert_eq!(count, 4);
}

#[test]
fn adb_misc_preserves_order() {
    let db = Adb::new().unwrap();
    db.open("+").unwrap();
    let args = List::from_items([&b"k2"[..], b"v2", b"k1", b"v1", b"k3", b"v3"]).unwrap();
    assert!(db.misc("putlist", &args).unwrap().is_empty());

    let keys = List::from_items([&b"k3"[..], b"k1"]).unwrap();
    let got = db.misc("getlist", &keys).unwrap();
    assert_eq!(got.to_vec(), vec![b"k3".to_vec(), b"v3".to_vec(), b"k1".to_vec(), b"v1".to_vec()]);

    let none = List::new().unwrap();
    db.misc("iterinit", &none).unwrap();
    let first = db.misc("iternext", &none).unwrap();
    assert_eq!(first.to_vec(), vec![b"k1".to_vec(), b"v1".to_vec()]);
}

#[test]
fn custom_comparator_with_equal_length_keys() {
    let by_len = Comparator::custom(|a, b| match a.len().cmp(&b.len()) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    let db = TestBdb::with_comparator(by_len);
    for key in [&b"ccc"[..], b"a", b"bb", b"aa"] {
        db.put(key, b"").unwrap();
    }
    assert_eq!(
        collect_forward(&db),
        vec![b"a".to_vec(), b"aa".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]
    );
}
