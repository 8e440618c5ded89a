//! Property-based test generators using proptest.
//!
//! Keys and values are arbitrary bytes, zero bytes included, since the
//! engine takes every buffer as a (pointer, length) pair.

use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for generating record keys (non-empty arbitrary bytes).
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

/// Strategy for generating record values (possibly empty arbitrary bytes).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for generating keys containing at least one zero byte.
pub fn nul_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    (key_strategy(), any::<prop::sample::Index>()).prop_map(|(mut key, at)| {
        let i = at.index(key.len());
        key[i] = 0;
        key
    })
}

/// Strategy for generating a set of distinct records.
pub fn records_strategy(max: usize) -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..max)
}

/// Strategy for generating ASCII keys sharing a small set of prefixes.
pub fn prefixed_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    (
        prop::sample::select(vec!["app", "apple", "b", "ban", "zz"]),
        prop::string::string_regex("[a-z0-9]{0,6}").expect("Invalid regex"),
    )
        .prop_map(|(prefix, rest)| format!("{prefix}{rest}").into_bytes())
}

/// A store operation for model-based tests.
#[derive(Debug, Clone)]
pub enum Op {
    /// Store a record.
    Put(Vec<u8>, Vec<u8>),
    /// Store a record unless the key exists.
    PutKeep(Vec<u8>, Vec<u8>),
    /// Append to a record.
    PutCat(Vec<u8>, Vec<u8>),
    /// Remove a record.
    Out(Vec<u8>),
}

/// Strategy for generating a sequence of operations over a small key space.
pub fn ops_strategy(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    let key = prop::collection::vec(0u8..4, 1..3);
    let value = prop::collection::vec(any::<u8>(), 0..16);
    let op = prop_oneof![
        (key.clone(), value.clone()).prop_map(|(k, v)| Op::Put(k, v)),
        (key.clone(), value.clone()).prop_map(|(k, v)| Op::PutKeep(k, v)),
        (key.clone(), value).prop_map(|(k, v)| Op::PutCat(k, v)),
        key.prop_map(Op::Out),
    ];
    prop::collection::vec(op, 0..max_ops)
}

/// Applies `ops` to an in-memory model with the engine's put semantics.
pub fn apply_to_model(ops: &[Op]) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut model = BTreeMap::new();
    for op in ops {
        match op {
            Op::Put(k, v) => {
                model.insert(k.clone(), v.clone());
            }
            Op::PutKeep(k, v) => {
                model.entry(k.clone()).or_insert_with(|| v.clone());
            }
            Op::PutCat(k, v) => {
                model.entry(k.clone()).or_insert_with(Vec::new).extend_from_slice(v);
            }
            Op::Out(k) => {
                model.remove(k);
            }
        }
    }
    model
}
