// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quarry_core::{IndexOid, SqlType, Value};
use quarry_index::{KeySchema, OrderedIndex};
use quarry_storage::{TransactionManager, TupleSlot};

fn int_index(unique: bool) -> Arc<OrderedIndex> {
	OrderedIndex::new(IndexOid(1), "idx", KeySchema::new(vec![SqlType::Int]), unique)
}

fn key(v: i32) -> Vec<Value> {
	vec![Value::Int(v)]
}

fn slot(v: u32) -> TupleSlot {
	TupleSlot::new(0, v)
}

/// Populate even keys 0..=20, committed.
fn even_keys() -> (TransactionManager, Arc<OrderedIndex>) {
	let manager = TransactionManager::new();
	let index = int_index(false);
	let txn = manager.begin();
	for k in (0..=20).step_by(2) {
		index.insert(&txn, &key(k), slot(k as u32)).unwrap();
	}
	manager.commit(txn);
	(manager, index)
}

fn keys_of(slots: &[TupleSlot]) -> Vec<u32> {
	slots.iter().map(|s| s.offset).collect()
}

#[test]
fn range_scans_over_even_keys() {
	let (manager, index) = even_keys();
	let txn = manager.begin();

	assert_eq!(keys_of(&index.scan_ascending(&txn, &key(8), &key(12)).unwrap()), vec![8, 10, 12]);
	assert_eq!(keys_of(&index.scan_ascending(&txn, &key(7), &key(13)).unwrap()), vec![8, 10, 12]);
	assert_eq!(keys_of(&index.scan_descending(&txn, &key(8), &key(12)).unwrap()), vec![12, 10, 8]);
	assert_eq!(keys_of(&index.scan_limit_ascending(&txn, &key(8), &key(12), 2).unwrap()), vec![8, 10]);
	assert_eq!(keys_of(&index.scan_limit_descending(&txn, &key(-1), &key(5), 2).unwrap()), vec![4, 2]);

	manager.commit(txn);
}

#[test]
fn ascending_scan_is_sorted_and_limit_is_a_prefix() {
	let (manager, index) = even_keys();
	let txn = manager.begin();

	let full = index.scan_ascending(&txn, &key(0), &key(20)).unwrap();
	let mut sorted = full.clone();
	sorted.sort_unstable();
	assert_eq!(full, sorted);

	for n in 0..full.len() {
		let limited = index.scan_limit_ascending(&txn, &key(0), &key(20), n).unwrap();
		assert_eq!(limited.len(), n);
		assert_eq!(&full[..n], limited.as_slice());
	}

	manager.commit(txn);
}

#[test]
fn snapshot_isolation_for_index_reads() {
	let manager = TransactionManager::new();
	let index = int_index(true);

	// A inserts and sees its own write.
	let a = manager.begin();
	assert!(index.insert_unique(&a, &key(15721), slot(1)).unwrap());
	assert_eq!(index.scan_key(&a, &key(15721)).unwrap(), vec![slot(1)]);

	// B started after A's write but before its commit: sees nothing.
	let b = manager.begin();
	assert!(index.scan_key(&b, &key(15721)).unwrap().is_empty());

	manager.commit(a);

	// B's snapshot predates the commit: still nothing.
	assert!(index.scan_key(&b, &key(15721)).unwrap().is_empty());
	manager.commit(b);

	// C started after the commit: sees the row.
	let c = manager.begin();
	assert_eq!(index.scan_key(&c, &key(15721)).unwrap(), vec![slot(1)]);
	manager.commit(c);
}

#[test]
fn unique_insert_rejects_committed_duplicate() {
	let manager = TransactionManager::new();
	let index = int_index(true);

	let first = manager.begin();
	assert!(index.insert_unique(&first, &key(7), slot(1)).unwrap());
	manager.commit(first);

	let second = manager.begin();
	assert!(!index.insert_unique(&second, &key(7), slot(2)).unwrap());
	manager.abort(second);
}

#[test]
fn unique_insert_rejects_pending_duplicate() {
	let manager = TransactionManager::new();
	let index = int_index(true);

	let first = manager.begin();
	assert!(index.insert_unique(&first, &key(7), slot(1)).unwrap());

	let second = manager.begin();
	assert!(!index.insert_unique(&second, &key(7), slot(2)).unwrap());
	manager.abort(second);
	manager.commit(first);
}

#[test]
fn unique_insert_succeeds_over_aborted_writer() {
	let manager = TransactionManager::new();
	let index = int_index(true);

	let doomed = manager.begin();
	assert!(index.insert_unique(&doomed, &key(42), slot(1)).unwrap());
	manager.abort(doomed);

	let retry = manager.begin();
	assert!(index.insert_unique(&retry, &key(42), slot(2)).unwrap());
	manager.commit(retry);

	let reader = manager.begin();
	assert_eq!(index.scan_key(&reader, &key(42)).unwrap(), vec![slot(2)]);
	manager.commit(reader);
}

#[test]
fn unique_insert_succeeds_after_committed_delete() {
	let manager = TransactionManager::new();
	let index = int_index(true);

	let first = manager.begin();
	assert!(index.insert_unique(&first, &key(5), slot(1)).unwrap());
	manager.commit(first);

	let deleter = manager.begin();
	index.delete(&deleter, &key(5), slot(1)).unwrap();
	manager.commit(deleter);

	let retry = manager.begin();
	assert!(index.insert_unique(&retry, &key(5), slot(2)).unwrap());
	manager.commit(retry);
}

#[test]
fn deleted_keys_are_skipped_by_scans() {
	let (manager, index) = even_keys();

	let deleter = manager.begin();
	index.delete(&deleter, &key(10), slot(10)).unwrap();
	manager.commit(deleter);

	let reader = manager.begin();
	assert_eq!(keys_of(&index.scan_ascending(&reader, &key(8), &key(12)).unwrap()), vec![8, 12]);
	manager.commit(reader);
}

/// Four threads race to uniquely insert the same key space; per key
/// exactly one transaction commits, and afterwards every key is visible
/// exactly once.
#[test]
fn concurrent_unique_inserts_have_one_winner_per_key() {
	const KEYS: i32 = 100_000;
	const THREADS: usize = 4;

	let manager = Arc::new(TransactionManager::new());
	let index = int_index(true);
	let committed = AtomicU64::new(0);

	std::thread::scope(|scope| {
		for t in 0..THREADS {
			let manager = manager.clone();
			let index = index.clone();
			let committed = &committed;
			scope.spawn(move || {
				for k in 0..KEYS {
					let txn = manager.begin();
					let slot = TupleSlot::new(t as u32, k as u32);
					if index.insert_unique(&txn, &key(k), slot).unwrap() {
						manager.commit(txn);
						committed.fetch_add(1, Ordering::Relaxed);
					} else {
						manager.abort(txn);
					}
				}
			});
		}
	});

	assert_eq!(committed.load(Ordering::Relaxed), KEYS as u64);

	let reader = manager.begin();
	let visible = index.scan_ascending(&reader, &key(0), &key(KEYS - 1)).unwrap();
	assert_eq!(visible.len(), KEYS as usize);
	for k in 0..KEYS {
		assert_eq!(index.scan_key(&reader, &key(k)).unwrap().len(), 1);
	}
	manager.commit(reader);
}
