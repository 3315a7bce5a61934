// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use quarry_core::{ColumnOid, SqlType, TableOid, Value, VARLEN_INLINE_CAPACITY};
use quarry_storage::{
	BlockLayout, ColumnSpec, GarbageCollector, ProjectedColumns, ProjectedRow, SlotIterator,
	SqlTable, StorageError, TransactionManager,
};

fn test_table() -> Arc<SqlTable> {
	let layout = BlockLayout::new(vec![
		ColumnSpec::new(1, SqlType::Int),
		ColumnSpec::new(2, SqlType::BigInt),
		ColumnSpec::new(3, SqlType::Varchar),
	]);
	SqlTable::new(TableOid(1), "t", layout, 64)
}

fn full_row(a: Value, b: Value, c: Value) -> ProjectedRow {
	ProjectedRow::from_values(vec![ColumnOid(1), ColumnOid(2), ColumnOid(3)], vec![a, b, c])
}

#[test]
fn insert_select_round_trips_all_types() {
	let manager = TransactionManager::new();
	let table = test_table();

	let long = "x".repeat(VARLEN_INLINE_CAPACITY * 3);
	let rows = vec![
		full_row(Value::Int(1), Value::BigInt(-9), Value::Varchar("short".into())),
		full_row(Value::Int(2), Value::Null, Value::Varchar(long.clone())),
		full_row(Value::Null, Value::BigInt(0), Value::Null),
	];

	let txn = manager.begin();
	let slots: Vec<_> = rows.iter().map(|r| table.insert(&txn, r).unwrap()).collect();
	manager.commit(txn);

	let reader = manager.begin();
	for (slot, row) in slots.iter().zip(&rows) {
		let mut out = ProjectedRow::new(vec![ColumnOid(1), ColumnOid(2), ColumnOid(3)]);
		assert!(table.select(&reader, *slot, &mut out).unwrap());
		assert_eq!(out.values(), row.values());
	}
	manager.commit(reader);
}

#[test]
fn uncommitted_rows_are_invisible_to_other_snapshots() {
	let manager = TransactionManager::new();
	let table = test_table();

	let writer = manager.begin();
	let slot = table
		.insert(&writer, &full_row(Value::Int(1), Value::BigInt(1), Value::Null))
		.unwrap();

	// Writer sees its own write.
	let mut out = ProjectedRow::new(vec![ColumnOid(1)]);
	assert!(table.select(&writer, slot, &mut out).unwrap());

	// A concurrent snapshot does not.
	let reader = manager.begin();
	assert!(!table.select(&reader, slot, &mut out).unwrap());

	manager.commit(writer);

	// The snapshot predates the commit, so it still sees nothing.
	assert!(!table.select(&reader, slot, &mut out).unwrap());
	manager.commit(reader);

	// A fresh snapshot sees the row.
	let late = manager.begin();
	assert!(table.select(&late, slot, &mut out).unwrap());
	assert_eq!(out.get(0), &Value::Int(1));
	manager.commit(late);
}

#[test]
fn update_preserves_old_version_for_old_snapshot() {
	let manager = TransactionManager::new();
	let table = test_table();

	let setup = manager.begin();
	let slot = table
		.insert(&setup, &full_row(Value::Int(10), Value::BigInt(0), Value::Null))
		.unwrap();
	manager.commit(setup);

	let old_reader = manager.begin();

	let writer = manager.begin();
	let update = ProjectedRow::from_values(vec![ColumnOid(1)], vec![Value::Int(20)]);
	table.update(&writer, slot, &update).unwrap();
	manager.commit(writer);

	let mut out = ProjectedRow::new(vec![ColumnOid(1)]);
	assert!(table.select(&old_reader, slot, &mut out).unwrap());
	assert_eq!(out.get(0), &Value::Int(10));
	manager.commit(old_reader);

	let new_reader = manager.begin();
	assert!(table.select(&new_reader, slot, &mut out).unwrap());
	assert_eq!(out.get(0), &Value::Int(20));
	manager.commit(new_reader);
}

#[test]
fn write_write_conflict_is_detected() {
	let manager = TransactionManager::new();
	let table = test_table();

	let setup = manager.begin();
	let slot = table
		.insert(&setup, &full_row(Value::Int(1), Value::BigInt(1), Value::Null))
		.unwrap();
	manager.commit(setup);

	let first = manager.begin();
	let second = manager.begin();
	let update = ProjectedRow::from_values(vec![ColumnOid(1)], vec![Value::Int(2)]);
	table.update(&first, slot, &update).unwrap();

	assert_eq!(
		table.update(&second, slot, &update),
		Err(StorageError::WriteWriteConflict { slot })
	);
	manager.abort(second);
	manager.commit(first);
}

#[test]
fn committed_newer_version_causes_serialization_failure() {
	let manager = TransactionManager::new();
	let table = test_table();

	let setup = manager.begin();
	let slot = table
		.insert(&setup, &full_row(Value::Int(1), Value::BigInt(1), Value::Null))
		.unwrap();
	manager.commit(setup);

	let stale = manager.begin();

	let winner = manager.begin();
	let update = ProjectedRow::from_values(vec![ColumnOid(1)], vec![Value::Int(2)]);
	table.update(&winner, slot, &update).unwrap();
	manager.commit(winner);

	assert_eq!(
		table.update(&stale, slot, &update),
		Err(StorageError::SerializationFailure { slot })
	);
	manager.abort(stale);
}

#[test]
fn abort_rolls_back_images() {
	let manager = TransactionManager::new();
	let table = test_table();

	let setup = manager.begin();
	let slot = table
		.insert(&setup, &full_row(Value::Int(1), Value::BigInt(5), Value::Null))
		.unwrap();
	manager.commit(setup);

	let doomed = manager.begin();
	let update = ProjectedRow::from_values(vec![ColumnOid(1)], vec![Value::Int(99)]);
	table.update(&doomed, slot, &update).unwrap();
	table.delete(&doomed, slot).unwrap();
	manager.abort(doomed);

	let reader = manager.begin();
	let mut out = ProjectedRow::new(vec![ColumnOid(1), ColumnOid(2)]);
	assert!(table.select(&reader, slot, &mut out).unwrap());
	assert_eq!(out.get(0), &Value::Int(1));
	assert_eq!(out.get(1), &Value::BigInt(5));
	manager.commit(reader);
}

#[test]
fn deleted_rows_disappear_from_scans() {
	let manager = TransactionManager::new();
	let table = test_table();

	let setup = manager.begin();
	for i in 0..10 {
		table.insert(&setup, &full_row(Value::Int(i), Value::BigInt(i as i64), Value::Null)).unwrap();
	}
	manager.commit(setup);

	let deleter = manager.begin();
	let mut iter = SlotIterator::new();
	let mut buffer = ProjectedColumns::new(&[(ColumnOid(1), SqlType::Int)], 16);
	table.scan(&deleter, &mut iter, &mut buffer).unwrap();
	let victim = buffer.slot(0);
	table.delete(&deleter, victim).unwrap();
	manager.commit(deleter);

	let reader = manager.begin();
	let mut iter = SlotIterator::new();
	let mut buffer = ProjectedColumns::new(&[(ColumnOid(1), SqlType::Int)], 16);
	table.scan(&reader, &mut iter, &mut buffer).unwrap();
	assert_eq!(buffer.num_tuples(), 9);
	for row in 0..buffer.num_tuples() {
		assert_ne!(buffer.slot(row), victim);
	}
	manager.commit(reader);
}

#[test]
fn scan_fills_in_slot_order_across_blocks() {
	let manager = TransactionManager::new();
	let layout = BlockLayout::new(vec![ColumnSpec::new(1, SqlType::Int)]);
	// Tiny blocks force multi-block iteration.
	let table = SqlTable::new(TableOid(9), "small", layout, 8);

	let setup = manager.begin();
	for i in 0..50 {
		let row = ProjectedRow::from_values(vec![ColumnOid(1)], vec![Value::Int(i)]);
		table.insert(&setup, &row).unwrap();
	}
	manager.commit(setup);
	assert!(table.num_blocks() > 1);

	let reader = manager.begin();
	let mut iter = SlotIterator::new();
	let mut buffer = ProjectedColumns::new(&[(ColumnOid(1), SqlType::Int)], 16);
	let mut seen = Vec::new();
	loop {
		table.scan(&reader, &mut iter, &mut buffer).unwrap();
		if buffer.num_tuples() == 0 {
			break;
		}
		for row in 0..buffer.num_tuples() {
			seen.push((buffer.slot(row).pack(), buffer.value(0, row)));
		}
	}
	manager.commit(reader);

	assert_eq!(seen.len(), 50);
	let packed: Vec<u64> = seen.iter().map(|(p, _)| *p).collect();
	let mut sorted = packed.clone();
	sorted.sort_unstable();
	assert_eq!(packed, sorted);
	for (i, (_, value)) in seen.iter().enumerate() {
		assert_eq!(value, &Value::Int(i as i32));
	}
}

#[test]
fn gc_deallocates_with_two_cycle_delay() {
	let manager = Arc::new(TransactionManager::new());
	let table = test_table();

	let setup = manager.begin();
	let slot = table
		.insert(&setup, &full_row(Value::Int(1), Value::BigInt(1), Value::Null))
		.unwrap();
	manager.commit(setup);

	let writer = manager.begin();
	let update = ProjectedRow::from_values(vec![ColumnOid(1)], vec![Value::Int(2)]);
	table.update(&writer, slot, &update).unwrap();
	manager.commit(writer);

	let mut gc = GarbageCollector::new(manager.clone());

	// First cycle unlinks both committed txns but deallocates nothing.
	let first = gc.cycle();
	assert_eq!(first.txns_unlinked, 2);
	assert!(first.records_unlinked >= 2);
	assert_eq!(first.buffers_deallocated, 0);

	// Second cycle frees what cooled down.
	let second = gc.cycle();
	assert_eq!(second.buffers_deallocated, 2);

	// Rows stay readable after collection.
	let reader = manager.begin();
	let mut out = ProjectedRow::new(vec![ColumnOid(1)]);
	assert!(table.select(&reader, slot, &mut out).unwrap());
	assert_eq!(out.get(0), &Value::Int(2));
	manager.commit(reader);
}

#[test]
fn gc_waits_for_active_snapshots() {
	let manager = Arc::new(TransactionManager::new());
	let table = test_table();

	let setup = manager.begin();
	let slot = table
		.insert(&setup, &full_row(Value::Int(1), Value::BigInt(1), Value::Null))
		.unwrap();
	manager.commit(setup);

	// A long-running snapshot pins the watermark.
	let pin = manager.begin();

	let writer = manager.begin();
	let update = ProjectedRow::from_values(vec![ColumnOid(1)], vec![Value::Int(2)]);
	table.update(&writer, slot, &update).unwrap();
	manager.commit(writer);

	let mut gc = GarbageCollector::new(manager.clone());
	let report = gc.cycle();
	// Only the setup txn (committed before the pin began) is eligible.
	assert_eq!(report.txns_unlinked, 1);

	// The pinned snapshot still reads the old version.
	let mut out = ProjectedRow::new(vec![ColumnOid(1)]);
	assert!(table.select(&pin, slot, &mut out).unwrap());
	assert_eq!(out.get(0), &Value::Int(1));
	manager.commit(pin);

	let report = gc.cycle();
	assert_eq!(report.txns_unlinked, 1);
}
