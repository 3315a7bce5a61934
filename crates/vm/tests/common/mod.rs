// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Shared end-to-end harness: an in-memory catalog seeded with the two
//! well-known test tables.
//!
//! `test_1(col1 int, col2 int)` holds `(i, i % 10)` for `i in 0..1000`;
//! `test_2(col1 int, col2 int)` holds `(i, (i * 7) % 100)`.

// Each test binary uses a different slice of the harness.
#![allow(dead_code)]

use std::sync::Arc;

use quarry_compiler::expr::Expr;
use quarry_compiler::plan::{OutputSchema, PlanNode, ScanColumn};
use quarry_core::{ColumnOid, EngineConfig, IndexOid, SqlType, TableOid, Value};
use quarry_index::{KeySchema, OrderedIndex};
use quarry_storage::{BlockLayout, ColumnSpec, ProjectedRow, SqlTable, TransactionManager};
use quarry_vm::{run_query, CatalogAccessor, ExecutionContext, MemoryCatalog};

pub const TEST_1: TableOid = TableOid(1);
pub const TEST_2: TableOid = TableOid(2);
pub const COL1: ColumnOid = ColumnOid(1);
pub const COL2: ColumnOid = ColumnOid(2);

pub struct TestDb {
	pub manager: Arc<TransactionManager>,
	pub catalog: MemoryCatalog,
}

fn two_int_table(oid: TableOid, name: &str) -> Arc<SqlTable> {
	let layout = BlockLayout::new(vec![
		ColumnSpec::new(COL1.0, SqlType::Int),
		ColumnSpec::new(COL2.0, SqlType::Int),
	]);
	SqlTable::new(oid, name, layout, 256)
}

impl TestDb {
	pub fn new() -> Self {
		let manager = Arc::new(TransactionManager::new());
		let mut catalog = MemoryCatalog::new();

		let test_1 = two_int_table(TEST_1, "test_1");
		let test_2 = two_int_table(TEST_2, "test_2");

		let txn = manager.begin();
		for i in 0..1000 {
			let row = ProjectedRow::from_values(
				vec![COL1, COL2],
				vec![Value::Int(i), Value::Int(i % 10)],
			);
			test_1.insert(&txn, &row).unwrap();
			let row = ProjectedRow::from_values(
				vec![COL1, COL2],
				vec![Value::Int(i), Value::Int((i * 7) % 100)],
			);
			test_2.insert(&txn, &row).unwrap();
		}
		manager.commit(txn);

		catalog.register_table(test_1);
		catalog.register_table(test_2);
		Self { manager, catalog }
	}

	/// Build an ordered index over one int column of a seeded table,
	/// committed and registered in the catalog.
	pub fn index_on_col1(&mut self, oid: IndexOid, table: TableOid, unique: bool) {
		let index = OrderedIndex::new(oid, "idx_col1", KeySchema::new(vec![SqlType::Int]), unique);
		let table = self.catalog.table(table).unwrap();
		let txn = self.manager.begin();
		let mut iter = quarry_storage::SlotIterator::new();
		let mut buffer = quarry_storage::ProjectedColumns::new(&[(COL1, SqlType::Int)], 256);
		loop {
			table.scan(&txn, &mut iter, &mut buffer).unwrap();
			if buffer.num_tuples() == 0 {
				break;
			}
			for row in 0..buffer.num_tuples() {
				index.insert(&txn, &[buffer.value(0, row)], buffer.slot(row)).unwrap();
			}
		}
		self.manager.commit(txn);
		self.catalog.register_index(index);
	}

	/// Run a plan in a fresh transaction; commits unless the query
	/// aborted. Returns the collected output rows and main's status.
	pub fn run(&self, plan: &PlanNode) -> (Vec<Vec<Value>>, i32) {
		let txn = self.manager.begin();
		let mut rows = Vec::new();
		let status;
		let aborted;
		{
			let callback = Box::new(|batch: &[Vec<Value>]| {
				rows.extend(batch.iter().cloned());
			});
			let mut exec =
				ExecutionContext::new(&self.catalog, &txn, EngineConfig::default(), callback);
			status = run_query(plan, &mut exec).unwrap();
			aborted = exec.is_aborted();
		}
		if aborted {
			self.manager.abort(txn);
		} else {
			self.manager.commit(txn);
		}
		(rows, status)
	}
}

pub fn int_cols() -> Vec<ScanColumn> {
	vec![ScanColumn { oid: COL1, ty: SqlType::Int }, ScanColumn { oid: COL2, ty: SqlType::Int }]
}

/// `SELECT col1, col2 FROM <table> [WHERE pred]` leaf.
pub fn scan(table: TableOid, predicate: Option<Expr>) -> PlanNode {
	PlanNode::SeqScan {
		table,
		columns: int_cols(),
		predicate,
		schema: OutputSchema::new(vec![
			("col1", Expr::col(0, SqlType::Int)),
			("col2", Expr::col(1, SqlType::Int)),
		]),
	}
}

pub fn as_i64(value: &Value) -> i64 {
	value.as_i64().unwrap_or_else(|| panic!("expected integer, got {:?}", value))
}
