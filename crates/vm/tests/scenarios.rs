// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! End-to-end pipeline scenarios: compile a plan, lower it, run it
//! against seeded tables, check the delivered rows.

mod common;

use common::{as_i64, int_cols, scan, TestDb, COL1, COL2, TEST_1, TEST_2};
use quarry_compiler::expr::{AggFunc, ArithOp, CmpOp, Expr};
use quarry_compiler::plan::{
	AggSpec, IndexMaintenance, OutputSchema, PlanNode, ScanColumn, ScanDirection, SortKey,
};
use quarry_core::{EngineConfig, IndexOid, SqlType, TableOid, Value};
use quarry_index::OrderedIndex;
use quarry_storage::{BlockLayout, ColumnSpec, SqlTable};
use quarry_vm::{run_query, ExecutionContext};

fn lt(column: usize, value: i64) -> Expr {
	Expr::cmp(CmpOp::Lt, Expr::col(column, SqlType::Int), Expr::int(value))
}

/// SELECT col1, col2, col1 * col2, col1 < 100 * col2
/// FROM test_1 WHERE col1 < 500 AND col2 >= 3
#[test]
fn seq_scan_with_filter() {
	let db = TestDb::new();
	let predicate = Expr::and(vec![
		lt(0, 500),
		Expr::cmp(CmpOp::Ge, Expr::col(1, SqlType::Int), Expr::int(3)),
	]);
	let plan = PlanNode::SeqScan {
		table: TEST_1,
		columns: int_cols(),
		predicate: Some(predicate),
		schema: OutputSchema::new(vec![
			("col1", Expr::col(0, SqlType::Int)),
			("col2", Expr::col(1, SqlType::Int)),
			(
				"col3",
				Expr::arith(
					ArithOp::Mul,
					Expr::col(0, SqlType::Int),
					Expr::col(1, SqlType::Int),
				),
			),
			(
				"col4",
				Expr::cmp(
					CmpOp::Lt,
					Expr::col(0, SqlType::Int),
					Expr::arith(ArithOp::Mul, Expr::int(100), Expr::col(1, SqlType::Int)),
				),
			),
		]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	// i in 0..500 with i % 10 >= 3.
	let expected = (0..500).filter(|i| i % 10 >= 3).count();
	assert_eq!(rows.len(), expected);
	for row in &rows {
		let col1 = as_i64(&row[0]);
		let col2 = as_i64(&row[1]);
		assert!(col1 < 500 && col2 >= 3);
		assert_eq!(as_i64(&row[2]), col1 * col2);
		assert_eq!(row[3], Value::Bool(col1 < 100 * col2));
	}
}

/// SELECT col2, SUM(col1) FROM test_1 WHERE col1 < 1000 GROUP BY col2
#[test]
fn hash_aggregate() {
	let db = TestDb::new();
	let plan = PlanNode::Aggregate {
		child: Box::new(scan(TEST_1, Some(lt(0, 1000)))),
		group_by: vec![Expr::col(1, SqlType::Int)],
		aggregates: vec![AggSpec { func: AggFunc::Sum, arg: Some(Expr::col(0, SqlType::Int)) }],
		having: None,
		schema: OutputSchema::new(vec![
			("col2", Expr::col(0, SqlType::Int)),
			("sum_col1", Expr::col_of(0, 1, SqlType::BigInt)),
		]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	assert_eq!(rows.len(), 10);
	let mut total = 0;
	for row in &rows {
		let group = as_i64(&row[0]);
		let sum = as_i64(&row[1]);
		// Values g, g + 10, ..., g + 990.
		assert_eq!(sum, 100 * group + 49_500);
		total += sum;
	}
	assert_eq!(total, 499_500);
}

/// test_1 JOIN test_2 ON t1.col1 = t2.col1 WHERE t1.col1 < 500 AND t2.col1 < 80
#[test]
fn hash_join() {
	let db = TestDb::new();
	let plan = PlanNode::HashJoin {
		left: Box::new(scan(TEST_1, Some(lt(0, 500)))),
		right: Box::new(scan(TEST_2, Some(lt(0, 80)))),
		left_keys: vec![Expr::col(0, SqlType::Int)],
		right_keys: vec![Expr::col(0, SqlType::Int)],
		predicate: None,
		schema: OutputSchema::new(vec![
			("t1_col1", Expr::col_of(0, 0, SqlType::Int)),
			("t2_col1", Expr::col_of(1, 0, SqlType::Int)),
			("t2_col2", Expr::col_of(1, 1, SqlType::Int)),
			(
				"sum",
				Expr::arith(
					ArithOp::Add,
					Expr::col_of(0, 0, SqlType::Int),
					Expr::col_of(1, 1, SqlType::Int),
				),
			),
		]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	assert_eq!(rows.len(), 80);
	for row in &rows {
		assert_eq!(row[0], row[1]);
		assert_eq!(as_i64(&row[3]), as_i64(&row[0]) + as_i64(&row[2]));
	}
}

/// SELECT col1, col2 FROM test_1 WHERE col1 < 500
/// ORDER BY col2 ASC, (col1 - col2) DESC
#[test]
fn order_by() {
	let db = TestDb::new();
	let plan = PlanNode::OrderBy {
		child: Box::new(scan(TEST_1, Some(lt(0, 500)))),
		keys: vec![
			SortKey { expr: Expr::col(1, SqlType::Int), descending: false },
			SortKey {
				expr: Expr::arith(
					ArithOp::Sub,
					Expr::col(0, SqlType::Int),
					Expr::col(1, SqlType::Int),
				),
				descending: true,
			},
		],
		limit: None,
		schema: OutputSchema::new(vec![
			("col1", Expr::col(0, SqlType::Int)),
			("col2", Expr::col(1, SqlType::Int)),
		]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	assert_eq!(rows.len(), 500);
	for pair in rows.windows(2) {
		let (a1, a2) = (as_i64(&pair[0][0]), as_i64(&pair[0][1]));
		let (b1, b2) = (as_i64(&pair[1][0]), as_i64(&pair[1][1]));
		// Lexicographic on (col2 asc, (col1 - col2) desc).
		assert!((a2, -(a1 - a2)) <= (b2, -(b1 - b2)));
	}
}

/// Top-K fused sort: ORDER BY col1 DESC LIMIT 5.
#[test]
fn order_by_with_top_k() {
	let db = TestDb::new();
	let plan = PlanNode::OrderBy {
		child: Box::new(scan(TEST_1, None)),
		keys: vec![SortKey { expr: Expr::col(0, SqlType::Int), descending: true }],
		limit: Some(5),
		schema: OutputSchema::new(vec![("col1", Expr::col(0, SqlType::Int))]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	let got: Vec<i64> = rows.iter().map(|r| as_i64(&r[0])).collect();
	assert_eq!(got, vec![999, 998, 997, 996, 995]);
}

#[test]
fn limit_with_offset() {
	let db = TestDb::new();
	let plan = PlanNode::Limit {
		child: Box::new(scan(TEST_1, Some(lt(0, 100)))),
		skip: 10,
		fetch: 20,
		schema: OutputSchema::new(vec![
			("col1", Expr::col(0, SqlType::Int)),
			("col2", Expr::col(1, SqlType::Int)),
		]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	assert_eq!(rows.len(), 20);
	// Scan order is slot order, which is insertion order here.
	let got: Vec<i64> = rows.iter().map(|r| as_i64(&r[0])).collect();
	assert_eq!(got, (10..30).collect::<Vec<i64>>());
}

#[test]
fn projection_rewrites_columns() {
	let db = TestDb::new();
	let plan = PlanNode::Projection {
		child: Box::new(scan(TEST_1, Some(lt(0, 10)))),
		schema: OutputSchema::new(vec![(
			"sum",
			Expr::arith(ArithOp::Add, Expr::col(0, SqlType::Int), Expr::col(1, SqlType::Int)),
		)]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	assert_eq!(rows.len(), 10);
	for (i, row) in rows.iter().enumerate() {
		let i = i as i64;
		assert_eq!(as_i64(&row[0]), i + i % 10);
	}
}

/// Both nested-loop sides stay in one pipeline; the inner side re-scans
/// per outer row.
#[test]
fn nested_loop_join() {
	let db = TestDb::new();
	let plan = PlanNode::NestLoop {
		left: Box::new(scan(TEST_1, Some(lt(0, 3)))),
		right: Box::new(scan(TEST_1, Some(lt(0, 2)))),
		predicate: Some(Expr::cmp(
			CmpOp::Gt,
			Expr::col_of(0, 0, SqlType::Int),
			Expr::col_of(1, 0, SqlType::Int),
		)),
		schema: OutputSchema::new(vec![
			("outer", Expr::col_of(0, 0, SqlType::Int)),
			("inner", Expr::col_of(1, 0, SqlType::Int)),
		]),
	};
	let (mut rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	rows.sort_by_key(|r| (as_i64(&r[0]), as_i64(&r[1])));
	let got: Vec<(i64, i64)> = rows.iter().map(|r| (as_i64(&r[0]), as_i64(&r[1]))).collect();
	assert_eq!(got, vec![(1, 0), (2, 0), (2, 1)]);
}

#[test]
fn index_scan_range() {
	let mut db = TestDb::new();
	db.index_on_col1(IndexOid(1), TEST_1, false);

	let make = |direction, limit| {
		PlanNode::output(PlanNode::IndexScan {
			index: IndexOid(1),
			table: TEST_1,
			columns: int_cols(),
			lo: vec![Value::Int(5)],
			hi: vec![Value::Int(10)],
			direction,
			limit,
			predicate: None,
			schema: OutputSchema::new(vec![
				("col1", Expr::col(0, SqlType::Int)),
				("col2", Expr::col(1, SqlType::Int)),
			]),
		})
	};

	let (rows, _) = db.run(&make(ScanDirection::Ascending, None));
	let got: Vec<i64> = rows.iter().map(|r| as_i64(&r[0])).collect();
	assert_eq!(got, vec![5, 6, 7, 8, 9, 10]);

	let (rows, _) = db.run(&make(ScanDirection::Descending, None));
	let got: Vec<i64> = rows.iter().map(|r| as_i64(&r[0])).collect();
	assert_eq!(got, vec![10, 9, 8, 7, 6, 5]);

	let (rows, _) = db.run(&make(ScanDirection::Ascending, Some(3)));
	let got: Vec<i64> = rows.iter().map(|r| as_i64(&r[0])).collect();
	assert_eq!(got, vec![5, 6, 7]);
}

/// Index nested-loop join: per outer row, probe test_2's col1 index.
#[test]
fn index_join() {
	let mut db = TestDb::new();
	db.index_on_col1(IndexOid(2), TEST_2, false);

	let plan = PlanNode::IndexJoin {
		child: Box::new(scan(TEST_1, Some(lt(0, 5)))),
		index: IndexOid(2),
		table: TEST_2,
		columns: int_cols(),
		key_exprs: vec![Expr::col(0, SqlType::Int)],
		predicate: None,
		schema: OutputSchema::new(vec![
			("outer_col1", Expr::col_of(0, 0, SqlType::Int)),
			("inner_col1", Expr::col_of(1, 0, SqlType::Int)),
			("inner_col2", Expr::col_of(1, 1, SqlType::Int)),
		]),
	};
	let (mut rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	assert_eq!(rows.len(), 5);
	rows.sort_by_key(|r| as_i64(&r[0]));
	for (i, row) in rows.iter().enumerate() {
		let i = i as i64;
		assert_eq!(as_i64(&row[0]), i);
		assert_eq!(as_i64(&row[1]), i);
		assert_eq!(as_i64(&row[2]), (i * 7) % 100);
	}
}

fn fresh_table(db: &mut TestDb, oid: TableOid) {
	let layout = BlockLayout::new(vec![
		ColumnSpec::new(COL1.0, SqlType::Int),
		ColumnSpec::new(COL2.0, SqlType::Int),
	]);
	db.catalog.register_table(SqlTable::new(oid, "t3", layout, 64));
}

fn insert_plan(table: TableOid, values: &[(i64, i64)], unique_index: Option<IndexOid>) -> PlanNode {
	let indexes = unique_index
		.map(|oid| vec![IndexMaintenance { oid, key_ordinals: vec![0], unique: true }])
		.unwrap_or_default();
	PlanNode::Insert {
		table,
		columns: vec![
			ScanColumn { oid: COL1, ty: SqlType::Int },
			ScanColumn { oid: COL2, ty: SqlType::Int },
		],
		rows: values
			.iter()
			.map(|(a, b)| vec![Expr::int(*a), Expr::int(*b)])
			.collect(),
		indexes,
	}
}

#[test]
fn insert_then_scan() {
	let mut db = TestDb::new();
	let t3 = TableOid(3);
	fresh_table(&mut db, t3);

	let (_, status) = db.run(&insert_plan(t3, &[(1, 10), (2, 20), (3, 30)], None));
	assert_eq!(status, 0);

	let (rows, _) = db.run(&PlanNode::output(scan(t3, None)));
	assert_eq!(rows.len(), 3);
	assert_eq!(as_i64(&rows[1][1]), 20);
}

/// A duplicate key through a unique index aborts the inserting
/// transaction; the generated pipeline checks the flag and bails.
#[test]
fn insert_unique_violation_aborts() {
	let mut db = TestDb::new();
	let t3 = TableOid(3);
	fresh_table(&mut db, t3);
	let index = OrderedIndex::new(
		IndexOid(9),
		"t3_pk",
		quarry_index::KeySchema::new(vec![SqlType::Int]),
		true,
	);
	db.catalog.register_index(index);

	let (_, status) = db.run(&insert_plan(t3, &[(1, 10)], Some(IndexOid(9))));
	assert_eq!(status, 0);

	// Second insert of the same key aborts and leaves nothing behind.
	let (_, status) = db.run(&insert_plan(t3, &[(1, 99)], Some(IndexOid(9))));
	assert_eq!(status, 0);

	let (rows, _) = db.run(&PlanNode::output(scan(t3, None)));
	assert_eq!(rows.len(), 1);
	assert_eq!(as_i64(&rows[0][1]), 10);
}

#[test]
fn update_through_scan() {
	let mut db = TestDb::new();
	let t3 = TableOid(3);
	fresh_table(&mut db, t3);
	db.run(&insert_plan(t3, &[(1, 10), (2, 20)], None));

	let plan = PlanNode::Update {
		child: Box::new(scan(t3, Some(Expr::cmp(
			CmpOp::Eq,
			Expr::col(0, SqlType::Int),
			Expr::int(2),
		)))),
		table: t3,
		assignments: vec![(
			COL2,
			Expr::arith(ArithOp::Add, Expr::col(1, SqlType::Int), Expr::int(5)),
		)],
	};
	let (_, status) = db.run(&plan);
	assert_eq!(status, 0);

	let (mut rows, _) = db.run(&PlanNode::output(scan(t3, None)));
	rows.sort_by_key(|r| as_i64(&r[0]));
	assert_eq!(as_i64(&rows[0][1]), 10);
	assert_eq!(as_i64(&rows[1][1]), 25);
}

#[test]
fn delete_through_scan() {
	let mut db = TestDb::new();
	let t3 = TableOid(3);
	fresh_table(&mut db, t3);
	db.run(&insert_plan(t3, &[(1, 10), (2, 20), (3, 30)], None));

	let plan = PlanNode::Delete {
		child: Box::new(scan(t3, Some(Expr::cmp(
			CmpOp::Eq,
			Expr::col(0, SqlType::Int),
			Expr::int(2),
		)))),
		table: t3,
	};
	let (_, status) = db.run(&plan);
	assert_eq!(status, 0);

	let (rows, _) = db.run(&PlanNode::output(scan(t3, None)));
	let got: Vec<i64> = rows.iter().map(|r| as_i64(&r[0])).collect();
	assert_eq!(got, vec![1, 3]);
}

/// setup followed by teardown with no pipeline in between releases every
/// runtime object.
#[test]
fn setup_teardown_is_balanced() {
	let db = TestDb::new();
	let plan = PlanNode::output(PlanNode::Aggregate {
		child: Box::new(scan(TEST_1, None)),
		group_by: vec![Expr::col(1, SqlType::Int)],
		aggregates: vec![AggSpec { func: AggFunc::Sum, arg: Some(Expr::col(0, SqlType::Int)) }],
		having: None,
		schema: OutputSchema::new(vec![
			("col2", Expr::col(0, SqlType::Int)),
			("sum", Expr::col_of(0, 1, SqlType::BigInt)),
		]),
	});
	let compiled = quarry_compiler::compile(&plan).unwrap();
	let module = quarry_vm::lower(&compiled).unwrap();

	let txn = db.manager.begin();
	{
		let callback = Box::new(|_: &[Vec<Value>]| {});
		let mut exec = ExecutionContext::new(&db.catalog, &txn, EngineConfig::default(), callback);
		let mut machine = quarry_vm::Machine::new(&module, &mut exec);

		let state = quarry_vm::ptr::state_ptr(0);
		machine.invoke_by_name("setup", &[state, 0]).unwrap();
		assert!(machine.live_objects() > 0);
		machine.invoke_by_name("teardown", &[state, 0]).unwrap();
		assert_eq!(machine.live_objects(), 0);
	}
	db.manager.commit(txn);
}

/// Cancellation short-circuits the scan; the query still finishes its
/// teardown and returns cleanly with no rows delivered.
#[test]
fn cancellation_short_circuits() {
	let db = TestDb::new();
	let plan = PlanNode::output(scan(TEST_1, None));

	let txn = db.manager.begin();
	let mut rows = 0usize;
	{
		let callback = Box::new(|batch: &[Vec<Value>]| {
			rows += batch.len();
		});
		let mut exec =
			ExecutionContext::new(&db.catalog, &txn, EngineConfig::default(), callback);
		exec.cancel_flag().store(true, std::sync::atomic::Ordering::Release);
		let status = run_query(&plan, &mut exec).unwrap();
		assert_eq!(status, 0);
	}
	db.manager.commit(txn);
	assert_eq!(rows, 0);
}

/// Aggregates compose under sorts: the build pipelines run in dependency
/// order before the final scan pipeline.
#[test]
fn aggregate_under_order_by() {
	let db = TestDb::new();
	let agg = PlanNode::Aggregate {
		child: Box::new(scan(TEST_1, None)),
		group_by: vec![Expr::col(1, SqlType::Int)],
		aggregates: vec![AggSpec { func: AggFunc::Count, arg: Some(Expr::col(0, SqlType::Int)) }],
		having: None,
		schema: OutputSchema::new(vec![
			("col2", Expr::col(0, SqlType::Int)),
			("cnt", Expr::col_of(0, 1, SqlType::BigInt)),
		]),
	};
	let plan = PlanNode::OrderBy {
		child: Box::new(agg),
		keys: vec![SortKey { expr: Expr::col(0, SqlType::Int), descending: false }],
		limit: None,
		schema: OutputSchema::new(vec![
			("col2", Expr::col(0, SqlType::Int)),
			("cnt", Expr::col(1, SqlType::BigInt)),
		]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	let got: Vec<(i64, i64)> = rows.iter().map(|r| (as_i64(&r[0]), as_i64(&r[1]))).collect();
	let expected: Vec<(i64, i64)> = (0..10).map(|g| (g, 100)).collect();
	assert_eq!(got, expected);
}

#[test]
fn aggregate_having_filters_groups() {
	let db = TestDb::new();
	let plan = PlanNode::Aggregate {
		child: Box::new(scan(TEST_1, None)),
		group_by: vec![Expr::col(1, SqlType::Int)],
		aggregates: vec![AggSpec { func: AggFunc::Sum, arg: Some(Expr::col(0, SqlType::Int)) }],
		having: Some(Expr::cmp(
			CmpOp::Ge,
			Expr::col_of(0, 1, SqlType::BigInt),
			Expr::int(100 * 7 + 49_500),
		)),
		schema: OutputSchema::new(vec![
			("col2", Expr::col(0, SqlType::Int)),
			("sum", Expr::col_of(0, 1, SqlType::BigInt)),
		]),
	};
	let (rows, status) = db.run(&PlanNode::output(plan));

	assert_eq!(status, 0);
	// Groups 7, 8, 9 pass.
	assert_eq!(rows.len(), 3);
	for row in &rows {
		assert!(as_i64(&row[0]) >= 7);
	}
}
