// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use quarry_compiler::expr::{AggFunc, CmpOp, Expr, ScalarFunc};
use quarry_compiler::plan::{AggSpec, OutputSchema, PlanNode, ScanColumn, SortKey};
use quarry_compiler::{compile, CompileError};
use quarry_core::{ColumnOid, SqlType, TableOid};

fn scan(predicate: Option<Expr>) -> PlanNode {
	PlanNode::SeqScan {
		table: TableOid(1),
		columns: vec![
			ScanColumn { oid: ColumnOid(1), ty: SqlType::Int },
			ScanColumn { oid: ColumnOid(2), ty: SqlType::Int },
		],
		predicate,
		schema: OutputSchema::new(vec![
			("col1", Expr::col(0, SqlType::Int)),
			("col2", Expr::col(1, SqlType::Int)),
		]),
	}
}

/// Every dependency edge respects pipeline order: a pipeline writing a
/// hash table precedes the one probing it.
#[test]
fn build_pipelines_precede_their_readers() {
	let plan = PlanNode::output(PlanNode::HashJoin {
		left: Box::new(scan(None)),
		right: Box::new(scan(None)),
		left_keys: vec![Expr::col(0, SqlType::Int)],
		right_keys: vec![Expr::col(0, SqlType::Int)],
		predicate: None,
		schema: OutputSchema::new(vec![("k", Expr::col_of(0, 0, SqlType::Int))]),
	});
	let compiled = compile(&plan).unwrap();

	let build = compiled
		.pipelines
		.iter()
		.position(|p| p.operators.contains(&"join_build"))
		.expect("build pipeline exists");
	let probe = compiled
		.pipelines
		.iter()
		.position(|p| p.operators.contains(&"join_probe"))
		.expect("probe pipeline exists");
	assert!(build < probe);
	assert_eq!(compiled.pipelines[build].function, "pipeline_0");
}

#[test]
fn aggregate_splits_into_two_pipelines() {
	let plan = PlanNode::output(PlanNode::Aggregate {
		child: Box::new(scan(None)),
		group_by: vec![Expr::col(1, SqlType::Int)],
		aggregates: vec![AggSpec { func: AggFunc::Sum, arg: Some(Expr::col(0, SqlType::Int)) }],
		having: None,
		schema: OutputSchema::new(vec![
			("g", Expr::col(0, SqlType::Int)),
			("s", Expr::col_of(0, 1, SqlType::BigInt)),
		]),
	});
	let compiled = compile(&plan).unwrap();
	assert_eq!(compiled.pipelines.len(), 2);
	assert!(compiled.pipelines[0].operators.contains(&"agg_build"));
	assert!(compiled.pipelines[1].operators.contains(&"agg_scan"));
	assert!(compiled.state_size > 0);
}

/// Exactly the skeleton functions plus per-operator helpers are emitted.
#[test]
fn emitted_function_skeleton() {
	let plan = PlanNode::output(PlanNode::OrderBy {
		child: Box::new(scan(Some(Expr::cmp(
			CmpOp::Lt,
			Expr::col(0, SqlType::Int),
			Expr::int(10),
		)))),
		keys: vec![SortKey { expr: Expr::col(0, SqlType::Int), descending: false }],
		limit: None,
		schema: OutputSchema::new(vec![("col1", Expr::col(0, SqlType::Int))]),
	});
	let compiled = compile(&plan).unwrap();
	let names: Vec<&str> =
		compiled.arena.functions.iter().map(|f| f.name.as_str()).collect();

	for expected in ["setup", "pipeline_0", "pipeline_1", "teardown", "main"] {
		assert!(names.contains(&expected), "missing {}", expected);
	}
	assert!(names.iter().any(|n| n.starts_with("sorter_cmp")));
	assert!(names.iter().any(|n| n.starts_with("seq_scan_filter")));
}

/// The semantic gate: an ill-typed program compiles to diagnostics, not
/// to bytecode.
#[test]
fn type_errors_accumulate_and_abort() {
	let plan = PlanNode::output(PlanNode::Projection {
		child: Box::new(scan(None)),
		schema: OutputSchema::new(vec![
			// length() over an integer column is a type error.
			(
				"bad_a",
				Expr::Function {
					func: ScalarFunc::Length,
					args: vec![Expr::col(0, SqlType::Int)],
				},
			),
			(
				"bad_b",
				Expr::Function {
					func: ScalarFunc::Lower,
					args: vec![Expr::col(1, SqlType::Int)],
				},
			),
		]),
	});
	match compile(&plan) {
		Err(CompileError::TypeCheck(diagnostics)) => {
			// The full pass accumulates both errors before aborting.
			assert!(diagnostics.len() >= 2, "got {:?}", diagnostics);
		}
		other => panic!("expected type-check failure, got {:?}", other.map(|_| ())),
	}
}

/// DML plans require a slot-providing child.
#[test]
fn update_without_scan_child_is_rejected() {
	let agg = PlanNode::Aggregate {
		child: Box::new(scan(None)),
		group_by: vec![Expr::col(1, SqlType::Int)],
		aggregates: vec![AggSpec { func: AggFunc::CountStar, arg: None }],
		having: None,
		schema: OutputSchema::new(vec![
			("g", Expr::col(0, SqlType::Int)),
			("c", Expr::col_of(0, 1, SqlType::BigInt)),
		]),
	};
	let plan = PlanNode::Update {
		child: Box::new(agg),
		table: TableOid(1),
		assignments: vec![(ColumnOid(2), Expr::int(0))],
	};
	assert!(matches!(compile(&plan), Err(CompileError::InvalidPlan(_))));
}
