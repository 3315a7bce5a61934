// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Physical plan nodes handed to the compiler by the planner.

use quarry_core::{ColumnOid, IndexOid, SqlType, TableOid, Value};

use crate::expr::{AggFunc, Expr};

/// One named, typed output column.
#[derive(Debug, Clone)]
pub struct OutputColumn {
	pub name: String,
	pub ty: SqlType,
	pub expr: Expr,
}

#[derive(Debug, Clone, Default)]
pub struct OutputSchema {
	pub columns: Vec<OutputColumn>,
}

impl OutputSchema {
	pub fn new(columns: Vec<(&str, Expr)>) -> Self {
		Self {
			columns: columns
				.into_iter()
				.map(|(name, expr)| OutputColumn { name: name.into(), ty: expr.result_type(), expr })
				.collect(),
		}
	}

	pub fn arity(&self) -> usize {
		self.columns.len()
	}
}

/// A table column a scan materializes, in scan output order.
#[derive(Debug, Clone, Copy)]
pub struct ScanColumn {
	pub oid: ColumnOid,
	pub ty: SqlType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
	Ascending,
	Descending,
}

/// One sort key: expression over the child's output plus a direction.
#[derive(Debug, Clone)]
pub struct SortKey {
	pub expr: Expr,
	pub descending: bool,
}

/// Aggregate to compute, argument over the child's output.
#[derive(Debug, Clone)]
pub struct AggSpec {
	pub func: AggFunc,
	pub arg: Option<Expr>,
}

/// Index maintained alongside inserts into its table.
#[derive(Debug, Clone)]
pub struct IndexMaintenance {
	pub oid: IndexOid,
	/// Ordinals into the inserted row forming the key.
	pub key_ordinals: Vec<usize>,
	pub unique: bool,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
	SeqScan {
		table: TableOid,
		columns: Vec<ScanColumn>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	},
	IndexScan {
		index: IndexOid,
		table: TableOid,
		columns: Vec<ScanColumn>,
		lo: Vec<Value>,
		hi: Vec<Value>,
		direction: ScanDirection,
		limit: Option<u64>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	},
	NestLoop {
		left: Box<PlanNode>,
		right: Box<PlanNode>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	},
	HashJoin {
		left: Box<PlanNode>,
		right: Box<PlanNode>,
		/// Equi-join keys over the left / right child outputs.
		left_keys: Vec<Expr>,
		right_keys: Vec<Expr>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	},
	/// Index nested-loop join: for each outer row, probe the index and
	/// materialize matching inner rows from the table.
	IndexJoin {
		child: Box<PlanNode>,
		index: IndexOid,
		table: TableOid,
		columns: Vec<ScanColumn>,
		/// Key expressions over the outer child's output.
		key_exprs: Vec<Expr>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	},
	Aggregate {
		child: Box<PlanNode>,
		group_by: Vec<Expr>,
		aggregates: Vec<AggSpec>,
		having: Option<Expr>,
		schema: OutputSchema,
	},
	OrderBy {
		child: Box<PlanNode>,
		keys: Vec<SortKey>,
		/// Fused top-K when present.
		limit: Option<u64>,
		schema: OutputSchema,
	},
	Projection {
		child: Box<PlanNode>,
		schema: OutputSchema,
	},
	Limit {
		child: Box<PlanNode>,
		skip: u64,
		fetch: u64,
		schema: OutputSchema,
	},
	Insert {
		table: TableOid,
		columns: Vec<ScanColumn>,
		rows: Vec<Vec<Expr>>,
		indexes: Vec<IndexMaintenance>,
	},
	Update {
		child: Box<PlanNode>,
		table: TableOid,
		/// (table column, value expression over the child output).
		assignments: Vec<(ColumnOid, Expr)>,
	},
	Delete {
		child: Box<PlanNode>,
		table: TableOid,
	},
	Output {
		child: Box<PlanNode>,
		schema: OutputSchema,
	},
}

impl PlanNode {
	pub fn schema(&self) -> Option<&OutputSchema> {
		match self {
			PlanNode::SeqScan { schema, .. }
			| PlanNode::IndexScan { schema, .. }
			| PlanNode::NestLoop { schema, .. }
			| PlanNode::HashJoin { schema, .. }
			| PlanNode::IndexJoin { schema, .. }
			| PlanNode::Aggregate { schema, .. }
			| PlanNode::OrderBy { schema, .. }
			| PlanNode::Projection { schema, .. }
			| PlanNode::Limit { schema, .. }
			| PlanNode::Output { schema, .. } => Some(schema),
			PlanNode::Insert { .. } | PlanNode::Update { .. } | PlanNode::Delete { .. } => None,
		}
	}

	/// Wrap a plan in an output node that passes the child's columns
	/// through by reference.
	pub fn output(child: PlanNode) -> PlanNode {
		let schema = OutputSchema {
			columns: child
				.schema()
				.map(|s| {
					s.columns
						.iter()
						.enumerate()
						.map(|(ordinal, column)| OutputColumn {
							name: column.name.clone(),
							ty: column.ty,
							expr: Expr::ColumnRef { input: 0, ordinal, ty: column.ty },
						})
						.collect()
				})
				.unwrap_or_default(),
		};
		PlanNode::Output { child: Box::new(child), schema }
	}
}
