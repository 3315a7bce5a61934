// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Index-driven translators: range scans from constant bounds, and the
//! index nested-loop join probing per outer row.

use quarry_core::{IndexOid, TableOid, Value};

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::Result;
use crate::expr::Expr;
use crate::ir::{Builtin, ExprId, FunctionBuilder, IrArena, IrType, UnOp};
use crate::plan::{OutputSchema, ScanColumn, ScanDirection};
use crate::translate::{expr_value_type, sql_value_type, translate_expr, translate_predicate, value_to_sql};
use crate::translators::index_get_builtin;

fn init_iter(
	b: &mut FunctionBuilder<'_>,
	ctx: &CompilationContext,
	idx: usize,
	index: IndexOid,
	table: TableOid,
	columns: &[ScanColumn],
) -> ExprId {
	let iter_local = b.add_local(format!("index_iter_{}", idx), IrType::IndexIter);
	let iter = b.local_expr(iter_local);
	let exec = b.local_expr(ctx.exec_param);
	let index_lit = b.int_lit(index.0 as i64);
	let table_lit = b.int_lit(table.0 as i64);
	let cols = b.u32_list_lit(columns.iter().map(|c| c.oid.0).collect());
	b.emit_call(Builtin::IndexIterInit, vec![iter, exec, index_lit, table_lit, cols]);
	iter
}

/// Write key values into a fresh arena row (16 bytes per column).
fn key_row(b: &mut FunctionBuilder<'_>, values: &[ExprId]) -> ExprId {
	let size = b.int_lit(values.len() as i64 * 16);
	let alloc = b.call(Builtin::RowAlloc, vec![size]);
	let name = format!("key_row_{}", b.arena().exprs.len());
	let local = b.declare_assign(name, IrType::RowPtr, alloc);
	let row = b.local_expr(local);
	for (i, value) in values.iter().enumerate() {
		let off = b.int_lit(i as i64 * 16);
		b.emit_call(Builtin::RowWrite, vec![row, off, *value]);
	}
	row
}

/// Materialize the table columns of the iterator's current match.
fn materialize_inner(b: &mut FunctionBuilder<'_>, iter: ExprId, columns: &[ScanColumn]) -> RowValues {
	let mut cols = Vec::with_capacity(columns.len());
	for (ordinal, column) in columns.iter().enumerate() {
		let ord = b.int_lit(ordinal as i64);
		let get = b.call(index_get_builtin(column.ty), vec![iter, ord]);
		let name = format!("idx_col{}_{}", ordinal, b.arena().exprs.len());
		let local = b.declare_assign(name, sql_value_type(column.ty), get);
		cols.push(b.local_expr(local));
	}
	RowValues::new(cols)
}

pub struct IndexScanTranslator {
	idx: usize,
	index: IndexOid,
	table: TableOid,
	columns: Vec<ScanColumn>,
	lo: Vec<Value>,
	hi: Vec<Value>,
	direction: ScanDirection,
	limit: Option<u64>,
	predicate: Option<Expr>,
	schema: OutputSchema,
}

impl IndexScanTranslator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		idx: usize,
		index: IndexOid,
		table: TableOid,
		columns: Vec<ScanColumn>,
		lo: Vec<Value>,
		hi: Vec<Value>,
		direction: ScanDirection,
		limit: Option<u64>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	) -> Self {
		Self { idx, index, table, columns, lo, hi, direction, limit, predicate, schema }
	}
}

impl OperatorTranslator for IndexScanTranslator {
	fn name(&self) -> &'static str {
		"index_scan"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let iter = init_iter(b, ctx, self.idx, self.index, self.table, &self.columns);

		let mut lo_vals = Vec::with_capacity(self.lo.len());
		for value in &self.lo {
			lo_vals.push(value_to_sql(b, value)?);
		}
		let mut hi_vals = Vec::with_capacity(self.hi.len());
		for value in &self.hi {
			hi_vals.push(value_to_sql(b, value)?);
		}
		let lo = key_row(b, &lo_vals);
		let hi = key_row(b, &hi_vals);
		let asc = b.int_lit(matches!(self.direction, ScanDirection::Ascending) as i64);
		let limit = b.int_lit(self.limit.unwrap_or(0) as i64);
		b.emit_call(Builtin::IndexIterScanRange, vec![iter, lo, hi, asc, limit]);

		b.emit_loop(|b| -> Result<()> {
			let has = b.call(Builtin::IndexIterAdvance, vec![iter]);
			let done = b.unary(UnOp::Not, has);
			b.emit_if(done, |b| b.brk());

			let inner = materialize_inner(b, iter, &self.columns);

			let emit_out = |b: &mut FunctionBuilder<'_>, ctx: &mut CompilationContext| -> Result<()> {
				let mut out = Vec::with_capacity(self.schema.arity());
				for column in &self.schema.columns {
					let (value, _) = translate_expr(b, &column.expr, &[&inner])?;
					let ty = expr_value_type(&column.expr);
					let name = format!("iscan_out_{}", b.arena().exprs.len());
					let local = b.declare_assign(name, ty, value);
					out.push(b.local_expr(local));
				}
				ctx.consume_parent(b, self.idx, &RowValues::new(out))
			};

			if let Some(predicate) = &self.predicate {
				let cond = translate_predicate(b, predicate, &[&inner])?;
				b.emit_if(cond, |b| emit_out(b, ctx))?;
			} else {
				emit_out(b, ctx)?;
			}
			Ok(())
		})?;

		b.emit_call(Builtin::IndexIterFree, vec![iter]);
		Ok(())
	}
}

pub struct IndexJoinTranslator {
	idx: usize,
	pub child: usize,
	index: IndexOid,
	table: TableOid,
	columns: Vec<ScanColumn>,
	key_exprs: Vec<Expr>,
	predicate: Option<Expr>,
	schema: OutputSchema,
}

impl IndexJoinTranslator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		idx: usize,
		child: usize,
		index: IndexOid,
		table: TableOid,
		columns: Vec<ScanColumn>,
		key_exprs: Vec<Expr>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	) -> Self {
		Self { idx, child, index, table, columns, key_exprs, predicate, schema }
	}
}

impl OperatorTranslator for IndexJoinTranslator {
	fn name(&self) -> &'static str {
		"index_join"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		ctx.call_produce(b, self.child)
	}

	fn consume(
		&self,
		ctx: &mut CompilationContext,
		b: &mut FunctionBuilder<'_>,
		_from: usize,
		outer: &RowValues,
	) -> Result<()> {
		let iter = init_iter(b, ctx, self.idx, self.index, self.table, &self.columns);

		// Index key from the outer row's columns.
		let mut key_vals = Vec::with_capacity(self.key_exprs.len());
		for expr in &self.key_exprs {
			let (value, ty) = translate_expr(b, expr, &[outer])?;
			let name = format!("ij_key_{}", b.arena().exprs.len());
			let local = b.declare_assign(name, ty, value);
			key_vals.push(b.local_expr(local));
		}
		let key = key_row(b, &key_vals);
		b.emit_call(Builtin::IndexIterScanKey, vec![iter, key]);

		b.emit_loop(|b| -> Result<()> {
			let has = b.call(Builtin::IndexIterAdvance, vec![iter]);
			let done = b.unary(UnOp::Not, has);
			b.emit_if(done, |b| b.brk());

			let inner = materialize_inner(b, iter, &self.columns);

			let emit_out = |b: &mut FunctionBuilder<'_>, ctx: &mut CompilationContext| -> Result<()> {
				let mut out = Vec::with_capacity(self.schema.arity());
				for column in &self.schema.columns {
					let (value, _) = translate_expr(b, &column.expr, &[outer, &inner])?;
					let ty = expr_value_type(&column.expr);
					let name = format!("ij_out_{}", b.arena().exprs.len());
					let local = b.declare_assign(name, ty, value);
					out.push(b.local_expr(local));
				}
				ctx.consume_parent(b, self.idx, &RowValues::new(out))
			};

			if let Some(predicate) = &self.predicate {
				let cond = translate_predicate(b, predicate, &[outer, &inner])?;
				b.emit_if(cond, |b| emit_out(b, ctx))?;
			} else {
				emit_out(b, ctx)?;
			}
			Ok(())
		})?;

		b.emit_call(Builtin::IndexIterFree, vec![iter]);
		Ok(())
	}
}
