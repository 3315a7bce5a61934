// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! DML translators. Conflicts surface as boolean returns from the
//! storage primitives; the emitted code branches, aborts the transaction
//! and bails out of the pipeline.

use quarry_core::{ColumnOid, TableOid};

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::{CompileError, Result};
use crate::expr::Expr;
use crate::ir::{Builtin, ExprId, FunctionBuilder, IrArena, IrType, UnOp};
use crate::plan::{IndexMaintenance, ScanColumn};
use crate::translate::translate_expr;

fn emit_abort_and_bail(b: &mut FunctionBuilder<'_>, ctx: &CompilationContext, failed: ExprId) {
	b.emit_if(failed, |b| {
		let exec = b.local_expr(ctx.exec_param);
		b.emit_call(Builtin::TxnAbort, vec![exec]);
		b.ret(None);
	});
}

/// Inserts literal rows and maintains the table's indexes.
pub struct InsertTranslator {
	table: TableOid,
	columns: Vec<ScanColumn>,
	rows: Vec<Vec<Expr>>,
	indexes: Vec<IndexMaintenance>,
}

impl InsertTranslator {
	pub fn new(
		table: TableOid,
		columns: Vec<ScanColumn>,
		rows: Vec<Vec<Expr>>,
		indexes: Vec<IndexMaintenance>,
	) -> Self {
		Self { table, columns, rows, indexes }
	}
}

impl OperatorTranslator for InsertTranslator {
	fn name(&self) -> &'static str {
		"insert"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		for row in &self.rows {
			if row.len() != self.columns.len() {
				return Err(CompileError::InvalidPlan("insert row arity mismatch".into()));
			}
		}
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let cols = b.u32_list_lit(self.columns.iter().map(|c| c.oid.0).collect());

		for row_exprs in &self.rows {
			// Stage the row image.
			let size = b.int_lit(row_exprs.len() as i64 * 16);
			let alloc = b.call(Builtin::RowAlloc, vec![size]);
			let name = format!("ins_row_{}", b.arena().exprs.len());
			let row_local = b.declare_assign(name, IrType::RowPtr, alloc);
			let row = b.local_expr(row_local);

			let mut staged = Vec::with_capacity(row_exprs.len());
			for (i, expr) in row_exprs.iter().enumerate() {
				let (value, ty) = translate_expr(b, expr, &[])?;
				let name = format!("ins_val_{}", b.arena().exprs.len());
				let local = b.declare_assign(name, ty, value);
				let value = b.local_expr(local);
				let off = b.int_lit(i as i64 * 16);
				b.emit_call(Builtin::RowWrite, vec![row, off, value]);
				staged.push(value);
			}

			let exec = b.local_expr(ctx.exec_param);
			let table = b.int_lit(self.table.0 as i64);
			let insert = b.call(Builtin::TableInsert, vec![exec, table, cols, row]);
			let name = format!("ins_slot_{}", b.arena().exprs.len());
			let slot_local = b.declare_assign(name, IrType::UInt64, insert);
			let slot = b.local_expr(slot_local);

			for index in &self.indexes {
				let mut key_vals = Vec::with_capacity(index.key_ordinals.len());
				for ordinal in &index.key_ordinals {
					key_vals.push(*staged.get(*ordinal).ok_or_else(|| {
						CompileError::InvalidPlan("index key ordinal out of range".into())
					})?);
				}
				let key_size = b.int_lit(key_vals.len() as i64 * 16);
				let alloc = b.call(Builtin::RowAlloc, vec![key_size]);
				let name = format!("ins_key_{}", b.arena().exprs.len());
				let key_local = b.declare_assign(name, IrType::RowPtr, alloc);
				let key = b.local_expr(key_local);
				for (i, value) in key_vals.iter().enumerate() {
					let off = b.int_lit(i as i64 * 16);
					b.emit_call(Builtin::RowWrite, vec![key, off, *value]);
				}

				let exec = b.local_expr(ctx.exec_param);
				let oid = b.int_lit(index.oid.0 as i64);
				let unique = b.int_lit(index.unique as i64);
				let ok = b.call(Builtin::IndexInsert, vec![exec, oid, key, slot, unique]);
				let failed = b.unary(UnOp::Not, ok);
				emit_abort_and_bail(b, ctx, failed);
			}
		}
		Ok(())
	}
}

/// Per-row table update over a child scan that exposes tuple slots.
pub struct UpdateTranslator {
	pub child: usize,
	table: TableOid,
	assignments: Vec<(ColumnOid, Expr)>,
}

impl UpdateTranslator {
	pub fn new(child: usize, table: TableOid, assignments: Vec<(ColumnOid, Expr)>) -> Self {
		Self { child, table, assignments }
	}
}

impl OperatorTranslator for UpdateTranslator {
	fn name(&self) -> &'static str {
		"update"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		if self.assignments.is_empty() {
			return Err(CompileError::InvalidPlan("update without assignments".into()));
		}
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
		row: &RowValues,
	) -> Result<()> {
		let slot = row
			.slot
			.ok_or_else(|| CompileError::InvalidPlan("update requires a slot-providing child".into()))?;

		let size = b.int_lit(self.assignments.len() as i64 * 16);
		let alloc = b.call(Builtin::RowAlloc, vec![size]);
		let name = format!("upd_row_{}", b.arena().exprs.len());
		let row_local = b.declare_assign(name, IrType::RowPtr, alloc);
		let update_row = b.local_expr(row_local);

		for (i, (_, expr)) in self.assignments.iter().enumerate() {
			let (value, ty) = translate_expr(b, expr, &[row])?;
			let name = format!("upd_val_{}", b.arena().exprs.len());
			let local = b.declare_assign(name, ty, value);
			let value = b.local_expr(local);
			let off = b.int_lit(i as i64 * 16);
			b.emit_call(Builtin::RowWrite, vec![update_row, off, value]);
		}

		let exec = b.local_expr(ctx.exec_param);
		let table = b.int_lit(self.table.0 as i64);
		let cols = b.u32_list_lit(self.assignments.iter().map(|(oid, _)| oid.0).collect());
		let ok = b.call(Builtin::TableUpdate, vec![exec, table, cols, slot, update_row]);
		let failed = b.unary(UnOp::Not, ok);
		emit_abort_and_bail(b, ctx, failed);
		Ok(())
	}
}

/// Per-row table delete over a child scan that exposes tuple slots.
pub struct DeleteTranslator {
	pub child: usize,
	table: TableOid,
}

impl DeleteTranslator {
	pub fn new(child: usize, table: TableOid) -> Self {
		Self { child, table }
	}
}

impl OperatorTranslator for DeleteTranslator {
	fn name(&self) -> &'static str {
		"delete"
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
		row: &RowValues,
	) -> Result<()> {
		let slot = row
			.slot
			.ok_or_else(|| CompileError::InvalidPlan("delete requires a slot-providing child".into()))?;

		let exec = b.local_expr(ctx.exec_param);
		let table = b.int_lit(self.table.0 as i64);
		let ok = b.call(Builtin::TableDelete, vec![exec, table, slot]);
		let failed = b.unary(UnOp::Not, ok);
		emit_abort_and_bail(b, ctx, failed);
		Ok(())
	}
}
