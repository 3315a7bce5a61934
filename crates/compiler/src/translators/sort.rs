// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Sort translators: the build half fills the sorter arena and sorts, the
//! scan half iterates in order and rehydrates rows.
//!
//! Tuple layout: child columns first (16 bytes each), then the computed
//! sort keys, so the comparator never re-evaluates key expressions.

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::{CompileError, Result};
use crate::ir::{Builtin, FuncId, FunctionBuilder, IrArena, IrType, UnOp};
use crate::plan::{OutputSchema, SortKey};
use crate::translate::{expr_value_type, translate_expr};
use crate::translators::row_read_builtin;

#[derive(Clone)]
pub struct SortLayout {
	pub sorter_offset: u32,
	pub child_types: Vec<IrType>,
	pub key_types: Vec<IrType>,
	pub cmp_fn: FuncId,
	pub limit: Option<u64>,
}

impl SortLayout {
	pub fn col_offset(&self, i: usize) -> u32 {
		(i * 16) as u32
	}

	pub fn key_offset(&self, k: usize) -> u32 {
		((self.child_types.len() + k) * 16) as u32
	}

	pub fn tuple_size(&self) -> u32 {
		((self.child_types.len() + self.key_types.len()) * 16) as u32
	}
}

pub struct SortBuildTranslator {
	idx: usize,
	pub child: usize,
	keys: Vec<SortKey>,
	child_types: Vec<IrType>,
	limit: Option<u64>,
	layout: Option<SortLayout>,
}

impl SortBuildTranslator {
	pub fn new(idx: usize, child: usize, keys: Vec<SortKey>, child_types: Vec<IrType>, limit: Option<u64>) -> Self {
		Self { idx, child, keys, child_types, limit, layout: None }
	}

	pub fn layout(&self) -> Result<&SortLayout> {
		self.layout
			.as_ref()
			.ok_or_else(|| CompileError::Internal("sort layout missing before prepare".into()))
	}
}

impl OperatorTranslator for SortBuildTranslator {
	fn name(&self) -> &'static str {
		"sort_build"
	}

	fn prepare(&mut self, ctx: &mut CompilationContext, arena: &mut IrArena) -> Result<()> {
		let sorter_offset = ctx.state.add_field(format!("sorter_{}", self.idx), IrType::Sorter)?;
		let key_types: Vec<IrType> = self.keys.iter().map(|k| expr_value_type(&k.expr)).collect();

		// Comparator over two sorter tuples; -1 orders lhs first.
		let cmp_fn = arena.declare_function(format!("sorter_cmp_{}", self.idx), IrType::Int32);
		{
			let mut b = FunctionBuilder::new(arena, cmp_fn);
			let lhs_param = b.add_param("lhs", IrType::RowPtr);
			let rhs_param = b.add_param("rhs", IrType::RowPtr);
			let lhs = b.local_expr(lhs_param);
			let rhs = b.local_expr(rhs_param);
			let base = self.child_types.len();
			for (k, (key, ty)) in self.keys.iter().zip(&key_types).enumerate() {
				let read = row_read_builtin(*ty)?;
				let off_a = b.int_lit(((base + k) * 16) as i64);
				let a_call = b.call(read, vec![lhs, off_a]);
				let name = format!("cmp_a_{}", b.arena().exprs.len());
				let a_local = b.declare_assign(name, *ty, a_call);
				let a = b.local_expr(a_local);

				let off_b = b.int_lit(((base + k) * 16) as i64);
				let b_call = b.call(read, vec![rhs, off_b]);
				let name = format!("cmp_b_{}", b.arena().exprs.len());
				let b_local = b.declare_assign(name, *ty, b_call);
				let bv = b.local_expr(b_local);

				let (first, second) = if key.descending { (1i64, -1i64) } else { (-1i64, 1i64) };

				let lt = b.call(Builtin::SqlCmpLt, vec![a, bv]);
				let lt = b.call(Builtin::ForceTruth, vec![lt]);
				b.emit_if(lt, |b| {
					let r = b.int_lit(first);
					b.ret(Some(r));
				});
				let gt = b.call(Builtin::SqlCmpGt, vec![a, bv]);
				let gt = b.call(Builtin::ForceTruth, vec![gt]);
				b.emit_if(gt, |b| {
					let r = b.int_lit(second);
					b.ret(Some(r));
				});
			}
			let zero = b.int_lit(0);
			b.ret(Some(zero));
			b.finish();
		}

		self.layout = Some(SortLayout {
			sorter_offset,
			child_types: self.child_types.clone(),
			key_types,
			cmp_fn,
			limit: self.limit,
		});
		Ok(())
	}

	fn init_query_state(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let layout = self.layout()?;
		let sorter = b.state_field(ctx.state_param, layout.sorter_offset, IrType::Sorter);
		let cmp = b.func_lit(layout.cmp_fn);
		let size = b.int_lit(layout.tuple_size() as i64);
		b.emit_call(Builtin::SorterInit, vec![sorter, cmp, size]);
		Ok(())
	}

	fn teardown_query_state(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let layout = self.layout()?;
		let sorter = b.state_field(ctx.state_param, layout.sorter_offset, IrType::Sorter);
		b.emit_call(Builtin::SorterFree, vec![sorter]);
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		ctx.call_produce(b, self.child)?;
		let layout = self.layout()?;
		let sorter = b.state_field(ctx.state_param, layout.sorter_offset, IrType::Sorter);
		b.emit_call(Builtin::SorterSort, vec![sorter]);
		Ok(())
	}

	fn consume(
		&self,
		ctx: &mut CompilationContext,
		b: &mut FunctionBuilder<'_>,
		_from: usize,
		row: &RowValues,
	) -> Result<()> {
		let layout = self.layout()?;
		if row.cols.len() != layout.child_types.len() {
			return Err(CompileError::Internal("sort input arity mismatch".into()));
		}

		let sorter = b.state_field(ctx.state_param, layout.sorter_offset, IrType::Sorter);
		let alloc = match layout.limit {
			Some(limit) => {
				let k = b.int_lit(limit as i64);
				b.call(Builtin::SorterAllocTupleTopK, vec![sorter, k])
			}
			None => b.call(Builtin::SorterAllocTuple, vec![sorter]),
		};
		let name = format!("sort_row_{}", b.arena().exprs.len());
		let tuple_local = b.declare_assign(name, IrType::RowPtr, alloc);
		let tuple = b.local_expr(tuple_local);

		for (i, col) in row.cols.iter().enumerate() {
			let off = b.int_lit(layout.col_offset(i) as i64);
			b.emit_call(Builtin::RowWrite, vec![tuple, off, *col]);
		}
		for (k, key) in self.keys.iter().enumerate() {
			let (value, _) = translate_expr(b, &key.expr, &[row])?;
			let off = b.int_lit(layout.key_offset(k) as i64);
			b.emit_call(Builtin::RowWrite, vec![tuple, off, value]);
		}

		if let Some(limit) = layout.limit {
			let sorter = b.state_field(ctx.state_param, layout.sorter_offset, IrType::Sorter);
			let k = b.int_lit(limit as i64);
			b.emit_call(Builtin::SorterAllocTupleTopKFinish, vec![sorter, k]);
		}
		Ok(())
	}
}

pub struct SortScanTranslator {
	idx: usize,
	layout: SortLayout,
	schema: OutputSchema,
}

impl SortScanTranslator {
	pub fn new(idx: usize, layout: SortLayout, schema: OutputSchema) -> Self {
		Self { idx, layout, schema }
	}
}

impl OperatorTranslator for SortScanTranslator {
	fn name(&self) -> &'static str {
		"sort_scan"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let iter_local = b.add_local(format!("sort_iter_{}", self.idx), IrType::SorterIter);
		let iter = b.local_expr(iter_local);
		let sorter = b.state_field(ctx.state_param, self.layout.sorter_offset, IrType::Sorter);
		b.emit_call(Builtin::SorterIterInit, vec![iter, sorter]);

		b.emit_loop(|b| -> Result<()> {
			let has = b.call(Builtin::SorterIterHasNext, vec![iter]);
			let done = b.unary(UnOp::Not, has);
			b.emit_if(done, |b| b.brk());

			let row_call = b.call(Builtin::SorterIterGetRow, vec![iter]);
			let name = format!("sorted_row_{}", b.arena().exprs.len());
			let row_local = b.declare_assign(name, IrType::RowPtr, row_call);
			let row_ptr = b.local_expr(row_local);

			let mut cols = Vec::with_capacity(self.layout.child_types.len());
			for (i, ty) in self.layout.child_types.iter().enumerate() {
				let read = row_read_builtin(*ty)?;
				let off = b.int_lit(self.layout.col_offset(i) as i64);
				let value = b.call(read, vec![row_ptr, off]);
				let name = format!("sort_col_{}", b.arena().exprs.len());
				let local = b.declare_assign(name, *ty, value);
				cols.push(b.local_expr(local));
			}
			let child_row = RowValues::new(cols);

			let mut out = Vec::with_capacity(self.schema.arity());
			for column in &self.schema.columns {
				let (value, _) = translate_expr(b, &column.expr, &[&child_row])?;
				let ty = expr_value_type(&column.expr);
				let name = format!("sort_out_{}", b.arena().exprs.len());
				let local = b.declare_assign(name, ty, value);
				out.push(b.local_expr(local));
			}
			ctx.consume_parent(b, self.idx, &RowValues::new(out))?;

			b.emit_call(Builtin::SorterIterNext, vec![iter]);
			Ok(())
		})?;
		Ok(())
	}
}
