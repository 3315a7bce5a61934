// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Hash join translators: the left/build half owns its own pipeline and
//! materializes the probe table, the right/probe half continues the
//! current pipeline.
//!
//! Build tuples store the left child's columns, 16 bytes each.

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::{CompileError, Result};
use crate::expr::Expr;
use crate::ir::{BinOp, Builtin, FunctionBuilder, IrArena, IrType, UnOp};
use crate::plan::OutputSchema;
use crate::translate::{expr_value_type, translate_expr, translate_predicate};
use crate::translators::{emit_hash, row_read_builtin};

#[derive(Clone)]
pub struct JoinLayout {
	pub jht_offset: u32,
	pub left_types: Vec<IrType>,
}

impl JoinLayout {
	pub fn col_offset(&self, i: usize) -> u32 {
		(i * 16) as u32
	}

	pub fn tuple_size(&self) -> u32 {
		(self.left_types.len() * 16) as u32
	}
}

pub struct JoinBuildTranslator {
	idx: usize,
	pub child: usize,
	left_keys: Vec<Expr>,
	left_types: Vec<IrType>,
	layout: Option<JoinLayout>,
}

impl JoinBuildTranslator {
	pub fn new(idx: usize, child: usize, left_keys: Vec<Expr>, left_types: Vec<IrType>) -> Self {
		Self { idx, child, left_keys, left_types, layout: None }
	}

	pub fn layout(&self) -> Result<&JoinLayout> {
		self.layout
			.as_ref()
			.ok_or_else(|| CompileError::Internal("join layout missing before prepare".into()))
	}
}

impl OperatorTranslator for JoinBuildTranslator {
	fn name(&self) -> &'static str {
		"join_build"
	}

	fn prepare(&mut self, ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		let jht_offset = ctx.state.add_field(format!("join_ht_{}", self.idx), IrType::JoinHashTable)?;
		self.layout = Some(JoinLayout { jht_offset, left_types: self.left_types.clone() });
		Ok(())
	}

	fn init_query_state(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let layout = self.layout()?;
		let jht = b.state_field(ctx.state_param, layout.jht_offset, IrType::JoinHashTable);
		let size = b.int_lit(layout.tuple_size() as i64);
		b.emit_call(Builtin::JhtInit, vec![jht, size]);
		Ok(())
	}

	fn teardown_query_state(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let layout = self.layout()?;
		let jht = b.state_field(ctx.state_param, layout.jht_offset, IrType::JoinHashTable);
		b.emit_call(Builtin::JhtFree, vec![jht]);
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		ctx.call_produce(b, self.child)?;
		let layout = self.layout()?;
		let jht = b.state_field(ctx.state_param, layout.jht_offset, IrType::JoinHashTable);
		b.emit_call(Builtin::JhtBuild, vec![jht]);
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

		let mut keys = Vec::with_capacity(self.left_keys.len());
		for expr in &self.left_keys {
			let (value, ty) = translate_expr(b, expr, &[row])?;
			let name = format!("jb_key_{}", b.arena().exprs.len());
			let local = b.declare_assign(name, ty, value);
			keys.push(b.local_expr(local));
		}
		let hash = emit_hash(b, &keys)?;

		let jht = b.state_field(ctx.state_param, layout.jht_offset, IrType::JoinHashTable);
		let alloc = b.call(Builtin::JhtAllocTuple, vec![jht, hash]);
		let name = format!("jb_row_{}", b.arena().exprs.len());
		let tuple_local = b.declare_assign(name, IrType::RowPtr, alloc);
		let tuple = b.local_expr(tuple_local);

		for (i, col) in row.cols.iter().enumerate() {
			let off = b.int_lit(layout.col_offset(i) as i64);
			b.emit_call(Builtin::RowWrite, vec![tuple, off, *col]);
		}
		Ok(())
	}
}

pub struct JoinProbeTranslator {
	idx: usize,
	pub child: usize,
	layout: JoinLayout,
	left_keys: Vec<Expr>,
	right_keys: Vec<Expr>,
	predicate: Option<Expr>,
	schema: OutputSchema,
}

impl JoinProbeTranslator {
	pub fn new(
		idx: usize,
		child: usize,
		layout: JoinLayout,
		left_keys: Vec<Expr>,
		right_keys: Vec<Expr>,
		predicate: Option<Expr>,
		schema: OutputSchema,
	) -> Self {
		Self { idx, child, layout, left_keys, right_keys, predicate, schema }
	}
}

impl OperatorTranslator for JoinProbeTranslator {
	fn name(&self) -> &'static str {
		"join_probe"
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
		right_row: &RowValues,
	) -> Result<()> {
		// Probe key hash from the right row.
		let mut rkeys = Vec::with_capacity(self.right_keys.len());
		for expr in &self.right_keys {
			let (value, ty) = translate_expr(b, expr, &[right_row])?;
			let name = format!("jp_key_{}", b.arena().exprs.len());
			let local = b.declare_assign(name, ty, value);
			rkeys.push(b.local_expr(local));
		}
		let hash = emit_hash(b, &rkeys)?;

		let iter_local = b.add_local(format!("jht_iter_{}", self.idx), IrType::JoinHashTableIter);
		let iter = b.local_expr(iter_local);
		let jht = b.state_field(ctx.state_param, self.layout.jht_offset, IrType::JoinHashTable);
		b.emit_call(Builtin::JhtIterInit, vec![iter, jht, hash]);

		b.emit_loop(|b| -> Result<()> {
			let has = b.call(Builtin::JhtIterHasNext, vec![iter]);
			let done = b.unary(UnOp::Not, has);
			b.emit_if(done, |b| b.brk());

			let row_call = b.call(Builtin::JhtIterGetRow, vec![iter]);
			let name = format!("jp_match_{}", b.arena().exprs.len());
			let row_local = b.declare_assign(name, IrType::RowPtr, row_call);
			let row_ptr = b.local_expr(row_local);

			// Rehydrate the left row from the build tuple.
			let mut lcols = Vec::with_capacity(self.layout.left_types.len());
			for (i, ty) in self.layout.left_types.iter().enumerate() {
				let read = row_read_builtin(*ty)?;
				let off = b.int_lit(self.layout.col_offset(i) as i64);
				let value = b.call(read, vec![row_ptr, off]);
				let name = format!("jp_lcol_{}", b.arena().exprs.len());
				let local = b.declare_assign(name, *ty, value);
				lcols.push(b.local_expr(local));
			}
			let left_row = RowValues::new(lcols);

			// Hash buckets only narrow by hash; compare the keys proper.
			let mut key_ok = None;
			for (lk_expr, rk) in self.left_keys.iter().zip(&rkeys) {
				let (lk, _) = translate_expr(b, lk_expr, &[&left_row])?;
				let eq = b.call(Builtin::SqlCmpEq, vec![lk, *rk]);
				let eq = b.call(Builtin::ForceTruth, vec![eq]);
				key_ok = Some(match key_ok {
					Some(prev) => b.binary(BinOp::And, prev, eq),
					None => eq,
				});
			}
			let key_ok = key_ok
				.ok_or_else(|| CompileError::Internal("hash join without keys".into()))?;

			b.emit_if(key_ok, |b| -> Result<()> {
				let emit_out = |b: &mut FunctionBuilder<'_>, ctx: &mut CompilationContext| -> Result<()> {
					let mut out = Vec::with_capacity(self.schema.arity());
					for column in &self.schema.columns {
						let (value, _) =
							translate_expr(b, &column.expr, &[&left_row, right_row])?;
						let ty = expr_value_type(&column.expr);
						let name = format!("jp_out_{}", b.arena().exprs.len());
						let local = b.declare_assign(name, ty, value);
						out.push(b.local_expr(local));
					}
					ctx.consume_parent(b, self.idx, &RowValues::new(out))
				};

				if let Some(predicate) = &self.predicate {
					let cond = translate_predicate(b, predicate, &[&left_row, right_row])?;
					b.emit_if(cond, |b| emit_out(b, ctx))?;
					Ok(())
				} else {
					emit_out(b, ctx)
				}
			})?;
			Ok(())
		})?;
		Ok(())
	}
}
