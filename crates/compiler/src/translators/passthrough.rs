// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Pass-through operators: projection, limit, output.

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::{CompileError, Result};
use crate::ir::{BinOp, Builtin, FunctionBuilder, IrArena, IrType};
use crate::plan::OutputSchema;
use crate::translate::{expr_value_type, translate_expr};

/// Rewrites the consumed row through its output expressions.
pub struct ProjectionTranslator {
	idx: usize,
	child: usize,
	schema: OutputSchema,
}

impl ProjectionTranslator {
	pub fn new(idx: usize, child: usize, schema: OutputSchema) -> Self {
		Self { idx, child, schema }
	}
}

impl OperatorTranslator for ProjectionTranslator {
	fn name(&self) -> &'static str {
		"projection"
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
		let mut cols = Vec::with_capacity(self.schema.arity());
		for column in &self.schema.columns {
			let (value, _) = translate_expr(b, &column.expr, &[row])?;
			let ty = expr_value_type(&column.expr);
			let name = format!("proj_{}", b.arena().exprs.len());
			let local = b.declare_assign(name, ty, value);
			cols.push(b.local_expr(local));
		}
		let out = RowValues { cols, slot: row.slot };
		ctx.consume_parent(b, self.idx, &out)
	}
}

/// Counts rows through a query-state counter, passing along those within
/// the window.
pub struct LimitTranslator {
	idx: usize,
	child: usize,
	skip: u64,
	fetch: u64,
	counter_offset: u32,
}

impl LimitTranslator {
	pub fn new(idx: usize, child: usize, skip: u64, fetch: u64) -> Self {
		Self { idx, child, skip, fetch, counter_offset: 0 }
	}
}

impl OperatorTranslator for LimitTranslator {
	fn name(&self) -> &'static str {
		"limit"
	}

	fn prepare(&mut self, ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		self.counter_offset = ctx.state.add_field(format!("limit_seen_{}", self.idx), IrType::UInt64)?;
		Ok(())
	}

	fn init_query_state(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let field = b.state_field(ctx.state_param, self.counter_offset, IrType::UInt64);
		let zero = b.int_lit(0);
		b.assign(field, zero);
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
		let field = b.state_field(ctx.state_param, self.counter_offset, IrType::UInt64);
		let name = format!("limit_seen_{}", b.arena().exprs.len());
		let seen_local = b.declare_assign(name, IrType::UInt64, field);
		let seen = b.local_expr(seen_local);

		let total = b.int_lit((self.skip + self.fetch) as i64);
		let within = b.binary(BinOp::Lt, seen, total);
		b.emit_if(within, |b| -> Result<()> {
			let field = b.state_field(ctx.state_param, self.counter_offset, IrType::UInt64);
			let one = b.int_lit(1);
			let next = b.binary(BinOp::Add, seen, one);
			b.assign(field, next);

			let skip = b.int_lit(self.skip as i64);
			let past_skip = b.binary(BinOp::Ge, seen, skip);
			b.emit_if(past_skip, |b| ctx.consume_parent(b, self.idx, row))
		})
	}
}

/// Serializes rows into the execution context's output buffer.
pub struct OutputTranslator {
	idx: usize,
	child: usize,
	schema: OutputSchema,
}

impl OutputTranslator {
	pub fn new(idx: usize, child: usize, schema: OutputSchema) -> Self {
		Self { idx, child, schema }
	}
}

impl OperatorTranslator for OutputTranslator {
	fn name(&self) -> &'static str {
		"output"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		if self.schema.arity() == 0 {
			return Err(CompileError::InvalidPlan("output node without columns".into()));
		}
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		ctx.call_produce(b, self.child)?;
		let exec = b.local_expr(ctx.exec_param);
		b.emit_call(Builtin::OutputFinalize, vec![exec]);
		Ok(())
	}

	fn consume(
		&self,
		ctx: &mut CompilationContext,
		b: &mut FunctionBuilder<'_>,
		_from: usize,
		row: &RowValues,
	) -> Result<()> {
		let exec = b.local_expr(ctx.exec_param);
		let alloc = b.call(Builtin::OutputAlloc, vec![exec]);
		let name = format!("out_row_{}", b.arena().exprs.len());
		let out_local = b.declare_assign(name, IrType::RowPtr, alloc);
		let out = b.local_expr(out_local);

		for (i, column) in self.schema.columns.iter().enumerate() {
			let (value, _) = translate_expr(b, &column.expr, &[row])?;
			let offset = b.int_lit(i as i64 * 16);
			b.emit_call(Builtin::RowWrite, vec![out, offset, value]);
		}
		b.emit_call(Builtin::OutputAdvance, vec![exec]);
		Ok(())
	}
}
