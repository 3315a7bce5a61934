// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Nested-loop join. Both sides live in the current pipeline: the outer
//! side drives, and each outer row re-produces the inner subtree with the
//! outer row stashed in scope.

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::{CompileError, Result};
use crate::expr::Expr;
use crate::ir::{FunctionBuilder, IrArena};
use crate::plan::OutputSchema;
use crate::translate::{expr_value_type, translate_expr, translate_predicate};

pub struct NestLoopTranslator {
	idx: usize,
	pub left: usize,
	pub right: usize,
	predicate: Option<Expr>,
	schema: OutputSchema,
}

impl NestLoopTranslator {
	pub fn new(idx: usize, left: usize, right: usize, predicate: Option<Expr>, schema: OutputSchema) -> Self {
		Self { idx, left, right, predicate, schema }
	}
}

impl OperatorTranslator for NestLoopTranslator {
	fn name(&self) -> &'static str {
		"nested_loop"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		ctx.call_produce(b, self.left)
	}

	fn consume(
		&self,
		ctx: &mut CompilationContext,
		b: &mut FunctionBuilder<'_>,
		from: usize,
		row: &RowValues,
	) -> Result<()> {
		if from == self.left {
			// Outer row arrived: run the inner side underneath it.
			ctx.row_stash.insert(self.idx, row.clone());
			ctx.call_produce(b, self.right)?;
			ctx.row_stash.remove(&self.idx);
			Ok(())
		} else if from == self.right {
			let outer = ctx
				.row_stash
				.get(&self.idx)
				.cloned()
				.ok_or_else(|| CompileError::Internal("inner row without outer in scope".into()))?;

			let emit_out = |b: &mut FunctionBuilder<'_>, ctx: &mut CompilationContext| -> Result<()> {
				let mut out = Vec::with_capacity(self.schema.arity());
				for column in &self.schema.columns {
					let (value, _) = translate_expr(b, &column.expr, &[&outer, row])?;
					let ty = expr_value_type(&column.expr);
					let name = format!("nlj_out_{}", b.arena().exprs.len());
					let local = b.declare_assign(name, ty, value);
					out.push(b.local_expr(local));
				}
				ctx.consume_parent(b, self.idx, &RowValues::new(out))
			};

			if let Some(predicate) = &self.predicate {
				let cond = translate_predicate(b, predicate, &[&outer, row])?;
				b.emit_if(cond, |b| emit_out(b, ctx))?;
				Ok(())
			} else {
				emit_out(b, ctx)
			}
		} else {
			Err(CompileError::Internal("nested loop consumed from unknown child".into()))
		}
	}
}
