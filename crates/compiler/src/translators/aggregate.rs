// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Hash-aggregation translators: a build half terminating the child
//! pipeline and a scan half sourcing the next one.
//!
//! Payload layout: group values first (16 bytes each), aggregator states
//! after them (fixed-size slots).

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::{CompileError, Result};
use crate::expr::{AggFunc, Expr};
use crate::ir::{AggKind, Builtin, FuncId, FunctionBuilder, IrArena, IrType, UnOp};
use crate::plan::{AggSpec, OutputSchema};
use crate::translate::{expr_value_type, translate_expr, translate_predicate};
use crate::translators::{emit_hash, ptr_offset, row_read_builtin};

/// Resolve the runtime aggregator kind from the aggregate function and
/// its argument type.
fn agg_kind(spec: &AggSpec) -> Result<AggKind> {
	let arg_ty = spec.arg.as_ref().map(expr_value_type);
	Ok(match (spec.func, arg_ty) {
		(AggFunc::CountStar, _) => AggKind::CountStar,
		(AggFunc::Count, _) => AggKind::Count,
		(AggFunc::Sum, Some(IrType::SqlReal)) => AggKind::SumReal,
		(AggFunc::Sum, _) => AggKind::SumInt,
		(AggFunc::Max, Some(IrType::SqlReal)) => AggKind::MaxReal,
		(AggFunc::Max, _) => AggKind::MaxInt,
		(AggFunc::Min, Some(IrType::SqlReal)) => AggKind::MinReal,
		(AggFunc::Min, _) => AggKind::MinInt,
		(AggFunc::Avg, _) => AggKind::Avg,
	})
}

/// Configuration shared by the two halves.
#[derive(Clone)]
pub struct AggLayout {
	pub ht_offset: u32,
	pub scratch_offset: u32,
	pub group_types: Vec<IrType>,
	pub kinds: Vec<AggKind>,
	pub key_eq_fn: FuncId,
}

impl AggLayout {
	pub fn group_offset(&self, i: usize) -> u32 {
		(i * 16) as u32
	}

	pub fn agg_offset(&self, j: usize) -> u32 {
		(self.group_types.len() * 16 + j * AggKind::STATE_SIZE) as u32
	}

	pub fn payload_size(&self) -> u32 {
		(self.group_types.len() * 16 + self.kinds.len() * AggKind::STATE_SIZE) as u32
	}
}

pub struct AggBuildTranslator {
	idx: usize,
	pub child: usize,
	group_by: Vec<Expr>,
	aggregates: Vec<AggSpec>,
	layout: Option<AggLayout>,
}

impl AggBuildTranslator {
	pub fn new(idx: usize, child: usize, group_by: Vec<Expr>, aggregates: Vec<AggSpec>) -> Self {
		Self { idx, child, group_by, aggregates, layout: None }
	}

	pub fn layout(&self) -> Result<&AggLayout> {
		self.layout
			.as_ref()
			.ok_or_else(|| CompileError::Internal("aggregation layout missing before prepare".into()))
	}

	fn kinds(&self) -> Result<Vec<AggKind>> {
		self.aggregates.iter().map(agg_kind).collect()
	}
}

impl OperatorTranslator for AggBuildTranslator {
	fn name(&self) -> &'static str {
		"agg_build"
	}

	fn prepare(&mut self, ctx: &mut CompilationContext, arena: &mut IrArena) -> Result<()> {
		if self.group_by.is_empty() {
			return Err(CompileError::InvalidPlan("aggregation requires group-by columns".into()));
		}
		let ht_offset = ctx.state.add_field(format!("agg_ht_{}", self.idx), IrType::AggHashTable)?;
		let scratch_offset = ctx.state.add_field(format!("agg_scratch_{}", self.idx), IrType::RowPtr)?;
		let group_types: Vec<IrType> = self.group_by.iter().map(expr_value_type).collect();
		let kinds = self.kinds()?;

		// Key-equality helper: entry row vs probe row, null-aware.
		let key_eq_fn = arena.declare_function(format!("agg_key_eq_{}", self.idx), IrType::Bool);
		{
			let mut b = FunctionBuilder::new(arena, key_eq_fn);
			let entry_param = b.add_param("entry", IrType::RowPtr);
			let probe_param = b.add_param("probe", IrType::RowPtr);
			let entry = b.local_expr(entry_param);
			let probe = b.local_expr(probe_param);
			for (i, ty) in group_types.iter().enumerate() {
				let read = row_read_builtin(*ty)?;
				let off_a = b.int_lit(i as i64 * 16);
				let a = b.call(read, vec![entry, off_a]);
				let name = format!("eq_a_{}", b.arena().exprs.len());
				let a_local = b.declare_assign(name, *ty, a);
				let a = b.local_expr(a_local);

				let off_b = b.int_lit(i as i64 * 16);
				let bv = b.call(read, vec![probe, off_b]);
				let name = format!("eq_b_{}", b.arena().exprs.len());
				let b_local = b.declare_assign(name, *ty, bv);
				let bv = b.local_expr(b_local);

				let a_null = b.call(Builtin::SqlIsNull, vec![a]);
				let b_null = b.call(Builtin::SqlIsNull, vec![bv]);
				let null_mismatch = b.binary(crate::ir::BinOp::Ne, a_null, b_null);
				b.emit_if(null_mismatch, |b| {
					let f = b.bool_lit(false);
					b.ret(Some(f));
				});

				let a_set = b.call(Builtin::SqlIsNotNull, vec![a]);
				b.emit_if(a_set, |b| {
					let eq = b.call(Builtin::SqlCmpEq, vec![a, bv]);
					let truth = b.call(Builtin::ForceTruth, vec![eq]);
					let ne = b.unary(UnOp::Not, truth);
					b.emit_if(ne, |b| {
						let f = b.bool_lit(false);
						b.ret(Some(f));
					});
				});
			}
			let t = b.bool_lit(true);
			b.ret(Some(t));
			b.finish();
		}

		self.layout = Some(AggLayout { ht_offset, scratch_offset, group_types, kinds, key_eq_fn });
		Ok(())
	}

	fn init_query_state(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let layout = self.layout()?;
		let ht = b.state_field(ctx.state_param, layout.ht_offset, IrType::AggHashTable);
		let payload = b.int_lit(layout.payload_size() as i64);
		b.emit_call(Builtin::AggHtInit, vec![ht, payload]);

		let scratch_size = b.int_lit(layout.group_types.len() as i64 * 16);
		let scratch = b.call(Builtin::RowAlloc, vec![scratch_size]);
		let field = b.state_field(ctx.state_param, layout.scratch_offset, IrType::RowPtr);
		b.assign(field, scratch);
		Ok(())
	}

	fn teardown_query_state(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let layout = self.layout()?;
		let ht = b.state_field(ctx.state_param, layout.ht_offset, IrType::AggHashTable);
		b.emit_call(Builtin::AggHtFree, vec![ht]);
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
		let layout = self.layout()?;

		// Group key values, bound once.
		let mut groups = Vec::with_capacity(self.group_by.len());
		for (i, expr) in self.group_by.iter().enumerate() {
			let (value, ty) = translate_expr(b, expr, &[row])?;
			let name = format!("agg_g{}_{}", i, b.arena().exprs.len());
			let local = b.declare_assign(name, ty, value);
			groups.push((b.local_expr(local), ty));
		}
		let hash = emit_hash(b, &groups.iter().map(|(e, _)| *e).collect::<Vec<_>>())?;

		// Serialize the key into the probe scratch row.
		let scratch_field = b.state_field(ctx.state_param, layout.scratch_offset, IrType::RowPtr);
		let name = format!("agg_probe_{}", b.arena().exprs.len());
		let scratch_local = b.declare_assign(name, IrType::RowPtr, scratch_field);
		let scratch = b.local_expr(scratch_local);
		for (i, (value, _)) in groups.iter().enumerate() {
			let off = b.int_lit(i as i64 * 16);
			b.emit_call(Builtin::RowWrite, vec![scratch, off, *value]);
		}

		let ht = b.state_field(ctx.state_param, layout.ht_offset, IrType::AggHashTable);
		let key_eq = b.func_lit(layout.key_eq_fn);
		let lookup = b.call(Builtin::AggHtLookup, vec![ht, hash, key_eq, scratch]);
		let name = format!("agg_entry_{}", b.arena().exprs.len());
		let entry_local = b.declare_assign(name, IrType::RowPtr, lookup);
		let entry = b.local_expr(entry_local);

		// Miss: insert a fresh entry, write group values, init aggregators.
		let missed = b.call(Builtin::PtrIsNull, vec![entry]);
		b.emit_if(missed, |b| -> Result<()> {
			let ht = b.state_field(ctx.state_param, layout.ht_offset, IrType::AggHashTable);
			let inserted = b.call(Builtin::AggHtInsert, vec![ht, hash]);
			let entry_dst = b.local_expr(entry_local);
			b.assign(entry_dst, inserted);
			let entry = b.local_expr(entry_local);
			for (i, (value, _)) in groups.iter().enumerate() {
				let off = b.int_lit(layout.group_offset(i) as i64);
				b.emit_call(Builtin::RowWrite, vec![entry, off, *value]);
			}
			for (j, kind) in layout.kinds.iter().enumerate() {
				let kind_lit = b.int_lit(*kind as i64);
				let slot = ptr_offset(b, entry, layout.agg_offset(j));
				b.emit_call(Builtin::AggInit, vec![kind_lit, slot]);
			}
			Ok(())
		})?;

		// Advance every aggregator with this row's argument.
		for (j, (kind, spec)) in layout.kinds.iter().zip(&self.aggregates).enumerate() {
			let arg = match &spec.arg {
				Some(expr) => translate_expr(b, expr, &[row])?.0,
				None => {
					let zero = b.int_lit(0);
					b.call(Builtin::InitSqlInt, vec![zero])
				}
			};
			let kind_lit = b.int_lit(*kind as i64);
			let entry = b.local_expr(entry_local);
			let slot = ptr_offset(b, entry, layout.agg_offset(j));
			b.emit_call(Builtin::AggAdvance, vec![kind_lit, slot, arg]);
		}
		Ok(())
	}
}

/// Scan half: iterates the aggregation table, reconstructs group columns
/// and aggregate results, applies having, feeds the parent.
pub struct AggScanTranslator {
	idx: usize,
	layout: AggLayout,
	having: Option<Expr>,
	schema: OutputSchema,
}

impl AggScanTranslator {
	pub fn new(idx: usize, layout: AggLayout, having: Option<Expr>, schema: OutputSchema) -> Self {
		Self { idx, layout, having, schema }
	}
}

impl OperatorTranslator for AggScanTranslator {
	fn name(&self) -> &'static str {
		"agg_scan"
	}

	fn prepare(&mut self, _ctx: &mut CompilationContext, _arena: &mut IrArena) -> Result<()> {
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let iter_local = b.add_local(format!("agg_iter_{}", self.idx), IrType::AggHashTableIter);
		let iter = b.local_expr(iter_local);
		let ht = b.state_field(ctx.state_param, self.layout.ht_offset, IrType::AggHashTable);
		b.emit_call(Builtin::AggHtIterInit, vec![iter, ht]);

		b.emit_loop(|b| -> Result<()> {
			let has = b.call(Builtin::AggHtIterHasNext, vec![iter]);
			let done = b.unary(UnOp::Not, has);
			b.emit_if(done, |b| b.brk());

			let row_call = b.call(Builtin::AggHtIterGetRow, vec![iter]);
			let name = format!("agg_row_{}", b.arena().exprs.len());
			let row_local = b.declare_assign(name, IrType::RowPtr, row_call);
			let row_ptr = b.local_expr(row_local);

			// Rebuild [groups..., results...] as the operator's output row.
			let mut cols = Vec::new();
			for (i, ty) in self.layout.group_types.iter().enumerate() {
				let read = row_read_builtin(*ty)?;
				let off = b.int_lit(self.layout.group_offset(i) as i64);
				let value = b.call(read, vec![row_ptr, off]);
				let name = format!("agg_gout_{}", b.arena().exprs.len());
				let local = b.declare_assign(name, *ty, value);
				cols.push(b.local_expr(local));
			}
			for (j, kind) in self.layout.kinds.iter().enumerate() {
				let kind_lit = b.int_lit(*kind as i64);
				let slot = ptr_offset(b, row_ptr, self.layout.agg_offset(j));
				let value = b.call(Builtin::AggResult, vec![kind_lit, slot]);
				let name = format!("agg_rout_{}", b.arena().exprs.len());
				let local = b.declare_assign(name, kind.result_type(), value);
				cols.push(b.local_expr(local));
			}
			let agg_row = RowValues::new(cols);

			let emit_row = |b: &mut FunctionBuilder<'_>, ctx: &mut CompilationContext| -> Result<()> {
				let mut out = Vec::with_capacity(self.schema.arity());
				for column in &self.schema.columns {
					let (value, _) = translate_expr(b, &column.expr, &[&agg_row])?;
					let ty = expr_value_type(&column.expr);
					let name = format!("agg_out_{}", b.arena().exprs.len());
					let local = b.declare_assign(name, ty, value);
					out.push(b.local_expr(local));
				}
				ctx.consume_parent(b, self.idx, &RowValues::new(out))
			};

			if let Some(having) = &self.having {
				let cond = translate_predicate(b, having, &[&agg_row])?;
				b.emit_if(cond, |b| emit_row(b, ctx))?;
			} else {
				emit_row(b, ctx)?;
			}

			b.emit_call(Builtin::AggHtIterNext, vec![iter]);
			Ok(())
		})?;

		b.emit_call(Builtin::AggHtIterFree, vec![iter]);
		Ok(())
	}
}
