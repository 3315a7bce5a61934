// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Top-level query compilation: plan walk into translators and
//! pipelines, emission of the per-query function skeleton, and the
//! semantic gate before lowering.

use quarry_core::SqlType;
use tracing::instrument;

use crate::context::{CompilationContext, OperatorTranslator};
use crate::error::{CompileError, Result};
use crate::ir::{Builtin, FuncId, FunctionBuilder, IrArena, IrType};
use crate::pipeline::PipelineInfo;
use crate::plan::{OutputSchema, PlanNode};
use crate::sema;
use crate::translate::sql_value_type;
use crate::translators::{
	AggBuildTranslator, AggScanTranslator, DeleteTranslator, IndexJoinTranslator, IndexScanTranslator,
	InsertTranslator, JoinBuildTranslator, JoinProbeTranslator, LimitTranslator, NestLoopTranslator,
	OutputTranslator, ProjectionTranslator, SeqScanTranslator, SortBuildTranslator, SortScanTranslator,
	UpdateTranslator,
};

/// A fully compiled query: the typed program plus execution metadata.
pub struct CompiledQuery {
	pub arena: IrArena,
	pub expr_types: Vec<Option<IrType>>,
	/// Query-state buffer size in bytes.
	pub state_size: u32,
	pub main: FuncId,
	pub setup: FuncId,
	pub teardown: FuncId,
	/// Pipelines in execution order.
	pub pipelines: Vec<PipelineInfo>,
}

fn schema_value_types(schema: &OutputSchema) -> Vec<IrType> {
	schema.columns.iter().map(|c| sql_value_type(c.ty)).collect()
}

#[instrument(level = "debug", skip_all)]
pub fn compile(plan: &PlanNode) -> Result<CompiledQuery> {
	let mut arena = IrArena::new();
	let mut ctx = CompilationContext::new();

	// Plan walk: build translators, split pipelines at breakers.
	let root_pipeline = ctx.new_pipeline();
	let root_idx = build_node(plan, None, root_pipeline, false, &mut ctx, &mut arena)?;
	ctx.finish_pipeline(root_pipeline, root_idx);
	ctx.state.finalize();

	// setup(state, exec): every operator's query-state initialization.
	let setup = arena.declare_function("setup", IrType::Nil);
	{
		let mut b = FunctionBuilder::new(&mut arena, setup);
		ctx.state_param = b.add_param("state", IrType::StatePtr);
		ctx.exec_param = b.add_param("exec", IrType::ExecCtx);
		for idx in 0..ctx.translators.len() {
			ctx.call_init(&mut b, idx)?;
		}
		b.ret(None);
		b.finish();
	}

	// One function per pipeline, in execution order.
	let mut pipeline_fids = Vec::new();
	for (n, pid) in ctx.pipeline_order.clone().into_iter().enumerate() {
		let fid = arena.declare_function(format!("pipeline_{}", n), IrType::Nil);
		let mut b = FunctionBuilder::new(&mut arena, fid);
		ctx.state_param = b.add_param("state", IrType::StatePtr);
		ctx.exec_param = b.add_param("exec", IrType::ExecCtx);
		let driver = ctx.pipelines[pid]
			.driver
			.ok_or_else(|| CompileError::Internal("pipeline without driver".into()))?;
		ctx.call_produce(&mut b, driver)?;
		b.ret(None);
		b.finish();
		ctx.pipelines[pid].func = Some(fid);
		pipeline_fids.push(fid);
	}

	// teardown(state, exec): mirror of setup, reverse operator order.
	let teardown = arena.declare_function("teardown", IrType::Nil);
	{
		let mut b = FunctionBuilder::new(&mut arena, teardown);
		ctx.state_param = b.add_param("state", IrType::StatePtr);
		ctx.exec_param = b.add_param("exec", IrType::ExecCtx);
		for idx in (0..ctx.translators.len()).rev() {
			ctx.call_teardown(&mut b, idx)?;
		}
		b.ret(None);
		b.finish();
	}

	// main(exec): setup, pipelines with abort short-circuit, teardown.
	let main = arena.declare_function("main", IrType::Int32);
	{
		let mut b = FunctionBuilder::new(&mut arena, main);
		let exec_param = b.add_param("exec", IrType::ExecCtx);
		ctx.exec_param = exec_param;
		let state_base = b.call(Builtin::StateBase, Vec::new());
		let state_local = b.declare_assign("state", IrType::StatePtr, state_base);
		ctx.state_param = state_local;

		let setup_ref = b.func_lit(setup);
		let state = b.local_expr(state_local);
		let exec = b.local_expr(exec_param);
		b.emit_call(Builtin::CallFn, vec![setup_ref, state, exec]);

		b.emit_loop(|b| {
			for fid in &pipeline_fids {
				let f = b.func_lit(*fid);
				let state = b.local_expr(state_local);
				let exec = b.local_expr(exec_param);
				b.emit_call(Builtin::CallFn, vec![f, state, exec]);
				let exec = b.local_expr(exec_param);
				let aborted = b.call(Builtin::ExecAborted, vec![exec]);
				b.emit_if(aborted, |b| b.brk());
			}
			b.brk();
		});

		let teardown_ref = b.func_lit(teardown);
		let state = b.local_expr(state_local);
		let exec = b.local_expr(exec_param);
		b.emit_call(Builtin::CallFn, vec![teardown_ref, state, exec]);

		let zero = b.int_lit(0);
		b.ret(Some(zero));
		b.finish();
	}

	// Semantic gate: a full pass, then abort on any error.
	let (expr_types, reporter) = sema::check(&arena);
	if reporter.has_errors() {
		return Err(CompileError::TypeCheck(reporter.into_diagnostics()));
	}

	let pipelines = ctx
		.pipeline_order
		.iter()
		.map(|pid| {
			let pipeline = &ctx.pipelines[*pid];
			let function = pipeline
				.func
				.map(|fid| arena.function(fid).name.clone())
				.unwrap_or_default();
			let operators = pipeline
				.translators
				.iter()
				.filter_map(|t| ctx.translators[*t].as_ref().map(|t| t.name()))
				.collect();
			PipelineInfo { function, operators }
		})
		.collect();

	Ok(CompiledQuery {
		state_size: ctx.state.size(),
		arena,
		expr_types,
		main,
		setup,
		teardown,
		pipelines,
	})
}

fn build_node(
	node: &PlanNode,
	parent: Option<usize>,
	pipeline: usize,
	want_slot: bool,
	ctx: &mut CompilationContext,
	arena: &mut IrArena,
) -> Result<usize> {
	match node {
		PlanNode::SeqScan { table, columns, predicate, schema } => {
			let idx = ctx.alloc_translator(parent);
			let mut t = SeqScanTranslator::new(
				idx,
				*table,
				columns.clone(),
				predicate.clone(),
				schema.clone(),
				want_slot,
			);
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::IndexScan { index, table, columns, lo, hi, direction, limit, predicate, schema } => {
			if want_slot {
				return Err(CompileError::InvalidPlan(
					"index scans cannot feed slot-consuming operators".into(),
				));
			}
			let idx = ctx.alloc_translator(parent);
			let mut t = IndexScanTranslator::new(
				idx,
				*index,
				*table,
				columns.clone(),
				lo.clone(),
				hi.clone(),
				*direction,
				*limit,
				predicate.clone(),
				schema.clone(),
			);
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::Projection { child, schema } => {
			let idx = ctx.alloc_translator(parent);
			let child_idx = build_node(child, Some(idx), pipeline, want_slot, ctx, arena)?;
			let mut t = ProjectionTranslator::new(idx, child_idx, schema.clone());
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::Limit { child, skip, fetch, .. } => {
			let idx = ctx.alloc_translator(parent);
			let child_idx = build_node(child, Some(idx), pipeline, want_slot, ctx, arena)?;
			let mut t = LimitTranslator::new(idx, child_idx, *skip, *fetch);
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::Output { child, schema } => {
			let idx = ctx.alloc_translator(parent);
			let child_idx = build_node(child, Some(idx), pipeline, false, ctx, arena)?;
			let mut t = OutputTranslator::new(idx, child_idx, schema.clone());
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::NestLoop { left, right, predicate, schema } => {
			let idx = ctx.alloc_translator(parent);
			let left_idx = build_node(left, Some(idx), pipeline, false, ctx, arena)?;
			let right_idx = build_node(right, Some(idx), pipeline, false, ctx, arena)?;
			let mut t =
				NestLoopTranslator::new(idx, left_idx, right_idx, predicate.clone(), schema.clone());
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::HashJoin { left, right, left_keys, right_keys, predicate, schema } => {
			let probe_idx = ctx.alloc_translator(parent);
			let build_idx = ctx.alloc_translator(None);

			// Build side materializes in its own, earlier pipeline.
			let build_pipeline = ctx.new_pipeline();
			let left_idx = build_node(left, Some(build_idx), build_pipeline, false, ctx, arena)?;
			let left_schema = left
				.schema()
				.ok_or_else(|| CompileError::InvalidPlan("join build side without schema".into()))?;
			let mut build = JoinBuildTranslator::new(
				build_idx,
				left_idx,
				left_keys.clone(),
				schema_value_types(left_schema),
			);
			build.prepare(ctx, arena)?;
			let layout = build.layout()?.clone();
			ctx.install(build_idx, Box::new(build));
			ctx.add_to_pipeline(build_pipeline, build_idx);
			ctx.finish_pipeline(build_pipeline, build_idx);

			let right_idx = build_node(right, Some(probe_idx), pipeline, false, ctx, arena)?;
			let mut probe = JoinProbeTranslator::new(
				probe_idx,
				right_idx,
				layout,
				left_keys.clone(),
				right_keys.clone(),
				predicate.clone(),
				schema.clone(),
			);
			probe.prepare(ctx, arena)?;
			ctx.install(probe_idx, Box::new(probe));
			ctx.add_to_pipeline(pipeline, probe_idx);
			Ok(probe_idx)
		}

		PlanNode::IndexJoin { child, index, table, columns, key_exprs, predicate, schema } => {
			let idx = ctx.alloc_translator(parent);
			let child_idx = build_node(child, Some(idx), pipeline, false, ctx, arena)?;
			let mut t = IndexJoinTranslator::new(
				idx,
				child_idx,
				*index,
				*table,
				columns.clone(),
				key_exprs.clone(),
				predicate.clone(),
				schema.clone(),
			);
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::Aggregate { child, group_by, aggregates, having, schema } => {
			let top_idx = ctx.alloc_translator(parent);
			let bottom_idx = ctx.alloc_translator(None);

			let build_pipeline = ctx.new_pipeline();
			let child_idx = build_node(child, Some(bottom_idx), build_pipeline, false, ctx, arena)?;
			let mut bottom =
				AggBuildTranslator::new(bottom_idx, child_idx, group_by.clone(), aggregates.clone());
			bottom.prepare(ctx, arena)?;
			let layout = bottom.layout()?.clone();
			ctx.install(bottom_idx, Box::new(bottom));
			ctx.add_to_pipeline(build_pipeline, bottom_idx);
			ctx.finish_pipeline(build_pipeline, bottom_idx);

			let mut top = AggScanTranslator::new(top_idx, layout, having.clone(), schema.clone());
			top.prepare(ctx, arena)?;
			ctx.install(top_idx, Box::new(top));
			ctx.add_to_pipeline(pipeline, top_idx);
			Ok(top_idx)
		}

		PlanNode::OrderBy { child, keys, limit, schema } => {
			let top_idx = ctx.alloc_translator(parent);
			let bottom_idx = ctx.alloc_translator(None);

			let build_pipeline = ctx.new_pipeline();
			let child_idx = build_node(child, Some(bottom_idx), build_pipeline, false, ctx, arena)?;
			let child_schema = child
				.schema()
				.ok_or_else(|| CompileError::InvalidPlan("sort child without schema".into()))?;
			let mut bottom = SortBuildTranslator::new(
				bottom_idx,
				child_idx,
				keys.clone(),
				schema_value_types(child_schema),
				*limit,
			);
			bottom.prepare(ctx, arena)?;
			let layout = bottom.layout()?.clone();
			ctx.install(bottom_idx, Box::new(bottom));
			ctx.add_to_pipeline(build_pipeline, bottom_idx);
			ctx.finish_pipeline(build_pipeline, bottom_idx);

			let mut top = SortScanTranslator::new(top_idx, layout, schema.clone());
			top.prepare(ctx, arena)?;
			ctx.install(top_idx, Box::new(top));
			ctx.add_to_pipeline(pipeline, top_idx);
			Ok(top_idx)
		}

		PlanNode::Insert { table, columns, rows, indexes } => {
			let idx = ctx.alloc_translator(parent);
			let mut t =
				InsertTranslator::new(*table, columns.clone(), rows.clone(), indexes.clone());
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::Update { child, table, assignments } => {
			let idx = ctx.alloc_translator(parent);
			let child_idx = build_node(child, Some(idx), pipeline, true, ctx, arena)?;
			let mut t = UpdateTranslator::new(child_idx, *table, assignments.clone());
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}

		PlanNode::Delete { child, table } => {
			let idx = ctx.alloc_translator(parent);
			let child_idx = build_node(child, Some(idx), pipeline, true, ctx, arena)?;
			let mut t = DeleteTranslator::new(child_idx, *table);
			t.prepare(ctx, arena)?;
			ctx.install(idx, Box::new(t));
			ctx.add_to_pipeline(pipeline, idx);
			Ok(idx)
		}
	}
}

/// Columns of a schema as `(name, type)` pairs, the shape the execution
/// context needs for its output buffer.
pub fn output_types(plan: &PlanNode) -> Vec<SqlType> {
	plan.schema()
		.map(|s| s.columns.iter().map(|c| c.ty).collect())
		.unwrap_or_default()
}
