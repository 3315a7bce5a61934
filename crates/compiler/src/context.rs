// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Compilation context shared by every operator translator.
//!
//! Translators are arena-owned and reach each other exclusively through
//! indices; the produce/consume recursion takes a translator out of its
//! slot for the duration of the call and puts it back afterwards.

use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::ir::{ExprId, FunctionBuilder, LocalId};
use crate::pipeline::Pipeline;
use crate::state::QueryStateLayout;

/// One logical row flowing up a pipeline during code emission: an
/// expression (almost always a local reference) per column, plus the
/// originating tuple slot when a scan provides one.
#[derive(Debug, Clone, Default)]
pub struct RowValues {
	pub cols: Vec<ExprId>,
	pub slot: Option<ExprId>,
}

impl RowValues {
	pub fn new(cols: Vec<ExprId>) -> Self {
		Self { cols, slot: None }
	}

	pub fn with_slot(cols: Vec<ExprId>, slot: ExprId) -> Self {
		Self { cols, slot: Some(slot) }
	}
}

/// The per-operator method table: prepare registers query-state fields
/// and helper functions, init/teardown emit into setup and teardown,
/// produce drives (or delegates), consume handles one row from below.
pub trait OperatorTranslator {
	fn name(&self) -> &'static str;

	fn prepare(&mut self, ctx: &mut CompilationContext, arena: &mut crate::ir::IrArena) -> Result<()>;

	fn init_query_state(&self, _ctx: &mut CompilationContext, _b: &mut FunctionBuilder<'_>) -> Result<()> {
		Ok(())
	}

	fn teardown_query_state(&self, _ctx: &mut CompilationContext, _b: &mut FunctionBuilder<'_>) -> Result<()> {
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()>;

	fn consume(
		&self,
		_ctx: &mut CompilationContext,
		_b: &mut FunctionBuilder<'_>,
		_from: usize,
		_row: &RowValues,
	) -> Result<()> {
		Err(CompileError::Internal("operator cannot consume rows".into()))
	}
}

pub struct CompilationContext {
	pub state: QueryStateLayout,
	pub translators: Vec<Option<Box<dyn OperatorTranslator>>>,
	parents: Vec<Option<usize>>,
	pub pipelines: Vec<Pipeline>,
	/// Pipeline ids in execution order; build pipelines complete first.
	pub pipeline_order: Vec<usize>,
	/// Outer-row stash for joins whose inner side produces while an
	/// outer row is in scope.
	pub row_stash: HashMap<usize, RowValues>,
	/// Parameters of the function currently being emitted.
	pub state_param: LocalId,
	pub exec_param: LocalId,
}

impl CompilationContext {
	pub fn new() -> Self {
		Self {
			state: QueryStateLayout::new(),
			translators: Vec::new(),
			parents: Vec::new(),
			pipelines: Vec::new(),
			pipeline_order: Vec::new(),
			row_stash: HashMap::new(),
			state_param: LocalId(0),
			exec_param: LocalId(0),
		}
	}

	// ── Translator table ─────────────────────────────────────────────

	/// Reserve a translator slot; the box is installed once constructed.
	pub fn alloc_translator(&mut self, parent: Option<usize>) -> usize {
		self.translators.push(None);
		self.parents.push(parent);
		self.translators.len() - 1
	}

	pub fn install(&mut self, idx: usize, translator: Box<dyn OperatorTranslator>) {
		self.translators[idx] = Some(translator);
	}

	pub fn parent_of(&self, idx: usize) -> Option<usize> {
		self.parents.get(idx).copied().flatten()
	}

	fn take(&mut self, idx: usize) -> Result<Box<dyn OperatorTranslator>> {
		self.translators
			.get_mut(idx)
			.and_then(Option::take)
			.ok_or_else(|| CompileError::Internal(format!("translator {} is not available", idx)))
	}

	pub fn call_produce(&mut self, b: &mut FunctionBuilder<'_>, idx: usize) -> Result<()> {
		let translator = self.take(idx)?;
		let result = translator.produce(self, b);
		self.translators[idx] = Some(translator);
		result
	}

	/// Route a row from `child_idx` to its parent's consume.
	pub fn consume_parent(&mut self, b: &mut FunctionBuilder<'_>, child_idx: usize, row: &RowValues) -> Result<()> {
		let Some(parent_idx) = self.parent_of(child_idx) else {
			// Terminal translator of a build pipeline.
			return Ok(());
		};
		let translator = self.take(parent_idx)?;
		let result = translator.consume(self, b, child_idx, row);
		self.translators[parent_idx] = Some(translator);
		result
	}

	pub fn call_init(&mut self, b: &mut FunctionBuilder<'_>, idx: usize) -> Result<()> {
		let translator = self.take(idx)?;
		let result = translator.init_query_state(self, b);
		self.translators[idx] = Some(translator);
		result
	}

	pub fn call_teardown(&mut self, b: &mut FunctionBuilder<'_>, idx: usize) -> Result<()> {
		let translator = self.take(idx)?;
		let result = translator.teardown_query_state(self, b);
		self.translators[idx] = Some(translator);
		result
	}

	// ── Pipelines ────────────────────────────────────────────────────

	pub fn new_pipeline(&mut self) -> usize {
		self.pipelines.push(Pipeline::new(self.pipelines.len()));
		self.pipelines.len() - 1
	}

	pub fn add_to_pipeline(&mut self, pipeline: usize, translator: usize) {
		self.pipelines[pipeline].translators.push(translator);
	}

	/// Mark a pipeline complete; completion order is execution order, so
	/// a materializing build side always runs before its consumer.
	pub fn finish_pipeline(&mut self, pipeline: usize, driver: usize) {
		self.pipelines[pipeline].driver = Some(driver);
		self.pipeline_order.push(pipeline);
	}
}

impl Default for CompilationContext {
	fn default() -> Self {
		Self::new()
	}
}
