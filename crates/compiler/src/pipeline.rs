// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Pipelines: maximal operator chains executable without intermediate
//! materialization. Created during the plan walk, frozen before codegen,
//! discarded with the compilation context.

use crate::ir::FuncId;

#[derive(Debug, Clone)]
pub struct Pipeline {
	pub id: usize,
	/// Member translators, bottom to top, in registration order.
	pub translators: Vec<usize>,
	/// The translator whose produce drives this pipeline's function.
	pub driver: Option<usize>,
	/// Filled when the pipeline function is emitted.
	pub func: Option<FuncId>,
}

impl Pipeline {
	pub fn new(id: usize) -> Self {
		Self { id, translators: Vec::new(), driver: None, func: None }
	}
}

/// Introspection record for one emitted pipeline, in execution order.
#[derive(Debug, Clone)]
pub struct PipelineInfo {
	pub function: String,
	pub operators: Vec<&'static str>,
}
