// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Register-based bytecode VM and operator runtime.
//!
//! The compiler's typed program lowers here into an immutable module —
//! opcode stream, constant pools, function table — which the interpreter
//! runs against an execution context wired to the storage engine, the
//! ordered indexes, and an output callback.

pub use bytecode::{
	BytecodeEmitter, BytecodeModule, BytecodeReader, FunctionInfo, Label, Opcode, OpcodeInfo, Operand,
	OperandKind, OPCODE_TABLE,
};
pub use error::{Result, VmError};
pub use exec::{CatalogAccessor, ExecutionContext, MemoryCatalog, OutputBuffer, OutputCallback};
pub use generator::lower;
pub use interpreter::{execute, Machine};

pub mod ptr;
pub mod sql;

mod bytecode;
mod error;
mod exec;
mod generator;
mod interpreter;

use quarry_compiler::plan::PlanNode;

/// Compile, lower, and execute a plan in one step. Returns `main`'s
/// status code; the caller still owns transaction commit or abort and
/// must roll back when the context reports an abort.
pub fn run_query(plan: &PlanNode, exec: &mut ExecutionContext<'_>) -> Result<i32> {
	let compiled = quarry_compiler::compile(plan)?;
	let module = lower(&compiled)?;
	exec.set_output_arity(quarry_compiler::output_types(plan).len());
	execute(&module, exec)
}
