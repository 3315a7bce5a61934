// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use quarry_compiler::CompileError;
use quarry_index::IndexError;
use quarry_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
	#[error("invalid bytecode at position {position}")]
	InvalidBytecode { position: usize },

	#[error("unexpected end of bytecode")]
	UnexpectedEndOfBytecode,

	#[error("unknown function `{0}`")]
	UnknownFunction(String),

	#[error("unknown function id {0}")]
	UnknownFunctionId(u16),

	#[error("unknown table oid {0}")]
	UnknownTable(u32),

	#[error("unknown index oid {0}")]
	UnknownIndex(u32),

	#[error("integer division by zero")]
	DivideByZero,

	/// Guaranteed unreachable after a clean semantic pass; hitting this
	/// at runtime is a lowering bug.
	#[error("vm invariant violated: {0}")]
	Invariant(String),

	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error(transparent)]
	Index(#[from] IndexError),

	#[error(transparent)]
	Compile(#[from] CompileError),
}

pub type Result<T> = std::result::Result<T, VmError>;
